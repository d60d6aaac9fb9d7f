//! Encoded raster images as exchanged with the editing service.
//!
//! [`ImageData`] is the raw file bytes plus their declared media type.  It
//! converts to and from `data:<type>;base64,<payload>` URLs and can be read
//! from or written to disk.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ImageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("not a base64 data URL")]
    InvalidDataUrl,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("image file is empty")]
    Empty,

    #[error("image I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// ImageData
// ---------------------------------------------------------------------------

/// An encoded image (PNG, JPEG, …) and its media type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Build from a media type and a base64 payload.
    pub fn from_base64(media_type: impl Into<String>, data: &str) -> Result<Self, ImageError> {
        Ok(Self::new(media_type, BASE64.decode(data.trim())?))
    }

    /// Parse a `data:<type>;base64,<payload>` URL.
    ///
    /// ```rust
    /// use nano_edit::editor::ImageData;
    ///
    /// let img = ImageData::from_data_url("data:image/png;base64,iVBORw==").unwrap();
    /// assert_eq!(img.media_type, "image/png");
    /// assert_eq!(img.to_data_url(), "data:image/png;base64,iVBORw==");
    /// ```
    pub fn from_data_url(url: &str) -> Result<Self, ImageError> {
        let rest = url.strip_prefix("data:").ok_or(ImageError::InvalidDataUrl)?;
        let (media_type, payload) = rest
            .split_once(";base64,")
            .ok_or(ImageError::InvalidDataUrl)?;
        if !is_valid_media_type(media_type) || payload.is_empty() {
            return Err(ImageError::InvalidDataUrl);
        }
        Self::from_base64(media_type, payload)
    }

    /// Base64 of the raw bytes.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `data:<type>;base64,<payload>`.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    /// A recognised `type/subtype` media type and a non-empty payload.
    pub fn is_well_formed(&self) -> bool {
        is_valid_media_type(&self.media_type) && !self.bytes.is_empty()
    }

    /// Read an image file; the media type comes from the extension.
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let media_type = media_type_for_extension(&ext)
            .ok_or_else(|| ImageError::UnsupportedType(ext.clone()))?;

        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self::new(media_type, bytes))
    }

    /// Write the raw bytes to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ImageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// File extension matching the media type (`"png"` when unknown).
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/heic" => "heic",
            "image/heif" => "heif",
            _ => "png",
        }
    }
}

fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// `<alnum>+/<alnum or - . +>+`
fn is_valid_media_type(media_type: &str) -> bool {
    let Some((kind, subtype)) = media_type.split_once('/') else {
        return false;
    };
    !kind.is_empty()
        && !subtype.is_empty()
        && kind.chars().all(|c| c.is_ascii_alphanumeric())
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '+'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn data_url_round_trip() {
        let img = ImageData::new("image/png", vec![1, 2, 3, 4]);
        let parsed = ImageData::from_data_url(&img.to_data_url()).unwrap();
        assert_eq!(parsed, img);
    }

    #[test]
    fn data_url_requires_prefix_and_base64_marker() {
        assert!(ImageData::from_data_url("image/png;base64,AAAA").is_err());
        assert!(ImageData::from_data_url("data:image/png,AAAA").is_err());
        assert!(ImageData::from_data_url("data:image/png;base64,").is_err());
        assert!(ImageData::from_data_url("data:png;base64,AAAA").is_err());
    }

    #[test]
    fn media_type_validation() {
        assert!(is_valid_media_type("image/png"));
        assert!(is_valid_media_type("image/svg+xml"));
        assert!(is_valid_media_type("image/vnd.ms-photo"));
        assert!(!is_valid_media_type("image/"));
        assert!(!is_valid_media_type("image png"));
        assert!(!is_valid_media_type("im age/png"));
    }

    #[test]
    fn empty_payload_is_not_well_formed() {
        assert!(!ImageData::new("image/png", vec![]).is_well_formed());
        assert!(!ImageData::new("png", vec![1]).is_well_formed());
        assert!(ImageData::new("image/png", vec![1]).is_well_formed());
    }

    #[test]
    fn load_infers_media_type_and_save_writes_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.JPG");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF]).unwrap();

        let img = ImageData::load(&path).unwrap();
        assert_eq!(img.media_type, "image/jpeg");
        assert_eq!(img.extension(), "jpg");

        let out = dir.path().join("nested").join("copy.jpg");
        img.save(&out).unwrap();
        assert_eq!(std::fs::read(out).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn load_rejects_unknown_extension_and_empty_file() {
        let dir = tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();
        assert!(matches!(
            ImageData::load(&txt),
            Err(ImageError::UnsupportedType(_))
        ));

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(ImageData::load(&empty), Err(ImageError::Empty)));
    }

    #[test]
    fn debug_does_not_dump_bytes() {
        let img = ImageData::new("image/png", vec![0; 1024]);
        let dbg = format!("{img:?}");
        assert!(dbg.contains("len: 1024"));
    }
}

//! JSON message types for the Gemini Live bidirectional stream.
//!
//! Outbound messages are externally tagged (`{"setup": {...}}`,
//! `{"realtimeInput": {...}}`, `{"toolResponse": {...}}`).  Inbound messages
//! are a loose union where any of `setupComplete`, `serverContent` and
//! `toolCall` may be present; [`ServerMessage::into_events`] flattens one
//! into the ordered list of events the session reacts to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::WireFrame;
use crate::config::VoiceConfig;

/// Name of the single tool the assistant may call.
pub const APPLY_IMAGE_EDIT_TOOL: &str = "apply_image_edit";

/// Argument of [`APPLY_IMAGE_EDIT_TOOL`] carrying the edit text.
pub const INSTRUCTION_ARG: &str = "instruction";

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Inline base64 payload with its MIME type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

impl From<WireFrame> for Blob {
    fn from(frame: WireFrame) -> Self {
        Self {
            mime_type: frame.mime_type,
            data: frame.data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoice {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    pub prebuilt_voice_config: PrebuiltVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceSelection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// OpenAPI-style schema of the arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Serialises as `{}`; its presence enables input transcription.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

/// First message on the stream; configures the model for the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<Tool>,
    pub input_audio_transcription: AudioTranscriptionConfig,
}

impl SessionSetup {
    /// Audio-only responses, the configured voice and system instruction,
    /// the `apply_image_edit` tool, and input transcription.
    pub fn from_config(config: &VoiceConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".into()],
                speech_config: SpeechConfig {
                    voice_config: VoiceSelection {
                        prebuilt_voice_config: PrebuiltVoice {
                            voice_name: config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
            tools: vec![Tool {
                function_declarations: vec![apply_image_edit_declaration()],
            }],
            input_audio_transcription: AudioTranscriptionConfig::default(),
        }
    }
}

fn apply_image_edit_declaration() -> FunctionDeclaration {
    FunctionDeclaration {
        name: APPLY_IMAGE_EDIT_TOOL.into(),
        description: "Trigger an image edit based on user instructions.".into(),
        parameters: serde_json::json!({
            "type": "OBJECT",
            "properties": {
                "instruction": {
                    "type": "STRING",
                    "description": "The specific editing instruction (e.g., \"make it brighter\", \"add a dog\")."
                }
            },
            "required": ["instruction"]
        }),
    }
}

// ---------------------------------------------------------------------------
// ClientMessage (outbound)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Every message the client sends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SessionSetup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// One block of microphone audio.
    pub fn audio(frame: WireFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame.into()],
        })
    }

    /// Reply to function call `id` with `{"result": result}`.
    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, result: &str) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: id.into(),
                name: name.into(),
                response: serde_json::json!({ "result": result }),
            }],
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// ServerMessage (inbound)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<Blob>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    pub input_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl FunctionCall {
    /// The `instruction` argument; missing or non-string reads as empty.
    pub fn instruction(&self) -> String {
        self.args
            .get(INSTRUCTION_ARG)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// Any message the server sends.  Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<ToolCall>,
}

/// One thing the session has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ToolCall(FunctionCall),
    Transcription(String),
    TurnComplete,
    /// Base64 PCM16 payload.
    Audio(String),
    Interrupted,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Events in handling order: tool calls, transcription, turn complete,
    /// audio, interruption.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if let Some(tool_call) = self.tool_call {
            events.extend(tool_call.function_calls.into_iter().map(InboundEvent::ToolCall));
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(transcription) = content.input_transcription {
            events.push(InboundEvent::Transcription(transcription.text));
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
        if let Some(turn) = content.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(|blob| blob.mime_type.is_empty() || blob.mime_type.starts_with("audio/"))
                    .map(|blob| InboundEvent::Audio(blob.data)),
            );
        }
        if content.interrupted {
            events.push(InboundEvent::Interrupted);
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_serialises_with_camel_case_tag() {
        let setup = SessionSetup::from_config(&VoiceConfig::default());
        let json: Value =
            serde_json::from_str(&ClientMessage::Setup(setup).to_json().unwrap()).unwrap();
        let setup = &json["setup"];

        assert_eq!(
            setup["model"],
            "models/gemini-2.5-flash-native-audio-preview-09-2025"
        );
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
        assert!(setup["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("apply_image_edit"));
        assert!(setup["inputAudioTranscription"].is_object());

        let decl = &setup["tools"][0]["functionDeclarations"][0];
        assert_eq!(decl["name"], APPLY_IMAGE_EDIT_TOOL);
        assert_eq!(decl["parameters"]["properties"]["instruction"]["type"], "STRING");
        assert_eq!(decl["parameters"]["required"][0], "instruction");
    }

    #[test]
    fn model_prefix_is_not_doubled() {
        let config = VoiceConfig {
            model: "models/custom".into(),
            ..VoiceConfig::default()
        };
        assert_eq!(SessionSetup::from_config(&config).model, "models/custom");
    }

    #[test]
    fn audio_and_tool_result_messages() {
        let frame = WireFrame {
            mime_type: "audio/pcm;rate=16000".into(),
            data: "AAAA".into(),
        };
        let json: Value =
            serde_json::from_str(&ClientMessage::audio(frame).to_json().unwrap()).unwrap();
        assert_eq!(
            json["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");

        let reply = ClientMessage::tool_result("call-1", APPLY_IMAGE_EDIT_TOOL, "done");
        let json: Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();
        let response = &json["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "call-1");
        assert_eq!(response["name"], APPLY_IMAGE_EDIT_TOOL);
        assert_eq!(response["response"]["result"], "done");
    }

    #[test]
    fn setup_complete_is_detected() {
        let msg = ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn server_content_events_are_ordered() {
        let msg = ServerMessage::parse(
            r#"{
                "serverContent": {
                    "interrupted": true,
                    "modelTurn": { "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                        { "text": "thinking" },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "BBBB" } }
                    ] },
                    "turnComplete": true,
                    "inputTranscription": { "text": "make it blue" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            msg.into_events(),
            vec![
                InboundEvent::Transcription("make it blue".into()),
                InboundEvent::TurnComplete,
                InboundEvent::Audio("AAAA".into()),
                InboundEvent::Audio("BBBB".into()),
                InboundEvent::Interrupted,
            ]
        );
    }

    #[test]
    fn non_audio_inline_data_is_ignored() {
        let msg = ServerMessage::parse(
            r#"{"serverContent":{"modelTurn":{"parts":[
                {"inlineData":{"mimeType":"image/png","data":"AAAA"}}
            ]}}}"#,
        )
        .unwrap();
        assert!(msg.into_events().is_empty());
    }

    #[test]
    fn tool_calls_come_first_in_order() {
        let msg = ServerMessage::parse(
            r#"{
                "toolCall": { "functionCalls": [
                    { "id": "a", "name": "apply_image_edit", "args": { "instruction": "add a hat" } },
                    { "id": "b", "name": "apply_image_edit", "args": {} }
                ] }
            }"#,
        )
        .unwrap();

        let events = msg.into_events();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (InboundEvent::ToolCall(a), InboundEvent::ToolCall(b)) => {
                assert_eq!(a.id, "a");
                assert_eq!(a.instruction(), "add a hat");
                assert_eq!(b.id, "b");
                assert_eq!(b.instruction(), "");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn unknown_shapes_parse_to_nothing() {
        let msg = ServerMessage::parse(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
        assert!(!msg.is_setup_complete());
        assert!(msg.into_events().is_empty());
    }
}

use serde::Deserialize;
use utoipa::ToSchema;

/// Body of an operator broadcast to every connected WebSocket client.
///
/// # Fields
///
/// * `kind` - Envelope `type` clients receive; defaults to `system_message`
/// * `message` - Human readable text, delivered as `{"message": ...}`
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct BroadcastParams {
    #[serde(rename = "type", default)]
    #[schema(example = "maintenance")]
    pub(crate) kind: Option<String>,
    #[schema(example = "Scanner restarting in 5 minutes")]
    pub(crate) message: String,
}

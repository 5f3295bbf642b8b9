use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

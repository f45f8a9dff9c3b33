use serde::{Deserialize, Serialize};

/// Platform limit: controls per rendered row.
pub const MAX_CONTROLS_PER_ROW: usize = 5;
/// Platform limit: control rows per message.
pub const MAX_CONTROL_ROWS: usize = 5;

/// Display identity carried on a relayed copy so the author appears as
/// themselves in every destination channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorIdentity {
    pub user_id: i64,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// "Replying to <author>: <snippet>" affordance, pointing at the reply
/// target's copy in the destination channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub author_name: String,
    pub snippet: String,
    pub target_physical_id: i64,
}

/// One interactive control (button) on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRow {
    pub controls: Vec<Control>,
}

/// A message as handed to the platform for delivery through one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub author: AuthorIdentity,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyPreview>,
    #[serde(default)]
    pub controls: Vec<ControlRow>,
}

impl OutboundMessage {
    pub fn new(author: AuthorIdentity, content: impl Into<String>) -> Self {
        Self {
            author,
            content: content.into(),
            attachments: Vec::new(),
            reply: None,
            controls: Vec::new(),
        }
    }
}

/// Partial update applied to an existing physical message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<Vec<ControlRow>>,
}

impl MessageEdit {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            controls: None,
        }
    }

    pub fn controls(rows: Vec<ControlRow>) -> Self {
        Self {
            content: None,
            controls: Some(rows),
        }
    }
}

use crate::channel::ChannelKind;
use serde::{Deserialize, Serialize};

/// A newly authored message observed at one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub guild_id: i64,
    pub channel_id: i64,
    pub physical_id: i64,
    pub author_id: i64,
    pub author_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Physical id of the message this one replies to, if any.
    #[serde(default)]
    pub reference_physical_id: Option<i64>,
}

/// A control (button) click on a message we sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlClick {
    pub guild_id: i64,
    pub channel_id: i64,
    pub physical_id: i64,
    pub user_id: i64,
    pub control_id: String,
}

/// Everything the relay consumes from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    MessageCreated(InboundMessage),
    MessageEdited {
        channel_id: i64,
        physical_id: i64,
        editor_id: i64,
        content: String,
    },
    MessageDeleted {
        channel_id: i64,
        physical_id: i64,
        /// Who deleted, when the platform reports it. Absent for deletions
        /// the platform performed itself.
        #[serde(default)]
        actor_id: Option<i64>,
    },
    ReactionAdded {
        channel_id: i64,
        physical_id: i64,
        user_id: i64,
        symbol: String,
    },
    PinChanged {
        channel_id: i64,
        physical_id: i64,
        pinned: bool,
    },
    ControlClicked(ControlClick),
    JoinRequested {
        guild_id: i64,
        channel_id: i64,
        kind: ChannelKind,
        requester_id: i64,
    },
    BanRemoved {
        guild_id: i64,
        user_id: i64,
    },
    GuildRemoved {
        guild_id: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_json() {
        let event = PlatformEvent::ReactionAdded {
            channel_id: 1,
            physical_id: 2,
            user_id: 3,
            symbol: "👍".to_string(),
        };
        let text = serde_json::to_string(&event).expect("serialize");
        assert!(text.contains("\"reaction_added\""));
        let back: PlatformEvent = serde_json::from_str(&text).expect("deserialize");
        match back {
            PlatformEvent::ReactionAdded { symbol, .. } => assert_eq!(symbol, "👍"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

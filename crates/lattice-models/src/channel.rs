use serde::{Deserialize, Serialize};

/// Which shared conversation a bound channel participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    General,
    Staff,
    Banshare,
    Info,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Staff => "staff",
            Self::Banshare => "banshare",
            Self::Info => "info",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(Self::General),
            "staff" => Some(Self::Staff),
            "banshare" => Some(Self::Banshare),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// How a guild's banshare endpoint reacts to incoming ban recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoBanLevel {
    /// Never ban automatically; moderators decide per case.
    None,
    /// Ban automatically only when the case reached reviewer quorum.
    Important,
    /// Ban automatically for every dispatched case.
    All,
}

impl AutoBanLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Important => "important",
            Self::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "important" => Some(Self::Important),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// One channel bound into the relay network.
///
/// The credential is the opaque capability used to send, edit and delete
/// through this endpoint. At most one active endpoint exists per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub guild_id: i64,
    pub channel_id: i64,
    pub kind: ChannelKind,
    pub credential: String,
    pub important_role_id: Option<i64>,
    pub auto_ban_level: AutoBanLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    Accepted,
    Rejected,
}

impl JoinStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Lifecycle of a banshare case. Forward-only, except that an external
/// unban signal forces `Overturned` from either decided state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanshareStatus {
    Pending,
    Enforced,
    Rejected,
    Overturned,
}

impl BanshareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enforced => "enforced",
            Self::Rejected => "rejected",
            Self::Overturned => "overturned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "enforced" => Some(Self::Enforced),
            "rejected" => Some(Self::Rejected),
            "overturned" => Some(Self::Overturned),
            _ => None,
        }
    }
}

/// One guild's decision on a dispatched case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuildDecision {
    Pending,
    Enforced,
    Rejected,
    Overturned,
}

impl GuildDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enforced => "enforced",
            Self::Rejected => "rejected",
            Self::Overturned => "overturned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "enforced" => Some(Self::Enforced),
            "rejected" => Some(Self::Rejected),
            "overturned" => Some(Self::Overturned),
            _ => None,
        }
    }
}

/// Action encoded in a control identifier.
///
/// Identifiers carry only the action and a record key; approval state lives
/// in its own table keyed by case id, never in the identifier itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Dispatch the case to the network as a plain banshare.
    Banshare { case_id: i64 },
    /// Toggle this reviewer's approval toward the important-banshare quorum.
    ImportantBanshare { case_id: i64 },
    /// Reject the case at central review.
    RejectBanshare { case_id: i64 },
    /// A member guild's moderator enforces the case locally.
    GuildEnforce { case_id: i64 },
    /// A member guild's moderator declines the case locally.
    GuildReject { case_id: i64 },
    /// Accept a pending network join request.
    JoinAccept { request_id: i64 },
    /// Reject a pending network join request.
    JoinReject { request_id: i64 },
    /// Toggle an aggregated reaction.
    React { symbol: String },
    /// Start the guided banshare submission dialog.
    StartDialog,
}

impl ControlAction {
    pub fn id(&self) -> String {
        match self {
            Self::Banshare { case_id } => format!("banshare:{case_id}"),
            Self::ImportantBanshare { case_id } => format!("banshare-important:{case_id}"),
            Self::RejectBanshare { case_id } => format!("banshare-reject:{case_id}"),
            Self::GuildEnforce { case_id } => format!("guild-enforce:{case_id}"),
            Self::GuildReject { case_id } => format!("guild-reject:{case_id}"),
            Self::JoinAccept { request_id } => format!("join-accept:{request_id}"),
            Self::JoinReject { request_id } => format!("join-reject:{request_id}"),
            Self::React { symbol } => format!("react:{symbol}"),
            Self::StartDialog => "banshare-dialog".to_string(),
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        if id == "banshare-dialog" {
            return Some(Self::StartDialog);
        }
        let (prefix, rest) = id.split_once(':')?;
        match prefix {
            "react" if !rest.is_empty() => Some(Self::React {
                symbol: rest.to_string(),
            }),
            "banshare" => Some(Self::Banshare {
                case_id: rest.parse().ok()?,
            }),
            "banshare-important" => Some(Self::ImportantBanshare {
                case_id: rest.parse().ok()?,
            }),
            "banshare-reject" => Some(Self::RejectBanshare {
                case_id: rest.parse().ok()?,
            }),
            "guild-enforce" => Some(Self::GuildEnforce {
                case_id: rest.parse().ok()?,
            }),
            "guild-reject" => Some(Self::GuildReject {
                case_id: rest.parse().ok()?,
            }),
            "join-accept" => Some(Self::JoinAccept {
                request_id: rest.parse().ok()?,
            }),
            "join-reject" => Some(Self::JoinReject {
                request_id: rest.parse().ok()?,
            }),
            _ => None,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub poll_id: i64,
    pub title: String,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub option_id: i64,
    pub poll_id: i64,
    pub label: String,
    pub position: i64,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub vote_id: i64,
    pub option_id: i64,
    pub client_id: String,
    pub voted_at: DateTime<Utc>,
}

/// A raw vote submission as handed over by the transport layer.
///
/// `option_id` stays the untyped string the client sent; the validator is
/// responsible for parsing it. `remote_addr` and `user_agent` feed the
/// derived client identity when no explicit token was supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteRequest {
    pub option_id: Option<String>,
    pub client_token: Option<String>,
    #[serde(default)]
    pub remote_addr: String,
    #[serde(default)]
    pub user_agent: String,
}

/// Point-in-time view of a poll's counts, as delivered to viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub poll_id: i64,
    pub title: String,
    pub total_votes: i64,
    pub options: Vec<OptionStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionStats {
    pub option_id: i64,
    pub label: String,
    pub vote_count: i64,
    pub percentage: f64,
}

/// Result of a vote submission. A duplicate vote is a defined outcome, not
/// an error: the caller still gets the current results to present.
#[derive(Debug, Clone)]
pub enum VoteOutcome {
    Recorded { new_count: i64, snapshot: PollSnapshot },
    AlreadyVoted { snapshot: PollSnapshot },
}

impl VoteOutcome {
    pub fn snapshot(&self) -> &PollSnapshot {
        match self {
            VoteOutcome::Recorded { snapshot, .. } => snapshot,
            VoteOutcome::AlreadyVoted { snapshot } => snapshot,
        }
    }

    pub fn was_recorded(&self) -> bool {
        matches!(self, VoteOutcome::Recorded { .. })
    }
}

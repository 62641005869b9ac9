//! Vote recording and aggregation core of a realtime poll service.
//!
//! The engine validates a submission, enforces one vote per client per
//! poll inside a single storage transaction, keeps the cached per-option
//! counts exact, computes percentage statistics, and broadcasts fresh
//! snapshots to live viewers. HTTP/websocket routing and process bootstrap
//! live in the consuming service, not here.

pub mod db;
pub mod engine;
pub mod error;
pub mod hub;
pub mod models;

pub use db::Database;
pub use engine::VoteEngine;
pub use engine::validate::{ClientResolver, SourceHashResolver};
pub use error::{StorageError, VoteError};
pub use hub::UpdateHub;
pub use models::{Poll, PollOption, PollSnapshot, Vote, VoteOutcome, VoteRequest};

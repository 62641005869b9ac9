pub mod stats;
pub mod validate;

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::db::Database;
use crate::error::VoteError;
use crate::hub::UpdateHub;
use crate::models::{PollSnapshot, VoteOutcome, VoteRequest};
use validate::{ClientResolver, SourceHashResolver};

/// The vote recording and aggregation engine.
///
/// Owns the validate -> dedup -> record flow. Recording runs in a single
/// transaction: the option existence and dedup checks are re-evaluated
/// inside it so two concurrent submissions from the same client cannot
/// both pass the check before either writes.
pub struct VoteEngine {
    db: Arc<Database>,
    hub: Arc<UpdateHub>,
    resolver: Box<dyn ClientResolver>,
}

impl VoteEngine {
    pub fn new(db: Arc<Database>, hub: Arc<UpdateHub>) -> Self {
        Self::with_resolver(db, hub, Box::new(SourceHashResolver::default()))
    }

    pub fn with_resolver(
        db: Arc<Database>,
        hub: Arc<UpdateHub>,
        resolver: Box<dyn ClientResolver>,
    ) -> Self {
        Self { db, hub, resolver }
    }

    pub fn hub(&self) -> &Arc<UpdateHub> {
        &self.hub
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Validate and record one vote submission.
    ///
    /// A duplicate vote is returned as `VoteOutcome::AlreadyVoted` with the
    /// current snapshot; only genuine failures surface as errors. On
    /// success the fresh snapshot is broadcast to the poll's subscribers.
    pub async fn submit_vote(&self, request: &VoteRequest) -> Result<VoteOutcome, VoteError> {
        let option_id = validate::parse_option_id(request)?;
        let client_id = self.resolver.resolve(request);

        // Validation lookup: the option must exist before we open the
        // ledger transaction.
        let option = self
            .db
            .find_option(option_id)
            .await?
            .ok_or(VoteError::OptionNotFound(option_id))?;
        let poll_id = option.poll_id;

        info!("Recording vote: option_id={option_id}, poll_id={poll_id}, client_id={client_id}");

        let mut tx = self.db.begin().await?;

        // Re-check inside the transaction; the option may have raced with
        // a delete since validation.
        if Database::option_in_tx(&mut *tx, option_id).await?.is_none() {
            return Err(VoteError::OptionGone(option_id));
        }

        if Database::vote_exists(&mut *tx, poll_id, &client_id).await? {
            // Release the transaction before the snapshot read; nothing
            // was written, so the drop rolls back a no-op.
            drop(tx);
            info!("Client {client_id} already voted in poll {poll_id}, returning current results");
            let snapshot = self.snapshot(poll_id).await?;
            return Ok(VoteOutcome::AlreadyVoted { snapshot });
        }

        let vote_id = Database::insert_vote(&mut *tx, option_id, &client_id, Utc::now()).await?;

        let new_count = Database::increment_vote_count(&mut *tx, option_id)
            .await?
            .ok_or_else(|| {
                VoteError::Integrity(format!(
                    "option {option_id} vanished mid-transaction after existence check"
                ))
            })?;

        tx.commit().await?;
        info!("Vote recorded: vote_id={vote_id}, option_id={option_id}, new_count={new_count}");

        let snapshot = self.snapshot(poll_id).await?;
        let reached = self.hub.publish(poll_id, snapshot.clone());
        if reached > 0 {
            info!("Published snapshot for poll {poll_id} to {reached} subscriber(s)");
        }

        Ok(VoteOutcome::Recorded { new_count, snapshot })
    }

    /// Current statistics for a poll.
    pub async fn snapshot(&self, poll_id: i64) -> Result<PollSnapshot, VoteError> {
        let poll = self
            .db
            .get_poll(poll_id)
            .await?
            .ok_or(VoteError::PollNotFound(poll_id))?;

        Ok(stats::snapshot_of(&poll))
    }

    /// Snapshot of the single active poll, for viewers connecting without
    /// a poll id.
    pub async fn current_snapshot(&self) -> Result<Option<PollSnapshot>, VoteError> {
        match self.db.current_poll().await? {
            Some(poll) => Ok(Some(stats::snapshot_of(&poll))),
            None => {
                warn!("No active poll configured");
                Ok(None)
            }
        }
    }
}

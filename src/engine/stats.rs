use crate::models::{OptionStats, Poll, PollSnapshot};

/// Build the statistics snapshot for a loaded poll.
///
/// The total is the sum of the cached per-option counts, not a separate
/// vote-row count, so it stays consistent with the counters the ledger
/// maintains. A zero total yields 0.0 for every option rather than an
/// error.
pub fn snapshot_of(poll: &Poll) -> PollSnapshot {
    let total_votes: i64 = poll.options.iter().map(|o| o.vote_count).sum();

    let options = poll
        .options
        .iter()
        .map(|option| OptionStats {
            option_id: option.option_id,
            label: option.label.clone(),
            vote_count: option.vote_count,
            percentage: percentage(option.vote_count, total_votes),
        })
        .collect();

    PollSnapshot {
        poll_id: poll.poll_id,
        title: poll.title.clone(),
        total_votes,
        options,
    }
}

// count / total * 100, rounded to 2 decimal places
fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

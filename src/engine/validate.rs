use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

use crate::error::VoteError;
use crate::models::VoteRequest;

/// Resolves the opaque client identifier used for duplicate suppression.
///
/// Not an identity guarantee. Kept behind a trait so a stronger identity
/// scheme can replace the hash heuristic without touching the ledger.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, request: &VoteRequest) -> String;
}

/// Default resolver: the supplied token verbatim when non-empty, otherwise
/// an id derived from the network origin and client software string.
///
/// The hash is seeded with fixed keys so the derived id is stable across
/// restarts. Collisions merely over-suppress distinct voters; that is the
/// accepted tradeoff of a non-cryptographic hash here.
pub struct SourceHashResolver {
    hash_state: RandomState,
}

impl Default for SourceHashResolver {
    fn default() -> Self {
        Self {
            hash_state: RandomState::with_seeds(
                0x6c69_7665,
                0x706f_6c6c,
                0x766f_7465,
                0x6875_6221,
            ),
        }
    }
}

impl ClientResolver for SourceHashResolver {
    fn resolve(&self, request: &VoteRequest) -> String {
        if let Some(token) = &request.client_token {
            if !token.trim().is_empty() {
                return token.clone();
            }
        }

        let mut hasher = self.hash_state.build_hasher();
        hasher.write(request.user_agent.as_bytes());
        format!("{}_{:x}", request.remote_addr, hasher.finish())
    }
}

/// Shape check on the raw submission: an option reference must be present
/// and must parse as an option id. Existence is checked by the caller
/// against the repository.
pub fn parse_option_id(request: &VoteRequest) -> Result<i64, VoteError> {
    let raw = match &request.option_id {
        Some(raw) if !raw.trim().is_empty() => raw.trim(),
        _ => return Err(VoteError::MissingOption),
    };

    raw.parse::<i64>()
        .map_err(|_| VoteError::MalformedOption(raw.to_string()))
}

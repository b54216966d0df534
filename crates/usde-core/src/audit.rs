//! # Audit Hash Chain
//!
//! Administrative actions (KYC reviews, company status changes, enterprise
//! user management) append to an audit log. Each entry's hash is
//! `SHA-256(previous_hash || action || actor || target || details)`, hex
//! encoded, starting from [`GENESIS_HASH`]. Editing or removing any entry
//! breaks every hash after it.

use sha2::{Digest, Sha256};

/// Hash preceding the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// The fields covered by an entry hash.
#[derive(Debug, Clone, Copy)]
pub struct ChainLink<'a> {
    /// Hash of the previous entry.
    pub previous_hash: &'a str,
    /// Action name, e.g. `kyc.review`.
    pub action: &'a str,
    /// Acting company id.
    pub actor: &'a str,
    /// Target record id.
    pub target: &'a str,
    /// Canonical JSON of the details object.
    pub details: &'a str,
}

impl ChainLink<'_> {
    /// Hex-encoded SHA-256 over the link fields.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.previous_hash,
            self.action,
            self.actor,
            self.target,
            self.details,
        ] {
            hasher.update(part.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// A stored entry as seen by [`verify_chain`].
pub trait ChainedEntry {
    /// The previous hash stored with the entry.
    fn previous_hash(&self) -> &str;
    /// The hash stored with the entry.
    fn entry_hash(&self) -> &str;
    /// The hash recomputed from the entry's current fields.
    fn computed_hash(&self) -> String;
}

/// Walk entries in append order and return the index of the first broken
/// link, or `None` when the chain is intact.
pub fn verify_chain<E: ChainedEntry>(entries: &[E]) -> Option<usize> {
    let mut expected_previous = GENESIS_HASH.to_string();
    for (i, entry) in entries.iter().enumerate() {
        if entry.previous_hash() != expected_previous || entry.computed_hash() != entry.entry_hash() {
            return Some(i);
        }
        expected_previous = entry.entry_hash().to_string();
    }
    None
}

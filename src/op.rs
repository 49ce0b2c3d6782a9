//! Mutation operation model and persistence wrappers.
//!
//! Every op carries the inputs its transition needs (outcome, timestamp,
//! chosen group keys) so that replaying the journal against a store in the
//! same prior state reproduces the card mutation and its paired
//! activity/audit appends exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    card::{CardPatch, CardRecord, GroupKey},
    types::{BoxId, CardId, OpSeq, UserId},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Immutable operation appended to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a fully materialized dormant card.
    Create {
        /// Inserted record.
        card: CardRecord,
    },
    /// Insert a batch of dormant cards in one logical operation.
    BulkCreate {
        /// Inserted records, in id order.
        cards: Vec<CardRecord>,
    },
    /// Edit card fields, including the precomputed inverse patch.
    Update {
        /// Card to mutate.
        id: CardId,
        /// Acting user.
        user_id: UserId,
        /// Forward patch.
        patch: CardPatch,
        /// Inverse patch that restores prior state.
        prev: CardPatch,
        /// Mutation time.
        at: DateTime<Utc>,
    },
    /// Delete one card; its trail entries are retained.
    Delete {
        /// Card to remove.
        id: CardId,
        /// Acting user.
        user_id: UserId,
        /// Mutation time.
        at: DateTime<Utc>,
    },
    /// Delete every card the user owns in a box.
    BulkDelete {
        /// Box to wipe.
        box_id: BoxId,
        /// Acting user.
        user_id: UserId,
        /// Mutation time.
        at: DateTime<Utc>,
    },
    /// Apply one recall outcome to a card.
    Review {
        /// Card reviewed.
        id: CardId,
        /// Acting user.
        user_id: UserId,
        /// Whether recall succeeded.
        correct: bool,
        /// Review time; anchors the next-review computation.
        at: DateTime<Utc>,
    },
    /// Promote every dormant card in the selected activation groups.
    Activate {
        /// Box scanned for dormant cards.
        box_id: BoxId,
        /// Acting user.
        user_id: UserId,
        /// Group keys chosen by the selector, in pool order.
        keys: Vec<GroupKey>,
        /// Promotion time.
        at: DateTime<Utc>,
    },
}

/// Journal row metadata plus operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Journal append timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}

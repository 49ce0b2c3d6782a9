//! Runtime event stream payloads.

use crate::types::{CardId, Level, OpSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardEvent {
    /// A new card was created (dormant).
    Created {
        /// Created card id.
        id: CardId,
    },
    /// An existing card was edited through a patch.
    Updated {
        /// Updated card id.
        id: CardId,
    },
    /// A card was deleted; its trail entries remain.
    Removed {
        /// Removed card id.
        id: CardId,
    },
    /// A review transition was applied.
    Reviewed {
        /// Reviewed card id.
        id: CardId,
        /// Level reached by the transition.
        level: Level,
    },
    /// An activation pass promoted dormant cards.
    Activated {
        /// Number of cards promoted.
        activated: usize,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}

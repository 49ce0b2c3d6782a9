//! Append-only activity and audit trail records.
//!
//! Both record kinds are created alongside a card mutation and never
//! updated or deleted; deletion audits reference a card that is about to
//! disappear but are themselves retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    card::CardSnapshot,
    types::{ActivityAction, AuditAction, BoxId, CardId, Level, UserId},
};

/// One immutable fact in the activity stream.
///
/// `card_level` is the level before the transition for answer records,
/// so per-level trends reflect the level the card was reviewed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Acting user.
    pub user_id: UserId,
    /// Card the fact is about.
    pub card_id: CardId,
    /// Box the card belonged to when the fact was recorded.
    pub box_id: BoxId,
    /// What happened.
    pub action: ActivityAction,
    /// Card level at the time of the action.
    pub card_level: Level,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// One immutable before/after record in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Acting user.
    pub user_id: UserId,
    /// Card the mutation targeted.
    pub card_id: CardId,
    /// What kind of mutation ran.
    pub action: AuditAction,
    /// Snapshot taken immediately before the mutation; `None` on creation.
    pub before: Option<CardSnapshot>,
    /// Snapshot taken immediately after the mutation; `None` on deletion.
    pub after: Option<CardSnapshot>,
    /// When the mutation ran.
    pub at: DateTime<Utc>,
}

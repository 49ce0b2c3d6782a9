//! Card domain record, draft, patch, audit snapshot, and group key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BoxId, CardId, Level, UserId};

/// Fully materialized, authoritative card record.
///
/// Invariants maintained by the store and scheduler:
/// `finished` iff `level == 8`; `next_review` is `None` iff the card is
/// dormant (`level == 0`) or finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Stable card identifier.
    pub id: CardId,
    /// Box this card belongs to.
    pub box_id: BoxId,
    /// Owning user.
    pub user_id: UserId,
    /// True once the card reaches the mastered level.
    pub finished: bool,
    /// Current review level, 0..=8.
    pub level: Level,
    /// Logical activation group; empty for singleton cards.
    pub group_id: String,
    /// Next time the card becomes eligible for review.
    pub next_review: Option<DateTime<Utc>>,
    /// Opaque content payload; the scheduler never interprets it.
    pub config: Value,
    /// Creation time; drives activation ordering.
    pub created_at: DateTime<Utc>,
}

impl CardRecord {
    /// Structural copy of the schedulable fields at this instant.
    pub fn snapshot(&self) -> CardSnapshot {
        CardSnapshot {
            id: self.id,
            box_id: self.box_id,
            finished: self.finished,
            level: self.level,
            group_id: self.group_id.clone(),
            next_review: self.next_review.map(|t| t.to_rfc3339()),
            config: self.config.clone(),
        }
    }

    /// Activation unit this card belongs to.
    pub fn group_key(&self) -> GroupKey {
        let trimmed = self.group_id.trim();
        if trimmed.is_empty() {
            GroupKey::Card(self.id)
        } else {
            GroupKey::Group(trimmed.to_string())
        }
    }
}

/// Insert payload used to create a new dormant [`CardRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct CardDraft {
    /// Box the card is created in.
    pub box_id: BoxId,
    /// Owning user.
    pub user_id: UserId,
    /// Logical activation group; empty for singleton cards.
    pub group_id: String,
    /// Opaque content payload.
    pub config: Value,
}

/// Replacement value for a card's next review time inside a patch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NextReviewPatch {
    /// Remove the scheduled review time.
    Clear,
    /// Schedule the review at the given instant.
    At(DateTime<Utc>),
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// Patching is the only sanctioned path for external edits such as
/// un-mastering a level-8 card; the scheduler itself never resurrects.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardPatch {
    /// Optional replacement for the group id.
    pub group_id: Option<String>,
    /// Optional replacement for the content payload.
    pub config: Option<Value>,
    /// Optional replacement for the finished flag.
    pub finished: Option<bool>,
    /// Optional replacement for the level.
    pub level: Option<Level>,
    /// Optional replacement for the next review time.
    pub next_review: Option<NextReviewPatch>,
}

impl CardPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Captures an inverse patch for all fields present in `self`.
    pub fn capture_inverse_for(&self, rec: &CardRecord) -> Self {
        Self {
            group_id: self.group_id.as_ref().map(|_| rec.group_id.clone()),
            config: self.config.as_ref().map(|_| rec.config.clone()),
            finished: self.finished.map(|_| rec.finished),
            level: self.level.map(|_| rec.level),
            next_review: self.next_review.map(|_| match rec.next_review {
                Some(t) => NextReviewPatch::At(t),
                None => NextReviewPatch::Clear,
            }),
        }
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut CardRecord) {
        if let Some(v) = &self.group_id {
            rec.group_id = v.clone();
        }
        if let Some(v) = &self.config {
            rec.config = v.clone();
        }
        if let Some(v) = self.finished {
            rec.finished = v;
        }
        if let Some(v) = self.level {
            rec.level = v;
        }
        if let Some(v) = self.next_review {
            rec.next_review = match v {
                NextReviewPatch::Clear => None,
                NextReviewPatch::At(t) => Some(t),
            };
        }
    }
}

/// Immutable point-in-time view of a card's schedulable fields.
///
/// Stored inside audit records; never a live reference, so it survives
/// the card's deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSnapshot {
    /// Card identifier at snapshot time.
    pub id: CardId,
    /// Owning box.
    pub box_id: BoxId,
    /// Finished flag.
    pub finished: bool,
    /// Review level.
    pub level: Level,
    /// Group id.
    pub group_id: String,
    /// Next review time as an RFC 3339 string, if scheduled.
    pub next_review: Option<String>,
    /// Deep copy of the content payload.
    pub config: Value,
}

/// Activation unit key: a shared group id, or the card itself when the
/// group id is empty. Singleton keys never collide with real group ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Cards sharing a trimmed, non-empty group id.
    Group(String),
    /// A single ungrouped card, keyed by identity.
    Card(CardId),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(g) => f.write_str(g),
            Self::Card(id) => write!(f, "id:{id}"),
        }
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.to_string()
    }
}

impl From<String> for GroupKey {
    fn from(s: String) -> Self {
        if let Some(rest) = s.strip_prefix("id:") {
            if let Ok(id) = rest.parse::<CardId>() {
                return Self::Card(id);
            }
        }
        Self::Group(s)
    }
}

/// Serde adapter rendering group keys as their display strings
/// (`"lesson-1"`, `"id:3"`) instead of externally tagged enum values.
///
/// Used on caller-facing payloads; journal ops keep the enum form, which
/// round-trips unambiguously even for group ids that look like `id:N`.
pub mod group_key_strings {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::GroupKey;

    /// Serializes each key via its `Display` form.
    pub fn serialize<S>(keys: &[GroupKey], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(keys.iter().map(ToString::to_string))
    }

    /// Deserializes display strings back into keys.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<GroupKey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings = Vec::<String>::deserialize(deserializer)?;
        Ok(strings.into_iter().map(GroupKey::from).collect())
    }
}

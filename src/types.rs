//! Shared primitive IDs, action enums, and the report interval.

use serde::{Deserialize, Serialize};

/// Monotonic card identifier.
pub type CardId = u64;
/// Box (card collection) identifier.
pub type BoxId = u64;
/// Owning user identifier.
pub type UserId = u64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;
/// Review level, 0 (dormant) through 8 (mastered).
pub type Level = u8;

/// Kind of fact appended to the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityAction {
    /// Card was created (dormant, level 0).
    Create,
    /// Card was promoted from level 0 into the review stream.
    Activate,
    /// Card was reviewed and recalled correctly.
    AnswerCorrect,
    /// Card was reviewed and recall failed.
    AnswerIncorrect,
}

/// Kind of mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// Single card creation.
    Create,
    /// Field edit through a patch.
    Update,
    /// Single card deletion.
    Delete,
    /// Scheduler review transition.
    Review,
    /// Promotion out of level 0.
    Activate,
    /// Card created as part of a batch.
    BulkCreate,
    /// Card deleted as part of a box-wide wipe.
    BulkDelete,
}

/// Calendar bucket width for activity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// 30 buckets, one per calendar day.
    Day,
    /// 24 buckets, one per Monday-start week.
    Week,
    /// 12 buckets, one per calendar month.
    Month,
}

/// Error for interval tokens other than `day`, `week`, or `month`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIntervalError;

impl Interval {
    /// Parses the wire tokens `day`, `week`, and `month`.
    pub fn parse(s: &str) -> Result<Self, ParseIntervalError> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(ParseIntervalError),
        }
    }

    /// Number of buckets a report of this width always contains.
    pub fn bucket_count(self) -> usize {
        match self {
            Self::Day => 30,
            Self::Week => 24,
            Self::Month => 12,
        }
    }
}

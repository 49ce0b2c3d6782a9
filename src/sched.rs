//! Pure spaced-repetition scheduling rules.
//!
//! A card climbs levels 1..=7 on correct recalls, with the wait before the
//! next review growing at each step, and drops back to level 1 on any
//! failure. Passing level 7 parks the card at the mastered level 8, which
//! the scheduler treats as terminal.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::types::Level;

/// Highest level that still schedules a next review.
pub const MAX_ACTIVE_LEVEL: Level = 7;
/// Terminal mastered level.
pub const MASTERED_LEVEL: Level = 8;

/// Hours to wait before the next review, keyed by the level just reached.
///
/// Levels outside 1..=7 fall back to 0.
pub fn delay_hours(level: Level) -> i64 {
    match level {
        1 => 0,
        2 => 12,
        3 => 24,
        4 => 48,
        5 => 96,
        6 => 168,
        7 => 336,
        _ => 0,
    }
}

/// Result of applying one recall outcome to a card's schedulable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// New review level.
    pub level: Level,
    /// True when the card just reached (or stays at) the mastered level.
    pub finished: bool,
    /// Next time the card becomes eligible; `None` once mastered.
    pub next_review: Option<DateTime<Utc>>,
}

/// Maps `(current level, outcome)` to the new schedulable state.
///
/// Correct: level + 1, clamped to [`MASTERED_LEVEL`] past
/// [`MAX_ACTIVE_LEVEL`]; otherwise the next review lands
/// `delay_hours(new level)` after `now`. A correct review of an already
/// mastered card is a fixed point.
///
/// Incorrect: full demotion to level 1, immediately due again.
pub fn review_transition(level: Level, correct: bool, now: DateTime<Utc>) -> Transition {
    if !correct {
        return Transition {
            level: 1,
            finished: false,
            next_review: Some(now),
        };
    }

    let next = level.saturating_add(1);
    if next > MAX_ACTIVE_LEVEL {
        Transition {
            level: MASTERED_LEVEL,
            finished: true,
            next_review: None,
        }
    } else {
        Transition {
            level: next,
            finished: false,
            next_review: Some(now + Duration::hours(delay_hours(next))),
        }
    }
}

/// Recall outcome supplied by the caller of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The card was recalled.
    Correct,
    /// Recall failed.
    Incorrect,
}

/// Error raised when a review request carries no outcome at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOutcome;

impl Outcome {
    /// Resolves a caller-supplied JSON value to an outcome.
    ///
    /// Booleans map directly; strings are correct only for the
    /// case-insensitive tokens `1`, `true`, and `yes`; numbers are correct
    /// when non-zero; arrays and objects when non-empty. An absent or
    /// null value is an error, not a failed recall.
    pub fn from_json(value: Option<&Value>) -> Result<Self, MissingOutcome> {
        let correct = match value.ok_or(MissingOutcome)? {
            Value::Null => return Err(MissingOutcome),
            Value::Bool(b) => *b,
            Value::String(s) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
            }
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
        };
        Ok(if correct {
            Self::Correct
        } else {
            Self::Incorrect
        })
    }

    /// True for [`Outcome::Correct`].
    pub fn is_correct(self) -> bool {
        matches!(self, Self::Correct)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn correct_reviews_step_through_the_delay_table() {
        for (level, expected_hours) in [(1, 12), (2, 24), (3, 48), (4, 96), (5, 168), (6, 336)] {
            let t = review_transition(level, true, now());
            assert_eq!(t.level, level + 1);
            assert!(!t.finished);
            assert_eq!(t.next_review, Some(now() + Duration::hours(expected_hours)));
        }
    }

    #[test]
    fn passing_level_seven_masters_the_card() {
        let t = review_transition(7, true, now());
        assert_eq!(t.level, MASTERED_LEVEL);
        assert!(t.finished);
        assert_eq!(t.next_review, None);
    }

    #[test]
    fn mastered_level_is_a_fixed_point_for_correct_reviews() {
        let t = review_transition(MASTERED_LEVEL, true, now());
        assert_eq!(t.level, MASTERED_LEVEL);
        assert!(t.finished);
        assert_eq!(t.next_review, None);
    }

    #[test]
    fn any_failure_demotes_to_level_one_immediately_due() {
        for level in 0..=MASTERED_LEVEL {
            let t = review_transition(level, false, now());
            assert_eq!(t.level, 1);
            assert!(!t.finished);
            assert_eq!(t.next_review, Some(now()));
        }
    }

    #[test]
    fn level_one_correct_is_due_with_no_delay() {
        let t = review_transition(1, true, now());
        assert_eq!(t.level, 2);
        assert_eq!(t.next_review, Some(now() + Duration::hours(12)));
        let t0 = review_transition(0, true, now());
        assert_eq!(t0.next_review, Some(now()));
    }

    #[test]
    fn outcome_accepts_booleans_and_truthy_tokens() {
        assert_eq!(Outcome::from_json(Some(&json!(true))), Ok(Outcome::Correct));
        assert_eq!(Outcome::from_json(Some(&json!(false))), Ok(Outcome::Incorrect));
        for token in ["1", "true", "yes", "TRUE", " Yes "] {
            assert_eq!(
                Outcome::from_json(Some(&json!(token))),
                Ok(Outcome::Correct),
                "token {token:?}"
            );
        }
        for token in ["0", "no", "correct", ""] {
            assert_eq!(
                Outcome::from_json(Some(&json!(token))),
                Ok(Outcome::Incorrect),
                "token {token:?}"
            );
        }
        assert_eq!(Outcome::from_json(Some(&json!(1))), Ok(Outcome::Correct));
        assert_eq!(Outcome::from_json(Some(&json!(0))), Ok(Outcome::Incorrect));
        assert_eq!(Outcome::from_json(None), Err(MissingOutcome));
        assert_eq!(Outcome::from_json(Some(&Value::Null)), Err(MissingOutcome));
    }
}

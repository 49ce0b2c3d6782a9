//! Read-side projection of the activity stream into calendar buckets.
//!
//! The bucket window is anchored to the supplied `now` and always has its
//! full width; buckets with no activity stay zero rather than being
//! omitted. The projection never touches store state and can be run
//! repeatedly with different intervals over the same records.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    trail::ActivityRecord,
    types::{ActivityAction, Interval},
};

/// Per-bucket breakdown of answer counts by the level reviewed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelBuckets {
    /// Same label as the bucket's entry in [`ActivityReport::labels`].
    pub label: String,
    /// Answer counts indexed by level 0..=8.
    pub counts: [u64; 9],
}

/// Fixed-width, zero-filled activity series for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    /// One label per bucket, oldest first.
    pub labels: Vec<String>,
    /// Activations per bucket.
    pub activated: Vec<u64>,
    /// Answers (correct plus incorrect) per bucket.
    pub checked: Vec<u64>,
    /// Answer counts per bucket split by review level.
    pub levels: Vec<LevelBuckets>,
}

/// Buckets `activities` into the fixed window ending at `now`.
pub fn aggregate<'a, I>(activities: I, interval: Interval, now: DateTime<Utc>) -> ActivityReport
where
    I: IntoIterator<Item = &'a ActivityRecord>,
{
    let starts = bucket_starts(interval, now.date_naive());
    let index: HashMap<NaiveDate, usize> = starts
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();

    let count = starts.len();
    let mut activated = vec![0u64; count];
    let mut checked = vec![0u64; count];
    let mut level_counts = vec![[0u64; 9]; count];

    for rec in activities {
        let key = truncate(interval, rec.at.date_naive());
        let Some(&i) = index.get(&key) else {
            continue;
        };
        match rec.action {
            ActivityAction::Activate => activated[i] += 1,
            ActivityAction::AnswerCorrect | ActivityAction::AnswerIncorrect => {
                checked[i] += 1;
                let level = usize::from(rec.card_level.min(8));
                level_counts[i][level] += 1;
            }
            ActivityAction::Create => {}
        }
    }

    let format = label_format(interval);
    let labels: Vec<String> = starts.iter().map(|d| d.format(format).to_string()).collect();
    let levels = labels
        .iter()
        .zip(level_counts)
        .map(|(label, counts)| LevelBuckets {
            label: label.clone(),
            counts,
        })
        .collect();

    ActivityReport {
        labels,
        activated,
        checked,
        levels,
    }
}

/// Truncates a date to the start of its bucket.
pub fn truncate(interval: Interval, date: NaiveDate) -> NaiveDate {
    match interval {
        Interval::Day => date,
        Interval::Week => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        Interval::Month => date.with_day(1).unwrap_or(date),
    }
}

fn bucket_starts(interval: Interval, today: NaiveDate) -> Vec<NaiveDate> {
    let count = interval.bucket_count();
    match interval {
        Interval::Day => (0..count)
            .rev()
            .map(|i| today - Duration::days(i as i64))
            .collect(),
        Interval::Week => {
            let week_start = truncate(Interval::Week, today);
            (0..count)
                .rev()
                .map(|i| week_start - Duration::weeks(i as i64))
                .collect()
        }
        Interval::Month => {
            let month_start = truncate(Interval::Month, today);
            (0..count)
                .rev()
                .map(|i| {
                    month_start
                        .checked_sub_months(Months::new(i as u32))
                        .unwrap_or(month_start)
                })
                .collect()
        }
    }
}

fn label_format(interval: Interval) -> &'static str {
    match interval {
        Interval::Day | Interval::Week => "%b %d",
        Interval::Month => "%b %y",
    }
}

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use cardlog::{
    card::CardDraft,
    core::store::CardStore,
    report::aggregate,
    trail::ActivityRecord,
    types::{ActivityAction, Interval},
};

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn activity(action: ActivityAction, level: u8, when: DateTime<Utc>) -> ActivityRecord {
    ActivityRecord {
        user_id: 1,
        card_id: 1,
        box_id: 1,
        action,
        card_level: level,
        at: when,
    }
}

#[test]
fn interval_tokens_parse_exactly() {
    assert_eq!(Interval::parse("day"), Ok(Interval::Day));
    assert_eq!(Interval::parse("week"), Ok(Interval::Week));
    assert_eq!(Interval::parse("month"), Ok(Interval::Month));
    for bad in ["Day", "WEEK", "months", "", "daily"] {
        assert!(Interval::parse(bad).is_err(), "token {bad:?}");
    }
}

#[test]
fn empty_stream_yields_full_zeroed_windows() {
    let now = at(2026, 3, 10, 12);
    let empty: Vec<ActivityRecord> = Vec::new();
    for interval in [Interval::Day, Interval::Week, Interval::Month] {
        let report = aggregate(&empty, interval, now);
        let n = interval.bucket_count();
        assert_eq!(report.labels.len(), n);
        assert_eq!(report.activated, vec![0; n]);
        assert_eq!(report.checked, vec![0; n]);
        assert_eq!(report.levels.len(), n);
        assert!(report.levels.iter().all(|b| b.counts == [0; 9]));
    }
}

#[test]
fn daily_window_is_thirty_days_ending_today() {
    let now = at(2026, 3, 10, 12);
    let records = vec![
        activity(ActivityAction::Activate, 0, now),
        activity(ActivityAction::AnswerCorrect, 1, now),
        activity(ActivityAction::AnswerIncorrect, 3, now - Duration::days(1)),
        // 31 days back falls outside the window.
        activity(ActivityAction::AnswerCorrect, 2, now - Duration::days(31)),
        // Creations never count toward either series.
        activity(ActivityAction::Create, 0, now),
    ];

    let report = aggregate(&records, Interval::Day, now);
    assert_eq!(report.labels.len(), 30);
    assert_eq!(report.labels[0], "Feb 09");
    assert_eq!(report.labels[29], "Mar 10");

    assert_eq!(report.activated[29], 1);
    assert_eq!(report.checked[29], 1);
    assert_eq!(report.checked[28], 1);
    assert_eq!(report.checked.iter().sum::<u64>(), 2);
    assert_eq!(report.activated.iter().sum::<u64>(), 1);

    assert_eq!(report.levels[29].counts[1], 1);
    assert_eq!(report.levels[28].counts[3], 1);
    assert_eq!(report.levels[29].label, "Mar 10");
}

#[test]
fn weekly_buckets_start_on_monday() {
    // 2026-03-10 is a Tuesday; its week starts 2026-03-09.
    let now = at(2026, 3, 10, 12);
    let records = vec![
        activity(ActivityAction::AnswerCorrect, 2, at(2026, 3, 9, 0)),
        activity(ActivityAction::AnswerCorrect, 2, at(2026, 3, 10, 9)),
        // Previous Sunday lands in the week of 2026-03-02.
        activity(ActivityAction::AnswerIncorrect, 5, at(2026, 3, 8, 23)),
    ];

    let report = aggregate(&records, Interval::Week, now);
    assert_eq!(report.labels.len(), 24);
    assert_eq!(report.labels[23], "Mar 09");
    assert_eq!(report.labels[22], "Mar 02");
    assert_eq!(report.checked[23], 2);
    assert_eq!(report.checked[22], 1);
    assert_eq!(report.levels[23].counts[2], 2);
    assert_eq!(report.levels[22].counts[5], 1);
}

#[test]
fn monthly_buckets_cover_a_year_with_short_year_labels() {
    let now = at(2026, 3, 10, 12);
    let records = vec![
        activity(ActivityAction::Activate, 0, at(2026, 3, 1, 0)),
        activity(ActivityAction::Activate, 0, at(2025, 4, 30, 23)),
        // Just before the window opens.
        activity(ActivityAction::Activate, 0, at(2025, 3, 31, 12)),
    ];

    let report = aggregate(&records, Interval::Month, now);
    assert_eq!(report.labels.len(), 12);
    assert_eq!(report.labels[0], "Apr 25");
    assert_eq!(report.labels[11], "Mar 26");
    assert_eq!(report.activated[11], 1);
    assert_eq!(report.activated[0], 1);
    assert_eq!(report.activated.iter().sum::<u64>(), 2);
}

#[test]
fn store_report_filters_by_user_and_box() {
    let now = at(2026, 3, 10, 12);
    let mut store = CardStore::new();

    let draft = |box_id: u64, user_id: u64| CardDraft {
        box_id,
        user_id,
        group_id: String::new(),
        config: json!({}),
    };

    let (mine, _) = store.insert(draft(1, 7), now).expect("insert");
    let (other_box, _) = store.insert(draft(2, 7), now).expect("insert");
    let (other_user, _) = store.insert(draft(1, 8), now).expect("insert");

    store.activate(1, 7, 1, now).expect("activate");
    store.activate(2, 7, 1, now).expect("activate");
    store.activate(1, 8, 1, now).expect("activate");
    store.review(mine, 7, true, now).expect("review");
    store.review(other_box, 7, true, now).expect("review");
    store.review(other_user, 8, false, now).expect("review");

    let report = store.activity_report(Some(1), 7, Interval::Day, now);
    assert_eq!(report.activated[29], 1);
    assert_eq!(report.checked[29], 1);
    assert_eq!(report.levels[29].counts[1], 1);

    // No box filter widens to all of the user's boxes.
    let report = store.activity_report(None, 7, Interval::Day, now);
    assert_eq!(report.activated[29], 2);
    assert_eq!(report.checked[29], 2);

    // Deleting the card leaves its activity in the report.
    store.remove(mine, 7, now).expect("remove");
    let report = store.activity_report(Some(1), 7, Interval::Day, now);
    assert_eq!(report.checked[29], 1);
}

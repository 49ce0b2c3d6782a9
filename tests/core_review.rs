use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use cardlog::{
    card::{CardDraft, CardPatch, GroupKey, NextReviewPatch},
    core::store::{ActivationOutcome, CardStore, StoreError},
    types::{ActivityAction, AuditAction},
};

const USER: u64 = 7;
const BOX: u64 = 1;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn draft(group: &str) -> CardDraft {
    CardDraft {
        box_id: BOX,
        user_id: USER,
        group_id: group.to_string(),
        config: json!({"front": "q", "back": "a"}),
    }
}

#[test]
fn inserts_are_dormant_until_activated() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft(""), t0()).expect("insert");

    let card = store.get(id).expect("card");
    assert_eq!(card.level, 0);
    assert!(!card.finished);
    assert_eq!(card.next_review, None);

    assert!(store.ready(Some(BOX), USER, t0() + Duration::days(365)).is_empty());
    assert_eq!(store.dormant(BOX, USER).len(), 1);
}

#[test]
fn activation_picks_distinct_groups_in_creation_order() {
    let mut store = CardStore::new();
    // Pool order: a, a, b, singleton, c.
    let (a1, _) = store.insert(draft("a"), t0()).expect("insert");
    let (a2, _) = store.insert(draft("a"), t0()).expect("insert");
    let (b1, _) = store.insert(draft("b"), t0()).expect("insert");
    let (solo, _) = store.insert(draft("  "), t0()).expect("insert");
    let (c1, _) = store.insert(draft("c"), t0()).expect("insert");

    let (outcome, stored) = store.activate(BOX, USER, 2, t0()).expect("activate");
    assert!(stored.is_some());
    assert_eq!(
        outcome.groups,
        vec![
            GroupKey::Group("a".to_string()),
            GroupKey::Group("b".to_string())
        ]
    );
    // Whole groups promote, not just the first card seen.
    assert_eq!(outcome.activated, 3);

    for id in [a1, a2, b1] {
        let card = store.get(id).expect("card");
        assert_eq!(card.level, 1);
        assert_eq!(card.next_review, Some(t0()));
    }
    for id in [solo, c1] {
        let card = store.get(id).expect("card");
        assert_eq!(card.level, 0);
        assert_eq!(card.next_review, None);
    }

    // Whitespace-only group ids activate as singletons.
    let (outcome, _) = store.activate(BOX, USER, 5, t0()).expect("activate");
    assert_eq!(
        outcome.groups,
        vec![GroupKey::Card(solo), GroupKey::Group("c".to_string())]
    );
    assert_eq!(outcome.activated, 2);
}

#[test]
fn activation_is_idempotent_and_rejects_nonpositive_counts() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft("a"), t0()).expect("insert");

    let (first, _) = store.activate(BOX, USER, 3, t0()).expect("activate");
    assert_eq!(first.activated, 1);

    // The promoted card left the pool, so a rerun selects nothing.
    let (again, stored) = store.activate(BOX, USER, 3, t0()).expect("activate");
    assert_eq!(again.activated, 0);
    assert!(again.groups.is_empty());
    assert!(stored.is_none());
    assert_eq!(store.get(id).expect("card").level, 1);

    assert_eq!(store.activate(BOX, USER, 0, t0()), Err(StoreError::InvalidCount(0)));
    assert_eq!(store.activate(BOX, USER, -2, t0()), Err(StoreError::InvalidCount(-2)));
}

#[test]
fn activation_outcome_serializes_group_keys_as_plain_strings() {
    let mut store = CardStore::new();
    store.insert(draft("A"), t0()).expect("insert");
    store.insert(draft(""), t0()).expect("insert");

    let (outcome, _) = store.activate(BOX, USER, 2, t0()).expect("activate");
    assert_eq!(
        outcome.groups,
        vec![GroupKey::Group("A".to_string()), GroupKey::Card(2)]
    );

    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["groups"], json!(["A", "id:2"]));

    let back: ActivationOutcome = serde_json::from_value(value).expect("deserialize");
    assert_eq!(back, outcome);
}

#[test]
fn correct_reviews_climb_to_mastery_and_incorrect_demotes() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft(""), t0()).expect("insert");
    store.activate(BOX, USER, 1, t0()).expect("activate");

    let mut now = t0();
    let expected_delays = [12, 24, 48, 96, 168, 336];
    for (step, hours) in expected_delays.iter().enumerate() {
        now += Duration::hours(1);
        let (reviewed, _) = store.review(id, USER, true, now).expect("review");
        assert_eq!(reviewed.previous_level, step as u8 + 1);
        assert_eq!(reviewed.card.level, step as u8 + 2);
        assert_eq!(reviewed.card.next_review, Some(now + Duration::hours(*hours)));
    }

    // Passing level 7 parks the card at level 8 with no schedule.
    let (mastered, _) = store.review(id, USER, true, now).expect("review");
    assert_eq!(mastered.card.level, 8);
    assert!(mastered.card.finished);
    assert_eq!(mastered.card.next_review, None);

    // Mastery is a fixed point under further correct reviews.
    let (still, _) = store.review(id, USER, true, now).expect("review");
    assert_eq!(still.card.level, 8);
    assert!(still.card.finished);

    // A miss resurrects nothing it should not: full demotion, due now.
    let (demoted, _) = store.review(id, USER, false, now).expect("review");
    assert_eq!(demoted.previous_level, 8);
    assert_eq!(demoted.card.level, 1);
    assert!(!demoted.card.finished);
    assert_eq!(demoted.card.next_review, Some(now));
}

#[test]
fn level_three_correct_review_schedules_forty_eight_hours_out() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft(""), t0()).expect("insert");
    store
        .patch(
            id,
            USER,
            CardPatch {
                level: Some(3),
                next_review: Some(NextReviewPatch::At(t0())),
                ..CardPatch::default()
            },
            t0(),
        )
        .expect("patch");

    let now = t0() + Duration::hours(5);
    let (reviewed, _) = store.review(id, USER, true, now).expect("review");
    assert_eq!(reviewed.card.level, 4);
    assert_eq!(reviewed.card.next_review, Some(now + Duration::hours(48)));

    let answer = store
        .activities(Some(BOX), USER)
        .into_iter()
        .find(|a| a.action == ActivityAction::AnswerCorrect)
        .expect("answer activity");
    assert_eq!(answer.card_level, 3);

    let audit = store
        .audits(Some(id), USER)
        .into_iter()
        .find(|a| a.action == AuditAction::Review)
        .expect("review audit");
    assert_eq!(audit.before.as_ref().expect("before").level, 3);
    assert_eq!(audit.after.as_ref().expect("after").level, 4);
}

#[test]
fn single_group_budget_promotes_the_whole_group() {
    let mut store = CardStore::new();
    let (a1, _) = store.insert(draft("A"), t0()).expect("insert");
    let (a2, _) = store
        .insert(draft("A"), t0() + Duration::seconds(1))
        .expect("insert");
    let (solo, _) = store
        .insert(draft(""), t0() + Duration::seconds(2))
        .expect("insert");

    let (outcome, _) = store.activate(BOX, USER, 1, t0()).expect("activate");
    assert_eq!(outcome.activated, 2);
    assert_eq!(outcome.groups, vec![GroupKey::Group("A".to_string())]);
    assert_eq!(store.get(a1).expect("card").level, 1);
    assert_eq!(store.get(a2).expect("card").level, 1);
    assert_eq!(store.get(solo).expect("card").level, 0);
}

#[test]
fn ready_orders_by_next_review_then_creation() {
    let mut store = CardStore::new();
    let (late, _) = store.insert(draft(""), t0()).expect("insert");
    let (early, _) = store.insert(draft(""), t0() + Duration::seconds(1)).expect("insert");
    store.activate(BOX, USER, 2, t0() + Duration::seconds(2)).expect("activate");

    // Climb `late` one level so its next review lands 12h out.
    store
        .review(late, USER, true, t0() + Duration::hours(1))
        .expect("review");

    let due = store.ready(Some(BOX), USER, t0() + Duration::hours(2));
    assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![early]);

    let due = store.ready(Some(BOX), USER, t0() + Duration::hours(14));
    assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![early, late]);

    // Mastered cards never show up as ready.
    for _ in 0..7 {
        store.review(early, USER, true, t0()).expect("review");
    }
    let due = store.ready(Some(BOX), USER, t0() + Duration::days(30));
    assert_eq!(due.iter().map(|c| c.id).collect::<Vec<_>>(), vec![late]);
}

#[test]
fn box_summary_counts_total_finished_active_ready() {
    let mut store = CardStore::new();
    let (a, _) = store.insert(draft(""), t0()).expect("insert");
    let (b, _) = store.insert(draft(""), t0()).expect("insert");
    let (_dormant, _) = store.insert(draft("later"), t0()).expect("insert");

    // Activate only the two singletons.
    store.activate(BOX, USER, 2, t0()).expect("activate");
    for _ in 0..7 {
        store.review(a, USER, true, t0()).expect("review");
    }
    store.review(b, USER, true, t0()).expect("review");

    let summary = store.box_summary(BOX, USER, t0() + Duration::days(2));
    assert_eq!(summary.total, 3);
    assert_eq!(summary.finished, 1);
    assert_eq!(summary.active, 1);
    assert_eq!(summary.ready, 1);
}

#[test]
fn patches_reindex_groups_and_audit_before_after() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft("old"), t0()).expect("insert");

    store
        .patch(
            id,
            USER,
            CardPatch {
                group_id: Some("new".to_string()),
                finished: Some(false),
                level: Some(3),
                next_review: Some(NextReviewPatch::At(t0())),
                ..CardPatch::default()
            },
            t0(),
        )
        .expect("patch");

    assert!(store.by_group("old").is_empty());
    assert_eq!(store.by_group("new").len(), 1);

    let card = store.get(id).expect("card");
    assert_eq!(card.level, 3);
    assert_eq!(card.next_review, Some(t0()));

    let audits = store.audits(Some(id), USER);
    let update = audits
        .iter()
        .find(|a| a.action == AuditAction::Update)
        .expect("update audit");
    let before = update.before.as_ref().expect("before");
    let after = update.after.as_ref().expect("after");
    assert_eq!(before.group_id, "old");
    assert_eq!(before.level, 0);
    assert_eq!(before.next_review, None);
    assert_eq!(after.group_id, "new");
    assert_eq!(after.level, 3);
    assert_eq!(after.next_review, Some(t0().to_rfc3339()));

    // Unmastering goes through a patch, never through a review.
    store
        .patch(
            id,
            USER,
            CardPatch {
                finished: Some(true),
                level: Some(8),
                next_review: Some(NextReviewPatch::Clear),
                ..CardPatch::default()
            },
            t0(),
        )
        .expect("patch");
    assert!(store.get(id).expect("card").finished);
}

#[test]
fn deletions_keep_trails_and_respect_ownership() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft("g"), t0()).expect("insert");
    let (other, _) = store
        .insert(
            CardDraft {
                user_id: USER + 1,
                ..draft("g")
            },
            t0(),
        )
        .expect("insert");

    // Another user cannot touch the card.
    assert_eq!(
        store.remove(id, USER + 1, t0()),
        Err(StoreError::MissingCard(id))
    );
    assert_eq!(
        store.review(id, USER + 1, true, t0()),
        Err(StoreError::MissingCard(id))
    );

    store.remove(id, USER, t0()).expect("remove");
    assert!(store.get(id).is_none());
    assert_eq!(store.by_group("g").len(), 1);

    // Trails survive the card.
    let audits = store.audits(Some(id), USER);
    let delete = audits
        .iter()
        .find(|a| a.action == AuditAction::Delete)
        .expect("delete audit");
    assert!(delete.before.is_some());
    assert!(delete.after.is_none());
    let activities = store.activities(Some(BOX), USER);
    assert!(activities.iter().any(|a| a.card_id == id));

    // Box wipe only removes the caller's cards.
    let (removed, stored) = store.remove_box(BOX, USER + 1, t0()).expect("remove_box");
    assert_eq!(removed, 1);
    assert!(stored.is_some());
    assert!(store.get(other).is_none());

    let (removed, stored) = store.remove_box(BOX, USER, t0()).expect("remove_box");
    assert_eq!(removed, 0);
    assert!(stored.is_none());
}

#[test]
fn bulk_insert_preserves_order_and_empty_batch_is_a_noop() {
    let mut store = CardStore::new();
    let (ids, stored) = store
        .insert_many(vec![draft("a"), draft("b"), draft("a")], t0())
        .expect("insert_many");
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(stored.is_some());
    assert_eq!(store.ordered_ids(), &[1, 2, 3]);

    let audits = store.audits(None, USER);
    assert_eq!(
        audits
            .iter()
            .filter(|a| a.action == AuditAction::BulkCreate)
            .count(),
        3
    );

    let (ids, stored) = store.insert_many(vec![], t0()).expect("empty batch");
    assert!(ids.is_empty());
    assert!(stored.is_none());
    assert_eq!(store.ordered_ids().len(), 3);
}

#[test]
fn activity_stream_records_levels_before_the_transition() {
    let mut store = CardStore::new();
    let (id, _) = store.insert(draft(""), t0()).expect("insert");
    store.activate(BOX, USER, 1, t0()).expect("activate");
    store.review(id, USER, true, t0()).expect("review");
    store.review(id, USER, false, t0()).expect("review");

    let activities = store.activities(Some(BOX), USER);
    let kinds: Vec<(ActivityAction, u8)> = activities
        .iter()
        .map(|a| (a.action, a.card_level))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (ActivityAction::Create, 0),
            (ActivityAction::Activate, 0),
            (ActivityAction::AnswerCorrect, 1),
            (ActivityAction::AnswerIncorrect, 2),
        ]
    );
}

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::{
    card::{CardDraft, CardPatch, CardRecord, GroupKey},
    core::indices::VecIndex,
    op::{Op, StoredOp},
    report::{self, ActivityReport},
    sched,
    trail::{ActivityRecord, AuditRecord},
    types::{ActivityAction, AuditAction, BoxId, CardId, Interval, Level, OpSeq, UserId},
};

/// Errors surfaced by store mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Card id unknown, or owned by a different user.
    MissingCard(CardId),
    /// Replayed creation collided with an existing id.
    AlreadyExists(CardId),
    /// Activation count was zero or negative.
    InvalidCount(i64),
}

/// Serializable full-state snapshot used for checkpointing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next card id to assign.
    pub next_card_id: CardId,
    /// Next op sequence to assign.
    pub next_op_seq: OpSeq,
    /// Card ids in creation order.
    pub order: Vec<CardId>,
    /// Card records, in creation order.
    pub records: Vec<CardRecord>,
    /// Full activity stream.
    pub activities: Vec<ActivityRecord>,
    /// Full audit trail.
    pub audits: Vec<AuditRecord>,
}

/// Per-box card counts for progress display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSummary {
    /// All cards in the box.
    pub total: usize,
    /// Mastered cards.
    pub finished: usize,
    /// Unfinished cards above level 0.
    pub active: usize,
    /// Unfinished cards due at or before the query time.
    pub ready: usize,
}

/// Result of one activation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    /// Number of cards promoted to level 1.
    pub activated: usize,
    /// Group keys chosen, in pool order; serialized as display strings
    /// (`"lesson-1"`, `"id:3"`).
    #[serde(with = "crate::card::group_key_strings")]
    pub groups: Vec<GroupKey>,
}

/// Result of one review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewedCard {
    /// Level before the transition.
    pub previous_level: Level,
    /// Updated record.
    pub card: CardRecord,
}

/// Authoritative in-memory card store with append-only trails.
///
/// Every mutation appends one journal op to `pending_ops` plus its
/// activity/audit records in the same call, so a drained journal replays
/// into an identical store, trails included.
#[derive(Debug, Default)]
pub struct CardStore {
    records: HashMap<CardId, CardRecord>,
    order: Vec<CardId>,
    pos: HashMap<CardId, usize>,
    by_box: VecIndex<BoxId>,
    by_group: VecIndex<String>,
    activities: Vec<ActivityRecord>,
    audits: Vec<AuditRecord>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_card_id: CardId,
}

impl CardStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            next_card_id: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a checkpoint snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_card_id: snapshot.next_card_id,
            next_op_seq: snapshot.next_op_seq,
            order: snapshot.order,
            activities: snapshot.activities,
            audits: snapshot.audits,
            ..Self::default()
        };

        for (idx, id) in store.order.iter().copied().enumerate() {
            store.pos.insert(id, idx);
        }

        for rec in snapshot.records {
            store.insert_indices(&rec);
            store.records.insert(rec.id, rec);
        }

        Ok(store)
    }

    /// Exports the full state for checkpointing.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let records = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect();

        StoreSnapshotV1 {
            next_card_id: self.next_card_id,
            next_op_seq: self.next_op_seq,
            order: self.order.clone(),
            records,
            activities: self.activities.clone(),
            audits: self.audits.clone(),
        }
    }

    /// Creates one dormant card from `draft` with creation time `at`.
    pub fn insert(
        &mut self,
        draft: CardDraft,
        at: DateTime<Utc>,
    ) -> Result<(CardId, StoredOp), StoreError> {
        let card = self.materialize(draft, at);
        let id = card.id;
        let seq = self.take_next_op_seq();
        let stored = self.apply_create_with_seq(card, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((id, stored))
    }

    /// Creates a batch of dormant cards as one logical operation.
    ///
    /// Returns `(ids, None)` without side effects when `drafts` is empty.
    pub fn insert_many(
        &mut self,
        drafts: Vec<CardDraft>,
        at: DateTime<Utc>,
    ) -> Result<(Vec<CardId>, Option<StoredOp>), StoreError> {
        if drafts.is_empty() {
            return Ok((Vec::new(), None));
        }

        let cards: Vec<CardRecord> = drafts
            .into_iter()
            .map(|draft| self.materialize(draft, at))
            .collect();
        let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
        let seq = self.take_next_op_seq();
        let stored = self.apply_bulk_create_with_seq(cards, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((ids, Some(stored)))
    }

    /// Edits card fields through a sparse patch, auditing before/after.
    pub fn patch(
        &mut self,
        id: CardId,
        user_id: UserId,
        patch: CardPatch,
        at: DateTime<Utc>,
    ) -> Result<((), StoredOp), StoreError> {
        let prev = patch.capture_inverse_for(self.owned(id, user_id)?);
        let seq = self.take_next_op_seq();
        let stored = self.apply_update_with_seq(id, user_id, patch, prev, at, seq)?;
        self.pending_ops.push(stored.clone());
        Ok(((), stored))
    }

    /// Deletes one card; its activity and audit entries are retained.
    pub fn remove(
        &mut self,
        id: CardId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<((), StoredOp), StoreError> {
        self.owned(id, user_id)?;
        let seq = self.take_next_op_seq();
        let stored = self.apply_delete_with_seq(id, user_id, at, seq)?;
        self.pending_ops.push(stored.clone());
        Ok(((), stored))
    }

    /// Deletes every card the user owns in `box_id`, one audit per card.
    ///
    /// Returns `(0, None)` without side effects when the box is empty.
    pub fn remove_box(
        &mut self,
        box_id: BoxId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(usize, Option<StoredOp>), StoreError> {
        if !self.box_has_cards(box_id, user_id) {
            return Ok((0, None));
        }
        let seq = self.take_next_op_seq();
        let (removed, stored) = self.apply_bulk_delete_with_seq(box_id, user_id, at, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((removed, Some(stored)))
    }

    /// Applies one recall outcome to a card at time `at`.
    ///
    /// Emits one answer activity (carrying the level before the
    /// transition) and one review audit with before/after snapshots.
    pub fn review(
        &mut self,
        id: CardId,
        user_id: UserId,
        correct: bool,
        at: DateTime<Utc>,
    ) -> Result<(ReviewedCard, StoredOp), StoreError> {
        self.owned(id, user_id)?;
        let seq = self.take_next_op_seq();
        let (reviewed, stored) = self.apply_review_with_seq(id, user_id, correct, at, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((reviewed, stored))
    }

    /// Promotes up to `count` activation groups out of the dormant pool.
    ///
    /// The pool is scanned once in creation order; a selected group key
    /// promotes every dormant card sharing it, not just the first seen.
    /// The `level == 0 && next_review == None` pool filter doubles as the
    /// idempotency guard: promoted cards never match again. An empty
    /// selection returns `(0, [])` with no side effects.
    pub fn activate(
        &mut self,
        box_id: BoxId,
        user_id: UserId,
        count: i64,
        at: DateTime<Utc>,
    ) -> Result<(ActivationOutcome, Option<StoredOp>), StoreError> {
        if count <= 0 {
            return Err(StoreError::InvalidCount(count));
        }
        let budget = count as usize;

        let mut groups = Vec::new();
        let mut seen = HashSet::new();
        for card in self.dormant(box_id, user_id) {
            let key = card.group_key();
            if seen.insert(key.clone()) {
                groups.push(key);
                if groups.len() >= budget {
                    break;
                }
            }
        }

        if groups.is_empty() {
            return Ok((
                ActivationOutcome {
                    activated: 0,
                    groups,
                },
                None,
            ));
        }

        let seq = self.take_next_op_seq();
        let (activated, stored) =
            self.apply_activate_with_seq(box_id, user_id, groups.clone(), at, seq)?;
        self.pending_ops.push(stored.clone());
        Ok((ActivationOutcome { activated, groups }, Some(stored)))
    }

    /// Re-applies a journaled op during replay, preserving its sequence.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        let seq = stored.seq;
        match stored.op {
            Op::Create { card } => {
                self.apply_create_with_seq(card, seq)?;
            }
            Op::BulkCreate { cards } => {
                self.apply_bulk_create_with_seq(cards, seq)?;
            }
            Op::Update {
                id,
                user_id,
                patch,
                prev,
                at,
            } => {
                self.apply_update_with_seq(id, user_id, patch, prev, at, seq)?;
            }
            Op::Delete { id, user_id, at } => {
                self.apply_delete_with_seq(id, user_id, at, seq)?;
            }
            Op::BulkDelete {
                box_id,
                user_id,
                at,
            } => {
                self.apply_bulk_delete_with_seq(box_id, user_id, at, seq)?;
            }
            Op::Review {
                id,
                user_id,
                correct,
                at,
            } => {
                self.apply_review_with_seq(id, user_id, correct, at, seq)?;
            }
            Op::Activate {
                box_id,
                user_id,
                keys,
                at,
            } => {
                self.apply_activate_with_seq(box_id, user_id, keys, at, seq)?;
            }
        }
        Ok(())
    }

    /// Looks up a card by id.
    pub fn get(&self, id: CardId) -> Option<&CardRecord> {
        self.records.get(&id)
    }

    /// Cloned variant of [`CardStore::get`].
    pub fn get_cloned(&self, id: CardId) -> Option<CardRecord> {
        self.get(id).cloned()
    }

    /// Unfinished cards due at or before `now`, ordered by
    /// `(next_review, created_at)`.
    pub fn ready(
        &self,
        box_id: Option<BoxId>,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Vec<&CardRecord> {
        let mut out: Vec<&CardRecord> = self
            .scoped_ids(box_id)
            .filter_map(|id| self.records.get(&id))
            .filter(|c| {
                c.user_id == user_id && !c.finished && c.next_review.is_some_and(|t| t <= now)
            })
            .collect();
        out.sort_by_key(|c| (c.next_review, c.created_at, c.id));
        out
    }

    /// Cloned variant of [`CardStore::ready`].
    pub fn ready_cloned(
        &self,
        box_id: Option<BoxId>,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Vec<CardRecord> {
        self.ready(box_id, user_id, now).into_iter().cloned().collect()
    }

    /// The activation pool: level-0, unscheduled cards in creation order.
    pub fn dormant(&self, box_id: BoxId, user_id: UserId) -> Vec<&CardRecord> {
        self.scoped_ids(Some(box_id))
            .filter_map(|id| self.records.get(&id))
            .filter(|c| c.user_id == user_id && c.level == 0 && c.next_review.is_none())
            .collect()
    }

    /// Cloned variant of [`CardStore::dormant`].
    pub fn dormant_cloned(&self, box_id: BoxId, user_id: UserId) -> Vec<CardRecord> {
        self.dormant(box_id, user_id).into_iter().cloned().collect()
    }

    /// Card counts for one box.
    pub fn box_summary(&self, box_id: BoxId, user_id: UserId, now: DateTime<Utc>) -> BoxSummary {
        let mut summary = BoxSummary::default();
        for card in self
            .scoped_ids(Some(box_id))
            .filter_map(|id| self.records.get(&id))
            .filter(|c| c.user_id == user_id)
        {
            summary.total += 1;
            if card.finished {
                summary.finished += 1;
                continue;
            }
            if card.level > 0 {
                summary.active += 1;
            }
            if card.next_review.is_some_and(|t| t <= now) {
                summary.ready += 1;
            }
        }
        summary
    }

    /// Activity stream filtered by owner and optionally by box.
    pub fn activities(&self, box_id: Option<BoxId>, user_id: UserId) -> Vec<ActivityRecord> {
        self.activities
            .iter()
            .filter(|a| a.user_id == user_id && box_id.map_or(true, |b| a.box_id == b))
            .cloned()
            .collect()
    }

    /// Audit trail filtered by owner and optionally by card.
    pub fn audits(&self, card_id: Option<CardId>, user_id: UserId) -> Vec<AuditRecord> {
        self.audits
            .iter()
            .filter(|a| a.user_id == user_id && card_id.map_or(true, |c| a.card_id == c))
            .cloned()
            .collect()
    }

    /// Calendar-bucketed projection of the activity stream.
    pub fn activity_report(
        &self,
        box_id: Option<BoxId>,
        user_id: UserId,
        interval: Interval,
        now: DateTime<Utc>,
    ) -> ActivityReport {
        let filtered = self
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && box_id.map_or(true, |b| a.box_id == b));
        report::aggregate(filtered, interval, now)
    }

    /// Cards sharing a trimmed, non-empty group id, in creation order.
    pub fn by_group(&self, group: &str) -> Vec<&CardRecord> {
        self.by_group
            .get(group.trim())
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Cloned variant of [`CardStore::by_group`].
    pub fn by_group_cloned(&self, group: &str) -> Vec<CardRecord> {
        self.by_group(group).into_iter().cloned().collect()
    }

    /// Card ids in creation order.
    pub fn ordered_ids(&self) -> &[CardId] {
        &self.order
    }

    /// Takes all ops appended since the last drain, for journaling.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Highest sequence handed out so far.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn materialize(&mut self, draft: CardDraft, at: DateTime<Utc>) -> CardRecord {
        let id = self.next_card_id;
        self.next_card_id += 1;
        CardRecord {
            id,
            box_id: draft.box_id,
            user_id: draft.user_id,
            finished: false,
            level: 0,
            group_id: draft.group_id,
            next_review: None,
            config: draft.config,
            created_at: at,
        }
    }

    fn owned(&self, id: CardId, user_id: UserId) -> Result<&CardRecord, StoreError> {
        self.records
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .ok_or(StoreError::MissingCard(id))
    }

    fn box_has_cards(&self, box_id: BoxId, user_id: UserId) -> bool {
        self.by_box
            .get(&box_id)
            .is_some_and(|ids| {
                ids.iter()
                    .any(|id| self.records.get(id).is_some_and(|c| c.user_id == user_id))
            })
    }

    fn scoped_ids(&self, box_id: Option<BoxId>) -> impl Iterator<Item = CardId> + '_ {
        let ids: &[CardId] = match box_id {
            Some(b) => self.by_box.get(&b).map(Vec::as_slice).unwrap_or(&[]),
            None => &self.order,
        };
        ids.iter().copied()
    }

    fn apply_create_with_seq(
        &mut self,
        card: CardRecord,
        seq: OpSeq,
    ) -> Result<StoredOp, StoreError> {
        self.admit_card(card.clone(), AuditAction::Create)?;
        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Create { card },
        })
    }

    fn apply_bulk_create_with_seq(
        &mut self,
        cards: Vec<CardRecord>,
        seq: OpSeq,
    ) -> Result<StoredOp, StoreError> {
        for card in &cards {
            self.admit_card(card.clone(), AuditAction::BulkCreate)?;
        }
        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::BulkCreate { cards },
        })
    }

    fn apply_update_with_seq(
        &mut self,
        id: CardId,
        user_id: UserId,
        patch: CardPatch,
        prev: CardPatch,
        at: DateTime<Utc>,
        seq: OpSeq,
    ) -> Result<StoredOp, StoreError> {
        let rec = self
            .records
            .get_mut(&id)
            .filter(|c| c.user_id == user_id)
            .ok_or(StoreError::MissingCard(id))?;

        let before = rec.snapshot();
        let old_group = trimmed_group(&rec.group_id);
        patch.apply_to(rec);
        let new_group = trimmed_group(&rec.group_id);
        let after = rec.snapshot();

        if old_group != new_group {
            if let Some(old) = old_group {
                Self::remove_from_vec_index(self.by_group.entry(old).or_default(), id);
            }
            if let Some(new) = new_group {
                self.by_group.entry(new).or_default().push(id);
            }
        }

        self.audits.push(AuditRecord {
            user_id,
            card_id: id,
            action: AuditAction::Update,
            before: Some(before),
            after: Some(after),
            at,
        });

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Update {
                id,
                user_id,
                patch,
                prev,
                at,
            },
        })
    }

    fn apply_delete_with_seq(
        &mut self,
        id: CardId,
        user_id: UserId,
        at: DateTime<Utc>,
        seq: OpSeq,
    ) -> Result<StoredOp, StoreError> {
        let before = self.owned(id, user_id)?.snapshot();
        self.audits.push(AuditRecord {
            user_id,
            card_id: id,
            action: AuditAction::Delete,
            before: Some(before),
            after: None,
            at,
        });
        self.detach_card(id);

        self.bump_next_seq_from(seq);
        Ok(StoredOp {
            seq,
            ts_ms: now_ms(),
            op: Op::Delete { id, user_id, at },
        })
    }

    fn apply_bulk_delete_with_seq(
        &mut self,
        box_id: BoxId,
        user_id: UserId,
        at: DateTime<Utc>,
        seq: OpSeq,
    ) -> Result<(usize, StoredOp), StoreError> {
        let ids: Vec<CardId> = self
            .scoped_ids(Some(box_id))
            .filter(|id| self.records.get(id).is_some_and(|c| c.user_id == user_id))
            .collect();

        for id in &ids {
            if let Some(rec) = self.records.get(id) {
                self.audits.push(AuditRecord {
                    user_id,
                    card_id: *id,
                    action: AuditAction::BulkDelete,
                    before: Some(rec.snapshot()),
                    after: None,
                    at,
                });
            }
            self.detach_card(*id);
        }

        self.bump_next_seq_from(seq);
        Ok((
            ids.len(),
            StoredOp {
                seq,
                ts_ms: now_ms(),
                op: Op::BulkDelete {
                    box_id,
                    user_id,
                    at,
                },
            },
        ))
    }

    fn apply_review_with_seq(
        &mut self,
        id: CardId,
        user_id: UserId,
        correct: bool,
        at: DateTime<Utc>,
        seq: OpSeq,
    ) -> Result<(ReviewedCard, StoredOp), StoreError> {
        let rec = self
            .records
            .get_mut(&id)
            .filter(|c| c.user_id == user_id)
            .ok_or(StoreError::MissingCard(id))?;

        let before = rec.snapshot();
        let previous_level = rec.level;
        let transition = sched::review_transition(previous_level, correct, at);
        rec.level = transition.level;
        rec.finished = transition.finished;
        rec.next_review = transition.next_review;
        let after = rec.snapshot();
        let card = rec.clone();

        self.activities.push(ActivityRecord {
            user_id,
            card_id: id,
            box_id: card.box_id,
            action: if correct {
                ActivityAction::AnswerCorrect
            } else {
                ActivityAction::AnswerIncorrect
            },
            card_level: previous_level,
            at,
        });
        self.audits.push(AuditRecord {
            user_id,
            card_id: id,
            action: AuditAction::Review,
            before: Some(before),
            after: Some(after),
            at,
        });

        self.bump_next_seq_from(seq);
        Ok((
            ReviewedCard {
                previous_level,
                card,
            },
            StoredOp {
                seq,
                ts_ms: now_ms(),
                op: Op::Review {
                    id,
                    user_id,
                    correct,
                    at,
                },
            },
        ))
    }

    fn apply_activate_with_seq(
        &mut self,
        box_id: BoxId,
        user_id: UserId,
        keys: Vec<GroupKey>,
        at: DateTime<Utc>,
        seq: OpSeq,
    ) -> Result<(usize, StoredOp), StoreError> {
        let selected: HashSet<GroupKey> = keys.iter().cloned().collect();
        let ids: Vec<CardId> = self
            .dormant(box_id, user_id)
            .into_iter()
            .filter(|c| selected.contains(&c.group_key()))
            .map(|c| c.id)
            .collect();

        for id in &ids {
            let Some(rec) = self.records.get_mut(id) else {
                continue;
            };
            let before = rec.snapshot();
            let previous_level = rec.level;
            rec.level = 1;
            rec.finished = false;
            rec.next_review = Some(at);
            let after = rec.snapshot();
            let box_id = rec.box_id;

            self.activities.push(ActivityRecord {
                user_id,
                card_id: *id,
                box_id,
                action: ActivityAction::Activate,
                card_level: previous_level,
                at,
            });
            self.audits.push(AuditRecord {
                user_id,
                card_id: *id,
                action: AuditAction::Activate,
                before: Some(before),
                after: Some(after),
                at,
            });
        }

        self.bump_next_seq_from(seq);
        Ok((
            ids.len(),
            StoredOp {
                seq,
                ts_ms: now_ms(),
                op: Op::Activate {
                    box_id,
                    user_id,
                    keys,
                    at,
                },
            },
        ))
    }

    fn admit_card(&mut self, card: CardRecord, action: AuditAction) -> Result<(), StoreError> {
        if self.records.contains_key(&card.id) {
            return Err(StoreError::AlreadyExists(card.id));
        }

        let id = card.id;
        self.next_card_id = self.next_card_id.max(id.saturating_add(1));
        self.insert_indices(&card);
        self.pos.insert(id, self.order.len());
        self.order.push(id);

        self.activities.push(ActivityRecord {
            user_id: card.user_id,
            card_id: id,
            box_id: card.box_id,
            action: ActivityAction::Create,
            card_level: card.level,
            at: card.created_at,
        });
        self.audits.push(AuditRecord {
            user_id: card.user_id,
            card_id: id,
            action,
            before: None,
            after: Some(card.snapshot()),
            at: card.created_at,
        });

        self.records.insert(id, card);
        Ok(())
    }

    fn detach_card(&mut self, id: CardId) -> Option<CardRecord> {
        let rec = self.records.remove(&id)?;

        if let Some(p) = self.pos.remove(&id) {
            self.order.remove(p);
            for (idx, moved) in self.order.iter().copied().enumerate().skip(p) {
                self.pos.insert(moved, idx);
            }
        }

        Self::remove_from_vec_index(self.by_box.entry(rec.box_id).or_default(), id);
        if let Some(group) = trimmed_group(&rec.group_id) {
            Self::remove_from_vec_index(self.by_group.entry(group).or_default(), id);
        }
        Some(rec)
    }

    fn insert_indices(&mut self, rec: &CardRecord) {
        self.by_box.entry(rec.box_id).or_default().push(rec.id);
        if let Some(group) = trimmed_group(&rec.group_id) {
            self.by_group.entry(group).or_default().push(rec.id);
        }
    }

    fn remove_from_vec_index(v: &mut Vec<CardId>, id: CardId) {
        if let Some(pos) = v.iter().position(|x| *x == id) {
            v.remove(pos);
        }
    }

    fn take_next_op_seq(&mut self) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        seq
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

fn trimmed_group(group_id: &str) -> Option<String> {
    let trimmed = group_id.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

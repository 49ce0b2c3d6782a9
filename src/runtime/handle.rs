use std::{collections::VecDeque, sync::Arc};

use chrono::Utc;
use tokio::{
    sync::{
        Mutex, broadcast,
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::{Duration, Instant},
};

use crate::{
    card::{CardDraft, CardPatch, CardRecord},
    core::store::{
        ActivationOutcome, BoxSummary, CardStore, ReviewedCard, StoreError, StoreSnapshotV1,
    },
    op::StoredOp,
    persist::{OpSink, PersistError},
    report::ActivityReport,
    sched::Outcome,
    types::{BoxId, CardId, Interval, OpSeq, UserId},
};

use super::events::CardEvent;

/// Errors surfaced by runtime calls.
#[derive(Debug)]
pub enum RuntimeError {
    /// Store rejected the operation.
    Store(StoreError),
    /// Journal sink failed or its queue is full.
    Persist(PersistError),
    /// The runtime loop has shut down.
    ChannelClosed,
}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

/// Tunables for the single-writer loop and its persistence worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Flush the sink after every enqueued mutation.
    pub flush_on_mutation: bool,
    /// Flush once this many ops are buffered.
    pub batch_max_ops: usize,
    /// Flush buffered ops after this many milliseconds.
    pub batch_max_latency_ms: u64,
    /// Bound on the persistence queue; overflow surfaces as an error
    /// while the rejected op waits in the loop's backlog for redelivery.
    pub persist_queue_bound: usize,
    /// Auto-checkpoint after this many mutations; 0 disables.
    pub snapshot_every_ops: usize,
    /// Compact the journal after each checkpoint.
    pub compact_after_snapshot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_on_mutation: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
        }
    }
}

/// Cloneable async handle to the single-writer card runtime.
///
/// All mutations funnel through one command loop, so reviews of the same
/// card observe a total order and activation's select-then-promote runs
/// without interleaving with other mutations.
///
/// A mutation that hits persistence backpressure returns an error, but its
/// journal op stays in a loop-owned backlog and is redelivered, in
/// sequence order, ahead of any later op. The journal can lag the
/// in-memory state; it never gaps.
pub struct CardLogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<CardEvent>,
}

impl Clone for CardLogHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Insert {
        draft: CardDraft,
        resp: oneshot::Sender<Result<CardId, RuntimeError>>,
    },
    InsertMany {
        drafts: Vec<CardDraft>,
        resp: oneshot::Sender<Result<Vec<CardId>, RuntimeError>>,
    },
    Patch {
        id: CardId,
        user_id: UserId,
        patch: CardPatch,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Remove {
        id: CardId,
        user_id: UserId,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    RemoveBox {
        box_id: BoxId,
        user_id: UserId,
        resp: oneshot::Sender<Result<usize, RuntimeError>>,
    },
    Review {
        id: CardId,
        user_id: UserId,
        outcome: Outcome,
        resp: oneshot::Sender<Result<ReviewedCard, RuntimeError>>,
    },
    Activate {
        box_id: BoxId,
        user_id: UserId,
        count: i64,
        resp: oneshot::Sender<Result<ActivationOutcome, RuntimeError>>,
    },
    Get {
        id: CardId,
        resp: oneshot::Sender<Option<CardRecord>>,
    },
    Ready {
        box_id: Option<BoxId>,
        user_id: UserId,
        resp: oneshot::Sender<Vec<CardRecord>>,
    },
    Dormant {
        box_id: BoxId,
        user_id: UserId,
        resp: oneshot::Sender<Vec<CardRecord>>,
    },
    ByGroup {
        group: String,
        resp: oneshot::Sender<Vec<CardRecord>>,
    },
    Summary {
        box_id: BoxId,
        user_id: UserId,
        resp: oneshot::Sender<BoxSummary>,
    },
    Report {
        box_id: Option<BoxId>,
        user_id: UserId,
        interval: Interval,
        resp: oneshot::Sender<ActivityReport>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Spawns the single-writer runtime over `store`, journaling to `sink`
/// when one is provided.
pub fn spawn_cardlog(
    store: CardStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> CardLogHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(256);
    let (events_tx, _) = broadcast::channel::<CardEvent>(1024);

    let (persist_tx_opt, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound);
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<Result<OpSeq, PersistError>>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let mut backlog = VecDeque::<StoredOp>::new();
        let mut ops_since_snapshot = 0usize;

        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        let done = handle_command(
                            cmd,
                            &mut store,
                            &mut backlog,
                            &events_tx_loop,
                            persist_tx_opt.as_ref(),
                            &config,
                            &mut ops_since_snapshot,
                        ).await;

                        if done {
                            break;
                        }
                    }
                    durable = rx.recv() => {
                        if let Some(Ok(op_seq)) = durable {
                            let _ = events_tx_loop.send(CardEvent::DurableUpTo { op_seq });
                        }
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                let done = handle_command(
                    cmd,
                    &mut store,
                    &mut backlog,
                    &events_tx_loop,
                    persist_tx_opt.as_ref(),
                    &config,
                    &mut ops_since_snapshot,
                )
                .await;
                if done {
                    break;
                }
            }
        }
    });

    CardLogHandle { cmd_tx, events_tx }
}

impl CardLogHandle {
    /// Subscribes to the runtime event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CardEvent> {
        self.events_tx.subscribe()
    }

    /// Creates one dormant card.
    pub async fn insert(&self, draft: CardDraft) -> Result<CardId, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Insert { draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Creates a batch of dormant cards as one logical operation.
    pub async fn insert_many(&self, drafts: Vec<CardDraft>) -> Result<Vec<CardId>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::InsertMany { drafts, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Edits card fields through a sparse patch.
    pub async fn patch(
        &self,
        id: CardId,
        user_id: UserId,
        patch: CardPatch,
    ) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Patch {
                id,
                user_id,
                patch,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Deletes one card.
    pub async fn remove(&self, id: CardId, user_id: UserId) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Remove {
                id,
                user_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Deletes every card the user owns in a box; returns the count.
    pub async fn remove_box(&self, box_id: BoxId, user_id: UserId) -> Result<usize, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RemoveBox {
                box_id,
                user_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Applies one recall outcome to a card at the current time.
    pub async fn review(
        &self,
        id: CardId,
        user_id: UserId,
        outcome: Outcome,
    ) -> Result<ReviewedCard, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Review {
                id,
                user_id,
                outcome,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Promotes up to `count` activation groups out of the dormant pool.
    pub async fn activate(
        &self,
        box_id: BoxId,
        user_id: UserId,
        count: i64,
    ) -> Result<ActivationOutcome, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Activate {
                box_id,
                user_id,
                count,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Looks up a card by id.
    pub async fn get(&self, id: CardId) -> Result<Option<CardRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Unfinished cards due now, ordered by next review time.
    pub async fn ready(
        &self,
        box_id: Option<BoxId>,
        user_id: UserId,
    ) -> Result<Vec<CardRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Ready {
                box_id,
                user_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// The dormant activation pool for one box.
    pub async fn dormant(
        &self,
        box_id: BoxId,
        user_id: UserId,
    ) -> Result<Vec<CardRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Dormant {
                box_id,
                user_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Cards sharing a non-empty group id.
    pub async fn by_group(&self, group: impl Into<String>) -> Result<Vec<CardRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ByGroup {
                group: group.into(),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Card counts for one box.
    pub async fn box_summary(
        &self,
        box_id: BoxId,
        user_id: UserId,
    ) -> Result<BoxSummary, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Summary {
                box_id,
                user_id,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Calendar-bucketed activity report anchored at the current time.
    pub async fn report(
        &self,
        box_id: Option<BoxId>,
        user_id: UserId,
        interval: Interval,
    ) -> Result<ActivityReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Report {
                box_id,
                user_id,
                interval,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Forces the journal sink to durability; returns the durable seq.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a full-state checkpoint to the sink.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Drains the persistence queue and stops the runtime loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut CardStore,
    backlog: &mut VecDeque<StoredOp>,
    events_tx: &broadcast::Sender<CardEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) -> bool {
    match cmd {
        Command::Insert { draft, resp } => {
            let res = store
                .insert(draft, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|(id, _)| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    let _ = events_tx.send(CardEvent::Created { id });
                    Ok(id)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::InsertMany { drafts, resp } => {
            let res = store
                .insert_many(drafts, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|(ids, stored)| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    if stored.is_some() {
                        for id in &ids {
                            let _ = events_tx.send(CardEvent::Created { id: *id });
                        }
                    }
                    Ok(ids)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::Patch {
            id,
            user_id,
            patch,
            resp,
        } => {
            let res = store
                .patch(id, user_id, patch, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|_| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    let _ = events_tx.send(CardEvent::Updated { id });
                    Ok(())
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::Remove { id, user_id, resp } => {
            let res = store
                .remove(id, user_id, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|_| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    let _ = events_tx.send(CardEvent::Removed { id });
                    Ok(())
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::RemoveBox {
            box_id,
            user_id,
            resp,
        } => {
            let res = store
                .remove_box(box_id, user_id, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|(removed, _)| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    Ok(removed)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::Review {
            id,
            user_id,
            outcome,
            resp,
        } => {
            let res = store
                .review(id, user_id, outcome.is_correct(), Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|(reviewed, _)| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    let _ = events_tx.send(CardEvent::Reviewed {
                        id,
                        level: reviewed.card.level,
                    });
                    Ok(reviewed)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::Activate {
            box_id,
            user_id,
            count,
            resp,
        } => {
            let res = store
                .activate(box_id, user_id, count, Utc::now())
                .map_err(RuntimeError::from)
                .and_then(|(outcome, stored)| {
                    forward_pending(store, backlog, events_tx, persist_tx)?;
                    if stored.is_some() {
                        let _ = events_tx.send(CardEvent::Activated {
                            activated: outcome.activated,
                        });
                    }
                    Ok(outcome)
                });
            if res.is_ok() {
                *ops_since_snapshot += 1;
                maybe_auto_checkpoint(store, backlog, persist_tx, config, ops_since_snapshot)
                    .await;
            }
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(id));
        }
        Command::Ready {
            box_id,
            user_id,
            resp,
        } => {
            let _ = resp.send(store.ready_cloned(box_id, user_id, Utc::now()));
        }
        Command::Dormant {
            box_id,
            user_id,
            resp,
        } => {
            let _ = resp.send(store.dormant_cloned(box_id, user_id));
        }
        Command::ByGroup { group, resp } => {
            let _ = resp.send(store.by_group_cloned(&group));
        }
        Command::Summary {
            box_id,
            user_id,
            resp,
        } => {
            let _ = resp.send(store.box_summary(box_id, user_id, Utc::now()));
        }
        Command::Report {
            box_id,
            user_id,
            interval,
            resp,
        } => {
            let _ = resp.send(store.activity_report(box_id, user_id, interval, Utc::now()));
        }
        Command::Flush { resp } => {
            let out = if let Some(tx) = persist_tx {
                match drain_backlog(tx, backlog).await {
                    Err(err) => Err(err),
                    Ok(()) => {
                        let (flush_tx, flush_rx) = oneshot::channel();
                        if tx
                            .send(PersistMsg::Flush { resp: flush_tx })
                            .await
                            .is_err()
                        {
                            Err(RuntimeError::ChannelClosed)
                        } else {
                            flush_rx
                                .await
                                .map_err(|_| RuntimeError::ChannelClosed)
                                .and_then(|r| r.map_err(RuntimeError::from))
                        }
                    }
                }
            } else {
                Ok(store.latest_op_seq())
            };
            let _ = resp.send(out);
        }
        Command::Checkpoint { resp } => {
            let out = if let Some(tx) = persist_tx {
                match drain_backlog(tx, backlog).await {
                    Err(err) => Err(err),
                    Ok(()) => {
                        let snapshot = store.export_snapshot();
                        let last_seq = store.latest_op_seq();
                        let (cp_tx, cp_rx) = oneshot::channel();
                        if tx
                            .send(PersistMsg::Checkpoint {
                                snapshot,
                                last_seq,
                                compact: config.compact_after_snapshot,
                                resp: cp_tx,
                            })
                            .await
                            .is_err()
                        {
                            Err(RuntimeError::ChannelClosed)
                        } else {
                            cp_rx
                                .await
                                .map_err(|_| RuntimeError::ChannelClosed)
                                .and_then(|r| r.map_err(RuntimeError::from))
                        }
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = if let Some(tx) = persist_tx {
                match drain_backlog(tx, backlog).await {
                    Err(err) => Err(err),
                    Ok(()) => {
                        let (done_tx, done_rx) = oneshot::channel();
                        let send_res = tx.send(PersistMsg::Shutdown { resp: done_tx }).await;
                        if send_res.is_err() {
                            Err(RuntimeError::ChannelClosed)
                        } else {
                            match done_rx.await {
                                Ok(()) => Ok(()),
                                Err(_) => Err(RuntimeError::ChannelClosed),
                            }
                        }
                    }
                }
            } else {
                Ok(())
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

/// Moves the store's freshly journaled ops into the backlog, then pushes
/// the backlog into the persistence queue, oldest first.
///
/// On queue overflow the remaining ops stay backlogged and the error
/// surfaces to the caller; the next forward (or an explicit flush,
/// checkpoint, or shutdown) redelivers them before anything newer, so
/// journal ordering and completeness hold even under backpressure.
fn forward_pending(
    store: &mut CardStore,
    backlog: &mut VecDeque<StoredOp>,
    events_tx: &broadcast::Sender<CardEvent>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
) -> Result<(), RuntimeError> {
    backlog.extend(store.drain_pending_ops());

    let Some(tx) = persist_tx else {
        backlog.clear();
        let _ = events_tx.send(CardEvent::DurableUpTo {
            op_seq: store.latest_op_seq(),
        });
        return Ok(());
    };

    while let Some(op) = backlog.front() {
        match tx.try_send(PersistMsg::Op(op.clone())) {
            Ok(()) => {
                backlog.pop_front();
            }
            Err(TrySendError::Full(_)) => {
                return Err(RuntimeError::Persist(PersistError::Message(
                    "persist queue full; op retained for redelivery".to_string(),
                )));
            }
            Err(TrySendError::Closed(_)) => {
                return Err(RuntimeError::ChannelClosed);
            }
        }
    }
    Ok(())
}

/// Delivers every backlogged op, waiting for queue capacity.
async fn drain_backlog(
    tx: &mpsc::Sender<PersistMsg>,
    backlog: &mut VecDeque<StoredOp>,
) -> Result<(), RuntimeError> {
    while let Some(op) = backlog.pop_front() {
        if let Err(mpsc::error::SendError(msg)) = tx.send(PersistMsg::Op(op)).await {
            if let PersistMsg::Op(op) = msg {
                backlog.push_front(op);
            }
            return Err(RuntimeError::ChannelClosed);
        }
    }
    Ok(())
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
        let mut last_durable: OpSeq = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || config.flush_on_mutation {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                            }
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let flush_result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let result = if let Err(err) = flush_result {
                                Err(err)
                            } else {
                                let sink_ref = Arc::clone(&sink);
                                match tokio::task::spawn_blocking(move || {
                                    let mut sink = sink_ref.blocking_lock();
                                    sink.write_snapshot(&snapshot, last_seq)?;
                                    if compact {
                                        let _ = sink.compact_through(last_seq)?;
                                    }
                                    Result::<(), PersistError>::Ok(())
                                }).await {
                                    Ok(inner) => inner,
                                    Err(e) => Err(PersistError::Message(format!("join error: {e}"))),
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                        }
                        PersistMsg::Shutdown { resp } => {
                            let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await;
                    deadline = Instant::now() + Duration::from_millis(config.batch_max_latency_ms);
                }
            }
        }
    });
}

async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    durable_tx: &mpsc::UnboundedSender<Result<OpSeq, PersistError>>,
    call_flush: bool,
) -> Result<(), PersistError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || {
                let mut sink = sink_ref.blocking_lock();
                sink.flush()
            })
            .await
            .map_err(|e| PersistError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let append_res: Result<OpSeq, PersistError> = tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        let seq = sink.append_ops(&ops)?;
        if call_flush {
            sink.flush()?;
        }
        Ok(seq)
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))?;

    match append_res {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = durable_tx.send(Ok(*last_durable));
            Ok(())
        }
        Err(err) => {
            let _ = durable_tx.send(Err(PersistError::Message(format!(
                "append failed: {err:?}"
            ))));
            Err(err)
        }
    }
}

async fn maybe_auto_checkpoint(
    store: &CardStore,
    backlog: &mut VecDeque<StoredOp>,
    persist_tx: Option<&mpsc::Sender<PersistMsg>>,
    config: &RuntimeConfig,
    ops_since_snapshot: &mut usize,
) {
    if config.snapshot_every_ops == 0 || *ops_since_snapshot < config.snapshot_every_ops {
        return;
    }

    let Some(tx) = persist_tx else {
        return;
    };

    if drain_backlog(tx, backlog).await.is_err() {
        return;
    }

    let snapshot = store.export_snapshot();
    let last_seq = store.latest_op_seq();
    let (cp_tx, cp_rx) = oneshot::channel();
    if tx
        .send(PersistMsg::Checkpoint {
            snapshot,
            last_seq,
            compact: config.compact_after_snapshot,
            resp: cp_tx,
        })
        .await
        .is_ok()
    {
        let _ = cp_rx.await;
        *ops_since_snapshot = 0;
    }
}

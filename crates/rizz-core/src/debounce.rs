//! Per-user debounced task coalescer.
//!
//! Sits between "a new inbound message arrived" and "invoke the response
//! pipeline". Bursts of rapid messages from one user collapse into a single
//! downstream invocation carrying the most recent message, while isolated
//! messages are dispatched with no artificial delay.
//!
//! State per user: `IDLE -> PENDING -> (PENDING on newer message) -> FIRED -> IDLE`.
//! Only the most recently scheduled task for a user can ever fire; every
//! earlier one is cancelled synchronously, under the registry lock, before the
//! new one is stored.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{domain::UserId, Result};

/// Messages arriving at least this far apart are treated as isolated.
pub const ARRIVAL_GAP_THRESHOLD: Duration = Duration::from_secs(2);

/// Quiet period applied to messages that arrive inside a burst.
pub const DEBOUNCE_DELAY: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceConfig {
    pub arrival_gap_threshold: Duration,
    pub debounce_delay: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            arrival_gap_threshold: ARRIVAL_GAP_THRESHOLD,
            debounce_delay: DEBOUNCE_DELAY,
        }
    }
}

/// The downstream work a scheduled task performs once its delay elapses.
///
/// Implementations own their user-facing error reporting; whatever they
/// return is only logged by the coalescer.
#[async_trait]
pub trait ResponsePipeline: Send + Sync + 'static {
    type Message: Send + 'static;

    async fn respond(&self, user_id: UserId, message: Self::Message) -> Result<()>;
}

#[derive(Debug)]
struct PendingTask {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct UserSlot {
    pending: Option<PendingTask>,
    last_arrival: Option<DateTime<Utc>>,
}

/// Owns `{user_id -> (pending task handle, last arrival)}`.
///
/// Injected into a [`Coalescer`] so tests and independent coalescers never
/// share ambient state. The coalescer is the only writer.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    slots: Mutex<HashMap<UserId, UserSlot>>,
    next_task_id: AtomicU64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, UserSlot>> {
        // Every mutation is a plain field assignment, so a poisoned map is still consistent.
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True while a scheduled task for `user_id` is still waiting out its delay.
    pub fn is_pending(&self, user_id: UserId) -> bool {
        self.slots()
            .get(&user_id)
            .is_some_and(|slot| slot.pending.is_some())
    }

    pub fn pending_count(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.pending.is_some())
            .count()
    }

    pub fn last_arrival(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.slots().get(&user_id).and_then(|slot| slot.last_arrival)
    }

    /// Cancel-then-reschedule as one non-suspending step.
    fn schedule(
        &self,
        user_id: UserId,
        arrival: DateTime<Utc>,
        cfg: &DebounceConfig,
    ) -> (u64, CancellationToken, Duration, bool) {
        let mut slots = self.slots();
        let slot = slots.entry(user_id).or_default();

        let superseded = match slot.pending.take() {
            Some(previous) => {
                previous.cancel.cancel();
                true
            }
            None => false,
        };

        let gap = slot.last_arrival.map(|last| arrival - last);
        let delay = delay_for_gap(gap, cfg);

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        slot.pending = Some(PendingTask {
            id,
            cancel: cancel.clone(),
        });
        slot.last_arrival = Some(arrival);

        (id, cancel, delay, superseded)
    }

    /// Transition `PENDING -> FIRED` for exactly the task that is still current.
    fn claim(&self, user_id: UserId, task_id: u64) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&user_id) else {
            return false;
        };
        match &slot.pending {
            Some(task) if task.id == task_id && !task.cancel.is_cancelled() => {
                slot.pending = None;
                true
            }
            _ => false,
        }
    }

    fn cancel(&self, user_id: UserId) -> bool {
        let mut slots = self.slots();
        let Some(task) = slots.get_mut(&user_id).and_then(|slot| slot.pending.take()) else {
            return false;
        };
        task.cancel.cancel();
        true
    }

    fn cancel_all(&self) -> usize {
        let mut slots = self.slots();
        let mut cancelled = 0;
        for slot in slots.values_mut() {
            if let Some(task) = slot.pending.take() {
                task.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

/// Result of scheduling one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub task_id: u64,
    pub delay: Duration,
    /// A still-waiting task for the same user was cancelled.
    pub superseded: bool,
}

/// Pick the artificial delay for a message given the gap to the user's
/// previous one. No previous message counts as an infinite gap; a negative
/// gap (out-of-order timestamps) counts as a burst.
pub fn delay_for_gap(gap: Option<chrono::Duration>, cfg: &DebounceConfig) -> Duration {
    let Some(gap) = gap else {
        return Duration::ZERO;
    };
    match gap.to_std() {
        Ok(gap) if gap >= cfg.arrival_gap_threshold => Duration::ZERO,
        _ => cfg.debounce_delay,
    }
}

pub struct Coalescer<P: ResponsePipeline> {
    pipeline: Arc<P>,
    cfg: DebounceConfig,
    registry: Arc<PendingRegistry>,
}

impl<P: ResponsePipeline> Clone for Coalescer<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            cfg: self.cfg,
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P: ResponsePipeline> Coalescer<P> {
    pub fn new(pipeline: Arc<P>, cfg: DebounceConfig) -> Self {
        Self::with_registry(pipeline, cfg, Arc::new(PendingRegistry::new()))
    }

    pub fn with_registry(pipeline: Arc<P>, cfg: DebounceConfig, registry: Arc<PendingRegistry>) -> Self {
        Self {
            pipeline,
            cfg,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Schedule `message` for `user_id`, superseding any task still waiting.
    ///
    /// Must be called from within a Tokio runtime. Never suspends; the
    /// deferred work runs on a spawned task.
    pub fn on_message(
        &self,
        user_id: UserId,
        message: P::Message,
        arrival: DateTime<Utc>,
    ) -> ScheduleOutcome {
        let (task_id, cancel, delay, superseded) =
            self.registry.schedule(user_id, arrival, &self.cfg);

        if superseded {
            debug!(user_id = user_id.0, task_id, "superseded pending reply");
        }
        debug!(user_id = user_id.0, task_id, delay_ms = delay.as_millis() as u64, "scheduled reply");

        let registry = Arc::clone(&self.registry);
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(user_id = user_id.0, task_id, "debounced task cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if !registry.claim(user_id, task_id) {
                debug!(user_id = user_id.0, task_id, "debounced task superseded before firing");
                return;
            }

            if let Err(e) = pipeline.respond(user_id, message).await {
                warn!(user_id = user_id.0, task_id, error = %e, "response pipeline failed");
            }
        });

        ScheduleOutcome {
            task_id,
            delay,
            superseded,
        }
    }

    /// Cancel the user's waiting task, if any. Cancelling a task that already
    /// fired or finished is a no-op and returns `false`.
    pub fn cancel(&self, user_id: UserId) -> bool {
        self.registry.cancel(user_id)
    }

    /// Cancel every waiting task (shutdown).
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use tokio::time::Instant;

    struct RecordingPipeline {
        started: Instant,
        calls: Mutex<Vec<(UserId, String, Duration)>>,
        fail_on: Option<&'static str>,
        hold: Duration,
    }

    impl RecordingPipeline {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                hold: Duration::ZERO,
            })
        }

        fn failing_on(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                calls: Mutex::new(Vec::new()),
                fail_on: Some(text),
                hold: Duration::ZERO,
            })
        }

        fn holding(hold: Duration) -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                hold,
            })
        }

        fn calls(&self) -> Vec<(UserId, String, Duration)> {
            self.calls.lock().unwrap().clone()
        }

        fn texts_for(&self, user: UserId) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(u, _, _)| *u == user)
                .map(|(_, t, _)| t)
                .collect()
        }
    }

    #[async_trait]
    impl ResponsePipeline for RecordingPipeline {
        type Message = String;

        async fn respond(&self, user_id: UserId, message: String) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((user_id, message.clone(), self.started.elapsed()));
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            if self.fail_on == Some(message.as_str()) {
                return Err(Error::External("model quota exceeded".to_string()));
            }
            Ok(())
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);

    #[test]
    fn delay_rules() {
        let cfg = DebounceConfig::default();
        assert_eq!(delay_for_gap(None, &cfg), Duration::ZERO);
        assert_eq!(delay_for_gap(Some(chrono::Duration::seconds(2)), &cfg), Duration::ZERO);
        assert_eq!(delay_for_gap(Some(chrono::Duration::seconds(30)), &cfg), Duration::ZERO);
        assert_eq!(
            delay_for_gap(Some(chrono::Duration::milliseconds(1999)), &cfg),
            DEBOUNCE_DELAY
        );
        assert_eq!(delay_for_gap(Some(chrono::Duration::zero()), &cfg), DEBOUNCE_DELAY);
        assert_eq!(
            delay_for_gap(Some(chrono::Duration::seconds(-3)), &cfg),
            DEBOUNCE_DELAY
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_message_fires_immediately() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        let out = coalescer.on_message(ALICE, "hey".to_string(), at(0));
        assert_eq!(out.delay, Duration::ZERO);
        assert!(!out.superseded);

        wait(1).await;
        let calls = pipeline.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "hey");
        assert!(calls[0].2 < Duration::from_millis(1));
        assert!(!coalescer.registry().is_pending(ALICE));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_message_after_delay() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        // The opener of the burst has no recent predecessor and goes straight through.
        coalescer.on_message(ALICE, "yo".to_string(), at(0));
        wait(1000).await;

        let second = coalescer.on_message(ALICE, "hi".to_string(), at(1000));
        assert_eq!(second.delay, DEBOUNCE_DELAY);
        assert!(!second.superseded);

        wait(1000).await;
        let third = coalescer.on_message(ALICE, "hi there".to_string(), at(2000));
        assert_eq!(third.delay, DEBOUNCE_DELAY);
        assert!(third.superseded);

        wait(9_000).await;
        assert_eq!(pipeline.texts_for(ALICE), vec!["yo".to_string()]);

        wait(2_000).await;
        let calls = pipeline.calls();
        assert_eq!(pipeline.texts_for(ALICE), vec!["yo".to_string(), "hi there".to_string()]);
        assert!(calls[1].2 >= Duration::from_secs(12));
        assert!(calls[1].2 < Duration::from_millis(12_050));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_messages_are_processed_independently() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        let first = coalescer.on_message(ALICE, "first".to_string(), at(0));
        wait(5_000).await;
        let second = coalescer.on_message(ALICE, "second".to_string(), at(5_000));
        assert_eq!(first.delay, Duration::ZERO);
        assert_eq!(second.delay, Duration::ZERO);

        wait(1).await;
        let calls = pipeline.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].2 < Duration::from_millis(1));
        assert!(calls[1].2 >= Duration::from_secs(5) && calls[1].2 < Duration::from_millis(5_001));
    }

    #[tokio::test(start_paused = true)]
    async fn users_do_not_cancel_each_other() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        coalescer.on_message(ALICE, "a0".to_string(), at(0));
        coalescer.on_message(BOB, "b0".to_string(), at(0));
        wait(500).await;
        let a1 = coalescer.on_message(ALICE, "a1".to_string(), at(500));
        let b1 = coalescer.on_message(BOB, "b1".to_string(), at(600));
        assert!(!a1.superseded);
        assert!(!b1.superseded);
        wait(200).await;
        let a2 = coalescer.on_message(ALICE, "a2".to_string(), at(700));
        assert!(a2.superseded);
        assert!(coalescer.registry().is_pending(BOB));

        wait(15_000).await;
        assert_eq!(pipeline.texts_for(ALICE), vec!["a0".to_string(), "a2".to_string()]);
        assert_eq!(pipeline.texts_for(BOB), vec!["b0".to_string(), "b1".to_string()]);
        assert_eq!(coalescer.registry().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_reaches_pipeline() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        coalescer.on_message(ALICE, "one".to_string(), at(0));
        wait(1).await;
        coalescer.on_message(ALICE, "two".to_string(), at(500));
        assert!(coalescer.registry().is_pending(ALICE));

        assert!(coalescer.cancel(ALICE));
        assert!(!coalescer.cancel(ALICE), "second cancel is a no-op");

        wait(20_000).await;
        assert_eq!(pipeline.texts_for(ALICE), vec!["one".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_fired_task_is_a_no_op() {
        let pipeline = RecordingPipeline::holding(Duration::from_secs(3));
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        coalescer.on_message(ALICE, "slow".to_string(), at(0));
        wait(1).await;
        assert_eq!(pipeline.calls().len(), 1);
        assert!(!coalescer.cancel(ALICE));

        // A new message during the in-flight call is scheduled, not a supersede.
        let next = coalescer.on_message(ALICE, "next".to_string(), at(1_000));
        assert!(!next.superseded);
        assert_eq!(next.delay, DEBOUNCE_DELAY);

        wait(20_000).await;
        assert_eq!(pipeline.texts_for(ALICE), vec!["slow".to_string(), "next".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_contained() {
        let pipeline = RecordingPipeline::failing_on("boom");
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        coalescer.on_message(ALICE, "boom".to_string(), at(0));
        wait(5_000).await;
        assert!(!coalescer.registry().is_pending(ALICE));

        coalescer.on_message(ALICE, "after".to_string(), at(5_000));
        wait(1).await;
        assert_eq!(pipeline.texts_for(ALICE), vec!["boom".to_string(), "after".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_arrival_applies_delay() {
        let pipeline = RecordingPipeline::new();
        let coalescer = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        coalescer.on_message(ALICE, "later".to_string(), at(10_000));
        wait(1).await;
        let out = coalescer.on_message(ALICE, "earlier".to_string(), at(4_000));
        assert_eq!(out.delay, DEBOUNCE_DELAY);
        assert_eq!(coalescer.registry().last_arrival(ALICE), Some(at(4_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn registries_are_isolated_per_coalescer() {
        let pipeline = RecordingPipeline::new();
        let shared = Arc::new(PendingRegistry::new());
        let a = Coalescer::with_registry(pipeline.clone(), DebounceConfig::default(), shared.clone());
        let b = Coalescer::new(pipeline.clone(), DebounceConfig::default());

        a.on_message(ALICE, "x".to_string(), at(0));
        let out = b.on_message(ALICE, "y".to_string(), at(100));
        assert_eq!(out.delay, Duration::ZERO, "other registry has no history for the user");
        assert_eq!(shared.last_arrival(ALICE), Some(at(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_every_waiting_task() {
        let pipeline = RecordingPipeline::new();
        let cfg = DebounceConfig {
            arrival_gap_threshold: Duration::from_secs(2),
            debounce_delay: Duration::from_secs(4),
        };
        let coalescer = Coalescer::new(pipeline.clone(), cfg);

        for user in [ALICE, BOB] {
            coalescer.on_message(user, "open".to_string(), at(0));
        }
        wait(1).await;
        for user in [ALICE, BOB] {
            let out = coalescer.on_message(user, "pending".to_string(), at(100));
            assert_eq!(out.delay, Duration::from_secs(4));
        }

        assert_eq!(coalescer.cancel_all(), 2);
        wait(10_000).await;
        assert_eq!(pipeline.calls().len(), 2);
    }
}

//! Per-actor workflow slots.
//!
//! Every actor owns one [`ActorSlots`] behind its own async mutex. A dispatch
//! holds that lock from routing until the step's effect is done, and the idle
//! sweep only evicts from actors whose lock it can take without waiting, so a
//! slot is never reaped halfway through a step.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::workflow::{Workflow, WorkflowKind, WorkflowSlot};

/// The slots of one actor, at most one per kind.
#[derive(Debug)]
pub struct ActorSlots {
    actor_id: i64,
    slots: BTreeMap<WorkflowKind, WorkflowSlot>,
    idle_timeout: Duration,
}

impl ActorSlots {
    fn new(actor_id: i64, idle_timeout: Duration) -> Self {
        Self {
            actor_id,
            slots: BTreeMap::new(),
            idle_timeout,
        }
    }

    pub fn actor_id(&self) -> i64 {
        self.actor_id
    }

    fn is_expired(&self, slot: &WorkflowSlot, now: DateTime<Utc>) -> bool {
        now - slot.last_activity > self.idle_timeout
    }

    /// Drops every slot idle for longer than the timeout; returns how many.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.slots.len();
        let timeout = self.idle_timeout;
        self.slots
            .retain(|_, slot| now - slot.last_activity <= timeout);
        before - self.slots.len()
    }

    /// The live workflow of `kind`, if any. An expired slot is dropped here
    /// rather than returned.
    pub fn get(&mut self, kind: WorkflowKind, now: DateTime<Utc>) -> Option<&Workflow> {
        if self
            .slots
            .get(&kind)
            .is_some_and(|slot| self.is_expired(slot, now))
        {
            self.slots.remove(&kind);
            tracing::debug!(actor_id = self.actor_id, kind = %kind, "expired slot dropped on access");
        }
        self.slots.get(&kind).map(|slot| &slot.workflow)
    }

    /// Highest-priority kind with a live slot.
    pub fn first_live(&mut self, now: DateTime<Utc>) -> Option<WorkflowKind> {
        self.evict_expired(now);
        self.slots.keys().next().copied()
    }

    /// Creates the slot for the workflow's kind, replacing any existing one,
    /// and returns what was replaced.
    pub fn start(&mut self, workflow: Workflow, now: DateTime<Utc>) -> Option<WorkflowSlot> {
        let kind = workflow.kind();
        let previous = self.slots.insert(
            kind,
            WorkflowSlot {
                workflow,
                last_activity: now,
            },
        );
        if let Some(previous) = &previous {
            tracing::warn!(
                actor_id = self.actor_id,
                kind = %kind,
                replaced_step = previous.workflow.step_name(),
                "workflow restarted, previous slot overwritten"
            );
        } else {
            tracing::debug!(actor_id = self.actor_id, kind = %kind, "workflow started");
        }
        previous
    }

    /// Stores the advanced workflow and refreshes its activity timestamp.
    pub fn advance(&mut self, workflow: Workflow, now: DateTime<Utc>) {
        let kind = workflow.kind();
        self.slots.insert(
            kind,
            WorkflowSlot {
                workflow,
                last_activity: now,
            },
        );
    }

    /// Refreshes the activity timestamp without changing the step.
    pub fn touch(&mut self, kind: WorkflowKind, now: DateTime<Utc>) {
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.last_activity = now;
        }
    }

    pub fn finish(&mut self, kind: WorkflowKind) -> Option<Workflow> {
        self.slots.remove(&kind).map(|slot| slot.workflow)
    }

    /// Removes every slot; returns how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let removed = self.slots.len();
        self.slots.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// All actors' slots.
#[derive(Debug)]
pub struct WorkflowRegistry {
    actors: Mutex<HashMap<i64, Arc<Mutex<ActorSlots>>>>,
    idle_timeout: Duration,
}

impl WorkflowRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            actors: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Locks the actor's slots, creating an empty set on first use. Hold the
    /// guard for the whole step.
    pub async fn lock(&self, actor_id: i64) -> OwnedMutexGuard<ActorSlots> {
        let slots = {
            let mut actors = self.actors.lock().await;
            Arc::clone(actors.entry(actor_id).or_insert_with(|| {
                Arc::new(Mutex::new(ActorSlots::new(actor_id, self.idle_timeout)))
            }))
        };
        slots.lock_owned().await
    }

    pub async fn start(
        &self,
        actor_id: i64,
        workflow: Workflow,
        now: DateTime<Utc>,
    ) -> Option<WorkflowSlot> {
        self.lock(actor_id).await.start(workflow, now)
    }

    /// Removes every slot of the actor. `found` iff the result is non-zero.
    pub async fn cancel(&self, actor_id: i64) -> usize {
        let removed = self.lock(actor_id).await.cancel_all();
        tracing::info!(actor_id, removed, "workflows cancelled");
        removed
    }

    pub async fn workflow(
        &self,
        actor_id: i64,
        kind: WorkflowKind,
        now: DateTime<Utc>,
    ) -> Option<Workflow> {
        self.lock(actor_id).await.get(kind, now).cloned()
    }

    /// Live slots of the actor.
    pub async fn live_slots(&self, actor_id: i64, now: DateTime<Utc>) -> usize {
        let mut slots = self.lock(actor_id).await;
        slots.evict_expired(now);
        slots.len()
    }

    /// Evicts every slot idle longer than the timeout and forgets actors left
    /// with nothing. Actors busy in a dispatch are skipped; their expired
    /// slots go on the next sweep or on their next access.
    pub async fn reap_idle(&self, now: DateTime<Utc>) -> usize {
        let mut actors = self.actors.lock().await;
        let mut evicted = 0;
        let mut skipped = 0;
        let mut emptied = Vec::new();

        for (actor_id, slots) in actors.iter() {
            let Ok(mut guard) = slots.try_lock() else {
                skipped += 1;
                continue;
            };
            let removed = guard.evict_expired(now);
            if removed > 0 {
                tracing::debug!(actor_id, removed, "idle slots evicted");
            }
            evicted += removed;
            if guard.is_empty() {
                emptied.push(*actor_id);
            }
        }

        for actor_id in emptied {
            // A dispatch that already cloned the Arc keeps the entry alive.
            if actors
                .get(&actor_id)
                .is_some_and(|slots| Arc::strong_count(slots) == 1)
            {
                actors.remove(&actor_id);
            }
        }

        if evicted > 0 || skipped > 0 {
            tracing::info!(evicted, skipped, "idle sweep done");
        }
        evicted
    }

    /// Actors currently tracked, empty ones included.
    pub async fn tracked_actors(&self) -> usize {
        self.actors.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{InviteStep, LowBalanceStep, RegistrationStep, UsageStep};

    fn registry() -> WorkflowRegistry {
        WorkflowRegistry::new(Duration::minutes(30))
    }

    #[tokio::test]
    async fn cancel_reports_how_many_slots_existed() {
        let registry = registry();
        let now = Utc::now();
        assert_eq!(registry.cancel(7).await, 0);

        registry
            .start(7, Workflow::UsageRegistration(UsageStep::WaitingForAmount), now)
            .await;
        registry
            .start(7, Workflow::LowBalanceSearch(LowBalanceStep::WaitingForThreshold), now)
            .await;
        registry
            .start(
                7,
                Workflow::InviteCode(InviteStep::WaitingForNotes {
                    code: "ABC123".to_string(),
                }),
                now,
            )
            .await;

        assert_eq!(registry.cancel(7).await, 3);
        assert_eq!(registry.live_slots(7, now).await, 0);
    }

    #[tokio::test]
    async fn start_overwrites_same_kind_only() {
        let registry = registry();
        let now = Utc::now();
        assert!(
            registry
                .start(1, Workflow::UsageRegistration(UsageStep::WaitingForAmount), now)
                .await
                .is_none()
        );
        let replaced = registry
            .start(
                1,
                Workflow::UsageRegistration(UsageStep::WaitingForPhoto {
                    amount: engine::Kwh::whole(3),
                }),
                now,
            )
            .await;
        assert_eq!(
            replaced.map(|slot| slot.workflow),
            Some(Workflow::UsageRegistration(UsageStep::WaitingForAmount))
        );
        assert_eq!(registry.live_slots(1, now).await, 1);
    }

    #[tokio::test]
    async fn first_live_follows_priority() {
        let registry = registry();
        let now = Utc::now();
        registry
            .start(1, Workflow::LowBalanceSearch(LowBalanceStep::WaitingForThreshold), now)
            .await;
        registry
            .start(
                1,
                Workflow::Registration(RegistrationStep::WaitingForInviteCode),
                now,
            )
            .await;
        let mut slots = registry.lock(1).await;
        assert_eq!(slots.first_live(now), Some(WorkflowKind::Registration));
    }

    #[tokio::test]
    async fn idle_slots_are_reaped_and_touched_ones_survive() {
        let registry = registry();
        let start = Utc::now();
        registry
            .start(1, Workflow::UsageRegistration(UsageStep::WaitingForAmount), start)
            .await;
        registry
            .start(2, Workflow::UsageRegistration(UsageStep::WaitingForAmount), start)
            .await;

        // Actor 2 keeps answering inside the window.
        registry
            .lock(2)
            .await
            .touch(WorkflowKind::UsageRegistration, start + Duration::minutes(25));

        let later = start + Duration::minutes(31);
        assert_eq!(registry.reap_idle(later).await, 1);
        assert_eq!(registry.tracked_actors().await, 1);
        assert!(
            registry
                .workflow(2, WorkflowKind::UsageRegistration, later)
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn expired_slot_is_invisible_before_the_sweep() {
        let registry = registry();
        let start = Utc::now();
        registry
            .start(1, Workflow::UsageRegistration(UsageStep::WaitingForAmount), start)
            .await;
        let later = start + Duration::minutes(45);
        assert!(
            registry
                .workflow(1, WorkflowKind::UsageRegistration, later)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn sweep_skips_actor_mid_dispatch() {
        let registry = registry();
        let start = Utc::now();
        registry
            .start(1, Workflow::UsageRegistration(UsageStep::WaitingForAmount), start)
            .await;

        let guard = registry.lock(1).await;
        assert_eq!(registry.reap_idle(start + Duration::hours(2)).await, 0);
        drop(guard);
        assert_eq!(registry.reap_idle(start + Duration::hours(2)).await, 1);
    }
}

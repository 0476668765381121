use crate::actions::kind::ActionKind;
use crate::actors::actor::ActorId;
use crate::world::schedule::ActionSchedule;
use crate::world::time::GameTick;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// One in-flight delayed action. Slips accumulate until the timer fires;
/// the resolution formulas read them as a permanent penalty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedAction {
    pub id: ContextId,
    pub kind: ActionKind,
    pub initiator: ActorId,
    pub target: ActorId,
    pub slips: u32,
    pub started_at: GameTick,
    pub fire_at: GameTick,
}

/// Live contexts plus their timers. The per-initiator index enforces the
/// core invariant: at most one pending action per initiator, and starting
/// another silently replaces the first.
#[derive(Debug, Default)]
pub struct ActionBook {
    contexts: HashMap<ContextId, DelayedAction>,
    by_initiator: HashMap<ActorId, ContextId>,
    schedule: ActionSchedule,
    next_id: u64,
}

impl ActionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context and arm its timer. Any pending context for the
    /// same initiator is stopped and returned; its timer can no longer
    /// fire and no notification is owed for it.
    pub fn begin(
        &mut self,
        initiator: ActorId,
        target: ActorId,
        kind: ActionKind,
        now: GameTick,
        fire_at: GameTick,
    ) -> (ContextId, Option<DelayedAction>) {
        let replaced = self.remove_for_initiator(initiator);
        self.next_id += 1;
        let id = ContextId(self.next_id);
        let context = DelayedAction {
            id,
            kind,
            initiator,
            target,
            slips: 0,
            started_at: now,
            fire_at,
        };
        self.contexts.insert(id, context);
        self.by_initiator.insert(initiator, id);
        self.schedule.set(id, fire_at);
        (id, replaced)
    }

    /// Record a slip on the initiator's pending action. Returns the new
    /// slip count, or None when nothing is pending.
    pub fn slip(&mut self, initiator: ActorId) -> Option<u32> {
        let id = *self.by_initiator.get(&initiator)?;
        let context = self.contexts.get_mut(&id)?;
        context.slips += 1;
        Some(context.slips)
    }

    pub fn pending_for(&self, initiator: ActorId) -> Option<&DelayedAction> {
        let id = self.by_initiator.get(&initiator)?;
        self.contexts.get(id)
    }

    /// Remove every context the actor participates in, either role, and
    /// disarm the timers. Idempotent: a second call finds nothing.
    pub fn abort_for(&mut self, actor: ActorId) -> Vec<DelayedAction> {
        let ids: Vec<ContextId> = self
            .contexts
            .values()
            .filter(|context| context.initiator == actor || context.target == actor)
            .map(|context| context.id)
            .collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(context) = self.remove(id) {
                removed.push(context);
            }
        }
        removed
    }

    /// Pop the next context whose timer is due, removing it entirely.
    pub fn pop_ready(&mut self, now: GameTick) -> Option<DelayedAction> {
        let id = self.schedule.pop_ready(now)?;
        let context = self.contexts.remove(&id)?;
        self.by_initiator.remove(&context.initiator);
        Some(context)
    }

    pub fn remaining_ticks(&self, initiator: ActorId, now: GameTick) -> Option<u64> {
        let id = *self.by_initiator.get(&initiator)?;
        self.schedule.remaining_ticks(id, now)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    fn remove_for_initiator(&mut self, initiator: ActorId) -> Option<DelayedAction> {
        let id = *self.by_initiator.get(&initiator)?;
        self.remove(id)
    }

    fn remove(&mut self, id: ContextId) -> Option<DelayedAction> {
        let context = self.contexts.remove(&id)?;
        self.by_initiator.remove(&context.initiator);
        self.schedule.stop(id);
        Some(context)
    }
}

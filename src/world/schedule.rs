use crate::actions::context::ContextId;
use crate::world::time::GameTick;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Heap entry for a single-shot action timer
#[derive(Clone, Copy, Debug)]
struct ScheduleEntry {
    context_id: ContextId,
    fire_at: GameTick,
}

/// Min-heap by fire tick (earliest first)
impl Ord for ScheduleEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior in BinaryHeap (which is max-heap)
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.context_id.0.cmp(&self.context_id.0))
    }
}

impl PartialOrd for ScheduleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id && self.fire_at == other.fire_at
    }
}

impl Eq for ScheduleEntry {}

/// Single-shot timers for delayed-action contexts. Cancelled or replaced
/// entries stay in the heap until they surface and are skipped against the
/// index, so `stop` is O(1).
#[derive(Debug, Default)]
pub struct ActionSchedule {
    heap: BinaryHeap<ScheduleEntry>,
    index: HashMap<ContextId, ScheduleEntry>,
}

impl ActionSchedule {
    pub fn new() -> Self {
        ActionSchedule {
            heap: BinaryHeap::new(),
            index: HashMap::new(),
        }
    }

    /// Arm (or re-arm) the timer for a context.
    pub fn set(&mut self, context_id: ContextId, fire_at: GameTick) {
        let entry = ScheduleEntry {
            context_id,
            fire_at,
        };
        self.index.insert(context_id, entry);
        self.heap.push(entry);
    }

    /// Check whether any timer is due (without disarming it).
    pub fn check(&mut self, now: GameTick) -> Option<ContextId> {
        loop {
            let entry = self.heap.peek()?;
            match self.index.get(&entry.context_id) {
                Some(active) if active.fire_at == entry.fire_at => {
                    if entry.fire_at <= now {
                        return Some(entry.context_id);
                    }
                    return None;
                }
                _ => {
                    self.heap.pop();
                    continue;
                }
            }
        }
    }

    /// Pop and return the next due timer.
    pub fn pop_ready(&mut self, now: GameTick) -> Option<ContextId> {
        loop {
            let entry = self.heap.peek()?;
            match self.index.get(&entry.context_id) {
                Some(active) if active.fire_at == entry.fire_at => {
                    if entry.fire_at <= now {
                        let entry = self.heap.pop()?;
                        self.index.remove(&entry.context_id);
                        return Some(entry.context_id);
                    }
                    return None;
                }
                _ => {
                    self.heap.pop();
                    continue;
                }
            }
        }
    }

    /// Disarm the timer for a context. Returns false if it was not armed.
    /// A stopped timer can never surface from `pop_ready`.
    pub fn stop(&mut self, context_id: ContextId) -> bool {
        self.index.remove(&context_id).is_some()
    }

    pub fn remaining_ticks(&self, context_id: ContextId, now: GameTick) -> Option<u64> {
        let entry = self.index.get(&context_id)?;
        Some(entry.fire_at.0.saturating_sub(now.0))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_tick_order() {
        let mut schedule = ActionSchedule::new();
        schedule.set(ContextId(1), GameTick(1010));
        schedule.set(ContextId(2), GameTick(1005));
        assert_eq!(schedule.len(), 2);

        assert_eq!(schedule.check(GameTick(1004)), None);
        assert_eq!(schedule.check(GameTick(1005)), Some(ContextId(2)));
        assert_eq!(schedule.pop_ready(GameTick(1005)), Some(ContextId(2)));
        assert_eq!(schedule.pop_ready(GameTick(1009)), None);
        assert_eq!(schedule.pop_ready(GameTick(1010)), Some(ContextId(1)));
        assert!(schedule.is_empty());
    }

    #[test]
    fn stopped_timer_never_fires() {
        let mut schedule = ActionSchedule::new();
        schedule.set(ContextId(7), GameTick(100));
        assert!(schedule.stop(ContextId(7)));
        assert!(!schedule.stop(ContextId(7)));
        assert_eq!(schedule.pop_ready(GameTick(5000)), None);
        assert!(schedule.is_empty());
    }

    #[test]
    fn rearming_supersedes_the_old_fire_tick() {
        let mut schedule = ActionSchedule::new();
        schedule.set(ContextId(3), GameTick(10));
        schedule.set(ContextId(3), GameTick(50));
        // The stale heap entry surfaces first but is skipped against the index.
        assert_eq!(schedule.pop_ready(GameTick(10)), None);
        assert_eq!(schedule.pop_ready(GameTick(50)), Some(ContextId(3)));
        assert_eq!(schedule.pop_ready(GameTick(50)), None);
    }

    #[test]
    fn remaining_ticks_counts_down() {
        let mut schedule = ActionSchedule::new();
        schedule.set(ContextId(4), GameTick(30));
        assert_eq!(schedule.remaining_ticks(ContextId(4), GameTick(10)), Some(20));
        assert_eq!(schedule.remaining_ticks(ContextId(4), GameTick(30)), Some(0));
        assert_eq!(schedule.remaining_ticks(ContextId(9), GameTick(0)), None);
    }

    #[test]
    fn several_timers_due_on_the_same_tick_all_surface() {
        let mut schedule = ActionSchedule::new();
        schedule.set(ContextId(1), GameTick(5));
        schedule.set(ContextId(2), GameTick(5));
        schedule.set(ContextId(3), GameTick(5));

        let mut ready = Vec::new();
        while let Some(id) = schedule.pop_ready(GameTick(5)) {
            ready.push(id);
        }
        assert_eq!(ready.len(), 3);
        assert!(ready.contains(&ContextId(1)));
        assert!(ready.contains(&ContextId(2)));
        assert!(ready.contains(&ContextId(3)));
    }
}

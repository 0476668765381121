use crate::world::time::GameTick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AfflictionKind {
    Poison,
    Bleed,
    MortalWound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfflictionInstance {
    pub kind: AfflictionKind,
    pub tick_damage: u32,
    pub interval_ticks: u64,
    pub next_tick: GameTick,
    pub expires_at: GameTick,
}

impl AfflictionInstance {
    pub fn new(
        kind: AfflictionKind,
        tick_damage: u32,
        interval_ticks: u64,
        start_tick: GameTick,
        duration_ticks: u64,
    ) -> Self {
        let interval_ticks = interval_ticks.max(1);
        let duration_ticks = duration_ticks.max(1);
        let expires_at = GameTick(start_tick.0.saturating_add(duration_ticks));
        Self {
            kind,
            tick_damage,
            interval_ticks,
            next_tick: start_tick,
            expires_at,
        }
    }

    /// Damage owed for all intervals elapsed up to `now`, or None when the
    /// next interval has not arrived yet. Skipped ticks accumulate.
    pub fn apply_until(&mut self, now: GameTick) -> Option<u32> {
        if now < self.next_tick {
            return None;
        }
        let last_tick = if now >= self.expires_at {
            self.expires_at
        } else {
            now
        };
        if last_tick < self.next_tick {
            return None;
        }
        let available = last_tick.0.saturating_sub(self.next_tick.0);
        let ticks = (available / self.interval_ticks).saturating_add(1);
        let damage = self
            .tick_damage
            .saturating_mul(ticks.min(u64::from(u32::MAX)) as u32);
        self.next_tick = GameTick(
            self.next_tick
                .0
                .saturating_add(self.interval_ticks.saturating_mul(ticks)),
        );
        Some(damage)
    }

    pub fn is_expired(&self, now: GameTick) -> bool {
        now >= self.expires_at
    }

    pub fn merge_from(&mut self, other: AfflictionInstance) {
        if self.kind != other.kind {
            return;
        }
        if other.expires_at > self.expires_at {
            self.expires_at = other.expires_at;
        }
        if other.next_tick < self.next_tick {
            self.next_tick = other.next_tick;
        }
        self.tick_damage = self.tick_damage.max(other.tick_damage);
        self.interval_ticks = self.interval_ticks.min(other.interval_ticks.max(1));
    }
}

/// Active afflictions on one actor. At most one instance per kind;
/// re-application merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfflictionSet {
    active: Vec<AfflictionInstance>,
}

impl AfflictionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn afflict(&mut self, instance: AfflictionInstance) {
        if let Some(existing) = self
            .active
            .iter_mut()
            .find(|entry| entry.kind == instance.kind)
        {
            existing.merge_from(instance);
        } else {
            self.active.push(instance);
        }
    }

    pub fn has(&self, kind: AfflictionKind) -> bool {
        self.active.iter().any(|entry| entry.kind == kind)
    }

    /// Remove an affliction outright (a successful cure). Returns whether
    /// anything was removed.
    pub fn cure(&mut self, kind: AfflictionKind) -> bool {
        let before = self.active.len();
        self.active.retain(|entry| entry.kind != kind);
        self.active.len() != before
    }

    /// Apply all due interval damage and drop expired instances. Returns
    /// the total damage owed this tick.
    pub fn tick(&mut self, now: GameTick) -> u32 {
        let mut total = 0u32;
        for entry in &mut self.active {
            if let Some(damage) = entry.apply_until(now) {
                total = total.saturating_add(damage);
            }
        }
        self.active.retain(|entry| !entry.is_expired(now));
        total
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

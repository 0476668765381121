use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning for the bandage-style tending action and its resurrection
/// variant. Loaded from `actions/definitions.yml` under the asset root;
/// the compiled-in defaults match the reference shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AidTuning {
    pub self_delay_ms: u64,
    pub other_delay_ms: u64,
    pub ms_per_agility: u64,
    pub min_delay_ms: u64,
    pub resurrect_extra_ms: u64,
    pub max_range: u16,
    pub elevation_limit: u8,
    pub base_success_percent: u32,
    pub slip_success_penalty: u32,
    pub heal_min: u32,
    pub heal_max: u32,
    pub anatomy_bonus_divisor: u32,
    pub slip_magnitude_penalty: u32,
    pub resurrect_skill_floor: u16,
    pub cure_skill_floor: u16,
    pub barely_helps: u32,
}

impl Default for AidTuning {
    fn default() -> Self {
        Self {
            self_delay_ms: 8000,
            other_delay_ms: 4000,
            ms_per_agility: 20,
            min_delay_ms: 2500,
            resurrect_extra_ms: 5000,
            max_range: 2,
            elevation_limit: 18,
            base_success_percent: 50,
            slip_success_penalty: 10,
            heal_min: 10,
            heal_max: 25,
            anatomy_bonus_divisor: 5,
            slip_magnitude_penalty: 4,
            resurrect_skill_floor: 80,
            cure_skill_floor: 60,
            barely_helps: 3,
        }
    }
}

impl AidTuning {
    /// Delay before the bandage resolves. Tending someone else is quicker
    /// than working on yourself; agility shaves time off either, down to
    /// the floor; raising the dead always adds the fixed extra.
    pub fn delay_ms(&self, agility: u16, self_aid: bool, resurrect: bool) -> u64 {
        let base = if self_aid {
            self.self_delay_ms
        } else {
            self.other_delay_ms
        };
        let reduction = u64::from(agility).saturating_mul(self.ms_per_agility);
        let mut delay = base.saturating_sub(reduction).max(self.min_delay_ms);
        if resurrect {
            delay = delay.saturating_add(self.resurrect_extra_ms);
        }
        delay
    }

    /// Final success chance in percent. Every slip lowers it; the chance
    /// never reaches certainty.
    pub fn success_percent(&self, treatment_level: u16, slips: u32) -> u32 {
        let chance = self
            .base_success_percent
            .saturating_add(u32::from(treatment_level) / 2)
            .saturating_sub(slips.saturating_mul(self.slip_success_penalty));
        chance.min(95)
    }

    /// Heal magnitude from a rolled base. Anatomy knowledge adds; every
    /// slip takes away; a successful bandage always mends at least one.
    pub fn heal_amount(&self, rolled: u32, anatomy_level: u16, slips: u32) -> u32 {
        let bonus = u32::from(anatomy_level) / self.anatomy_bonus_divisor.max(1);
        rolled
            .saturating_add(bonus)
            .saturating_sub(slips.saturating_mul(self.slip_magnitude_penalty))
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PicklockTuning {
    pub delay_ms: u64,
    pub max_range: u16,
    pub elevation_limit: u8,
    pub base_success_percent: u32,
}

impl Default for PicklockTuning {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            max_range: 1,
            elevation_limit: 18,
            base_success_percent: 20,
        }
    }
}

impl PicklockTuning {
    pub fn success_percent(&self, nimbleness_level: u16) -> u32 {
        self.base_success_percent
            .saturating_add(u32::from(nimbleness_level) / 2)
            .min(95)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionDefinitions {
    pub aid: AidTuning,
    pub picklock: PicklockTuning,
}

impl ActionDefinitions {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
        serde_yaml::from_str(&content)
            .map_err(|err| format!("failed to parse {}: {}", path.display(), err))
    }

    /// Load from `<root>/actions/definitions.yml`; a missing file means
    /// the defaults, a malformed file is an error.
    pub fn load_from_root(root: &Path) -> Result<Self, String> {
        let path = root.join("actions").join("definitions.yml");
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tending_others_is_quicker_than_self() {
        let tuning = AidTuning::default();
        let other = tuning.delay_ms(0, false, false);
        let own = tuning.delay_ms(0, true, false);
        assert!(other < own);
    }

    #[test]
    fn agility_shaves_delay_down_to_the_floor() {
        let tuning = AidTuning::default();
        let slow = tuning.delay_ms(10, true, false);
        let quick = tuning.delay_ms(60, true, false);
        assert!(quick < slow);
        assert_eq!(tuning.delay_ms(1000, true, false), tuning.min_delay_ms);
    }

    #[test]
    fn resurrection_always_adds_the_extra_delay() {
        let tuning = AidTuning::default();
        let plain = tuning.delay_ms(30, false, false);
        let raise = tuning.delay_ms(30, false, true);
        assert_eq!(raise, plain + tuning.resurrect_extra_ms);
    }

    #[test]
    fn each_slip_strictly_lowers_chance_and_magnitude() {
        let tuning = AidTuning::default();
        let mut last_chance = u32::MAX;
        let mut last_amount = u32::MAX;
        for slips in 0..4 {
            let chance = tuning.success_percent(50, slips);
            let amount = tuning.heal_amount(20, 50, slips);
            assert!(chance < last_chance);
            assert!(amount < last_amount);
            last_chance = chance;
            last_amount = amount;
        }
    }

    #[test]
    fn success_chance_never_reaches_certainty() {
        assert!(AidTuning::default().success_percent(u16::MAX, 0) <= 95);
        assert!(PicklockTuning::default().success_percent(u16::MAX) <= 95);
    }

    #[test]
    fn yaml_overrides_merge_with_defaults() {
        let parsed: ActionDefinitions =
            serde_yaml::from_str("aid:\n  max_range: 4\n").expect("parse yaml");
        assert_eq!(parsed.aid.max_range, 4);
        assert_eq!(
            parsed.aid.elevation_limit,
            AidTuning::default().elevation_limit
        );
        assert_eq!(parsed.picklock, PicklockTuning::default());
    }
}

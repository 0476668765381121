use crate::actions::kind::ActionKind;
use crate::actors::actor::ActorState;
use crate::world::terrain::TileMap;

/// Why a precondition failed without suggesting foul play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignFailure {
    OutOfRange,
}

/// Failure patterns that indicate deliberate manipulation rather than a
/// target simply wandering off. These are reported to the audit sink;
/// the initiator sees the ordinary failure text either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploitSignal {
    ElevationJump { delta: u8 },
    NoLandingSpace,
    SightBlocked,
    PathBlocked,
}

impl ExploitSignal {
    /// Whether the pattern implies helpers on the inside (someone had to
    /// open or hold the obstacle); forwarded to the audit sink.
    pub fn implicates_accomplices(self) -> bool {
        matches!(self, ExploitSignal::PathBlocked)
    }

    pub fn describe(self) -> String {
        match self {
            ExploitSignal::ElevationJump { delta } => {
                format!("elevation delta {} over the action limit", delta)
            }
            ExploitSignal::NoLandingSpace => {
                "no open footprint around the target".to_string()
            }
            ExploitSignal::SightBlocked => "line of sight obstructed".to_string(),
            ExploitSignal::PathBlocked => {
                "direct path blocked inside a protected structure".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityResult {
    Continue,
    FailBenign(BenignFailure),
    FailExploit(ExploitSignal),
}

/// What the gate checks for one action kind. `needs_landing` is set when
/// the resolution would have to place the target (resurrection);
/// `check_path_in_protected` restricts the rule-5 path test to kinds that
/// reach through house walls in the wild.
#[derive(Debug, Clone, Copy)]
pub struct GateProfile {
    pub max_range: u16,
    pub elevation_limit: u8,
    pub needs_landing: bool,
    pub check_path_in_protected: bool,
}

impl GateProfile {
    pub fn for_kind(
        kind: ActionKind,
        defs: &crate::actions::definitions::ActionDefinitions,
        target_dead: bool,
    ) -> Self {
        match kind {
            ActionKind::Aid => GateProfile {
                max_range: defs.aid.max_range,
                elevation_limit: defs.aid.elevation_limit,
                needs_landing: target_dead,
                check_path_in_protected: true,
            },
            ActionKind::Picklock => GateProfile {
                max_range: defs.picklock.max_range,
                elevation_limit: defs.picklock.elevation_limit,
                needs_landing: false,
                check_path_in_protected: false,
            },
        }
    }
}

/// Ordered precondition rules; the first failing rule decides. Run both
/// when an action is scheduled and again when its timer fires - the
/// delay window is exactly where manipulation happens.
pub fn check(
    initiator: &ActorState,
    target: &ActorState,
    profile: &GateProfile,
    terrain: &mut TileMap,
) -> ProximityResult {
    let from = initiator.position;
    let to = target.position;

    if !from.within_planar_range(to, profile.max_range) {
        return ProximityResult::FailBenign(BenignFailure::OutOfRange);
    }

    let delta = from.elevation_delta(to);
    if delta > profile.elevation_limit {
        return ProximityResult::FailExploit(ExploitSignal::ElevationJump { delta });
    }

    if profile.needs_landing && terrain.clear_landing_around(to).is_none() {
        return ProximityResult::FailExploit(ExploitSignal::NoLandingSpace);
    }

    if initiator.id != target.id && !terrain.line_of_sight(from, to) {
        return ProximityResult::FailExploit(ExploitSignal::SightBlocked);
    }

    if profile.check_path_in_protected
        && initiator.id != target.id
        && terrain.is_protected(to)
        && terrain.direct_path_blocked(from, to)
    {
        return ProximityResult::FailExploit(ExploitSignal::PathBlocked);
    }

    ProximityResult::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::definitions::ActionDefinitions;
    use crate::actors::actor::{ActorId, ActorKind, ActorState};
    use crate::world::position::Position;

    fn actor(id: u32, x: u16, y: u16, z: u8) -> ActorState {
        ActorState::new(
            ActorId(id),
            format!("actor-{id}"),
            ActorKind::Player,
            Position { x, y, z },
        )
    }

    fn aid_profile(target_dead: bool) -> GateProfile {
        GateProfile::for_kind(ActionKind::Aid, &ActionDefinitions::default(), target_dead)
    }

    #[test]
    fn range_failure_is_benign() {
        let healer = actor(1, 0, 0, 0);
        let patient = actor(2, 30, 0, 0);
        let mut terrain = TileMap::new();
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::FailBenign(BenignFailure::OutOfRange)
        );
    }

    #[test]
    fn elevation_jump_over_the_limit_is_an_exploit() {
        // Planar distance 0, elevation delta 19 with limit 18: the stacked
        // floor shortcut must classify as exploit, not as out of range.
        let healer = actor(1, 10, 10, 0);
        let patient = actor(2, 10, 10, 19);
        let mut terrain = TileMap::new();
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::FailExploit(ExploitSignal::ElevationJump { delta: 19 })
        );
    }

    #[test]
    fn elevation_at_the_limit_passes() {
        let healer = actor(1, 10, 10, 0);
        let patient = actor(2, 10, 10, 18);
        let mut terrain = TileMap::new();
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::Continue
        );
    }

    #[test]
    fn resurrection_needs_an_open_footprint() {
        let healer = actor(1, 10, 10, 0);
        let mut patient = actor(2, 11, 10, 0);
        patient.vitals.apply_raw_damage(1000);
        let mut terrain = TileMap::new();
        for neighbor in patient.position.neighbors() {
            terrain.set_blocked(neighbor);
        }
        assert_eq!(
            check(&healer, &patient, &aid_profile(true), &mut terrain),
            ProximityResult::FailExploit(ExploitSignal::NoLandingSpace)
        );
    }

    #[test]
    fn sight_break_is_an_exploit() {
        let healer = actor(1, 10, 10, 0);
        let patient = actor(2, 12, 10, 0);
        let mut terrain = TileMap::new();
        terrain.set_wall(Position { x: 11, y: 10, z: 0 });
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::FailExploit(ExploitSignal::SightBlocked)
        );
    }

    #[test]
    fn blocked_path_only_matters_inside_protection() {
        let healer = actor(1, 10, 10, 0);
        let patient = actor(2, 12, 10, 0);
        // A transparent but impassable barrier (a window ledge).
        let mut terrain = TileMap::new();
        terrain.set_blocked(Position { x: 11, y: 10, z: 0 });
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::Continue
        );

        terrain.set_protected(patient.position);
        assert_eq!(
            check(&healer, &patient, &aid_profile(false), &mut terrain),
            ProximityResult::FailExploit(ExploitSignal::PathBlocked)
        );
    }

    #[test]
    fn self_aid_skips_sight_and_path_rules() {
        let mut healer = actor(1, 10, 10, 0);
        healer.position = Position { x: 10, y: 10, z: 0 };
        let mut terrain = TileMap::new();
        terrain.set_protected(healer.position);
        let target = healer.clone();
        assert_eq!(
            check(&healer, &target, &aid_profile(false), &mut terrain),
            ProximityResult::Continue
        );
    }
}

use crate::actors::afflictions::AfflictionSet;
use crate::actors::skills::SkillSet;
use crate::actors::vitals::Vitals;
use crate::world::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Player,
    Npc,
}

/// The slice of an entity the coordination core needs: identity, place,
/// liveness, and the handful of attributes the action formulas read. The
/// full entity model lives in the surrounding engine.
#[derive(Debug, Clone)]
pub struct ActorState {
    pub id: ActorId,
    pub name: String,
    pub kind: ActorKind,
    pub position: Position,
    pub connected: bool,
    pub vitals: Vitals,
    pub agility: u16,
    pub skills: SkillSet,
    pub afflictions: AfflictionSet,
}

impl ActorState {
    pub fn new(id: ActorId, name: impl Into<String>, kind: ActorKind, position: Position) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            position,
            connected: true,
            vitals: Vitals::full(100),
            agility: 25,
            skills: SkillSet::novice(),
            afflictions: AfflictionSet::new(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.vitals.is_dead()
    }

    pub fn is_present(&self) -> bool {
        self.connected && !self.is_dead()
    }
}

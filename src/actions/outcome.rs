use crate::actions::context::DelayedAction;
use crate::actions::kind::ActionKind;
use crate::actors::actor::ActorId;

/// Why an action could not be scheduled. Every variant maps to a
/// user-facing message; none of them is an error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginError {
    UnknownInitiator,
    UnknownTarget,
    InitiatorIncapacitated,
    Busy,
    OutOfRange,
    /// Schedule-time exploit classification. The caller shows the same
    /// text as OutOfRange so the detection stays invisible.
    NotPossible,
}

/// The mutually exclusive resolution branches, in priority order. Only
/// the first matching branch executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionBranch {
    Resurrection,
    CurePoison,
    StaunchBleeding,
    MortalWound,
    AlreadyWhole,
    Mend,
    Picklock,
}

/// Fire-time precondition loss; the action performs no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
    InitiatorDied,
    TargetGone,
    TooFarAway,
}

/// Terminal record of one resolved context, kept for the content layer
/// (and the tests) to inspect after the notices go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub context: DelayedAction,
    pub branch: Option<ResolutionBranch>,
    pub failure: Option<ResolutionFailure>,
    pub success: bool,
    pub magnitude: u32,
    pub skill_advanced: bool,
}

/// A line of text owed to one actor. The engine's localization layer
/// would map these; the core only guarantees that no failure is silent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: ActorId,
    pub text: String,
}

/// One exploit-classified event, mirrored to the audit log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor: ActorId,
    pub kind: ActionKind,
    pub reason: String,
    pub implicate_accomplices: bool,
}

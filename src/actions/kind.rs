use serde::{Deserialize, Serialize};

/// The delayed actions the coordinator knows how to time and resolve.
/// Aid covers bandage-style tending (and its resurrection variant when
/// the patient is dead); Picklock is the exclusive self-targeted kind
/// serialized through the action lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Aid,
    Picklock,
}

impl ActionKind {
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Aid => "aid",
            ActionKind::Picklock => "picklock",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(ActionKind::Aid.to_string(), "aid");
        assert_eq!(ActionKind::Picklock.to_string(), "picklock");
    }
}

use crate::actions::outcome::Notice;
use crate::actors::actor::{ActorId, ActorState};
use crate::conversation::bridge::Conversation;
use crate::world::position::Position;
use std::collections::HashMap;

/// A conversation that was torn down this tick, with whatever resumption
/// blob its interpreter left behind.
#[derive(Debug)]
pub struct SweepRecord {
    pub participant: ActorId,
    pub story: String,
    pub snapshot: Option<Vec<u8>>,
}

/// All live conversations hosted by one entity, keyed by participant.
/// Progress happens only through `tick`, in the fixed order sweep,
/// flush, resume: a conversation removed this tick can never receive a
/// spurious resume afterwards.
pub struct ConversationRegistry {
    host: ActorId,
    talk_range: u16,
    by_participant: HashMap<ActorId, Conversation>,
}

impl ConversationRegistry {
    pub fn new(host: ActorId, talk_range: u16) -> Self {
        Self {
            host,
            talk_range,
            by_participant: HashMap::new(),
        }
    }

    pub fn host(&self) -> ActorId {
        self.host
    }

    pub fn contains(&self, participant: ActorId) -> bool {
        self.by_participant.contains_key(&participant)
    }

    /// Register a freshly launched conversation. A lingering one for the
    /// same participant is force-terminated first.
    pub fn start(&mut self, participant: ActorId, conversation: Conversation) {
        if let Some(mut old) = self.by_participant.remove(&participant) {
            let _ = old.terminate();
        }
        self.by_participant.insert(participant, conversation);
    }

    /// Buffer input from a participant. Returns false when no
    /// conversation is open for them.
    pub fn push_input(&self, participant: ActorId, line: &str) -> bool {
        match self.by_participant.get(&participant) {
            Some(conversation) => {
                conversation.push_input(line);
                true
            }
            None => false,
        }
    }

    /// One host think-cycle: sweep stale conversations, flush buffered
    /// output, then raise each resume signal exactly once.
    pub fn tick(
        &mut self,
        host_name: &str,
        host_position: Position,
        actors: &HashMap<ActorId, ActorState>,
        notices: &mut Vec<Notice>,
    ) -> Vec<SweepRecord> {
        let stale: Vec<ActorId> = self
            .by_participant
            .iter()
            .filter(|(participant, conversation)| {
                conversation.is_finished() || !self.participant_reachable(**participant, host_position, actors)
            })
            .map(|(participant, _)| *participant)
            .collect();

        let mut swept = Vec::with_capacity(stale.len());
        for participant in stale {
            if let Some(mut conversation) = self.by_participant.remove(&participant) {
                let snapshot = conversation.terminate();
                swept.push(SweepRecord {
                    participant,
                    story: conversation.story().to_string(),
                    snapshot,
                });
            }
        }

        for (participant, conversation) in &self.by_participant {
            for line in conversation.take_output() {
                if conversation.is_private() {
                    notices.push(Notice {
                        to: *participant,
                        text: format!("{} says: {}", host_name, line),
                    });
                } else {
                    for (id, actor) in actors {
                        if actor.connected
                            && actor.position.within_planar_range(host_position, self.talk_range)
                        {
                            notices.push(Notice {
                                to: *id,
                                text: format!("{} says: {}", host_name, line),
                            });
                        }
                    }
                }
            }
        }

        for conversation in self.by_participant.values() {
            conversation.resume_if_ready();
        }

        swept
    }

    fn participant_reachable(
        &self,
        participant: ActorId,
        host_position: Position,
        actors: &HashMap<ActorId, ActorState>,
    ) -> bool {
        match actors.get(&participant) {
            Some(actor) => {
                actor.connected
                    && !actor.is_dead()
                    && actor.position.within_planar_range(host_position, self.talk_range)
            }
            None => false,
        }
    }

    /// Tear down everything, e.g. when the host itself dies or despawns.
    pub fn terminate_all(&mut self) -> Vec<SweepRecord> {
        let mut swept = Vec::with_capacity(self.by_participant.len());
        for (participant, mut conversation) in self.by_participant.drain() {
            let snapshot = conversation.terminate();
            swept.push(SweepRecord {
                participant,
                story: conversation.story().to_string(),
                snapshot,
            });
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.by_participant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_participant.is_empty()
    }
}

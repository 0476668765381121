use crate::conversation::bridge::{ConversationIo, Interpreter};
use crate::dialogue::script::{DialogueScript, RuleAction};
use std::sync::Arc;

/// Runs a behaviour-rule script as a blocking conversation: greet, then
/// answer each incoming line from the rule table until a farewell, a
/// quit action, or a forced shutdown ends it. Topic state carries
/// follow-up questions across turns and survives in the resumption blob.
pub struct DialogueInterpreter {
    script: Arc<DialogueScript>,
    participant_name: String,
    topic: i64,
    turns: u32,
}

impl DialogueInterpreter {
    pub fn new(script: Arc<DialogueScript>, participant_name: impl Into<String>) -> Self {
        Self {
            script,
            participant_name: participant_name.into(),
            topic: 0,
            turns: 0,
        }
    }

    /// Restore topic/turn state from a previous session's blob. Unknown
    /// or malformed blobs are ignored and the conversation starts fresh.
    pub fn with_resume_blob(mut self, blob: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(blob) else {
            return self;
        };
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "topic" => {
                    if let Ok(topic) = value.trim().parse() {
                        self.topic = topic;
                    }
                }
                "turns" => {
                    if let Ok(turns) = value.trim().parse() {
                        self.turns = turns;
                    }
                }
                _ => {}
            }
        }
        self
    }

    fn personalize(&self, text: &str) -> String {
        text.replace("%N", &self.participant_name)
    }

    fn snapshot(&self) -> Vec<u8> {
        format!("topic={}\nturns={}\n", self.topic, self.turns).into_bytes()
    }
}

impl Interpreter for DialogueInterpreter {
    fn run(&mut self, io: &ConversationIo) {
        io.write_line(self.personalize(&self.script.greeting()));

        while let Some(line) = io.read_line() {
            let message = line.trim().to_ascii_lowercase();
            if message.is_empty() {
                continue;
            }
            self.turns += 1;

            if self
                .script
                .farewell_phrases()
                .iter()
                .any(|phrase| phrase == &message)
            {
                io.write_line(self.personalize(&self.script.farewell_reply()));
                break;
            }

            let Some(rule) = self.script.matching_rule(self.topic, &message) else {
                // Stay quiet about synthetic shutdown input.
                if !io.is_stopping() {
                    if let Some(fallback) = self.script.fallback_reply() {
                        io.write_line(self.personalize(&fallback));
                    }
                }
                continue;
            };

            let mut quit = false;
            for action in rule.actions.clone() {
                match action {
                    RuleAction::Say(text) => io.write_line(self.personalize(&text)),
                    RuleAction::SetTopic(topic) => self.topic = topic,
                    RuleAction::Quit => quit = true,
                }
            }
            if quit {
                break;
            }
        }

        io.save_blob(self.snapshot());
    }
}

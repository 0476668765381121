use crate::dialogue::value::{parse_value, split_top_level, ScriptValue};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCondition {
    /// Word the message must contain; a trailing `$` demands the whole
    /// message match exactly.
    Phrase(String),
    Topic(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    Say(String),
    SetTopic(i64),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueRule {
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub line_no: usize,
}

#[derive(Debug, Default)]
pub struct DialogueScript {
    pub name: Option<String>,
    pub fields: Vec<(String, ScriptValue)>,
    pub rules: Vec<DialogueRule>,
}

#[derive(Debug, Default)]
pub struct DialogueValidationReport {
    pub files: usize,
    pub parsed: usize,
    pub errors: Vec<String>,
}

impl DialogueScript {
    pub fn field(&self, key: &str) -> Option<&ScriptValue> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    pub fn trigger_phrases(&self) -> Vec<String> {
        self.field("Trigger")
            .map(|value| value.as_phrases())
            .filter(|phrases| !phrases.is_empty())
            .unwrap_or_else(|| vec!["hail".to_string(), "hi".to_string()])
    }

    pub fn farewell_phrases(&self) -> Vec<String> {
        self.field("Farewell")
            .map(|value| value.as_phrases())
            .filter(|phrases| !phrases.is_empty())
            .unwrap_or_else(|| vec!["bye".to_string(), "farewell".to_string(), "quit".to_string()])
    }

    pub fn is_private(&self) -> bool {
        self.field("Private")
            .and_then(|value| value.as_number())
            .map(|number| number != 0)
            .unwrap_or(false)
    }

    pub fn greeting(&self) -> String {
        match self.field("Greeting") {
            Some(ScriptValue::String(text)) => text.clone(),
            _ => "Greetings, %N.".to_string(),
        }
    }

    pub fn farewell_reply(&self) -> String {
        match self.field("Goodbye") {
            Some(ScriptValue::String(text)) => text.clone(),
            _ => "Farewell.".to_string(),
        }
    }

    pub fn fallback_reply(&self) -> Option<String> {
        match self.field("Default") {
            Some(ScriptValue::String(text)) => Some(text.clone()),
            _ => None,
        }
    }

    /// First rule whose conditions all hold against the message and the
    /// current topic. Rules without a phrase condition never match free
    /// text.
    pub fn matching_rule(&self, topic: i64, message: &str) -> Option<&DialogueRule> {
        let normalized = message.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        let tokens = tokenize_message(&normalized);
        self.rules
            .iter()
            .find(|rule| rule_matches(rule, topic, &normalized, &tokens))
    }
}

fn rule_matches(rule: &DialogueRule, topic: i64, message: &str, tokens: &[String]) -> bool {
    let mut saw_phrase = false;
    for condition in &rule.conditions {
        match condition {
            RuleCondition::Topic(expected) => {
                if topic != *expected {
                    return false;
                }
            }
            RuleCondition::Phrase(raw) => {
                saw_phrase = true;
                let value = raw.trim().to_ascii_lowercase();
                if value.is_empty() {
                    continue;
                }
                if let Some(stripped) = value.strip_suffix('$') {
                    if message != stripped {
                        return false;
                    }
                    continue;
                }
                if !tokens.iter().any(|token| token == &value) {
                    return false;
                }
            }
        }
    }
    saw_phrase
}

pub fn tokenize_message(message: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in message.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

pub fn load_dialogue_script(path: &Path) -> Result<DialogueScript, String> {
    let bytes = std::fs::read(path)
        .map_err(|err| format!("failed to read dialogue script {}: {}", path.display(), err))?;
    let content = String::from_utf8_lossy(&bytes);
    parse_dialogue_script(&content)
        .map_err(|err| format!("dialogue script {}: {}", path.display(), err))
}

pub fn parse_dialogue_script(content: &str) -> Result<DialogueScript, String> {
    let mut script = DialogueScript::default();
    let mut in_behaviour = false;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_inline_comment(raw_line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if in_behaviour {
            if line == "}" {
                in_behaviour = false;
                continue;
            }
            script.rules.push(parse_rule(line, line_no)?);
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let value = value.trim();
            if key.eq_ignore_ascii_case("Behaviour") || key.eq_ignore_ascii_case("Behavior") {
                if !value.starts_with('{') {
                    return Err(format!("line {} behaviour missing '{{'", line_no));
                }
                in_behaviour = !value.ends_with('}') || value == "{";
                continue;
            }

            if !line.contains("->") {
                let parsed = parse_value(value)
                    .map_err(|err| format!("line {} invalid value: {}", line_no, err))?;
                if key.eq_ignore_ascii_case("Name") {
                    if let ScriptValue::String(name) = &parsed {
                        script.name = Some(name.clone());
                    }
                }
                script.fields.push((key, parsed));
                continue;
            }
        }

        if line.contains("->") {
            return Err(format!("line {} rule outside behaviour block", line_no));
        }
    }

    if in_behaviour {
        return Err("behaviour block not closed".to_string());
    }
    Ok(script)
}

fn parse_rule(line: &str, line_no: usize) -> Result<DialogueRule, String> {
    let (lhs, rhs) = line
        .split_once("->")
        .ok_or_else(|| format!("line {} missing '->' in behaviour", line_no))?;
    let condition_tokens = split_top_level(lhs.trim(), ',')
        .map_err(|err| format!("line {} invalid conditions: {}", line_no, err))?;
    let action_tokens = split_top_level(rhs.trim(), ',')
        .map_err(|err| format!("line {} invalid actions: {}", line_no, err))?;

    let mut conditions = Vec::with_capacity(condition_tokens.len());
    for token in &condition_tokens {
        conditions.push(parse_condition(token, line_no)?);
    }
    let mut actions = Vec::with_capacity(action_tokens.len());
    for token in &action_tokens {
        actions.push(parse_action(token, line_no)?);
    }
    if actions.is_empty() {
        return Err(format!("line {} rule has no actions", line_no));
    }
    Ok(DialogueRule {
        conditions,
        actions,
        line_no,
    })
}

fn parse_condition(raw: &str, line_no: usize) -> Result<RuleCondition, String> {
    let token = raw.trim();
    if let Some(value) = parse_quoted(token) {
        return Ok(RuleCondition::Phrase(value));
    }
    if let Some(number) = parse_topic_assignment(token) {
        return Ok(RuleCondition::Topic(number));
    }
    Err(format!("line {} unknown condition '{}'", line_no, token))
}

fn parse_action(raw: &str, line_no: usize) -> Result<RuleAction, String> {
    let token = raw.trim();
    if let Some(value) = parse_quoted(token) {
        return Ok(RuleAction::Say(value));
    }
    if let Some(number) = parse_topic_assignment(token) {
        return Ok(RuleAction::SetTopic(number));
    }
    if token.eq_ignore_ascii_case("quit") {
        return Ok(RuleAction::Quit);
    }
    Err(format!("line {} unknown action '{}'", line_no, token))
}

fn parse_topic_assignment(token: &str) -> Option<i64> {
    let (key, value) = token.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("Topic") {
        return None;
    }
    value.trim().parse::<i64>().ok()
}

fn parse_quoted(token: &str) -> Option<String> {
    if token.starts_with('"') && token.ends_with('"') && token.len() >= 2 {
        return Some(token[1..token.len() - 1].to_string());
    }
    None
}

fn strip_inline_comment(line: &str) -> String {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return line[..idx].to_string(),
            _ => {}
        }
    }
    line.to_string()
}

pub fn validate_dialogues(dir: &Path) -> DialogueValidationReport {
    let mut report = DialogueValidationReport::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            report
                .errors
                .push(format!("failed to read dialogue dir {}: {}", dir.display(), err));
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                report
                    .errors
                    .push(format!("failed to read dialogue dir entry: {}", err));
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "dlg" {
            continue;
        }
        report.files += 1;
        match load_dialogue_script(&path) {
            Ok(_) => report.parsed += 1,
            Err(err) => report.errors.push(err),
        }
    }

    report
}

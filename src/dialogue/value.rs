#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptValue {
    Number(i64),
    String(String),
    Ident(String),
    List(Vec<ScriptValue>),
}

pub fn parse_value(raw: &str) -> Result<ScriptValue, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("empty value".to_string());
    }
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        return Ok(ScriptValue::String(value[1..value.len() - 1].to_string()));
    }
    if (value.starts_with('{') && value.ends_with('}'))
        || (value.starts_with('[') && value.ends_with(']'))
    {
        let inner = value[1..value.len() - 1].trim();
        if inner.is_empty() {
            return Ok(ScriptValue::List(Vec::new()));
        }
        let parts = split_top_level(inner, ',')?;
        let mut items = Vec::with_capacity(parts.len());
        for part in parts {
            items.push(parse_value(&part)?);
        }
        return Ok(ScriptValue::List(items));
    }
    if let Ok(number) = value.parse::<i64>() {
        return Ok(ScriptValue::Number(number));
    }
    Ok(ScriptValue::Ident(value.to_string()))
}

pub fn split_top_level(input: &str, delimiter: char) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut in_quotes = false;
    let mut prev_escape = false;

    for ch in input.chars() {
        if in_quotes {
            if ch == '"' && !prev_escape {
                in_quotes = false;
            }
            prev_escape = ch == '\\' && !prev_escape;
            current.push(ch);
            continue;
        }

        match ch {
            '"' => {
                in_quotes = true;
                prev_escape = false;
                current.push(ch);
            }
            '{' => {
                brace_depth += 1;
                current.push(ch);
            }
            '}' => {
                if brace_depth == 0 {
                    return Err("unbalanced '}'".to_string());
                }
                brace_depth -= 1;
                current.push(ch);
            }
            '[' => {
                bracket_depth += 1;
                current.push(ch);
            }
            ']' => {
                if bracket_depth == 0 {
                    return Err("unbalanced ']'".to_string());
                }
                bracket_depth -= 1;
                current.push(ch);
            }
            _ if ch == delimiter && brace_depth == 0 && bracket_depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if in_quotes {
        return Err("unterminated string".to_string());
    }
    if brace_depth != 0 || bracket_depth != 0 {
        return Err("unbalanced delimiters".to_string());
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    Ok(parts)
}

impl ScriptValue {
    /// Collect the lowercase strings from a list value; scalars collect
    /// as a single entry.
    pub fn as_phrases(&self) -> Vec<String> {
        match self {
            ScriptValue::String(value) | ScriptValue::Ident(value) => {
                vec![value.trim().to_ascii_lowercase()]
            }
            ScriptValue::List(items) => items
                .iter()
                .flat_map(|item| item.as_phrases())
                .collect(),
            ScriptValue::Number(_) => Vec::new(),
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            ScriptValue::Number(number) => Some(*number),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_accepts_brace_list() {
        let parsed = parse_value(r#"{"hail", "hi"}"#).expect("parse list");
        assert_eq!(
            parsed,
            ScriptValue::List(vec![
                ScriptValue::String("hail".to_string()),
                ScriptValue::String("hi".to_string()),
            ])
        );
    }

    #[test]
    fn split_respects_quotes_and_nesting() {
        let parts = split_top_level(r#""a,b", {1,2}, 3"#, ',').expect("split");
        assert_eq!(parts, vec![r#""a,b""#, "{1,2}", "3"]);
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        assert!(split_top_level("{1,2", ',').is_err());
        assert!(split_top_level(r#""open"#, ',').is_err());
    }

    #[test]
    fn phrases_flatten_and_lowercase() {
        let value = parse_value(r#"{"Hail", "Well Met"}"#).expect("parse");
        assert_eq!(value.as_phrases(), vec!["hail", "well met"]);
    }
}

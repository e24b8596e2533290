//! Best-effort repair of almost-JSON model output.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'((?:[^'\\"]|\\.)*)'"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub value: Value,
    /// True when the raw text only parsed after one or more repair steps.
    pub repaired: bool,
}

/// Parse model output as JSON, applying cumulative repair steps until one
/// parses: strip markdown fences, cut to the outermost object, drop trailing
/// commas, rewrite Python literals, convert single-quoted strings.
///
/// Returns the parser error of the final attempt when nothing works.
pub fn parse_or_repair(raw: &str) -> Result<ParsedResponse, String> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(ParsedResponse { value, repaired: false });
    }

    let steps: [fn(&str) -> String; 5] = [
        strip_code_fence,
        outermost_json,
        drop_trailing_commas,
        python_literals,
        single_to_double_quotes,
    ];

    let mut text = raw.to_string();
    let mut last_error = String::from("empty response");
    for step in steps {
        text = step(&text);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => return Ok(ParsedResponse { value, repaired: true }),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(last_error)
}

fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => text.trim().to_string(),
    }
}

/// Slice from the first `{` to the last `}` (or `[`..`]` when there is no object).
fn outermost_json(text: &str) -> String {
    let bounds = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some((start, end)),
        _ => match (text.find('['), text.rfind(']')) {
            (Some(start), Some(end)) if start < end => Some((start, end)),
            _ => None,
        },
    };

    match bounds {
        Some((start, end)) => text[start..=end].to_string(),
        None => text.to_string(),
    }
}

fn drop_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").to_string()
}

/// Rewrite bare `True`/`False`/`None`. Text inside single- or double-quoted
/// strings is copied untouched.
fn python_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush_word(&mut out, &mut word);
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    flush_word(&mut out, &mut word);

    out
}

fn flush_word(out: &mut String, word: &mut String) {
    out.push_str(match word.as_str() {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        other => other,
    });
    word.clear();
}

fn single_to_double_quotes(text: &str) -> String {
    SINGLE_QUOTED.replace_all(text, "\"$1\"").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_is_not_repaired() {
        let parsed = parse_or_repair(r#"{"entities": []}"#).unwrap();
        assert!(!parsed.repaired);
        assert_eq!(parsed.value, json!({"entities": []}));
    }

    #[test]
    fn test_markdown_fence_and_prose() {
        let raw = "Here is the result:\n```json\n{\"entities\": [{\"name\": \"Facade\"}]}\n```\nHope this helps!";
        let parsed = parse_or_repair(raw).unwrap();

        assert!(parsed.repaired);
        assert_eq!(parsed.value["entities"][0]["name"], "Facade");
    }

    #[test]
    fn test_trailing_commas() {
        let raw = r#"{"entities": [{"name": "Facade",},], "relationships": [],}"#;
        let parsed = parse_or_repair(raw).unwrap();

        assert_eq!(parsed.value["entities"][0]["name"], "Facade");
    }

    #[test]
    fn test_python_style_dict() {
        let raw = "{'entities': [{'name': 'Facade', 'core': True, 'domain': None}], 'relationships': []}";
        let parsed = parse_or_repair(raw).unwrap();

        assert_eq!(parsed.value["entities"][0]["name"], "Facade");
        assert_eq!(parsed.value["entities"][0]["core"], true);
        assert!(parsed.value["entities"][0]["domain"].is_null());
    }

    #[test]
    fn test_python_literals_inside_strings_are_kept() {
        let raw = r#"{"entities": [{"name": "True North", "description": "None of the \"False\" claims hold", "core": True}]}"#;
        let parsed = parse_or_repair(raw).unwrap();

        let entity = &parsed.value["entities"][0];
        assert_eq!(entity["name"], "True North");
        assert_eq!(entity["description"], "None of the \"False\" claims hold");
        assert_eq!(entity["core"], true);
    }

    #[test]
    fn test_python_literals_in_single_quoted_dict() {
        let raw = "{'entities': [{'name': 'None Object', 'core': False}]}";
        let parsed = parse_or_repair(raw).unwrap();

        let entity = &parsed.value["entities"][0];
        assert_eq!(entity["name"], "None Object");
        assert_eq!(entity["core"], false);
    }

    #[test]
    fn test_leading_prose_without_fence() {
        let raw = "Sure! {\"entities\": [], \"relationships\": []} Let me know.";
        assert!(parse_or_repair(raw).is_ok());
    }

    #[test]
    fn test_unrepairable() {
        assert!(parse_or_repair("I could not find any concepts in this text.").is_err());
        assert!(parse_or_repair("{\"entities\": [{\"name\": ").is_err());
        assert!(parse_or_repair("").is_err());
    }
}

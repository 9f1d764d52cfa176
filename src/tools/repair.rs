//! Three-stage repair of malformed JSON argument strings.
//!
//! Models frequently emit argument strings with raw newlines, tabs, or
//! stray backslashes inside JSON string values. Parsing escalates through
//! three passes and fails only after all three, with a composite error
//! naming each stage's failure:
//!
//! 1. strict parse,
//! 2. escape-sequence normalization (raw control characters inside string
//!    values become their escape sequences),
//! 3. control-character stripping plus invalid-escape repair.

use std::fmt;

/// Composite failure after all three repair stages.
#[derive(Debug, Clone)]
pub struct ArgumentRepairError {
    pub strict: String,
    pub normalized: String,
    pub stripped: String,
}

impl fmt::Display for ArgumentRepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argument repair failed; strict: {}; escape-normalized: {}; control-stripped: {}",
            self.strict, self.normalized, self.stripped
        )
    }
}

impl std::error::Error for ArgumentRepairError {}

/// Parse a model-emitted argument string, repairing common corruption.
pub fn safe_parse_arguments(raw: &str) -> Result<serde_json::Value, ArgumentRepairError> {
    let strict = match serde_json::from_str(raw) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    let pass2 = normalize_escapes(raw);
    let normalized = match serde_json::from_str(&pass2) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    let pass3 = strip_controls(&pass2);
    let stripped = match serde_json::from_str(&pass3) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    Err(ArgumentRepairError {
        strict,
        normalized,
        stripped,
    })
}

/// Stage 2: replace raw control characters inside string values with their
/// escape sequences. Text outside string values is left untouched.
fn normalize_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in raw.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                out.push(ch);
                escaped = true;
            }
            '"' => {
                out.push(ch);
                in_string = !in_string;
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

const VALID_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

/// Stage 3: drop remaining control characters inside string values and
/// repair invalid escape sequences by escaping the stray backslash.
fn strip_controls(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_string = false;
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\\' => match chars.peek() {
                Some(next) if VALID_ESCAPES.contains(next) => {
                    out.push('\\');
                    out.push(chars.next().expect("peeked"));
                }
                _ => out.push_str("\\\\"),
            },
            c if (c as u32) < 0x20 => {} // dropped
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn valid_json_passes_stage_one_untouched() {
        let value = safe_parse_arguments(r#"{"path": "a.txt", "n": 3}"#).unwrap();
        assert_eq!(value, json!({"path": "a.txt", "n": 3}));
    }

    #[test]
    fn raw_newline_inside_string_value_is_recovered() {
        let raw = "{\"content\": \"line one\nline two\"}";
        let value = safe_parse_arguments(raw).unwrap();
        assert_eq!(value, json!({"content": "line one\nline two"}));
    }

    #[test]
    fn recovered_value_deep_equals_pre_corruption_source() {
        let original = json!({
            "path": "chapter1.md",
            "content": "It was raining.\n\tHard.",
        });
        // Corrupt the encoding the way models do: escapes become raw chars.
        let corrupted = serde_json::to_string(&original)
            .unwrap()
            .replace("\\n", "\n")
            .replace("\\t", "\t");
        assert!(serde_json::from_str::<serde_json::Value>(&corrupted).is_err());
        assert_eq!(safe_parse_arguments(&corrupted).unwrap(), original);
    }

    #[test]
    fn invalid_escape_is_repaired_in_stage_three() {
        let raw = r#"{"path": "C:\docs\xfile"}"#;
        let value = safe_parse_arguments(raw).unwrap();
        assert_eq!(value["path"], "C:\\docs\\xfile");
    }

    #[test]
    fn stray_control_characters_are_stripped() {
        let raw = "{\"text\": \"ok\u{0008}\u{0000}done\"}";
        let value = safe_parse_arguments(raw).unwrap();
        // \u{0008} survives normalization as nothing maps it; stage 3 drops it.
        assert_eq!(value["text"], "okdone");
    }

    #[test]
    fn hopeless_input_reports_every_stage() {
        let err = safe_parse_arguments("{\"a\": ").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("strict:"));
        assert!(message.contains("escape-normalized:"));
        assert!(message.contains("control-stripped:"));
    }

    #[test]
    fn escapes_outside_strings_left_alone() {
        // A backslash outside a string is a syntax error no stage invents
        // content for.
        assert!(safe_parse_arguments(r"\ {}").is_err());
    }
}

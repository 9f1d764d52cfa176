//! Recovery of pseudo-tool-call tokens leaked inline in plain text.
//!
//! Some backends emit tool calls as text instead of structured fields:
//! either `<tool_call>{json}</tool_call>` blocks or DeepSeek's private
//! `<|tool▁call▁begin|>` marker dialect. The coordinator strips these from
//! display text and recovers the calls they describe.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use crate::tools::repair::safe_parse_arguments;
use crate::types::ToolCall;

/// DeepSeek marker tokens occasionally leaked into text output.
const DEEPSEEK_MARKERS: &[&str] = &[
    "<|tool▁calls▁begin|>",
    "<|tool▁calls▁end|>",
    "<|tool▁call▁begin|>",
    "<|tool▁call▁end|>",
    "<|tool▁sep|>",
];

fn inline_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>").expect("valid regex")
    })
}

/// Strip pseudo-tool-call tokens from display text.
pub fn sanitize_text(text: &str) -> String {
    let mut cleaned = inline_call_re().replace_all(text, "").into_owned();
    for marker in DEEPSEEK_MARKERS {
        if cleaned.contains(marker) {
            cleaned = cleaned.replace(marker, "");
        }
    }
    cleaned.trim().to_string()
}

/// Recover structured tool calls leaked inline, returning the cleaned text
/// and the recovered calls.
///
/// Each block is expected to carry `{"name": ..., "arguments": ...}`;
/// argument strings go through the standard repair pipeline. Blocks that
/// cannot be recovered are stripped and logged.
pub fn extract_inline_tool_calls(text: &str) -> (String, Vec<ToolCall>) {
    let mut calls = Vec::new();
    for captures in inline_call_re().captures_iter(text) {
        let raw = &captures[1];
        match parse_inline_call(raw) {
            Some(call) => calls.push(call),
            None => warn!(len = raw.len(), "unrecoverable inline tool call dropped"),
        }
    }
    (sanitize_text(text), calls)
}

fn parse_inline_call(raw: &str) -> Option<ToolCall> {
    let value = safe_parse_arguments(raw).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let parameters = match value.get("arguments") {
        Some(serde_json::Value::String(s)) => {
            safe_parse_arguments(s).unwrap_or(serde_json::Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => serde_json::json!({}),
    };
    Some(ToolCall {
        call_id: format!("inline_{}", Uuid::new_v4()),
        tool_name: name,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_deepseek_marker_tokens() {
        let text = "Sure.<|tool▁calls▁begin|><|tool▁call▁begin|>x<|tool▁call▁end|><|tool▁calls▁end|>";
        assert_eq!(sanitize_text(text), "Sure.x");
    }

    #[test]
    fn recovers_inline_call_and_cleans_text() {
        let text = concat!(
            "Let me save that.\n",
            r#"<tool_call>{"name": "Write", "arguments": {"path": "draft.md", "content": "hi"}}</tool_call>"#,
        );
        let (cleaned, calls) = extract_inline_tool_calls(text);
        assert_eq!(cleaned, "Let me save that.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "Write");
        assert_eq!(calls[0].parameters["path"], "draft.md");
    }

    #[test]
    fn inline_call_with_string_arguments_is_repaired() {
        let text = r#"<tool_call>{"name": "Read", "arguments": "{\"path\": \"a.txt\"}"}</tool_call>"#;
        let (cleaned, calls) = extract_inline_tool_calls(text);
        assert!(cleaned.is_empty());
        assert_eq!(calls[0].parameters["path"], "a.txt");
    }

    #[test]
    fn unparseable_block_is_stripped_without_a_call() {
        let text = "before <tool_call>{not json at all</tool_call> after";
        let (cleaned, calls) = extract_inline_tool_calls(text);
        // The open brace never closes, so the regex does not match either;
        // text is left alone and no call is invented.
        assert!(calls.is_empty());
        assert_eq!(cleaned, text);
    }

    #[test]
    fn plain_text_passes_through_unchanged() {
        let (cleaned, calls) = extract_inline_tool_calls("Chapter One\n\nIt was raining.");
        assert_eq!(cleaned, "Chapter One\n\nIt was raining.");
        assert!(calls.is_empty());
    }
}

//! Response-text classification and collapsible content blocks.
//!
//! Raw response text is classified against an ordered rule list and split
//! into renderable blocks. Long blocks carry collapse state for the terminal
//! renderer; creative prose is never collapsed regardless of length.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Label assigned to a span of response text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentLabel {
    ToolExecution,
    Code,
    FileContent,
    Error,
    Analysis,
    CreativeContent,
    CreativeWriting,
    Article,
    Novel,
    Text,
}

impl ContentLabel {
    /// Authored prose. Protected from auto-collapse.
    pub fn is_creative(self) -> bool {
        matches!(
            self,
            Self::CreativeContent | Self::CreativeWriting | Self::Article | Self::Novel
        )
    }
}

/// One entry of the ordered classification rule list.
///
/// Rules with `overrides` set are checked before the base rules so creative
/// markers win over structural ones. `sample` is a canonical matching input,
/// kept with the rule so coverage can enumerate every label.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub label: ContentLabel,
    pub pattern: &'static str,
    pub overrides: bool,
    pub sample: &'static str,
}

/// The rule list, in evaluation order within each tier.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        label: ContentLabel::CreativeContent,
        pattern: r"(?i)<creative(?:[_-]content)?>",
        overrides: true,
        sample: "<creative>\nThe rain had not stopped for three days.",
    },
    ClassificationRule {
        label: ContentLabel::Novel,
        pattern: r"(?mi)^#{1,3}\s*chapter\s+(?:\d+|[ivxlcdm]+)\b",
        overrides: true,
        sample: "# Chapter 3\nThe harbor lights went out one by one.",
    },
    ClassificationRule {
        label: ContentLabel::CreativeWriting,
        pattern: r"(?mi)^#{1,3}\s*(?:chapter|scene|prologue|epilogue)\b",
        overrides: true,
        sample: "## Scene: the kitchen\nShe set the kettle down.",
    },
    ClassificationRule {
        label: ContentLabel::Article,
        pattern: r"(?mi)^#{1,2}\s*(?:introduction|abstract|conclusion)\b",
        overrides: true,
        sample: "## Introduction\nThis piece examines three trends.",
    },
    ClassificationRule {
        label: ContentLabel::ToolExecution,
        pattern: r"(?m)^\[tool (?:ok|error):",
        overrides: false,
        sample: "[tool ok: Write] saved draft.md",
    },
    ClassificationRule {
        label: ContentLabel::Code,
        pattern: r"```",
        overrides: false,
        sample: "```rust\nfn main() {}\n```",
    },
    ClassificationRule {
        label: ContentLabel::FileContent,
        pattern: r"(?m)^File:\s+\S+",
        overrides: false,
        sample: "File: src/main.rs\nuse std::io;",
    },
    ClassificationRule {
        label: ContentLabel::Error,
        pattern: r"(?mi)^\[?error\]?[:\s]",
        overrides: false,
        sample: "[error] connection refused",
    },
    ClassificationRule {
        label: ContentLabel::Analysis,
        pattern: r"(?mi)^analysis\b",
        overrides: false,
        sample: "Analysis: the pacing drags in act two.",
    },
];

fn compiled_rules() -> &'static Vec<(ContentLabel, Regex, bool)> {
    static RULES: OnceLock<Vec<(ContentLabel, Regex, bool)>> = OnceLock::new();
    RULES.get_or_init(|| {
        CLASSIFICATION_RULES
            .iter()
            .map(|rule| {
                let re = Regex::new(rule.pattern).expect("rule pattern compiles");
                (rule.label, re, rule.overrides)
            })
            .collect()
    })
}

/// Classify a span of text. Pure; override rules win, then base rules in
/// order, then [`ContentLabel::Text`].
pub fn classify(text: &str) -> ContentLabel {
    let rules = compiled_rules();
    for (label, re, overrides) in rules {
        if *overrides && re.is_match(text) {
            return *label;
        }
    }
    for (label, re, overrides) in rules {
        if !*overrides && re.is_match(text) {
            return *label;
        }
    }
    ContentLabel::Text
}

/// Whether a block of this label and size should start collapsed.
///
/// Creative prose never collapses, whatever its length.
pub fn should_auto_collapse(label: ContentLabel, text: &str) -> bool {
    if label.is_creative() {
        return false;
    }
    let lines = text.lines().count();
    let chars = text.chars().count();
    match label {
        ContentLabel::Code => lines > 30,
        ContentLabel::ToolExecution => lines > 20,
        ContentLabel::FileContent => lines > 25 || chars > 2_000,
        ContentLabel::Error => lines > 40,
        ContentLabel::Analysis => lines > 30,
        ContentLabel::Text => lines > 50 || chars > 4_000,
        _ => false,
    }
}

fn preview_lines(label: ContentLabel) -> usize {
    match label {
        ContentLabel::Code => 15,
        ContentLabel::FileContent => 12,
        ContentLabel::ToolExecution => 8,
        _ => 10,
    }
}

/// Collapse state attached to long blocks for the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollapsibleState {
    pub id: String,
    pub collapsed: bool,
    pub auto_collapse: bool,
    pub max_lines: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMeta {
    pub estimated_lines: usize,
    pub content_type: ContentLabel,
}

/// Renderable block in an [`crate::types::AIResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Thinking {
        text: String,
    },
    LongContent {
        text: String,
        state: CollapsibleState,
        meta: RenderMeta,
    },
}

/// Split response text into blocks, fenced code kept whole, long spans
/// wrapped in collapse state.
pub fn process_content(text: &str) -> Vec<ContentBlock> {
    split_fenced(text)
        .into_iter()
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| {
            let label = classify(&segment);
            if should_auto_collapse(label, &segment) {
                ContentBlock::LongContent {
                    state: CollapsibleState {
                        id: Uuid::new_v4().to_string(),
                        collapsed: true,
                        auto_collapse: true,
                        max_lines: preview_lines(label),
                    },
                    meta: RenderMeta {
                        estimated_lines: segment.lines().count(),
                        content_type: label,
                    },
                    text: segment,
                }
            } else {
                ContentBlock::Text { text: segment }
            }
        })
        .collect()
}

/// Split on triple-backtick fences, each fenced region its own segment
/// with the fences included.
fn split_fenced(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;
    for line in text.lines() {
        let is_fence = line.trim_start().starts_with("```");
        if is_fence && !in_fence {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            in_fence = true;
            current.push_str(line);
            current.push('\n');
        } else if is_fence && in_fence {
            current.push_str(line);
            current.push('\n');
            segments.push(std::mem::take(&mut current));
            in_fence = false;
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rule_sample_classifies_to_its_label() {
        for rule in CLASSIFICATION_RULES {
            assert_eq!(
                classify(rule.sample),
                rule.label,
                "sample for {} misclassified",
                rule.label
            );
        }
    }

    #[test]
    fn unmatched_text_falls_back() {
        assert_eq!(classify("Just a plain sentence."), ContentLabel::Text);
    }

    #[test]
    fn creative_markers_override_structural_ones() {
        // A chapter heading that also contains a code fence stays a novel.
        let text = "# Chapter 1\n```rust\nfn x() {}\n```\nThe door was open.";
        assert_eq!(classify(text), ContentLabel::Novel);
    }

    #[test]
    fn creative_content_never_auto_collapses() {
        for rule in CLASSIFICATION_RULES.iter().filter(|r| r.label.is_creative()) {
            let mut long = String::from(rule.sample);
            for _ in 0..200 {
                long.push_str("\nAnother line of prose that keeps on going.");
            }
            let label = classify(&long);
            assert!(label.is_creative(), "{} lost its label", rule.label);
            assert!(
                !should_auto_collapse(label, &long),
                "{} collapsed",
                rule.label
            );
        }
    }

    #[test]
    fn long_code_collapses_with_preview() {
        let mut code = String::from("```rust\n");
        for i in 0..40 {
            code.push_str(&format!("let x{i} = {i};\n"));
        }
        code.push_str("```\n");
        let label = classify(&code);
        assert_eq!(label, ContentLabel::Code);
        assert!(should_auto_collapse(label, &code));

        let blocks = process_content(&code);
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::LongContent { state, meta, .. } => {
                assert!(state.collapsed);
                assert_eq!(state.max_lines, 15);
                assert_eq!(meta.content_type, ContentLabel::Code);
            }
            other => panic!("expected long content, got {other:?}"),
        }
    }

    #[test]
    fn fenced_code_splits_out_of_prose() {
        let text = "Intro line.\n```py\nprint(1)\n```\nOutro line.\n";
        let blocks = process_content(text);
        assert_eq!(blocks.len(), 3);
        match (&blocks[0], &blocks[1], &blocks[2]) {
            (
                ContentBlock::Text { text: a },
                ContentBlock::Text { text: b },
                ContentBlock::Text { text: c },
            ) => {
                assert!(a.contains("Intro"));
                assert!(b.starts_with("```py"));
                assert!(c.contains("Outro"));
            }
            other => panic!("unexpected blocks {other:?}"),
        }
    }

    #[test]
    fn short_prose_stays_plain_text_block() {
        let blocks = process_content("A short reply.");
        assert!(matches!(&blocks[0], ContentBlock::Text { .. }));
    }
}

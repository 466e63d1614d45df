//! [`SyntectHighlighter`]: the concrete [`Highlighter`] adapter, built on
//! `syntect`'s low-level parser rather than `HighlightLines` — this crate
//! stores scope-name token streams for a downstream renderer to colorize,
//! not pre-rendered spans (there is no terminal UI in this binary).

use std::sync::LazyLock;

use async_trait::async_trait;
use diffengine_core::error::JobError;
use diffengine_core::ports::{Highlighter, HighlightToken};
use syntect::parsing::{ParseState, Scope, ScopeStack, ScopeStackOp, SyntaxSet};

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

pub struct SyntectHighlighter;

impl SyntectHighlighter {
    pub fn new() -> Self {
        // Eagerly force the LazyLock to avoid first-request latency.
        let _ = &*SYNTAX_SET;
        Self
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Highlighter for SyntectHighlighter {
    async fn highlight(
        &self,
        blob: &[u8],
        language: Option<&str>,
        conflicts: bool,
        encodings: &[String],
    ) -> Result<Vec<HighlightToken>, JobError> {
        let text = decode_with_encodings(blob, encodings)
            .ok_or_else(|| JobError::Fatal("blob could not be decoded with any preferred encoding".into()))?;

        let syntax = language
            .and_then(|l| SYNTAX_SET.find_syntax_by_token(l))
            .or_else(|| SYNTAX_SET.find_syntax_by_first_line(&text))
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

        let mut state = ParseState::new(syntax);
        let mut stack = ScopeStack::new();
        let mut tokens = Vec::new();
        let mut byte_offset = 0usize;

        for line in text.split_inclusive('\n') {
            let ops = state
                .parse_line(line, &SYNTAX_SET)
                .map_err(|e| JobError::Fatal(format!("syntax parse failed: {e}")))?;

            let mut last_pos = 0usize;
            for (pos, op) in ops {
                if pos > last_pos {
                    push_token(&mut tokens, &stack, byte_offset + last_pos, byte_offset + pos, conflicts);
                }
                apply_op(&mut stack, &op);
                last_pos = pos;
            }
            if last_pos < line.len() {
                push_token(&mut tokens, &stack, byte_offset + last_pos, byte_offset + line.len(), conflicts);
            }
            byte_offset += line.len();
        }

        Ok(tokens)
    }

    fn detect_language(&self, path: &str) -> Option<String> {
        let ext = path.rsplit('.').next()?;
        SYNTAX_SET.find_syntax_by_extension(ext).map(|s| s.name.clone())
    }
}

fn apply_op(stack: &mut ScopeStack, op: &ScopeStackOp) {
    match op {
        ScopeStackOp::Push(scope) => stack.push(*scope),
        ScopeStackOp::Pop(count) => {
            for _ in 0..*count {
                stack.pop();
            }
        }
        ScopeStackOp::Clear(_) | ScopeStackOp::Restore | ScopeStackOp::Noop => {}
    }
}

fn push_token(tokens: &mut Vec<HighlightToken>, stack: &ScopeStack, start: usize, end: usize, conflicts: bool) {
    if start >= end {
        return;
    }
    let scope = stack
        .as_slice()
        .last()
        .copied()
        .map(scope_name)
        .unwrap_or_else(|| "text".to_string());
    // Conflict-marker regions are tagged distinctly so the UI never applies
    // syntax colors inside a `<<<<<<<`/`=======`/`>>>>>>>` block.
    let scope = if conflicts && scope.starts_with("meta.diff") { "conflict".to_string() } else { scope };
    tokens.push(HighlightToken { start, end, scope });
}

fn scope_name(scope: Scope) -> String {
    format!("{scope}")
}

/// Tries each encoding in order, returning the first successful decode.
/// Falls back to lossy UTF-8 if `encodings` is empty or all fail.
fn decode_with_encodings(blob: &[u8], encodings: &[String]) -> Option<String> {
    for label in encodings {
        if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
            if let Ok(s) = std::str::from_utf8(blob) {
                return Some(s.to_string());
            }
        }
    }
    Some(String::from_utf8_lossy(blob).into_owned())
}

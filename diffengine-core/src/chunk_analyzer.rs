//! Pure per-line, per-word analysis of a single contiguous edit block.
//!
//! Given the deleted and inserted line sequences of one changed-lines block,
//! [`analyze_chunk`] produces the compact edit string the review UI renders
//! intra-line highlights from (see the format grammar in the module-level
//! docs below). The function is a pure function of its inputs: re-running it
//! on the same `(deleted, inserted, moved)` always yields byte-identical
//! output.
//!
//! ```text
//! <record>(;<record>)*
//! <record>  ::= <d>=<i> | <d>=<i>:<item>(,<item>)*
//! <item>    ::= r<a>-<b>=<c>-<d> | d<a>-<b> | i<a>-<b> | ws | eol | ws,<item>*
//! ```
//! Offsets are absolute character offsets within the respective line.
//!
//! The word tokenizer below is a hand-written scanner rather than a regex,
//! so the character classes it recognizes (and therefore the offsets it
//! produces) are easy to audit against the format grammar above.

use std::collections::VecDeque;

use similar::{capture_diff_slices, Algorithm, DiffOp};

/// Brace/keyword-only lines that should never anchor a word-level match.
///
/// Matches a line that, after trimming, is empty or exactly one of
/// `{`, `}`, `*`, `else`, `do`, `*/`.
fn is_ignore_line(line: &str) -> bool {
    matches!(line.trim(), "" | "{" | "}" | "*" | "else" | "do" | "*/")
}

/// A merge-conflict marker line, which must never be matched against
/// anything else.
fn is_conflict_marker(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    line == "======="
        || line.starts_with("<<<<<<< ")
        || line.starts_with(">>>>>>> ")
}

/// Tokenizes a line into "words" for the word-level similarity match.
///
/// Classes, tried in order at each position: a run of digits, an
/// initial-capital word (`[A-Z][a-z]+`), a run of uppercase letters, a run
/// of lowercase letters, a single bracket/paren, a run of whitespace, or any
/// other single character.
fn tokenize_words(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c.is_ascii_uppercase() {
            let start = i;
            if i + 1 < chars.len() && chars[i + 1].is_ascii_lowercase() {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    i += 1;
                }
            } else {
                while i < chars.len() && chars[i].is_ascii_uppercase() {
                    i += 1;
                }
            }
            tokens.push(chars[start..i].iter().collect());
        } else if c.is_ascii_lowercase() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_lowercase() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if matches!(c, '[' | ']' | '{' | '}' | '(' | ')') {
            tokens.push(c.to_string());
            i += 1;
        } else if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else {
            tokens.push(c.to_string());
            i += 1;
        }
    }
    tokens
}

/// Tokenizes a line into whitespace-run / non-whitespace-run words, used by
/// [`analyze_white_space_line`]. A lone space or tab is its own token; any
/// other whitespace run is grouped, matching the source grammar's
/// alternation order.
fn tokenize_ws_words(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ' ' || c == '\t' {
            tokens.push(c.to_string());
            i += 1;
        } else if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        }
    }
    tokens.retain(|t| !t.is_empty());
    tokens
}

/// Collapses interior whitespace runs to a single space and trims the ends.
/// Used to build the whitespace-insensitive line sequences for the
/// line-level fallback diff in [`analyze_chunk`].
fn normalize_whitespace(line: &str) -> String {
    let mut out = String::new();
    let mut chars = line.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            out.push(' ');
            while matches!(chars.peek(), Some(c2) if c2.is_whitespace()) {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Sum of character lengths of `words[0..index]`, i.e. the offset within
/// the original line where `words[index]` begins.
fn offset_in_line(words: &[String], index: usize) -> usize {
    words[..index].iter().map(|w| w.chars().count()).sum()
}

/// Converts word-level diff ops into `r`/`d`/`i` format items.
fn opcode_items(ops: &[DiffOp], deleted_words: &[String], inserted_words: &[String]) -> Vec<String> {
    let mut items = Vec::new();
    for op in ops {
        match *op {
            DiffOp::Replace { old_index, old_len, new_index, new_len } => items.push(format!(
                "r{}-{}={}-{}",
                offset_in_line(deleted_words, old_index),
                offset_in_line(deleted_words, old_index + old_len),
                offset_in_line(inserted_words, new_index),
                offset_in_line(inserted_words, new_index + new_len),
            )),
            DiffOp::Delete { old_index, old_len, .. } => items.push(format!(
                "d{}-{}",
                offset_in_line(deleted_words, old_index),
                offset_in_line(deleted_words, old_index + old_len),
            )),
            DiffOp::Insert { new_index, new_len, .. } => items.push(format!(
                "i{}-{}",
                offset_in_line(inserted_words, new_index),
                offset_in_line(inserted_words, new_index + new_len),
            )),
            DiffOp::Equal { .. } => {}
        }
    }
    items
}

/// Word-level diff between two single lines, rendered as comma-joined
/// `r`/`d`/`i` items (no leading `ws,`/`eol` marker — callers add those).
fn analyze_white_space_line(deleted_line: &str, inserted_line: &str) -> String {
    let deleted_words = tokenize_ws_words(deleted_line);
    let inserted_words = tokenize_ws_words(inserted_line);
    let ops = capture_diff_slices(Algorithm::Myers, &deleted_words, &inserted_words);
    opcode_items(&ops, &deleted_words, &inserted_words).join(",")
}

/// Emits one record per line pair in a whitespace-only (or identical)
/// matching block. `full` additionally emits a bare `d=i` record for lines
/// that are byte-identical (used for `moved` chunks, where even unchanged
/// lines are interesting to the UI because their position shifted).
fn analyze_white_space_changes(
    deleted: &[String],
    inserted: &[String],
    at_eof: bool,
    offset_a: i64,
    offset_b: i64,
    full: bool,
) -> String {
    let mut result = Vec::new();
    let n = deleted.len().min(inserted.len());
    for index in 0..n {
        let d = &deleted[index];
        let ins = &inserted[index];
        if d != ins {
            result.push(format!(
                "{}={}:{}",
                index as i64 + offset_a,
                index as i64 + offset_b,
                analyze_white_space_line(d, ins)
            ));
        } else if index == deleted.len() - 1 && at_eof {
            result.push(format!("{}={}:eol", index as i64 + offset_a, index as i64 + offset_b));
        } else if full {
            result.push(format!("{}={}", index as i64 + offset_a, index as i64 + offset_b));
        }
    }
    if result.is_empty() && (offset_a != 0 || offset_b != 0) {
        result.push(format!("{offset_a}={offset_b}"));
    }
    result.join(";")
}

/// Ratio of matching characters to total characters between a deleted and
/// an inserted line's word tokens.
///
/// Open question (preserved verbatim, see `DESIGN.md`): when the deleted
/// side has more than 5 non-whitespace characters and the two lines share
/// exactly one contiguous matching run, the ratio divides by the deleted
/// side's length alone rather than the symmetric `2*matching/(a+b)` used
/// otherwise. This favors matches where the inserted line strictly extends
/// the deleted one.
fn word_ratio(ops: &[DiffOp], deleted_words: &[String], deleted_len: usize, inserted_len: usize) -> f64 {
    let mut matching = 0usize;
    let mut equal_blocks = 0usize;
    for op in ops {
        if let DiffOp::Equal { old_index, len, .. } = *op {
            if len == 0 {
                continue;
            }
            equal_blocks += 1;
            for word in &deleted_words[old_index..old_index + len] {
                matching += word.trim().chars().count();
            }
        }
    }
    if deleted_len > 5 && equal_blocks == 1 {
        matching as f64 / deleted_len as f64
    } else {
        let denom = (deleted_len + inserted_len) as f64;
        if denom == 0.0 {
            0.0
        } else {
            2.0 * matching as f64 / denom
        }
    }
}

type WordMatch = (f64, usize, usize, Vec<String>, Vec<String>, Vec<DiffOp>);

/// Analyzes one block of deleted/inserted lines too small to need the
/// line-level fallback (or a sub-window of one produced by it).
///
/// Returns `""` when no word-level match was found and the last lines of
/// the two sides are not identical (nothing intra-line-interesting to say).
fn analyze_chunk1(deleted: &[String], inserted: &[String], offset_a: i64, offset_b: i64) -> String {
    if deleted.is_empty() || inserted.is_empty() {
        return String::new();
    }
    if (deleted.len() as u128) * (inserted.len() as u128) > 10_000 {
        return String::new();
    }

    let mut matches: Vec<WordMatch> = Vec::new();
    let mut equals: Vec<(usize, usize)> = Vec::new();

    for (deleted_index, deleted_line) in deleted.iter().enumerate() {
        let deleted_stripped = deleted_line.trim();

        if is_conflict_marker(deleted_line) {
            continue;
        }

        if !is_ignore_line(deleted_line) {
            let deleted_words = tokenize_words(deleted_line);
            let deleted_non_ws_len = deleted_line.chars().filter(|c| !c.is_whitespace()).count();

            for (inserted_index, inserted_line) in inserted.iter().enumerate() {
                let inserted_stripped = inserted_line.trim();

                if !is_ignore_line(inserted_line) {
                    let inserted_words = tokenize_words(inserted_line);
                    let inserted_non_ws_len =
                        inserted_line.chars().filter(|c| !c.is_whitespace()).count();
                    let ops = capture_diff_slices(Algorithm::Myers, &deleted_words, &inserted_words);
                    let r = word_ratio(&ops, &deleted_words, deleted_non_ws_len, inserted_non_ws_len);
                    if r > 0.5 {
                        matches.push((r, deleted_index, inserted_index, deleted_words.clone(), inserted_words, ops));
                    }
                } else if deleted_stripped == inserted_stripped {
                    equals.push((deleted_index, inserted_index));
                }
            }
        } else {
            for (inserted_index, inserted_line) in inserted.iter().enumerate() {
                if deleted_stripped == inserted_line.trim() {
                    equals.push((deleted_index, inserted_index));
                }
            }
        }
    }

    if !matches.is_empty() {
        matches.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut remaining: VecDeque<WordMatch> = matches.into();
        let mut final_matches: Vec<(usize, usize, Vec<String>, Vec<String>, Vec<DiffOp>)> = Vec::new();
        let mut equals_remaining = equals;

        while let Some((_, d_idx, i_idx, dwords, iwords, ops)) = remaining.pop_front() {
            final_matches.push((d_idx, i_idx, dwords, iwords, ops));
            remaining.retain(|(_, d2, i2, _, _, _)| {
                *d2 != d_idx && *i2 != i_idx && (*d2 < d_idx) == (*i2 < i_idx)
            });
            equals_remaining.retain(|(de, ie)| (*de < d_idx) == (*ie < i_idx));
        }

        final_matches.sort_by_key(|m| m.0);
        equals_remaining.sort();

        let mut entries: Vec<(usize, usize, Option<(Vec<String>, Vec<String>, Vec<DiffOp>)>)> = final_matches
            .into_iter()
            .map(|(d, i, dw, iw, ops)| (d, i, Some((dw, iw, ops))))
            .collect();
        entries.push((deleted.len(), inserted.len(), None));

        let mut equals_q: VecDeque<(usize, usize)> = equals_remaining.into();
        let mut result: Vec<String> = Vec::new();
        let mut previous_deleted_index: isize = -1;
        let mut previous_inserted_index: isize = -1;

        for (deleted_index, inserted_index, words) in &entries {
            while let Some(&(de, ie)) = equals_q.front() {
                if !(de < *deleted_index || ie < *inserted_index) {
                    break;
                }
                let (de, ie) = equals_q.pop_front().unwrap();
                if previous_deleted_index < de as isize
                    && (de as isize) < *deleted_index as isize
                    && previous_inserted_index < ie as isize
                    && (ie as isize) < *inserted_index as isize
                {
                    let line_diff = analyze_white_space_line(&deleted[de], &inserted[ie]);
                    if !line_diff.is_empty() {
                        result.push(format!("{}={}:ws,{}", de as i64 + offset_a, ie as i64 + offset_b, line_diff));
                    } else {
                        result.push(format!("{}={}", de as i64 + offset_a, ie as i64 + offset_b));
                    }
                    previous_deleted_index = de as isize;
                    previous_inserted_index = ie as isize;
                }
                while let Some(&(de2, ie2)) = equals_q.front() {
                    if de2 == de || ie2 == ie {
                        equals_q.pop_front();
                    } else {
                        break;
                    }
                }
            }

            let Some((dwords, iwords, ops)) = words else {
                break;
            };

            let deleted_line = &deleted[*deleted_index];
            let inserted_line = &inserted[*inserted_index];
            let mut line_diff_items: Vec<String> = Vec::new();
            if deleted_line != inserted_line && deleted_line.trim() == inserted_line.trim() {
                line_diff_items.push("ws".to_string());
                line_diff_items.push(analyze_white_space_line(deleted_line, inserted_line));
            } else {
                line_diff_items.extend(opcode_items(ops, dwords, iwords));
            }

            let mut line_diff = format!("{}={}", *deleted_index as i64 + offset_a, *inserted_index as i64 + offset_b);
            if !line_diff_items.is_empty() {
                line_diff.push(':');
                line_diff.push_str(&line_diff_items.join(","));
            }
            result.push(line_diff);

            previous_deleted_index = *deleted_index as isize;
            previous_inserted_index = *inserted_index as isize;
        }

        result.join(";")
    } else if deleted[deleted.len() - 1] == inserted[inserted.len() - 1] {
        let ndeleted = deleted.len();
        let ninserted = inserted.len();
        let mut result = Vec::new();
        let mut index = 1usize;
        while index <= ndeleted
            && index <= ninserted
            && deleted[ndeleted - index] == inserted[ninserted - index]
        {
            result.push(format!(
                "{}={}",
                (ndeleted - index) as i64 + offset_a,
                (ninserted - index) as i64 + offset_b
            ));
            index += 1;
        }
        result.reverse();
        result.join(";")
    } else {
        String::new()
    }
}

/// Analyzes one changed-lines block, producing the compact per-line/
/// per-word edit encoding described in the module docs.
///
/// Returns `None` for a pure insertion or pure deletion (nothing to
/// analyze). Returns `Some("")` when analysis ran but found no
/// intra-line detail worth reporting.
///
/// Open question (preserved verbatim, see `DESIGN.md`): the fast-path
/// condition below reads `len(D)*len(I) <= 10_000 and not moved`, which by
/// the shape of the surrounding code looks like it should probably be the
/// negation. The original behavior is kept as observed rather than
/// "corrected."
pub fn analyze_chunk(deleted: &[String], inserted: &[String], moved: bool) -> Option<String> {
    if deleted.is_empty() || inserted.is_empty() {
        return None;
    }

    let small = (deleted.len() as u128) * (inserted.len() as u128) <= 10_000;
    let analysis = if small && !moved {
        analyze_chunk1(deleted, inserted, 0, 0)
    } else {
        let deleted_norm: Vec<String> = deleted.iter().map(|l| normalize_whitespace(l)).collect();
        let inserted_norm: Vec<String> = inserted.iter().map(|l| normalize_whitespace(l)).collect();
        let ops = capture_diff_slices(Algorithm::Myers, &deleted_norm, &inserted_norm);

        let mut edits: Vec<String> = Vec::new();
        let mut pi = 0usize;
        let mut pj = 0usize;

        for op in &ops {
            if let DiffOp::Equal { old_index: i, new_index: j, len: n } = *op {
                if n == 0 {
                    continue;
                }
                if i > pi && j > pj {
                    edits.push(analyze_chunk1(&deleted[pi..i], &inserted[pj..j], pi as i64, pj as i64));
                }
                edits.push(analyze_white_space_changes(
                    &deleted[i..i + n],
                    &inserted[j..j + n],
                    false,
                    i as i64,
                    j as i64,
                    moved,
                ));
                pi = i + n;
                pj = j + n;
            }
        }

        if pi < deleted.len() && pj < inserted.len() {
            edits.push(analyze_chunk1(&deleted[pi..], &inserted[pj..], pi as i64, pj as i64));
        }

        edits.into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(";")
    };

    Some(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pure_insertion_is_irrelevant() {
        let d: Vec<String> = vec![];
        let i = lines(&["x\n", "y\n"]);
        assert_eq!(analyze_chunk(&d, &i, false), None);
    }

    #[test]
    fn pure_deletion_is_irrelevant() {
        let d = lines(&["x\n", "y\n"]);
        let i: Vec<String> = vec![];
        assert_eq!(analyze_chunk(&d, &i, false), None);
    }

    #[test]
    fn whitespace_only_change() {
        let d = lines(&["foo\n"]);
        let i = lines(&[" foo\n"]);
        assert_eq!(analyze_chunk(&d, &i, false), Some("0=0:ws,i0-1".to_string()));
    }

    #[test]
    fn single_line_replace_reports_digit_substitution() {
        let d = lines(&["int x = 1;"]);
        let i = lines(&["int x = 2;"]);
        let result = analyze_chunk(&d, &i, false).unwrap();
        assert!(result.contains("0=0:r8-9=8-9"), "got {result:?}");
    }

    #[test]
    fn bulk_identical_tail_without_word_match_on_first_line() {
        let d = lines(&["qqqqqqqqqq", "b", "c"]);
        let i = lines(&["zzzzzzzzzz", "b", "c"]);
        assert_eq!(analyze_chunk(&d, &i, false), Some("1=1;2=2".to_string()));
    }

    #[test]
    fn deterministic_across_runs() {
        let d = lines(&["foo(bar, 42);", "next line here"]);
        let i = lines(&["foo(baz, 43);", "next line gone"]);
        let a = analyze_chunk(&d, &i, false);
        let b = analyze_chunk(&d, &i, false);
        assert_eq!(a, b);
    }

    #[test]
    fn conflict_markers_never_match() {
        let d = lines(&["<<<<<<< ours", "value", "======="]);
        let i = lines(&["value", ">>>>>>> theirs"]);
        // Conflict-marker lines are skipped as match anchors; "value" on
        // both sides should still be picked up as the trailing identical
        // line fallback or a direct word match, never paired with a marker.
        let result = analyze_chunk(&d, &i, false).unwrap();
        assert!(!result.contains("0=1"), "marker should never anchor a match: {result:?}");
    }

    #[test]
    fn tokenizer_splits_digit_upper_lower_runs() {
        assert_eq!(tokenize_words("ABCd"), vec!["ABC", "d"]);
        assert_eq!(tokenize_words("Abc"), vec!["Abc"]);
        assert_eq!(tokenize_words("x1"), vec!["x", "1"]);
        assert_eq!(tokenize_words("(a)"), vec!["(", "a", ")"]);
    }

    #[test]
    fn large_block_takes_line_level_fallback() {
        // 101 * 101 > 10_000 so the fast path is skipped.
        let d: Vec<String> = (0..101).map(|n| format!("line {n}")).collect();
        let mut i = d.clone();
        i[50] = "line fifty changed".to_string();
        let result = analyze_chunk(&d, &i, false);
        assert!(result.is_some());
    }
}

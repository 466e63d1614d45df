//! Line-level structural diffing: turns two line sequences into the
//! ordered, relative-offset block list stored in `changesetchangedlines`.

use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::types::ChangedLinesBlock;

/// One non-equal diff op, before it is assigned a `block_index` and
/// converted to a relative offset.
struct RawBlock {
    delete_start: usize,
    delete_len: usize,
    insert_start: usize,
    insert_len: usize,
}

/// Diffs `old_lines` against `new_lines`, returning one block per
/// contiguous replace/delete/insert run, offsets stored relative to the
/// previous block's end (or line 0 for the first block) as the schema
/// requires.
pub fn diff_lines(changeset: i64, file: i64, old_lines: &[String], new_lines: &[String]) -> Vec<ChangedLinesBlock> {
    let ops = capture_diff_slices(Algorithm::Myers, old_lines, new_lines);

    let mut raw = Vec::new();
    for op in &ops {
        match *op {
            DiffOp::Replace { old_index, old_len, new_index, new_len } => raw.push(RawBlock {
                delete_start: old_index,
                delete_len: old_len,
                insert_start: new_index,
                insert_len: new_len,
            }),
            DiffOp::Delete { old_index, old_len, new_index } => raw.push(RawBlock {
                delete_start: old_index,
                delete_len: old_len,
                insert_start: new_index,
                insert_len: 0,
            }),
            DiffOp::Insert { old_index, new_index, new_len } => raw.push(RawBlock {
                delete_start: old_index,
                delete_len: 0,
                insert_start: new_index,
                insert_len: new_len,
            }),
            DiffOp::Equal { .. } => {}
        }
    }

    let mut blocks = Vec::with_capacity(raw.len());
    let mut prev_delete_end = 0usize;
    let mut prev_insert_end = 0usize;
    for (index, block) in raw.iter().enumerate() {
        let offset = (block.delete_start - prev_delete_end) as i64;
        debug_assert_eq!(offset, (block.insert_start - prev_insert_end) as i64);
        blocks.push(ChangedLinesBlock {
            changeset,
            file,
            block_index: index as i64,
            offset,
            delete_count: block.delete_len as i64,
            delete_length: block.delete_len as i64,
            insert_count: block.insert_len as i64,
            insert_length: block.insert_len as i64,
            analysis: None,
        });
        prev_delete_end = block.delete_start + block.delete_len;
        prev_insert_end = block.insert_start + block.insert_len;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_changes_produces_no_blocks() {
        let l = lines(&["a", "b", "c"]);
        assert!(diff_lines(1, 1, &l, &l).is_empty());
    }

    #[test]
    fn single_line_replace_produces_one_block_at_offset() {
        let old = lines(&["a", "b", "c"]);
        let new = lines(&["a", "x", "c"]);
        let blocks = diff_lines(1, 1, &old, &new);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset, 1);
        assert_eq!(blocks[0].delete_count, 1);
        assert_eq!(blocks[0].insert_count, 1);
    }

    #[test]
    fn two_separated_edits_have_relative_offsets() {
        let old = lines(&["a", "b", "c", "d", "e"]);
        let new = lines(&["a", "X", "c", "Y", "e"]);
        let blocks = diff_lines(1, 1, &old, &new);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].offset, 1);
        assert_eq!(blocks[1].offset, 1);
    }

    #[test]
    fn pure_insertion_block_has_zero_delete_length() {
        let old = lines(&["a", "c"]);
        let new = lines(&["a", "b", "c"]);
        let blocks = diff_lines(1, 1, &old, &new);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].delete_length, 0);
        assert_eq!(blocks[0].insert_length, 1);
    }
}

//! Integration tests for the persistence layer: open/migrate, the
//! changeset/file/highlight lifecycle, and the merge-filter transaction.

use diffengine_core::db::{open_db, Persistence, Side};
use diffengine_core::types::{ChangedLinesBlock, ChangesetFile, ChangesetFileDifference};

fn temp_db_path() -> String {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.keep().join("test.db");
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn schema_migrates_to_version_one_under_wal() {
    let path = temp_db_path();
    let conn = open_db(&path).await.unwrap();

    let version: i64 = conn
        .call(|db| Ok::<_, rusqlite::Error>(db.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?))
        .await
        .unwrap();
    assert_eq!(version, 1);

    let journal: String = conn
        .call(|db| Ok::<_, rusqlite::Error>(db.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
        .await
        .unwrap();
    assert_eq!(journal, "wal");

    let table_count: i64 = conn
        .call(|db| {
            Ok::<_, rusqlite::Error>(db.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'changesetchangedlines'",
                [],
                |r| r.get(0),
            )?)
        })
        .await
        .unwrap();
    assert_eq!(table_count, 1);
}

#[tokio::test]
async fn ensure_changeset_is_idempotent() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let id1 = db.ensure_changeset(1, None, "abc123".into(), None, false).await.unwrap();
    let id2 = db.ensure_changeset(1, None, "abc123".into(), None, false).await.unwrap();
    assert_eq!(id1, id2);

    let changeset = db.get_changeset(id1).await.unwrap();
    assert!(!changeset.processed);
    assert!(!changeset.complete);
    assert!(!changeset.is_primary_merge());
}

#[tokio::test]
async fn scan_incomplete_finds_unprocessed_changesets() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let id = db.ensure_changeset(1, None, "abc123".into(), None, false).await.unwrap();
    let incomplete = db.scan_incomplete().await.unwrap();
    assert!(incomplete.iter().any(|c| c.changeset == id));

    db.mark_processed(id).await.unwrap();
    db.mark_complete(id).await.unwrap();
    let incomplete = db.scan_incomplete().await.unwrap();
    assert!(!incomplete.iter().any(|c| c.changeset == id));
}

#[tokio::test]
async fn content_difference_lifecycle() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let changeset = db.ensure_changeset(1, None, "abc123".into(), None, false).await.unwrap();
    db.mark_processed(changeset).await.unwrap();
    db.mark_complete(changeset).await.unwrap();

    let file = db.ensure_file("src/main.rs".into()).await.unwrap();
    db.set_changeset_files(
        changeset,
        vec![ChangesetFile {
            changeset,
            file,
            path: "src/main.rs".into(),
            old_sha1: Some("old".into()),
            old_mode: Some(0o100644),
            new_sha1: Some("new".into()),
            new_mode: Some(0o100644),
        }],
    )
    .await
    .unwrap();

    let needing_examine = db.scan_files_needing_examine(changeset).await.unwrap();
    assert_eq!(needing_examine.len(), 1);
    assert_eq!(needing_examine[0].path, "src/main.rs");

    db.insert_file_difference(ChangesetFileDifference {
        changeset,
        file,
        old_highlightfile: None,
        new_highlightfile: None,
        comparison_pending: true,
    })
    .await
    .unwrap();

    assert!(db.scan_files_needing_examine(changeset).await.unwrap().is_empty());
    assert_eq!(db.scan_pending_diffs(changeset).await.unwrap().len(), 1);

    db.set_changed_lines(
        changeset,
        file,
        vec![ChangedLinesBlock {
            changeset,
            file,
            block_index: 0,
            offset: 3,
            delete_count: 1,
            delete_length: 1,
            insert_count: 1,
            insert_length: 1,
            analysis: None,
        }],
    )
    .await
    .unwrap();
    db.mark_diff_computed(changeset, file).await.unwrap();

    assert!(db.scan_pending_diffs(changeset).await.unwrap().is_empty());

    let unanalyzed = db.scan_unanalyzed_blocks(changeset).await.unwrap();
    assert_eq!(unanalyzed.len(), 1);
    assert_eq!(unanalyzed[0].1.delete_offset, 3);

    db.set_block_analysis(changeset, file, 0, "0=0".into()).await.unwrap();
    assert!(db.scan_unanalyzed_blocks(changeset).await.unwrap().is_empty());

    assert!(db.content_difference_state(changeset).await.unwrap().is_none());
    db.mark_content_complete(changeset).await.unwrap();
    assert!(db.content_difference_state(changeset).await.unwrap().unwrap().complete);
}

#[tokio::test]
async fn highlight_file_is_content_addressed() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let id1 = db.ensure_highlight_file("deadbeef".into(), Some("rust".into()), false).await.unwrap();
    let id2 = db.ensure_highlight_file("deadbeef".into(), Some("rust".into()), false).await.unwrap();
    assert_eq!(id1, id2);

    let id3 = db.ensure_highlight_file("deadbeef".into(), Some("python".into()), false).await.unwrap();
    assert_ne!(id1, id3);

    assert!(!db.get_highlight_file(id1).await.unwrap().highlighted);
    db.mark_highlighted(id1).await.unwrap();
    assert!(db.get_highlight_file(id1).await.unwrap().highlighted);
}

#[tokio::test]
async fn error_memoization_is_queryable() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let changeset = db.ensure_changeset(1, None, "abc123".into(), None, false).await.unwrap();
    assert!(!db.has_failed(changeset, "structure:1").await.unwrap());

    db.record_error(changeset, "structure:1".into(), true, Some("bad blob".into())).await.unwrap();
    assert!(db.has_failed(changeset, "structure:1").await.unwrap());
}

#[tokio::test]
async fn merge_filter_prunes_to_file_intersection() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let primary = db.ensure_changeset(1, Some("base".into()), "merge".into(), Some("merge".into()), false).await.unwrap();
    let reference = db.ensure_changeset(1, Some("mergebase".into()), "base".into(), Some("merge".into()), false).await.unwrap();

    let alpha = db.ensure_file("alpha.rs".into()).await.unwrap();
    let beta = db.ensure_file("beta.rs".into()).await.unwrap();
    let gamma = db.ensure_file("gamma.rs".into()).await.unwrap();

    let mk = |changeset: i64, file: i64, path: &str| ChangesetFile {
        changeset,
        file,
        path: path.into(),
        old_sha1: None,
        old_mode: None,
        new_sha1: Some("x".into()),
        new_mode: Some(0o100644),
    };

    db.set_changeset_files(primary, vec![mk(primary, alpha, "alpha.rs"), mk(primary, beta, "beta.rs")])
        .await
        .unwrap();
    db.set_changeset_files(reference, vec![mk(reference, beta, "beta.rs"), mk(reference, gamma, "gamma.rs")])
        .await
        .unwrap();

    db.apply_merge_filter(primary, reference, vec![beta]).await.unwrap();

    let primary_files = db.list_file_ids(primary).await.unwrap();
    let reference_files = db.list_file_ids(reference).await.unwrap();
    assert_eq!(primary_files, vec![beta]);
    assert_eq!(reference_files, vec![beta]);

    assert!(db.get_changeset(primary).await.unwrap().complete);
    assert!(db.get_changeset(reference).await.unwrap().complete);
}

#[tokio::test]
async fn find_merge_reference_locates_reference_by_commit_and_for_merge() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let primary = db.ensure_changeset(1, Some("base".into()), "merge".into(), Some("merge".into()), false).await.unwrap();
    let reference = db.ensure_changeset(1, Some("mergebase".into()), "base".into(), Some("merge".into()), false).await.unwrap();
    let unrelated = db.ensure_changeset(1, None, "other".into(), None, false).await.unwrap();

    let primary_changeset = db.get_changeset(primary).await.unwrap();
    assert_eq!(db.find_merge_reference(&primary_changeset).await.unwrap(), Some(reference));

    let unrelated_changeset = db.get_changeset(unrelated).await.unwrap();
    assert_eq!(db.find_merge_reference(&unrelated_changeset).await.unwrap(), None);

    let reference_changeset = db.get_changeset(reference).await.unwrap();
    assert_eq!(db.find_merge_reference(&reference_changeset).await.unwrap(), None);
}

#[tokio::test]
async fn scan_highlight_files_filters_by_side_and_highlighted_flag() {
    let path = temp_db_path();
    let db = Persistence::open(&path).await.unwrap();

    let changeset = db.ensure_changeset(1, None, "abc".into(), None, false).await.unwrap();
    let file = db.ensure_file("a.rs".into()).await.unwrap();
    let old_hf = db.ensure_highlight_file("old-sha".into(), Some("rust".into()), false).await.unwrap();
    let new_hf = db.ensure_highlight_file("new-sha".into(), Some("rust".into()), false).await.unwrap();

    db.insert_file_difference(ChangesetFileDifference {
        changeset,
        file,
        old_highlightfile: Some(old_hf),
        new_highlightfile: Some(new_hf),
        comparison_pending: false,
    })
    .await
    .unwrap();

    let pending_old = db.scan_highlight_files(changeset, Side::Old).await.unwrap();
    let pending_new = db.scan_highlight_files(changeset, Side::New).await.unwrap();
    assert_eq!(pending_old.len(), 1);
    assert_eq!(pending_new.len(), 1);

    db.mark_highlighted(old_hf).await.unwrap();
    assert!(db.scan_highlight_files(changeset, Side::Old).await.unwrap().is_empty());
    assert_eq!(db.scan_highlight_files(changeset, Side::New).await.unwrap().len(), 1);
}

//! DDL for the difference-engine schema and its forward-only migration.
//!
//! Column names and semantics are load-bearing: the review front-end (out
//! of scope here) reads these tables directly. Table and column names must
//! not be renamed once shipped.

/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the full v1 schema.
///
/// Nine tables (data model plus the `files` lookup table carried over from
/// the original implementation's normalized schema):
/// - `files`: repository-relative path, deduplicated by path.
/// - `changesets`: one row per (from_commit?, to_commit) pair being diffed.
/// - `changesetcontentdifferences`: content-diff completion tracking.
/// - `changesethighlightrequests`: highlight-evaluation completion tracking.
/// - `changesetfiles`: one row per file changed within a changeset.
/// - `changesetfiledifferences`: per-file content-diff bookkeeping.
/// - `changesetchangedlines`: one row per contiguous edit block.
/// - `highlightfiles`: content-addressed highlighted-blob cache.
/// - `changeseterrors`: memo of prior job failures, keyed by job_key.
///
/// All tables use `STRICT` mode for type enforcement. Foreign keys use
/// `ON DELETE CASCADE` so removing a changeset cleans up its child rows;
/// `highlightfiles` rows are independently owned and never cascade-deleted.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS files (
        id   INTEGER PRIMARY KEY,
        path TEXT NOT NULL UNIQUE
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesets (
        id           INTEGER PRIMARY KEY,
        repository   INTEGER NOT NULL,
        from_commit  TEXT,
        to_commit    TEXT    NOT NULL,
        for_merge    TEXT,
        is_replay    INTEGER NOT NULL DEFAULT 0,
        processed    INTEGER NOT NULL DEFAULT 0,
        complete     INTEGER NOT NULL DEFAULT 0
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesetcontentdifferences (
        changeset INTEGER PRIMARY KEY REFERENCES changesets(id) ON DELETE CASCADE,
        complete  INTEGER NOT NULL DEFAULT 0
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesethighlightrequests (
        changeset INTEGER PRIMARY KEY REFERENCES changesets(id) ON DELETE CASCADE,
        requested INTEGER NOT NULL DEFAULT 0,
        evaluated INTEGER NOT NULL DEFAULT 0
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesetfiles (
        changeset INTEGER NOT NULL REFERENCES changesets(id) ON DELETE CASCADE,
        file      INTEGER NOT NULL REFERENCES files(id),
        old_sha1  TEXT,
        old_mode  INTEGER,
        new_sha1  TEXT,
        new_mode  INTEGER,
        PRIMARY KEY (changeset, file)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesetfiledifferences (
        changeset          INTEGER NOT NULL REFERENCES changesets(id) ON DELETE CASCADE,
        file               INTEGER NOT NULL REFERENCES files(id),
        old_highlightfile  INTEGER REFERENCES highlightfiles(id),
        new_highlightfile  INTEGER REFERENCES highlightfiles(id),
        comparison_pending INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (changeset, file)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changesetchangedlines (
        changeset     INTEGER NOT NULL REFERENCES changesets(id) ON DELETE CASCADE,
        file          INTEGER NOT NULL REFERENCES files(id),
        block_index   INTEGER NOT NULL,
        offset        INTEGER NOT NULL,
        delete_count  INTEGER NOT NULL,
        delete_length INTEGER NOT NULL,
        insert_count  INTEGER NOT NULL,
        insert_length INTEGER NOT NULL,
        analysis      TEXT,
        PRIMARY KEY (changeset, file, block_index)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS highlightfiles (
        id          INTEGER PRIMARY KEY,
        sha1        TEXT    NOT NULL,
        language    TEXT,
        conflicts   INTEGER NOT NULL DEFAULT 0,
        highlighted INTEGER NOT NULL DEFAULT 0,
        UNIQUE (sha1, language, conflicts)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS changeseterrors (
        changeset INTEGER NOT NULL REFERENCES changesets(id) ON DELETE CASCADE,
        job_key   TEXT    NOT NULL,
        fatal     INTEGER NOT NULL,
        traceback TEXT,
        PRIMARY KEY (changeset, job_key)
    ) STRICT;
";

/// Runs forward-only schema migration to bring the DB to the latest version.
///
/// Idempotent: safe to call on every startup regardless of whether the
/// schema has already been applied.
///
/// # Errors
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be
/// read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}

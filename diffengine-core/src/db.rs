//! The persistence layer: typed async methods over the WAL-mode SQLite
//! database, built on [`tokio_rusqlite::Connection`].
//!
//! Every method here runs its SQL inside a `conn.call(...)` closure on the
//! connection's dedicated worker thread (`rusqlite::Connection` is not
//! `Send` across awaits, so the closure — not the handle — crosses the
//! thread boundary). No other module issues SQL directly.

use std::time::Duration;

use tokio_rusqlite::Connection;

use crate::types::{
    AbsoluteBlock, Changeset, ChangesetFile, ChangesetFileDifference, ChangedLinesBlock,
    ContentDifferenceState, FileRef, HighlightFile, HighlightRequestState,
};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies the schema migrations.
///
/// # Errors
/// Returns an error if the file cannot be opened, WAL cannot be enabled,
/// or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    // Step 1: WAL pragmas — connection-level settings re-applied on every open.
    conn.call(|db| {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        // busy_timeout is set via the Connection method, not a PRAGMA string,
        // to ensure it applies regardless of pragma caching behavior.
        db.busy_timeout(Duration::from_secs(10))?;
        Ok(())
    })
    .await?;

    // Step 2: Checkpoint any leftover WAL from a previous run (maintenance,
    // not a data write — plain execute_batch is appropriate here).
    conn.call(|db| {
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    })
    .await?;

    // Step 3: Apply schema migrations via schema_version versioning system.
    conn.call(|db| {
        crate::schema::migrate(db)?;
        Ok(())
    })
    .await?;

    Ok(conn)
}

/// A row identifying a changeset still missing one of its completion flags,
/// returned by [`Persistence::scan_incomplete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompleteChangeset {
    pub changeset: i64,
}

/// Which side of a content-diff pair a highlight request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

/// A pending highlight job: one (file, sha1) pair on one side of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHighlight {
    pub highlightfile: i64,
    pub sha1: String,
    pub language: String,
    pub conflicts: bool,
}

/// Thin typed wrapper around a [`Connection`]; the sole issuer of SQL for
/// the difference-engine schema.
#[derive(Clone)]
pub struct Persistence {
    conn: Connection,
}

impl Persistence {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn open(path: &str) -> Result<Self, tokio_rusqlite::Error> {
        Ok(Self::new(open_db(path).await?))
    }

    /// Creates (or returns, if it already exists) the changeset row for
    /// `(repository, from_commit, to_commit, for_merge)`.
    pub async fn ensure_changeset(
        &self,
        repository: i64,
        from_commit: Option<String>,
        to_commit: String,
        for_merge: Option<String>,
        is_replay: bool,
    ) -> Result<i64, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let existing: Option<i64> = db
                    .query_row(
                        "SELECT id FROM changesets
                         WHERE repository = ?1 AND from_commit IS ?2 AND to_commit = ?3 AND for_merge IS ?4",
                        rusqlite::params![repository, from_commit, to_commit, for_merge],
                        |r| r.get(0),
                    )
                    .ok();
                if let Some(id) = existing {
                    return Ok(id);
                }
                db.execute(
                    "INSERT INTO changesets (repository, from_commit, to_commit, for_merge, is_replay)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![repository, from_commit, to_commit, for_merge, is_replay],
                )?;
                Ok(db.last_insert_rowid())
            })
            .await
    }

    pub async fn get_changeset(&self, id: i64) -> Result<Changeset, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT id, repository, from_commit, to_commit, for_merge, is_replay, processed, complete
                     FROM changesets WHERE id = ?1",
                    [id],
                    row_to_changeset,
                )
                .map_err(Into::into)
            })
            .await
    }

    /// Finds the reference changeset that filters `primary`'s file set: the
    /// one whose `to_commit` is `primary`'s `from_commit` and whose
    /// `for_merge` matches `primary`'s, i.e. the diff against the merge
    /// base. Returns `None` if `primary` isn't a primary merge changeset
    /// (see [`Changeset::is_primary_merge`]) or has no `from_commit`.
    pub async fn find_merge_reference(&self, primary: &Changeset) -> Result<Option<i64>, tokio_rusqlite::Error> {
        if !primary.is_primary_merge() {
            return Ok(None);
        }
        let Some(from_commit) = primary.from_commit.clone() else { return Ok(None) };
        let for_merge = primary.for_merge.clone();
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT id FROM changesets WHERE to_commit = ?1 AND for_merge IS ?2",
                    rusqlite::params![from_commit, for_merge],
                    |r| r.get(0),
                )
                .optional()
                .map_err(Into::into)
            })
            .await
    }

    /// Returns every changeset with at least one of: structure not
    /// `processed`, structure not `complete`, requested content diff not
    /// complete, or requested highlighting not evaluated.
    ///
    /// Mirrors `find_incomplete`'s union of three queries: the set of
    /// changesets a fresh process must resume work on is reconstructed
    /// purely from persisted flags, with no separate "pending work" table.
    pub async fn scan_incomplete(&self) -> Result<Vec<IncompleteChangeset>, tokio_rusqlite::Error> {
        self.conn
            .call(|db| {
                let mut stmt = db.prepare(
                    "SELECT id FROM changesets WHERE processed = 0 OR complete = 0
                     UNION
                     SELECT changeset FROM changesetcontentdifferences WHERE complete = 0
                     UNION
                     SELECT changeset FROM changesethighlightrequests WHERE requested = 1 AND evaluated = 0",
                )?;
                let rows = stmt
                    .query_map([], |r| Ok(IncompleteChangeset { changeset: r.get(0)? }))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Files changed in `changeset` that have not yet been examined
    /// (neither side's highlight file row has been created).
    pub async fn scan_files_needing_examine(
        &self,
        changeset: i64,
    ) -> Result<Vec<ChangesetFile>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT cf.changeset, cf.file, f.path, cf.old_sha1, cf.old_mode, cf.new_sha1, cf.new_mode
                     FROM changesetfiles cf
                     JOIN files f ON f.id = cf.file
                     LEFT JOIN changesetfiledifferences cfd
                       ON cfd.changeset = cf.changeset AND cfd.file = cf.file
                     WHERE cf.changeset = ?1 AND cfd.changeset IS NULL",
                )?;
                let rows = stmt
                    .query_map([changeset], row_to_changeset_file)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Per-file content-diff rows still marked `comparison_pending`.
    pub async fn scan_pending_diffs(
        &self,
        changeset: i64,
    ) -> Result<Vec<ChangesetFileDifference>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT changeset, file, old_highlightfile, new_highlightfile, comparison_pending
                     FROM changesetfiledifferences
                     WHERE changeset = ?1 AND comparison_pending = 1",
                )?;
                let rows = stmt
                    .query_map([changeset], row_to_file_difference)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Changed-lines blocks in `changeset` with no `analysis` yet,
    /// reconstructed to absolute offsets by accumulating each file's block
    /// sequence in `block_index` order.
    pub async fn scan_unanalyzed_blocks(
        &self,
        changeset: i64,
    ) -> Result<Vec<(i64, AbsoluteBlock)>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT file, block_index, offset, delete_count, delete_length, insert_count, insert_length, analysis
                     FROM changesetchangedlines
                     WHERE changeset = ?1
                     ORDER BY file, block_index",
                )?;
                let rows = stmt.query_map([changeset], |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        ChangedLinesBlock {
                            changeset,
                            file: r.get(0)?,
                            block_index: r.get(1)?,
                            offset: r.get(2)?,
                            delete_count: r.get(3)?,
                            delete_length: r.get(4)?,
                            insert_count: r.get(5)?,
                            insert_length: r.get(6)?,
                            analysis: r.get(7)?,
                        },
                    ))
                })?;

                let mut result = Vec::new();
                let mut delete_cursor = 0i64;
                let mut insert_cursor = 0i64;
                let mut current_file: Option<i64> = None;
                for row in rows {
                    let (file, block) = row?;
                    if current_file != Some(file) {
                        delete_cursor = 0;
                        insert_cursor = 0;
                        current_file = Some(file);
                    }
                    let delete_offset = delete_cursor + block.offset;
                    let insert_offset = insert_cursor + block.offset;
                    delete_cursor = delete_offset + block.delete_length;
                    insert_cursor = insert_offset + block.insert_length;
                    if block.analysis.is_none() {
                        result.push((
                            file,
                            AbsoluteBlock {
                                block_index: block.block_index,
                                delete_offset,
                                delete_length: block.delete_length,
                                insert_offset,
                                insert_length: block.insert_length,
                            },
                        ));
                    }
                }
                Ok(result)
            })
            .await
    }

    /// Highlight files referenced by `changeset` on `side` that have a
    /// detected language and have not been highlighted yet.
    pub async fn scan_highlight_files(
        &self,
        changeset: i64,
        side: Side,
    ) -> Result<Vec<PendingHighlight>, tokio_rusqlite::Error> {
        let column = match side {
            Side::Old => "old_highlightfile",
            Side::New => "new_highlightfile",
        };
        let sql = format!(
            "SELECT hf.id, hf.sha1, hf.language, hf.conflicts FROM highlightfiles hf
             JOIN changesetfiledifferences cfd ON cfd.{column} = hf.id
             WHERE cfd.changeset = ?1 AND hf.language IS NOT NULL AND hf.highlighted = 0"
        );
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare(&sql)?;
                let rows = stmt
                    .query_map([changeset], |r| {
                        Ok(PendingHighlight {
                            highlightfile: r.get(0)?,
                            sha1: r.get(1)?,
                            language: r.get(2)?,
                            conflicts: r.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Records a job failure. Once recorded, [`scan_incomplete`] and its
    /// siblings must never re-surface the same `job_key` for this
    /// changeset — callers check `has_failed` before re-emitting.
    ///
    /// [`scan_incomplete`]: Persistence::scan_incomplete
    pub async fn record_error(
        &self,
        changeset: i64,
        job_key: String,
        fatal: bool,
        traceback: Option<String>,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "INSERT INTO changeseterrors (changeset, job_key, fatal, traceback)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (changeset, job_key) DO UPDATE SET fatal = excluded.fatal, traceback = excluded.traceback",
                    rusqlite::params![changeset, job_key, fatal, traceback],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn has_failed(&self, changeset: i64, job_key: &str) -> Result<bool, tokio_rusqlite::Error> {
        let job_key = job_key.to_string();
        self.conn
            .call(move |db| {
                let count: i64 = db.query_row(
                    "SELECT COUNT(*) FROM changeseterrors WHERE changeset = ?1 AND job_key = ?2",
                    rusqlite::params![changeset, job_key],
                    |r| r.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    pub async fn mark_processed(&self, changeset: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute("UPDATE changesets SET processed = 1 WHERE id = ?1", [changeset])?;
                Ok(())
            })
            .await
    }

    pub async fn mark_complete(&self, changeset: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute("UPDATE changesets SET complete = 1 WHERE id = ?1", [changeset])?;
                Ok(())
            })
            .await
    }

    pub async fn mark_content_complete(&self, changeset: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "INSERT INTO changesetcontentdifferences (changeset, complete) VALUES (?1, 1)
                     ON CONFLICT (changeset) DO UPDATE SET complete = 1",
                    [changeset],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn request_highlighting(&self, changeset: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "INSERT INTO changesethighlightrequests (changeset, requested, evaluated) VALUES (?1, 1, 0)
                     ON CONFLICT (changeset) DO UPDATE SET requested = 1",
                    [changeset],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn set_highlight_evaluated(&self, changeset: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "UPDATE changesethighlightrequests SET evaluated = 1 WHERE changeset = ?1",
                    [changeset],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn content_difference_state(
        &self,
        changeset: i64,
    ) -> Result<Option<ContentDifferenceState>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT changeset, complete FROM changesetcontentdifferences WHERE changeset = ?1",
                    [changeset],
                    |r| Ok(ContentDifferenceState { changeset: r.get(0)?, complete: r.get(1)? }),
                )
                .optional()
                .map_err(Into::into)
            })
            .await
    }

    pub async fn highlight_request_state(
        &self,
        changeset: i64,
    ) -> Result<Option<HighlightRequestState>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT changeset, requested, evaluated FROM changesethighlightrequests WHERE changeset = ?1",
                    [changeset],
                    |r| {
                        Ok(HighlightRequestState {
                            changeset: r.get(0)?,
                            requested: r.get(1)?,
                            evaluated: r.get(2)?,
                        })
                    },
                )
                .optional()
                .map_err(Into::into)
            })
            .await
    }

    /// Looks up or creates the `files` row for `path`, returning its id.
    pub async fn ensure_file(&self, path: String) -> Result<i64, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "INSERT INTO files (path) VALUES (?1) ON CONFLICT (path) DO NOTHING",
                    [&path],
                )?;
                db.query_row("SELECT id FROM files WHERE path = ?1", [&path], |r| r.get(0))
                    .map_err(Into::into)
            })
            .await
    }

    pub async fn get_file(&self, id: i64) -> Result<FileRef, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row("SELECT id, path FROM files WHERE id = ?1", [id], |r| {
                    Ok(FileRef { id: r.get(0)?, path: r.get(1)? })
                })
                .map_err(Into::into)
            })
            .await
    }

    /// One file's structural diff row within `changeset`, for jobs that need
    /// its blob shas after the initial examine pass.
    pub async fn get_changeset_file(&self, changeset: i64, file: i64) -> Result<ChangesetFile, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT cf.changeset, cf.file, f.path, cf.old_sha1, cf.old_mode, cf.new_sha1, cf.new_mode
                     FROM changesetfiles cf
                     JOIN files f ON f.id = cf.file
                     WHERE cf.changeset = ?1 AND cf.file = ?2",
                    rusqlite::params![changeset, file],
                    row_to_changeset_file,
                )
                .map_err(Into::into)
            })
            .await
    }

    /// Replaces `changeset`'s structural file list in one transaction.
    pub async fn set_changeset_files(
        &self,
        changeset: i64,
        files: Vec<ChangesetFile>,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let tx = db.transaction()?;
                tx.execute("DELETE FROM changesetfiles WHERE changeset = ?1", [changeset])?;
                for f in &files {
                    tx.execute(
                        "INSERT INTO changesetfiles (changeset, file, old_sha1, old_mode, new_sha1, new_mode)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        rusqlite::params![f.changeset, f.file, f.old_sha1, f.old_mode, f.new_sha1, f.new_mode],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    pub async fn insert_file_difference(
        &self,
        diff: ChangesetFileDifference,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "INSERT INTO changesetfiledifferences
                     (changeset, file, old_highlightfile, new_highlightfile, comparison_pending)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (changeset, file) DO UPDATE SET
                       old_highlightfile = excluded.old_highlightfile,
                       new_highlightfile = excluded.new_highlightfile,
                       comparison_pending = excluded.comparison_pending",
                    rusqlite::params![
                        diff.changeset,
                        diff.file,
                        diff.old_highlightfile,
                        diff.new_highlightfile,
                        diff.comparison_pending,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn mark_diff_computed(&self, changeset: i64, file: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "UPDATE changesetfiledifferences SET comparison_pending = 0
                     WHERE changeset = ?1 AND file = ?2",
                    [changeset, file],
                )?;
                Ok(())
            })
            .await
    }

    /// Replaces the changed-lines blocks for one file's content diff.
    pub async fn set_changed_lines(
        &self,
        changeset: i64,
        file: i64,
        blocks: Vec<ChangedLinesBlock>,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let tx = db.transaction()?;
                tx.execute(
                    "DELETE FROM changesetchangedlines WHERE changeset = ?1 AND file = ?2",
                    [changeset, file],
                )?;
                for b in &blocks {
                    tx.execute(
                        "INSERT INTO changesetchangedlines
                         (changeset, file, block_index, offset, delete_count, delete_length, insert_count, insert_length, analysis)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        rusqlite::params![
                            b.changeset, b.file, b.block_index, b.offset,
                            b.delete_count, b.delete_length, b.insert_count, b.insert_length, b.analysis,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    pub async fn set_block_analysis(
        &self,
        changeset: i64,
        file: i64,
        block_index: i64,
        analysis: String,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute(
                    "UPDATE changesetchangedlines SET analysis = ?1
                     WHERE changeset = ?2 AND file = ?3 AND block_index = ?4",
                    rusqlite::params![analysis, changeset, file, block_index],
                )?;
                Ok(())
            })
            .await
    }

    /// Looks up or creates the `highlightfiles` row for
    /// `(sha1, language, conflicts)`, returning its id. Entries are shared
    /// across every changeset that references the same blob/language pair.
    pub async fn ensure_highlight_file(
        &self,
        sha1: String,
        language: Option<String>,
        conflicts: bool,
    ) -> Result<i64, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let existing: Option<i64> = db
                    .query_row(
                        "SELECT id FROM highlightfiles WHERE sha1 = ?1 AND language IS ?2 AND conflicts = ?3",
                        rusqlite::params![sha1, language, conflicts],
                        |r| r.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    return Ok(id);
                }
                db.execute(
                    "INSERT INTO highlightfiles (sha1, language, conflicts) VALUES (?1, ?2, ?3)",
                    rusqlite::params![sha1, language, conflicts],
                )?;
                Ok(db.last_insert_rowid())
            })
            .await
    }

    pub async fn mark_highlighted(&self, highlightfile: i64) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.execute("UPDATE highlightfiles SET highlighted = 1 WHERE id = ?1", [highlightfile])?;
                Ok(())
            })
            .await
    }

    /// File ids touched by `changeset`'s structural diff.
    pub async fn list_file_ids(&self, changeset: i64) -> Result<Vec<i64>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare("SELECT file FROM changesetfiles WHERE changeset = ?1")?;
                let rows = stmt.query_map([changeset], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Prunes both sides of a merge/reference pair down to `keep_file_ids`
    /// and marks both `complete = 1`, in one transaction (phase B).
    pub async fn apply_merge_filter(
        &self,
        primary: i64,
        reference: i64,
        keep_file_ids: Vec<i64>,
    ) -> Result<(), tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let tx = db.transaction()?;
                for changeset in [primary, reference] {
                    let placeholders = std::iter::repeat("?").take(keep_file_ids.len()).collect::<Vec<_>>().join(",");
                    let sql = format!(
                        "DELETE FROM changesetfiles WHERE changeset = ? AND file NOT IN ({placeholders})"
                    );
                    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&changeset];
                    for id in &keep_file_ids {
                        params.push(id);
                    }
                    tx.execute(&sql, params.as_slice())?;
                    tx.execute("UPDATE changesets SET complete = 1 WHERE id = ?1", [changeset])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }

    /// Changed files in `changeset` still missing a language-detection
    /// attempt on at least one side (`old_highlightfile`/`new_highlightfile`
    /// not yet populated).
    pub async fn scan_files_needing_language(
        &self,
        changeset: i64,
    ) -> Result<Vec<ChangesetFile>, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                let mut stmt = db.prepare(
                    "SELECT cf.changeset, cf.file, f.path, cf.old_sha1, cf.old_mode, cf.new_sha1, cf.new_mode
                     FROM changesetfiles cf
                     JOIN files f ON f.id = cf.file
                     JOIN changesetfiledifferences cfd ON cfd.changeset = cf.changeset AND cfd.file = cf.file
                     WHERE cf.changeset = ?1
                       AND (cfd.old_highlightfile IS NULL OR cfd.new_highlightfile IS NULL)",
                )?;
                let rows = stmt
                    .query_map([changeset], row_to_changeset_file)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn get_highlight_file(&self, id: i64) -> Result<HighlightFile, tokio_rusqlite::Error> {
        self.conn
            .call(move |db| {
                db.query_row(
                    "SELECT id, sha1, language, conflicts, highlighted FROM highlightfiles WHERE id = ?1",
                    [id],
                    |r| {
                        Ok(HighlightFile {
                            id: r.get(0)?,
                            sha1: r.get(1)?,
                            language: r.get(2)?,
                            conflicts: r.get(3)?,
                            highlighted: r.get(4)?,
                        })
                    },
                )
                .map_err(Into::into)
            })
            .await
    }
}

use rusqlite::OptionalExtension;

fn row_to_changeset(r: &rusqlite::Row<'_>) -> rusqlite::Result<Changeset> {
    Ok(Changeset {
        id: r.get(0)?,
        repository: r.get(1)?,
        from_commit: r.get(2)?,
        to_commit: r.get(3)?,
        for_merge: r.get(4)?,
        is_replay: r.get(5)?,
        processed: r.get(6)?,
        complete: r.get(7)?,
    })
}

fn row_to_changeset_file(r: &rusqlite::Row<'_>) -> rusqlite::Result<ChangesetFile> {
    Ok(ChangesetFile {
        changeset: r.get(0)?,
        file: r.get(1)?,
        path: r.get(2)?,
        old_sha1: r.get(3)?,
        old_mode: r.get(4)?,
        new_sha1: r.get(5)?,
        new_mode: r.get(6)?,
    })
}

fn row_to_file_difference(r: &rusqlite::Row<'_>) -> rusqlite::Result<ChangesetFileDifference> {
    Ok(ChangesetFileDifference {
        changeset: r.get(0)?,
        file: r.get(1)?,
        old_highlightfile: r.get(2)?,
        new_highlightfile: r.get(3)?,
        comparison_pending: r.get(4)?,
    })
}

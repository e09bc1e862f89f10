pub mod migrations;
pub mod models;
pub mod schema;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use models::*;

use crate::select::recognition::RecognitionKind;
use crate::select::sort::{default_sort_terms, order_by_clause, SortTerm};
use crate::select::sql::{
    column, detection, episode_front_wrapper, random_sample_prefix, random_sample_suffix,
    select_detections, select_missing_detections, SelectKind, DETECTIONS_TABLE, FILE_DATA_TABLE,
    TEMPLATE_TABLE,
};
use crate::select::term::{ControlDefinition, ControlKind};
use crate::select::{Selection, WhereOptions};

pub struct Database {
    pub conn: Connection,
    pub path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        Self::init(&conn)?;

        info!("Opened database: {}", path.display());

        Ok(Database {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Database {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        // Performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;",
        )?;

        schema::create_schema(conn)?;
        migrations::run_migrations(conn)?;
        Ok(())
    }

    /// Default database path: ~/.cts/cts.db
    pub fn default_db_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".cts").join("cts.db"))
    }

    /// Read the field definitions, in template order.
    pub fn template_controls(&self) -> Result<Vec<ControlDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT Type, DataLabel, Label, DefaultValue, List FROM {TEMPLATE_TABLE} \
             ORDER BY ControlOrder"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut controls = Vec::new();
        for row in rows {
            let (kind, data_label, label, default_value, list) = row?;
            let Some(kind) = ControlKind::from_str(&kind) else {
                bail!("Unknown control type {kind:?} for field {data_label}");
            };
            let choices: Vec<String> = serde_json::from_str(&list)
                .with_context(|| format!("Invalid choice list for field {data_label}"))?;
            controls.push(ControlDefinition {
                kind,
                data_label,
                label,
                default_value,
                choices,
            });
        }
        Ok(controls)
    }

    /// Build the default (inactive) selection for this database's template.
    pub fn default_selection(&self) -> Result<Selection> {
        Ok(Selection::from_controls(
            &self.template_controls()?,
            crate::select::term::CombiningOperator::And,
        ))
    }

    /// Add a field to the template and its backing column to the data table.
    pub fn add_control(&self, control: &ControlDefinition) -> Result<()> {
        ensure_valid_data_label(&control.data_label)?;
        let list = serde_json::to_string(&control.choices)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {TEMPLATE_TABLE} (Type, DataLabel, Label, DefaultValue, List) \
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            rusqlite::params![
                control.kind.as_str(),
                control.data_label,
                control.label,
                control.default_value,
                list,
            ],
        )?;
        self.conn.execute(
            &format!(
                "ALTER TABLE {FILE_DATA_TABLE} ADD COLUMN {} TEXT NOT NULL DEFAULT {}",
                control.data_label,
                crate::select::sql::quote(&control.default_value),
            ),
            [],
        )?;
        info!("Added {} control: {}", control.kind.as_str(), control.data_label);
        Ok(())
    }

    /// Insert a file record, returning its Id.
    pub fn insert_file(&self, file: &NewFile) -> Result<i64> {
        let mut columns = vec![column::FILE, column::RELATIVE_PATH, column::DATE_TIME];
        let mut values: Vec<&str> = vec![&file.file, &file.relative_path, &file.date_time];
        for (data_label, value) in &file.fields {
            ensure_valid_data_label(data_label)?;
            columns.push(data_label);
            values.push(value);
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        self.conn.execute(
            &format!(
                "INSERT INTO {FILE_DATA_TABLE} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", "),
            ),
            rusqlite::params_from_iter(values),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert one detection row.
    pub fn insert_detection(&self, d: &NewDetection) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {DETECTIONS_TABLE} \
                 ({}, {}, {}, {}, {}, bbox) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                detection::IMAGE_ID,
                detection::CATEGORY,
                detection::CONF,
                detection::CLASSIFICATION,
                detection::CLASSIFICATION_CONF,
            ),
            rusqlite::params![
                d.file_id,
                d.category,
                d.conf,
                d.classification,
                d.classification_conf,
                d.bbox,
            ],
        )?;
        Ok(())
    }

    /// Whether the database holds any recognition data at all.
    pub fn detections_exist(&self) -> Result<bool> {
        let exists: i64 = self.conn.query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {DETECTIONS_TABLE})"),
            [],
            |r| r.get(0),
        )?;
        Ok(exists != 0)
    }

    /// Import a recognizer output file, matching each image to a file record
    /// by its relative path and inserting its detections. Images with no
    /// matching record are counted, not imported.
    pub fn import_recognitions(&self, recognizer: &RecognizerFile) -> Result<ImportSummary> {
        let tx = self.conn.unchecked_transaction()?;
        let mut summary = ImportSummary::default();

        for image in &recognizer.images {
            let normalized = image.file.replace('\\', "/");
            let (relative_path, file) = match normalized.rsplit_once('/') {
                Some((dir, name)) => (dir.to_string(), name.to_string()),
                None => (String::new(), normalized.clone()),
            };
            let file_id: Option<i64> = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM {FILE_DATA_TABLE} WHERE {} = ?1 AND {} = ?2",
                        column::ID,
                        column::FILE,
                        column::RELATIVE_PATH,
                    ),
                    rusqlite::params![file, relative_path],
                    |r| r.get(0),
                )
                .optional()?;
            let Some(file_id) = file_id else {
                debug!("No file record for recognizer image {}", image.file);
                summary.files_unmatched += 1;
                continue;
            };
            summary.files_matched += 1;

            for det in &image.detections {
                let top_classification = det.classifications.first();
                tx.execute(
                    &format!(
                        "INSERT INTO {DETECTIONS_TABLE} \
                         ({}, {}, {}, {}, {}, bbox) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        detection::IMAGE_ID,
                        detection::CATEGORY,
                        detection::CONF,
                        detection::CLASSIFICATION,
                        detection::CLASSIFICATION_CONF,
                    ),
                    rusqlite::params![
                        file_id,
                        det.category.parse::<i64>().unwrap_or(0),
                        det.conf,
                        top_classification.map(|(category, _)| category.clone()),
                        top_classification.map(|(_, conf)| *conf),
                        serde_json::to_string(&det.bbox).ok(),
                    ],
                )?;
                summary.detections_imported += 1;
            }
        }

        tx.commit()?;
        info!(
            "Imported {} detections for {} files ({} unmatched)",
            summary.detections_imported, summary.files_matched, summary.files_unmatched
        );
        Ok(summary)
    }

    /// Select the files matching `selection`, sorted by `sort_terms` (the
    /// default sort when empty).
    pub fn select_files(
        &self,
        selection: &Selection,
        sort_terms: &[SortTerm],
    ) -> Result<Vec<FileRow>> {
        let query = self.compose_select_query(selection, sort_terms)?;
        debug!("select query: {query}");

        let mut stmt = self.conn.prepare(&query)?;
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let rows = stmt.query_map([], |row| {
            let mut file_row = FileRow::default();
            for (i, name) in names.iter().enumerate() {
                match name.as_str() {
                    column::ID => file_row.id = row.get(i)?,
                    column::FILE => file_row.file = row.get(i)?,
                    column::RELATIVE_PATH => file_row.relative_path = row.get(i)?,
                    column::DATE_TIME => file_row.date_time = row.get(i)?,
                    column::DELETE_FLAG => file_row.delete_flag = row.get(i)?,
                    _ => {
                        let value: Option<String> = row.get(i)?;
                        file_row.fields.push((name.clone(), value.unwrap_or_default()));
                    }
                }
            }
            Ok(file_row)
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Count the files matching `selection` without materializing them.
    pub fn count_files(&self, selection: &Selection) -> Result<i64> {
        let detections_exist = self.detections_exist()?;
        let recognition_active = detections_exist
            && selection.recognition.use_recognition
            && selection.recognition.kind() != RecognitionKind::Empty;

        let mut query = if detections_exist && selection.show_missing_detections {
            select_missing_detections(SelectKind::Count)
        } else if recognition_active {
            select_detections(SelectKind::Count)
        } else {
            format!("SELECT COUNT(*) FROM {FILE_DATA_TABLE}")
        };

        if detections_exist && selection.show_missing_detections {
            let clause = selection.files_where(
                detections_exist,
                &WhereOptions {
                    data_fields_only: true,
                    omit_where_keyword: true,
                    ..Default::default()
                },
            )?;
            if !clause.is_empty() {
                query.push_str(&format!(" AND {clause}"));
            }
        } else {
            let clause = selection.files_where(detections_exist, &WhereOptions::default())?;
            append_clause(&mut query, &clause);
            if recognition_active {
                // Close the COUNT(*) subquery opened by the detection join.
                query.push(')');
            }
        }

        if selection.episode_show_all_if_any_match && !selection.episode_note_field.is_empty() {
            let inner = query
                .strip_prefix("SELECT COUNT(*) FROM")
                .unwrap_or(&query)
                .to_string();
            let front =
                episode_front_wrapper(FILE_DATA_TABLE, &selection.episode_note_field, true);
            query = format!("{front}{inner})");
        }

        debug!("count query: {query}");
        let count: i64 = self.conn.query_row(&query, [], |r| r.get(0))?;
        Ok(count)
    }

    /// Whether at least one file matches `selection`.
    pub fn exists_files(&self, selection: &Selection) -> Result<bool> {
        let detections_exist = self.detections_exist()?;
        let recognition_active = detections_exist
            && selection.recognition.use_recognition
            && selection.recognition.kind() != RecognitionKind::Empty;

        let mut query = String::from("SELECT EXISTS (");
        let missing = detections_exist && selection.show_missing_detections;
        if missing {
            query.push_str(&select_missing_detections(SelectKind::One));
        } else if recognition_active {
            query.push_str(&select_detections(SelectKind::One));
        } else {
            query.push_str(&format!("SELECT 1 FROM {FILE_DATA_TABLE}"));
        }

        if !missing {
            let clause = selection.files_where(detections_exist, &WhereOptions::default())?;
            append_clause(&mut query, &clause);
        }
        query.push(')');

        debug!("exists query: {query}");
        let exists: i64 = self.conn.query_row(&query, [], |r| r.get(0))?;
        Ok(exists != 0)
    }

    /// Compose the full SELECT for `selection`: the projection and joins, the
    /// compiled WHERE clause, the episode and random-sample wrappers, and the
    /// ORDER BY.
    fn compose_select_query(
        &self,
        selection: &Selection,
        sort_terms: &[SortTerm],
    ) -> Result<String> {
        let detections_exist = self.detections_exist()?;
        let recognition_active = detections_exist
            && selection.recognition.use_recognition
            && selection.recognition.kind() != RecognitionKind::Empty;

        let mut query = String::new();
        if selection.random_sample > 0 {
            query.push_str(&random_sample_prefix());
        }

        if detections_exist && selection.show_missing_detections {
            query.push_str(&select_missing_detections(SelectKind::Star));
            // The missing-detections join already carries a WHERE, so the
            // data-field terms attach with AND.
            let clause = selection.files_where(
                detections_exist,
                &WhereOptions {
                    data_fields_only: true,
                    omit_where_keyword: true,
                    ..Default::default()
                },
            )?;
            if !clause.is_empty() {
                query.push_str(&format!(" AND {clause}"));
            }
        } else {
            if recognition_active {
                query.push_str(&select_detections(SelectKind::Star));
            } else {
                query.push_str(&format!("SELECT * FROM {FILE_DATA_TABLE}"));
            }
            let clause = selection.files_where(detections_exist, &WhereOptions::default())?;
            append_clause(&mut query, &clause);
        }

        if selection.episode_show_all_if_any_match && !selection.episode_note_field.is_empty() {
            let front =
                episode_front_wrapper(FILE_DATA_TABLE, &selection.episode_note_field, false);
            query = format!("{front} {query} ))");
        }

        if selection.random_sample > 0 {
            query.push_str(&random_sample_suffix(selection.random_sample));
        }

        // Ranking by confidence overrides the configured sort.
        let rec = &selection.recognition;
        let rank_order = if rec.use_recognition && rec.rank_by_detection_confidence {
            format!(
                "{DETECTIONS_TABLE}.{} DESC, {DETECTIONS_TABLE}.{} DESC",
                detection::CONF,
                detection::CLASSIFICATION_CONF
            )
        } else if rec.use_recognition
            && rec.kind() == RecognitionKind::Classification
            && rec.rank_by_classification_confidence
        {
            format!(
                "{DETECTIONS_TABLE}.{} DESC, {DETECTIONS_TABLE}.{} DESC",
                detection::CLASSIFICATION_CONF,
                detection::CONF
            )
        } else {
            String::new()
        };

        let defaults;
        let sort_terms = if sort_terms.is_empty() {
            defaults = default_sort_terms();
            &defaults
        } else {
            sort_terms
        };
        let order_by = order_by_clause(sort_terms);
        if !rank_order.is_empty() {
            query.push_str(&format!(" ORDER BY {rank_order}"));
            if let Some(rest) = order_by.strip_prefix(" ORDER BY ") {
                query.push_str(&format!(", {rest}"));
            }
        } else {
            query.push_str(&order_by);
        }

        Ok(query)
    }

    /// Database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        let files: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {FILE_DATA_TABLE}"), [], |r| {
                    r.get(0)
                })?;
        let folders: i64 = self.conn.query_row(
            &format!("SELECT COUNT(DISTINCT {}) FROM {FILE_DATA_TABLE}", column::RELATIVE_PATH),
            [],
            |r| r.get(0),
        )?;
        let detections: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {DETECTIONS_TABLE}"), [], |r| {
                    r.get(0)
                })?;
        let classified_detections: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {DETECTIONS_TABLE} WHERE {} IS NOT NULL",
                detection::CLASSIFICATION
            ),
            [],
            |r| r.get(0),
        )?;
        let controls: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {TEMPLATE_TABLE}"), [], |r| {
                    r.get(0)
                })?;

        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);

        Ok(DbStats {
            files,
            folders,
            detections,
            classified_detections,
            controls,
            db_size_bytes,
        })
    }
}

/// Append a compiled WHERE clause to a query, inserting a separating space
/// unless the clause already leads with one (the join-fragment form).
fn append_clause(query: &mut String, clause: &str) {
    if clause.is_empty() {
        return;
    }
    if !clause.starts_with(' ') {
        query.push(' ');
    }
    query.push_str(clause);
}

/// Data labels become SQL identifiers, so only plain identifier characters
/// are allowed.
fn ensure_valid_data_label(data_label: &str) -> Result<()> {
    let mut chars = data_label.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        bail!("Invalid data label: {data_label:?}");
    }
    Ok(())
}

use rusqlite::OptionalExtension;

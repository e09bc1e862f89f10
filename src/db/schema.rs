use anyhow::Result;
use rusqlite::Connection;

use crate::select::term::ControlKind;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Version tracking
        CREATE TABLE IF NOT EXISTS cts_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Field definitions; List is a JSON array of choice values
        CREATE TABLE IF NOT EXISTS TemplateTable (
            ControlOrder INTEGER PRIMARY KEY AUTOINCREMENT,
            Type TEXT NOT NULL,
            DataLabel TEXT NOT NULL UNIQUE,
            Label TEXT NOT NULL,
            DefaultValue TEXT NOT NULL DEFAULT '',
            List TEXT NOT NULL DEFAULT '[]'
        );

        -- One row per image/video; custom fields are added as TEXT columns
        CREATE TABLE IF NOT EXISTS DataTable (
            Id INTEGER PRIMARY KEY AUTOINCREMENT,
            File TEXT NOT NULL DEFAULT '',
            RelativePath TEXT NOT NULL DEFAULT '',
            DateTime TEXT NOT NULL DEFAULT '',
            DeleteFlag TEXT NOT NULL DEFAULT 'false'
        );

        -- Recognizer output, one row per detection
        CREATE TABLE IF NOT EXISTS Detections (
            detectionID INTEGER PRIMARY KEY AUTOINCREMENT,
            Id INTEGER NOT NULL REFERENCES DataTable(Id) ON DELETE CASCADE,
            category INTEGER NOT NULL DEFAULT 0,
            conf REAL NOT NULL DEFAULT 0,
            classification TEXT,
            classification_conf REAL,
            bbox TEXT
        );

        -- Indexes for common filters
        CREATE INDEX IF NOT EXISTS idx_datatable_relativepath ON DataTable(RelativePath);
        CREATE INDEX IF NOT EXISTS idx_datatable_datetime ON DataTable(DateTime);
        CREATE INDEX IF NOT EXISTS idx_datatable_deleteflag ON DataTable(DeleteFlag);
        CREATE INDEX IF NOT EXISTS idx_detections_id ON Detections(Id);
        CREATE INDEX IF NOT EXISTS idx_detections_category ON Detections(category);
        CREATE INDEX IF NOT EXISTS idx_detections_conf ON Detections(conf);
        ",
    )?;

    seed_standard_controls(conn)?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO cts_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// The four standard fields every template carries, inserted once into a
/// fresh TemplateTable.
fn seed_standard_controls(conn: &Connection) -> Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM TemplateTable", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    let standard = [
        (ControlKind::Note, "File", "File", ""),
        (ControlKind::Note, "RelativePath", "Relative Path", ""),
        (ControlKind::DateTime, "DateTime", "Date/Time", ""),
        (ControlKind::Flag, "DeleteFlag", "Delete?", "false"),
    ];
    for (kind, data_label, label, default_value) in standard {
        conn.execute(
            "INSERT INTO TemplateTable (Type, DataLabel, Label, DefaultValue, List)
             VALUES (?1, ?2, ?3, ?4, '[]')",
            rusqlite::params![kind.as_str(), data_label, label, default_value],
        )?;
    }
    Ok(())
}

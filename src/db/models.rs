use serde::{Deserialize, Serialize};

/// One file record, standard columns plus the template-defined fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRow {
    pub id: i64,
    pub file: String,
    pub relative_path: String,
    pub date_time: String,
    pub delete_flag: String,
    /// Custom field values as (data label, value) pairs, in column order.
    pub fields: Vec<(String, String)>,
}

/// Data needed to insert a new file record.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub file: String,
    pub relative_path: String,
    pub date_time: String,
    pub fields: Vec<(String, String)>,
}

/// Data needed to insert one detection row.
#[derive(Debug, Clone)]
pub struct NewDetection {
    pub file_id: i64,
    pub category: i64,
    pub conf: f64,
    pub classification: Option<String>,
    pub classification_conf: Option<f64>,
    pub bbox: Option<String>,
}

/// Recognizer output file (MegaDetector batch format).
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerFile {
    #[serde(default)]
    pub detection_categories: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub classification_categories: std::collections::BTreeMap<String, String>,
    pub images: Vec<RecognizerImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerImage {
    /// Path relative to the image root, forward or backward slashes.
    pub file: String,
    #[serde(default)]
    pub detections: Vec<RecognizerDetection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerDetection {
    pub category: String,
    pub conf: f64,
    #[serde(default)]
    pub bbox: Vec<f64>,
    /// `[category, confidence]` pairs, best first.
    #[serde(default)]
    pub classifications: Vec<(String, f64)>,
}

/// Outcome of importing a recognizer file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub files_matched: i64,
    pub files_unmatched: i64,
    pub detections_imported: i64,
}

/// Stats returned by `cts stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub files: i64,
    pub folders: i64,
    pub detections: i64,
    pub classified_detections: i64,
    pub controls: i64,
    pub db_size_bytes: u64,
}

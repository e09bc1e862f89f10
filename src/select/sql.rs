//! SQL fragments shared by the selection compiler and the database layer.
//!
//! All predicate text is assembled here so the rest of the crate never
//! concatenates raw SQL keywords.

/// Table holding one row per image/video file.
pub const FILE_DATA_TABLE: &str = "DataTable";
/// Table holding recognizer output, one row per detection.
pub const DETECTIONS_TABLE: &str = "Detections";
/// Table holding the field (control) definitions.
pub const TEMPLATE_TABLE: &str = "TemplateTable";

/// Column names in `DataTable`.
pub mod column {
    pub const ID: &str = "Id";
    pub const FILE: &str = "File";
    pub const RELATIVE_PATH: &str = "RelativePath";
    pub const DATE_TIME: &str = "DateTime";
    pub const DELETE_FLAG: &str = "DeleteFlag";
}

/// Column names in `Detections`.
pub mod detection {
    pub const DETECTION_ID: &str = "detectionID";
    pub const IMAGE_ID: &str = "Id";
    pub const CATEGORY: &str = "category";
    pub const CONF: &str = "conf";
    pub const CLASSIFICATION: &str = "classification";
    pub const CLASSIFICATION_CONF: &str = "classification_conf";
}

/// SQL affinity a term compiles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

/// Which projection a partial SELECT should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectKind {
    /// `SELECT DataTable.*`
    Star,
    /// `SELECT COUNT(*)` (detection form opens a subquery the caller must close)
    Count,
    /// `SELECT 1` (for EXISTS probes)
    One,
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_numeric(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}

/// Empty string and NULL are equivalent for query purposes.
/// Form: `(label IS NULL OR label = '')`
pub fn label_is_null_or_empty(label: &str) -> String {
    format!("({label} IS NULL OR {label} = '')")
}

/// Standard comparison: `label op 'value'`, with numeric columns cast so that
/// text-affinity storage still compares numerically.
/// Non-numeric literals against numeric columns are coerced to 0.
pub fn label_operator_value(label: &str, op: &str, value: &str, ty: SqlType) -> String {
    let value = value.trim();
    match ty {
        SqlType::Integer => {
            let value = if is_numeric(value) { value } else { "0" };
            format!("CAST({label} AS INTEGER) {op} {value}")
        }
        SqlType::Real => {
            let value = if is_numeric(value) { value } else { "0" };
            format!("CAST({label} AS REAL) {op} {value}")
        }
        SqlType::Text => format!("{label} {op} {}", quote(value)),
    }
}

/// Compare only the date portion of a stored timestamp.
/// Form: `DATE(label) op DATE('value')`
pub fn label_date_operator_value(label: &str, op: &str, value: &str) -> String {
    format!("DATE({label}) {op} DATE({})", quote(value.trim()))
}

/// Compare only the time-of-day portion of a stored timestamp.
/// Form: `TIME(label) op TIME('value')`
pub fn label_time_operator_value(label: &str, op: &str, value: &str) -> String {
    format!("TIME({label}) {op} TIME({})", quote(value.trim()))
}

/// Multi-choice "contains at least these items" phrase.
///
/// The stored value is a comma-separated list. A plain GLOB on one item would
/// also match items it is a substring of (selecting "Sheep" must not return
/// "Bighorn Sheep"), so each selected item is matched in every position it can
/// occupy in the list: alone, at the start, at the end, or in the middle.
pub fn multichoice_operator_value(label: &str, op: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return format!("{label} {op} '*'");
    }
    value
        .split(',')
        .map(|item| {
            format!(
                "({label} {op} {} OR {label} {op} {} OR {label} {op} {} OR {label} {op} {})",
                quote(item),
                quote(&format!("{item},*")),
                quote(&format!("*,{item}")),
                quote(&format!("*,{item},*")),
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Form: `Detections.category = N`
pub fn detection_category_equals(category: &str) -> String {
    format!("{DETECTIONS_TABLE}.{} = {category}", detection::CATEGORY)
}

/// Confidence-range constraint on individual detections. The leading `AND`
/// lets this attach either to an existing WHERE clause or, when no clause
/// exists, to the detection join's ON condition.
/// Form: ` AND Detections.conf BETWEEN lo AND hi`
pub fn detection_conf_between(lower: f64, upper: f64) -> String {
    format!(
        " AND {DETECTIONS_TABLE}.{} BETWEEN {lower} AND {upper}",
        detection::CONF
    )
}

/// Per-file maximum-confidence constraint, used when interpreting files as
/// empty: a file is only empty if its *best* detection is under threshold.
/// Form: ` GROUP BY Detections.Id HAVING MAX(Detections.conf) BETWEEN lo AND hi`
pub fn group_by_max_detection_conf(lower: f64, upper: f64) -> String {
    format!(
        " GROUP BY {DETECTIONS_TABLE}.{} HAVING MAX({DETECTIONS_TABLE}.{}) BETWEEN {lower} AND {upper}",
        detection::IMAGE_ID,
        detection::CONF
    )
}

/// Compound classification constraint: detection confidence range, the
/// classification category, and the classification confidence range.
pub fn classification_category_and_conf(
    detection_lower: f64,
    detection_upper: f64,
    category: &str,
    classification_lower: f64,
    classification_upper: f64,
) -> String {
    format!(
        " AND {DETECTIONS_TABLE}.{} BETWEEN {detection_lower} AND {detection_upper} \
         AND {DETECTIONS_TABLE}.{} = {} \
         AND {DETECTIONS_TABLE}.{} BETWEEN {classification_lower} AND {classification_upper}",
        detection::CONF,
        detection::CLASSIFICATION,
        quote(category),
        detection::CLASSIFICATION_CONF,
    )
}

/// Partial query joining files to their detections.
///
/// The Count form opens a `SELECT COUNT(*) FROM (` subquery that the caller
/// must close after appending the predicate.
pub fn select_detections(kind: SelectKind) -> String {
    let projection = match kind {
        SelectKind::Count => format!("SELECT COUNT(*) FROM (SELECT DISTINCT {FILE_DATA_TABLE}.*"),
        SelectKind::Star => format!("SELECT {FILE_DATA_TABLE}.*"),
        SelectKind::One => "SELECT 1".to_string(),
    };
    format!(
        "{projection} FROM {DETECTIONS_TABLE} INNER JOIN {FILE_DATA_TABLE} \
         ON {FILE_DATA_TABLE}.{} = {DETECTIONS_TABLE}.{}",
        column::ID,
        detection::IMAGE_ID
    )
}

/// Partial query returning files with no detection rows at all.
pub fn select_missing_detections(kind: SelectKind) -> String {
    let projection = match kind {
        SelectKind::Count => format!("SELECT COUNT({FILE_DATA_TABLE}.{})", column::ID),
        SelectKind::Star => format!("SELECT {FILE_DATA_TABLE}.*"),
        SelectKind::One => "SELECT 1".to_string(),
    };
    format!(
        "{projection} FROM {FILE_DATA_TABLE} LEFT JOIN {DETECTIONS_TABLE} \
         ON {FILE_DATA_TABLE}.{} = {DETECTIONS_TABLE}.{} \
         WHERE {DETECTIONS_TABLE}.{} IS NULL",
        column::ID,
        detection::IMAGE_ID,
        detection::IMAGE_ID
    )
}

/// Prefix wrapping a selection so a random sample of its Ids is drawn.
/// Form: `SELECT * FROM DataTable WHERE Id IN (SELECT Id FROM (`
pub fn random_sample_prefix() -> String {
    format!(
        "SELECT * FROM {FILE_DATA_TABLE} WHERE {} IN (SELECT {} FROM (",
        column::ID,
        column::ID
    )
}

/// Closes [`random_sample_prefix`].
pub fn random_sample_suffix(sample_size: u32) -> String {
    format!(") ORDER BY RANDOM() LIMIT {sample_size})")
}

/// Front wrapper selecting (or counting) every file whose episode contains at
/// least one file matching the wrapped query. Episode membership is encoded in
/// a note field as `episode:index/count`; files sharing the prefix before the
/// ':' belong to the same episode.
pub fn episode_front_wrapper(table: &str, episode_note_field: &str, count_only: bool) -> String {
    let projection = if count_only {
        "SELECT COUNT(*) FROM"
    } else {
        "SELECT * FROM"
    };
    let mut wrapper = format!(
        "{projection} {table} WHERE SUBSTR({table}.{episode_note_field}, 0, \
         INSTR({table}.{episode_note_field}, ':')) IN \
         (SELECT SUBSTR({episode_note_field}, 0, INSTR({episode_note_field}, ':')) FROM "
    );
    if !count_only {
        wrapper.push('(');
    }
    wrapper
}

/// Sort expression that treats blank numeric cells as -1 so they group
/// together instead of sorting as text.
/// Form: `CAST(COALESCE(NULLIF(label, ''), '-1') AS INTEGER|REAL)`
pub fn cast_coalesce_as_type(label: &str, ty: SqlType) -> String {
    let type_name = match ty {
        SqlType::Integer => "INTEGER",
        SqlType::Real => "REAL",
        SqlType::Text => "TEXT",
    };
    format!("CAST(COALESCE(NULLIF({label}, ''), '-1') AS {type_name})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_doubles_single_quotes() {
        assert_eq!(quote("it's"), "'it''s'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn null_or_empty_phrase() {
        assert_eq!(
            label_is_null_or_empty("Comments"),
            "(Comments IS NULL OR Comments = '')"
        );
    }

    #[test]
    fn integer_cast_coerces_non_numeric_to_zero() {
        assert_eq!(
            label_operator_value("Count0", ">", "abc", SqlType::Integer),
            "CAST(Count0 AS INTEGER) > 0"
        );
        assert_eq!(
            label_operator_value("Count0", ">", "3", SqlType::Integer),
            "CAST(Count0 AS INTEGER) > 3"
        );
    }

    #[test]
    fn real_cast() {
        assert_eq!(
            label_operator_value("Weight", ">=", "0.5", SqlType::Real),
            "CAST(Weight AS REAL) >= 0.5"
        );
    }

    #[test]
    fn text_values_are_quoted_and_trimmed() {
        assert_eq!(
            label_operator_value("Species", "=", " deer ", SqlType::Text),
            "Species = 'deer'"
        );
    }

    #[test]
    fn multichoice_matches_every_list_position() {
        assert_eq!(
            multichoice_operator_value("Tags", "GLOB", "deer"),
            "(Tags GLOB 'deer' OR Tags GLOB 'deer,*' OR Tags GLOB '*,deer' OR Tags GLOB '*,deer,*')"
        );
    }

    #[test]
    fn multichoice_joins_items_with_and() {
        let phrase = multichoice_operator_value("Tags", "GLOB", "deer,elk");
        assert!(phrase.contains("'deer'"));
        assert!(phrase.contains("'elk,*'"));
        assert_eq!(phrase.matches(") AND (").count(), 1);
    }

    #[test]
    fn multichoice_empty_value_matches_anything() {
        assert_eq!(multichoice_operator_value("Tags", "GLOB", ""), "Tags GLOB '*'");
    }

    #[test]
    fn detection_phrases() {
        assert_eq!(detection_category_equals("2"), "Detections.category = 2");
        assert_eq!(
            detection_conf_between(0.25, 1.0),
            " AND Detections.conf BETWEEN 0.25 AND 1"
        );
        assert_eq!(
            group_by_max_detection_conf(0.0, 0.75),
            " GROUP BY Detections.Id HAVING MAX(Detections.conf) BETWEEN 0 AND 0.75"
        );
    }

    #[test]
    fn classification_phrase() {
        assert_eq!(
            classification_category_and_conf(0.25, 1.0, "17", 0.5, 1.0),
            " AND Detections.conf BETWEEN 0.25 AND 1 \
             AND Detections.classification = '17' \
             AND Detections.classification_conf BETWEEN 0.5 AND 1"
        );
    }

    #[test]
    fn sort_cast_treats_blank_as_minus_one() {
        assert_eq!(
            cast_coalesce_as_type("Count0", SqlType::Integer),
            "CAST(COALESCE(NULLIF(Count0, ''), '-1') AS INTEGER)"
        );
    }
}

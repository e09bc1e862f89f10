use serde::{Deserialize, Serialize};

use super::sql::{cast_coalesce_as_type, column, SqlType};
use super::term::{ControlKind, SearchTerm};

pub const RELATIVE_PATH_DISPLAY_LABEL: &str = "Relative Path (of image sub-folders)";
pub const DATE_DISPLAY_LABEL: &str = "Date/Time";
pub const FILE_DISPLAY_LABEL: &str = "File Path (relative path + file name)";

/// One sort criterion: which field, shown how, in which direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortTerm {
    pub data_label: String,
    pub display_label: String,
    pub kind: ControlKind,
    pub ascending: bool,
}

impl SortTerm {
    pub fn new(data_label: &str, display_label: &str, kind: ControlKind) -> SortTerm {
        SortTerm {
            data_label: data_label.to_string(),
            display_label: display_label.to_string(),
            kind,
            ascending: true,
        }
    }
}

/// The default sort order: by relative path, then by timestamp, ascending.
pub fn default_sort_terms() -> Vec<SortTerm> {
    vec![
        SortTerm::new(column::RELATIVE_PATH, RELATIVE_PATH_DISPLAY_LABEL, ControlKind::Note),
        SortTerm::new(column::DATE_TIME, DATE_DISPLAY_LABEL, ControlKind::DateTime),
    ]
}

/// Build the list of fields the user may sort by from the search term list.
///
/// The search terms omit Id and carry two copies of the timestamp field, so
/// this prepends Id, keeps one timestamp entry, and swaps in the friendlier
/// display labels for the standard fields.
pub fn sort_terms_from_search_terms(search_terms: &[SearchTerm]) -> Vec<SortTerm> {
    let mut sort_terms = vec![SortTerm::new(column::ID, column::ID, ControlKind::IntegerAny)];
    let mut date_time_seen = false;
    for term in search_terms {
        match term.data_label.as_str() {
            column::DATE_TIME => {
                if date_time_seen {
                    continue;
                }
                date_time_seen = true;
                sort_terms.push(SortTerm::new(&term.data_label, DATE_DISPLAY_LABEL, term.kind));
            }
            column::FILE => {
                sort_terms.push(SortTerm::new(&term.data_label, FILE_DISPLAY_LABEL, term.kind));
            }
            column::RELATIVE_PATH => {
                sort_terms.push(SortTerm::new(
                    &term.data_label,
                    RELATIVE_PATH_DISPLAY_LABEL,
                    term.kind,
                ));
            }
            _ => {
                sort_terms.push(SortTerm::new(&term.data_label, &term.label, term.kind));
            }
        }
    }
    sort_terms
}

/// Compile up to two sort terms into an ` ORDER BY ...` clause, empty when
/// there is nothing to sort by.
///
/// Timestamps sort through `DATETIME()` and pick up a final File tiebreak so
/// duplicate records with identical timestamps stay adjacent. The File field
/// sorts by the full path (relative path, then file name). Numeric fields
/// sort blanks as -1 by casting through COALESCE/NULLIF.
pub fn order_by_clause(sort_terms: &[SortTerm]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut file_tiebreak = false;
    for term in sort_terms.iter().take(2) {
        if term.data_label.is_empty() {
            break;
        }
        let mut expr = if term.data_label == column::DATE_TIME {
            file_tiebreak = true;
            format!("DATETIME({})", column::DATE_TIME)
        } else if term.data_label == column::FILE {
            format!("{}, {}", column::RELATIVE_PATH, column::FILE)
        } else if term.data_label != column::ID && term.kind.sql_type() == SqlType::Integer {
            cast_coalesce_as_type(&term.data_label, SqlType::Integer)
        } else if term.data_label != column::ID && term.kind.sql_type() == SqlType::Real {
            cast_coalesce_as_type(&term.data_label, SqlType::Real)
        } else {
            term.data_label.clone()
        };
        if !term.ascending {
            expr.push_str(" DESC");
        }
        parts.push(expr);
    }
    if parts.is_empty() {
        return String::new();
    }
    if file_tiebreak {
        parts.push(column::FILE.to_string());
    }
    format!(" ORDER BY {}", parts.join(", "))
}

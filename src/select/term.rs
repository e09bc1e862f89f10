use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::sql::{column, SqlType};

/// Canonical storage format for timestamps: `2021-04-05 18:05:01`.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Time-only storage format used when selecting by time of day: `18:05:01`.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// The semantic type of a template field. Closed set: every compiler decision
/// point matches exhaustively on this, so a new kind cannot be half-wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKind {
    Note,
    MultiLine,
    AlphaNumeric,
    Counter,
    IntegerAny,
    IntegerPositive,
    DecimalAny,
    DecimalPositive,
    Flag,
    FixedChoice,
    MultiChoice,
    DateTime,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Note => "Note",
            ControlKind::MultiLine => "MultiLine",
            ControlKind::AlphaNumeric => "AlphaNumeric",
            ControlKind::Counter => "Counter",
            ControlKind::IntegerAny => "IntegerAny",
            ControlKind::IntegerPositive => "IntegerPositive",
            ControlKind::DecimalAny => "DecimalAny",
            ControlKind::DecimalPositive => "DecimalPositive",
            ControlKind::Flag => "Flag",
            ControlKind::FixedChoice => "FixedChoice",
            ControlKind::MultiChoice => "MultiChoice",
            ControlKind::DateTime => "DateTime",
        }
    }

    pub fn from_str(s: &str) -> Option<ControlKind> {
        Some(match s {
            "Note" => ControlKind::Note,
            "MultiLine" => ControlKind::MultiLine,
            "AlphaNumeric" => ControlKind::AlphaNumeric,
            "Counter" => ControlKind::Counter,
            "IntegerAny" => ControlKind::IntegerAny,
            "IntegerPositive" => ControlKind::IntegerPositive,
            "DecimalAny" => ControlKind::DecimalAny,
            "DecimalPositive" => ControlKind::DecimalPositive,
            "Flag" => ControlKind::Flag,
            "FixedChoice" => ControlKind::FixedChoice,
            "MultiChoice" => ControlKind::MultiChoice,
            "DateTime" => ControlKind::DateTime,
            _ => return None,
        })
    }

    /// The SQL affinity comparisons against this kind compile with.
    pub fn sql_type(self) -> SqlType {
        match self {
            ControlKind::Counter | ControlKind::IntegerAny | ControlKind::IntegerPositive => {
                SqlType::Integer
            }
            ControlKind::DecimalAny | ControlKind::DecimalPositive => SqlType::Real,
            ControlKind::Note
            | ControlKind::MultiLine
            | ControlKind::AlphaNumeric
            | ControlKind::Flag
            | ControlKind::FixedChoice
            | ControlKind::MultiChoice
            | ControlKind::DateTime => SqlType::Text,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.sql_type() != SqlType::Text
    }

    pub fn is_choice(self) -> bool {
        matches!(self, ControlKind::FixedChoice | ControlKind::MultiChoice)
    }
}

/// Comparison operator a search term carries. The SQL mapping is total, so an
/// unmapped operator cannot silently produce a broken fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
    Glob,
    NotGlob,
    Includes,
    Excludes,
}

impl TermOperator {
    /// Map to SQL operator text. Includes/Excludes ride on GLOB; the
    /// multi-choice phrase builder gives them their set semantics.
    pub fn to_sql(self) -> &'static str {
        match self {
            TermOperator::Equal => "=",
            TermOperator::NotEqual => "<>",
            TermOperator::LessThan => "<",
            TermOperator::GreaterThan => ">",
            TermOperator::LessThanOrEqual => "<=",
            TermOperator::GreaterThanOrEqual => ">=",
            TermOperator::Glob | TermOperator::Includes => "GLOB",
            TermOperator::NotGlob | TermOperator::Excludes => "NOT GLOB",
        }
    }

    /// Short symbol accepted on the command line.
    pub fn symbol(self) -> &'static str {
        match self {
            TermOperator::Equal => "=",
            TermOperator::NotEqual => "!=",
            TermOperator::LessThan => "<",
            TermOperator::GreaterThan => ">",
            TermOperator::LessThanOrEqual => "<=",
            TermOperator::GreaterThanOrEqual => ">=",
            TermOperator::Glob => "~",
            TermOperator::NotGlob => "!~",
            TermOperator::Includes => "@",
            TermOperator::Excludes => "!@",
        }
    }

    pub fn from_symbol(s: &str) -> Option<TermOperator> {
        Some(match s {
            "=" => TermOperator::Equal,
            "!=" => TermOperator::NotEqual,
            "<" => TermOperator::LessThan,
            ">" => TermOperator::GreaterThan,
            "<=" => TermOperator::LessThanOrEqual,
            ">=" => TermOperator::GreaterThanOrEqual,
            "~" => TermOperator::Glob,
            "!~" => TermOperator::NotGlob,
            "@" => TermOperator::Includes,
            "!@" => TermOperator::Excludes,
            _ => return None,
        })
    }

    pub fn is_greater(self) -> bool {
        matches!(
            self,
            TermOperator::GreaterThan | TermOperator::GreaterThanOrEqual
        )
    }

    pub fn is_less(self) -> bool {
        matches!(self, TermOperator::LessThan | TermOperator::LessThanOrEqual)
    }
}

/// How the user combines the non-standard search terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombiningOperator {
    And,
    Or,
}

impl CombiningOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            CombiningOperator::And => " AND ",
            CombiningOperator::Or => " OR ",
        }
    }
}

/// Pre-configured quick selections the menu offers; each maps onto search
/// term state through `Selection::set_search_terms_from_selection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelection {
    All,
    Custom,
    Folders,
    MarkedForDeletion,
}

/// One field definition read from the template, in template order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDefinition {
    pub kind: ControlKind,
    pub data_label: String,
    pub label: String,
    pub default_value: String,
    /// Legal values for choice kinds; empty otherwise.
    pub choices: Vec<String>,
}

/// The search criteria for one field: operator, literal value, and whether the
/// term currently contributes to the query.
///
/// `Clone` deep-copies `choices`, so a cloned term never aliases the
/// original's choice list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub kind: ControlKind,
    pub data_label: String,
    pub label: String,
    pub database_value: String,
    pub choices: Vec<String>,
    pub operator: TermOperator,
    pub use_for_searching: bool,
}

impl SearchTerm {
    /// Whether this term is one of the four standard fields that are always
    /// AND-combined regardless of the user's combining operator.
    pub fn is_standard(&self) -> bool {
        matches!(
            self.data_label.as_str(),
            column::FILE | column::RELATIVE_PATH | column::DATE_TIME | column::DELETE_FLAG
        )
    }

    /// The term's value as a timestamp.
    ///
    /// Falls back to parsing a time-only value (as stored in time-of-day
    /// mode), and finally to [`min_date_time`] when the value is unparseable.
    ///
    /// # Panics
    /// Panics if called on a term whose data label is not the DateTime field;
    /// that is a programmer error, not a runtime condition.
    pub fn date_time(&self) -> NaiveDateTime {
        assert_eq!(
            self.data_label,
            column::DATE_TIME,
            "date_time() called on search term for field {}",
            self.data_label
        );
        parse_date_time(&self.database_value).unwrap_or_else(min_date_time)
    }

    /// Store a timestamp as the term's value in the canonical format.
    ///
    /// # Panics
    /// Panics if called on a term whose data label is not the DateTime field.
    pub fn set_date_time(&mut self, date_time: NaiveDateTime) {
        assert_eq!(
            self.data_label,
            column::DATE_TIME,
            "set_date_time() called on search term for field {}",
            self.data_label
        );
        self.database_value = date_time.format(DATE_TIME_FORMAT).to_string();
    }
}

/// Parse a stored timestamp, accepting the full database format or a
/// time-only value (anchored to an arbitrary fixed date; only the time of day
/// is meaningful for such values).
pub fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT) {
        return Some(dt);
    }
    if let Ok(time) = NaiveTime::parse_from_str(value, TIME_FORMAT) {
        return Some(min_date_time().date().and_time(time));
    }
    None
}

/// Sentinel for unparseable timestamps.
pub fn min_date_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .expect("valid constant date")
        .and_hms_opt(0, 0, 0)
        .expect("valid constant time")
}

/// Default value for freshly built DateTime terms: noon, January 1 of the
/// current year. The UI normally overwrites this with the current file's
/// timestamp before the user ever sees it.
pub fn default_date_time() -> NaiveDateTime {
    let year = chrono::Local::now().year();
    NaiveDate::from_ymd_opt(year, 1, 1)
        .expect("January 1 exists in every year")
        .and_hms_opt(12, 0, 0)
        .expect("valid constant time")
}

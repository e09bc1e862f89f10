//! Compiles user-configurable selection criteria into SQLite predicates.
//!
//! A [`Selection`] holds one [`SearchTerm`] per template field (two for the
//! timestamp, so a range can be expressed), recognition criteria, and the
//! operator that combines terms. [`Selection::files_where`] compiles the
//! active terms into the text of a WHERE clause.

pub mod recognition;
pub mod sort;
pub mod sql;
pub mod term;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::debug;

use recognition::{RecognitionKind, RecognitionSelections, ALL_DETECTION_CATEGORY};
use sql::{
    classification_category_and_conf, column, detection_category_equals, detection_conf_between,
    group_by_max_detection_conf, label_date_operator_value, label_is_null_or_empty,
    label_operator_value, label_time_operator_value, multichoice_operator_value, SqlType,
    FILE_DATA_TABLE,
};
use term::{
    default_date_time, CombiningOperator, ControlDefinition, ControlKind, FileSelection,
    SearchTerm, TermOperator, DATE_TIME_FORMAT,
};

/// Errors raised while compiling a selection.
#[derive(Debug, Error)]
pub enum SelectError {
    /// A term value contains a double quote, which the compiler refuses to
    /// embed in generated SQL.
    #[error("search term value {value:?} contains a quotation mark")]
    SuspectValue { value: String },
}

/// Options controlling what [`Selection::files_where`] emits.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereOptions {
    /// Compile only the data-field terms, skipping recognition criteria.
    pub data_fields_only: bool,
    /// Emit the bare predicate without the leading `WHERE ` keyword.
    pub omit_where_keyword: bool,
    /// Compile as if recognition criteria were switched off.
    pub ignore_recognitions: bool,
}

/// The full selection state: search terms, combining operator, recognition
/// criteria, and the episode/random-sample modifiers the query composer reads.
#[derive(Debug, Clone)]
pub struct Selection {
    pub search_terms: Vec<SearchTerm>,
    pub term_combining_operator: CombiningOperator,
    /// When positive, the composed query samples this many files at random.
    pub random_sample: u32,
    /// Compare the time-of-day portion of timestamps instead of the date.
    pub use_time_instead_of_date: bool,
    /// Select files that have no detection rows at all.
    pub show_missing_detections: bool,
    pub recognition: RecognitionSelections,
    /// Widen the selection to every file in an episode when any file in that
    /// episode matches.
    pub episode_show_all_if_any_match: bool,
    /// Note field carrying `episode:index/count` markers.
    pub episode_note_field: String,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            search_terms: Vec::new(),
            term_combining_operator: CombiningOperator::And,
            random_sample: 0,
            use_time_instead_of_date: false,
            show_missing_detections: false,
            recognition: RecognitionSelections::default(),
            episode_show_all_if_any_match: false,
            episode_note_field: String::new(),
        }
    }
}

impl Selection {
    /// Build the default selection for a template: one term per field, none
    /// of them active, with the standard fields first in a fixed order.
    pub fn from_controls(
        controls: &[ControlDefinition],
        term_combining_operator: CombiningOperator,
    ) -> Selection {
        let mut search_terms: Vec<SearchTerm> = Vec::with_capacity(controls.len() + 1);
        for control in controls {
            let mut choices = control.choices.clone();
            if control.kind.is_choice() && !choices.is_empty() {
                // The empty string up front lets the user search for blank cells.
                choices.insert(0, String::new());
            }
            let mut search_term = SearchTerm {
                kind: control.kind,
                data_label: control.data_label.clone(),
                label: control.label.clone(),
                database_value: control.default_value.clone(),
                choices,
                operator: TermOperator::Equal,
                use_for_searching: false,
            };
            if control.kind.is_numeric() {
                // Testing for "more than" is the usual intent for counts.
                search_term.database_value = "0".to_string();
                search_term.operator = TermOperator::GreaterThan;
            } else if control.kind == ControlKind::DateTime {
                search_term.database_value =
                    default_date_time().format(DATE_TIME_FORMAT).to_string();
                search_term.operator = TermOperator::GreaterThanOrEqual;
                // A second timestamp term lets the user select a range.
                let mut upper = search_term.clone();
                upper.operator = TermOperator::LessThanOrEqual;
                search_terms.push(search_term);
                search_terms.push(upper);
                continue;
            } else if control.kind == ControlKind::Flag {
                search_term.database_value = "false".to_string();
            }
            search_terms.push(search_term);
        }

        // Standard fields first, in a fixed order, then the rest in template
        // order. The standard slots are named so both timestamp terms land in
        // the right place no matter where the template put them.
        let mut file = None;
        let mut relative_path = None;
        let mut date_time_lower = None;
        let mut date_time_upper = None;
        let mut delete_flag = None;
        let mut rest = Vec::new();
        for search_term in search_terms {
            match search_term.data_label.as_str() {
                column::FILE => file = Some(search_term),
                column::RELATIVE_PATH => relative_path = Some(search_term),
                column::DATE_TIME if date_time_lower.is_none() => {
                    date_time_lower = Some(search_term)
                }
                column::DATE_TIME => date_time_upper = Some(search_term),
                column::DELETE_FLAG => delete_flag = Some(search_term),
                _ => rest.push(search_term),
            }
        }
        let search_terms = [file, relative_path, date_time_lower, date_time_upper, delete_flag]
            .into_iter()
            .flatten()
            .chain(rest)
            .collect();

        Selection {
            search_terms,
            term_combining_operator,
            ..Default::default()
        }
    }

    /// Mirror a pre-configured selection in the search term state. `Custom`
    /// leaves everything as configured. When `path_constraint` is set, `All`
    /// and `MarkedForDeletion` additionally pin the relative path to it.
    pub fn set_search_terms_from_selection(
        &mut self,
        selection: FileSelection,
        relative_path: &str,
        path_constraint: Option<&str>,
    ) {
        match selection {
            FileSelection::Custom => return,
            FileSelection::All => {
                self.clear_uses();
            }
            FileSelection::Folders => {
                // The folder selection carries its own path, so the
                // constraint does not apply on top of it.
                self.clear_uses();
                self.set_and_use_relative_path_term(relative_path);
                return;
            }
            FileSelection::MarkedForDeletion => {
                self.clear_uses();
                self.set_and_use_delete_flag_term();
            }
        }
        if let Some(constraint) = path_constraint {
            self.set_and_use_relative_path_term(constraint);
        }
    }

    /// Point the relative path term at `relative_path` and activate it.
    pub fn set_and_use_relative_path_term(&mut self, relative_path: &str) {
        if let Some(term) = self
            .search_terms
            .iter_mut()
            .find(|t| t.data_label == column::RELATIVE_PATH)
        {
            term.database_value = relative_path.to_string();
            term.operator = TermOperator::Equal;
            term.use_for_searching = true;
        }
    }

    /// Activate the delete flag term, selecting files marked for deletion.
    pub fn set_and_use_delete_flag_term(&mut self) {
        if let Some(term) = self
            .search_terms
            .iter_mut()
            .find(|t| t.data_label == column::DELETE_FLAG)
        {
            term.database_value = "true".to_string();
            term.operator = TermOperator::Equal;
            term.use_for_searching = true;
        }
    }

    /// Deactivate every term and the recognition criteria.
    pub fn clear_uses(&mut self) {
        for term in &mut self.search_terms {
            term.use_for_searching = false;
        }
        self.recognition.clear_uses();
        self.show_missing_detections = false;
    }

    /// Seed both timestamp terms with the same value, typically the
    /// timestamp of the file currently on display.
    pub fn set_date_times(&mut self, date_time: NaiveDateTime) {
        for term in self
            .search_terms
            .iter_mut()
            .filter(|t| t.data_label == column::DATE_TIME)
        {
            term.set_date_time(date_time);
        }
    }

    /// The value of the relative path term, empty when there is none.
    pub fn relative_path_folder(&self) -> String {
        self.search_terms
            .iter()
            .find(|t| t.data_label == column::RELATIVE_PATH)
            .map(|t| t.database_value.clone())
            .unwrap_or_default()
    }

    /// Compile the active terms into WHERE-clause text, empty when nothing is
    /// selected on.
    ///
    /// The four standard fields are always AND-combined; the remaining terms
    /// combine under the configured operator, and each group is
    /// parenthesized so an OR group cannot leak into the rest of the clause.
    /// Recognition criteria append afterwards; when they produce the only
    /// constraint the fragment starts with ` AND `, which the query composer
    /// attaches to the detection join's ON condition.
    ///
    /// `detections_exist` states whether the database holds recognition data
    /// at all; without it the recognition criteria compile to nothing.
    pub fn files_where(
        &self,
        detections_exist: bool,
        opts: &WhereOptions,
    ) -> Result<String, SelectError> {
        let standard: Vec<&SearchTerm> = self
            .search_terms
            .iter()
            .filter(|t| t.use_for_searching && t.is_standard())
            .collect();
        let nonstandard: Vec<&SearchTerm> = self
            .search_terms
            .iter()
            .filter(|t| t.use_for_searching && !t.is_standard())
            .collect();

        let standard_where = self.combine_terms(&standard, CombiningOperator::And)?;
        let nonstandard_where = self.combine_terms(&nonstandard, self.term_combining_operator)?;

        let keyword = if opts.omit_where_keyword { "" } else { "WHERE " };
        let mut clause = match (standard_where.is_empty(), nonstandard_where.is_empty()) {
            (false, false) => {
                format!("{keyword}({standard_where}) AND ({nonstandard_where})")
            }
            (false, true) => format!("{keyword}({standard_where})"),
            (true, false) => format!("{keyword}{nonstandard_where}"),
            (true, true) => String::new(),
        };

        let rec = &self.recognition;
        if !opts.ignore_recognitions
            && !opts.data_fields_only
            && detections_exist
            && rec.use_recognition
            && rec.kind() != RecognitionKind::Empty
        {
            let uses_category = !rec.all_detections && !rec.interpret_all_detections_as_empty;
            let mut add_and = true;
            if clause.is_empty() && uses_category {
                clause.push_str(keyword);
                add_and = false;
            }

            if uses_category {
                if add_and {
                    clause.push_str(" AND ");
                }
                // Counting classifications must span every detection
                // category, so the category pin only applies to detections.
                let category = if rec.kind() == RecognitionKind::Detection {
                    rec.detection_category.as_str()
                } else {
                    ALL_DETECTION_CATEGORY
                };
                clause.push_str(&detection_category_equals(category));
            }

            match rec.kind() {
                RecognitionKind::Detection => {
                    if !rec.rank_by_detection_confidence {
                        let (lower, upper) = rec.detection_bounds_for_select();
                        if rec.all_detections && rec.interpret_all_detections_as_empty {
                            // Empty must test the file's best detection, not
                            // each detection on its own.
                            clause.push_str(&group_by_max_detection_conf(lower, upper));
                        } else {
                            clause.push_str(&detection_conf_between(lower, upper));
                        }
                    } else if rec.all_detections && rec.interpret_all_detections_as_empty {
                        // Ranking inspects everything, so the range widens.
                        clause.push_str(&detection_conf_between(0.0, 1.0));
                    }
                }
                RecognitionKind::Classification => {
                    if !rec.rank_by_detection_confidence && !rec.rank_by_classification_confidence {
                        let (lower, upper) = rec.detection_bounds_for_select();
                        clause.push_str(&classification_category_and_conf(
                            lower,
                            upper,
                            &rec.classification_category,
                            rec.classification_conf_lower,
                            rec.classification_conf_higher,
                        ));
                    } else {
                        clause.push_str(&classification_category_and_conf(
                            0.0,
                            1.0,
                            &rec.classification_category,
                            0.0,
                            1.0,
                        ));
                    }
                }
                RecognitionKind::Empty => {}
            }
        }

        debug!(clause = %clause, "compiled selection");
        Ok(clause)
    }

    /// Combine a group of terms under one operator, parenthesizing the result.
    fn combine_terms(
        &self,
        search_terms: &[&SearchTerm],
        operator: CombiningOperator,
    ) -> Result<String, SelectError> {
        let combined_time = self.combined_time_expression(search_terms);
        let mut time_handled = false;
        let mut clause = String::new();

        for term in search_terms {
            let term_clause;
            if combined_time.is_some() && term.data_label == column::DATE_TIME {
                if time_handled {
                    // The second time term is already folded into the
                    // combined expression.
                    continue;
                }
                term_clause = combined_time.clone().unwrap_or_default();
                time_handled = true;
            } else {
                let label = self.qualified_label(&term.data_label);
                if term.database_value.is_empty() && term.operator == TermOperator::Equal {
                    // NULL and the empty string are equivalent for queries.
                    term_clause = label_is_null_or_empty(&label);
                } else {
                    if term.database_value.contains('"') {
                        return Err(SelectError::SuspectValue {
                            value: term.database_value.clone(),
                        });
                    }
                    let mut phrase = if term.data_label == column::RELATIVE_PATH {
                        // A folder's files include those of its subfolders.
                        let exact = label_operator_value(
                            &label,
                            TermOperator::Equal.to_sql(),
                            &term.database_value,
                            SqlType::Text,
                        );
                        let subtree = label_operator_value(
                            &label,
                            TermOperator::Glob.to_sql(),
                            &format!("{}\\*", term.database_value),
                            SqlType::Text,
                        );
                        format!("({exact} OR {subtree})")
                    } else if term.data_label == column::DATE_TIME {
                        if self.use_time_instead_of_date {
                            label_time_operator_value(
                                &label,
                                term.operator.to_sql(),
                                &term.database_value,
                            )
                        } else {
                            label_date_operator_value(
                                &label,
                                term.operator.to_sql(),
                                &term.database_value,
                            )
                        }
                    } else if term.kind == ControlKind::MultiChoice
                        && matches!(term.operator, TermOperator::Includes | TermOperator::Excludes)
                    {
                        multichoice_operator_value(
                            &label,
                            term.operator.to_sql(),
                            &term.database_value,
                        )
                    } else {
                        label_operator_value(
                            &label,
                            term.operator.to_sql(),
                            &term.database_value,
                            term.kind.sql_type(),
                        )
                    };
                    if term.kind == ControlKind::Flag {
                        // Stored flags mix cases ("true", "TRUE").
                        phrase.push_str(" COLLATE NOCASE");
                    }
                    term_clause = phrase;
                }
            }

            if !clause.is_empty() {
                clause.push_str(operator.as_sql());
            }
            clause.push_str(&term_clause);
        }

        if clause.is_empty() {
            Ok(clause)
        } else {
            Ok(format!("({clause})"))
        }
    }

    /// When selecting on time-of-day with a range that crosses midnight, the
    /// two time terms must combine with OR: `time >= 22:00 AND time <= 07:00`
    /// matches nothing, `time >= 22:00 OR time <= 07:00` is the overnight
    /// range the user meant. Returns the combined expression when that
    /// applies, in either operator order.
    fn combined_time_expression(&self, search_terms: &[&SearchTerm]) -> Option<String> {
        if !self.use_time_instead_of_date {
            return None;
        }
        let time_terms: Vec<&&SearchTerm> = search_terms
            .iter()
            .filter(|t| t.data_label == column::DATE_TIME)
            .collect();
        if time_terms.len() != 2 {
            return None;
        }
        let (first, second) = (time_terms[0], time_terms[1]);
        let first_time = first.date_time().time();
        let second_time = second.date_time().time();
        let wraps_midnight = (first.operator.is_greater()
            && second.operator.is_less()
            && first_time > second_time)
            || (first.operator.is_less()
                && second.operator.is_greater()
                && first_time < second_time);
        if !wraps_midnight {
            return None;
        }
        let label = self.qualified_label(&first.data_label);
        Some(format!(
            "({} OR {})",
            label_time_operator_value(&label, first.operator.to_sql(), &first.database_value),
            label_time_operator_value(&label, second.operator.to_sql(), &second.database_value),
        ))
    }

    /// Data labels must qualify as `DataTable.X` once the query joins the
    /// detections table, since `Id` appears in both tables.
    fn qualified_label(&self, data_label: &str) -> String {
        if self.recognition.use_recognition {
            format!("{FILE_DATA_TABLE}.{data_label}")
        } else {
            data_label.to_string()
        }
    }
}

/// Predicate matching a folder and its whole subtree, empty for an empty path.
/// Form: `(RelativePath = 'A/B' OR RelativePath GLOB 'A/B\*')`
pub fn relative_path_glob_to_include_subfolders(column_name: &str, relative_path: &str) -> String {
    if relative_path.is_empty() {
        return String::new();
    }
    let exact = label_operator_value(
        column_name,
        TermOperator::Equal.to_sql(),
        relative_path,
        SqlType::Text,
    );
    let subtree = label_operator_value(
        column_name,
        TermOperator::Glob.to_sql(),
        &format!("{relative_path}\\*"),
        SqlType::Text,
    );
    format!("({exact} OR {subtree})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(kind: ControlKind, data_label: &str, label: &str, default_value: &str) -> ControlDefinition {
        ControlDefinition {
            kind,
            data_label: data_label.to_string(),
            label: label.to_string(),
            default_value: default_value.to_string(),
            choices: Vec::new(),
        }
    }

    fn test_controls() -> Vec<ControlDefinition> {
        let mut species = control(ControlKind::FixedChoice, "Species", "Species", "");
        species.choices = vec!["deer".to_string(), "elk".to_string()];
        let mut tags = control(ControlKind::MultiChoice, "Tags", "Tags", "");
        tags.choices = vec!["collared".to_string(), "tagged".to_string()];
        vec![
            control(ControlKind::Note, column::FILE, "File", ""),
            control(ControlKind::Note, column::RELATIVE_PATH, "Relative Path", ""),
            control(ControlKind::DateTime, column::DATE_TIME, "Date", ""),
            control(ControlKind::Flag, column::DELETE_FLAG, "Delete?", "false"),
            species,
            control(ControlKind::Counter, "Count0", "Count", "0"),
            control(ControlKind::DecimalAny, "Weight", "Weight", ""),
            control(ControlKind::Note, "Comments", "Comments", ""),
            control(ControlKind::Note, "Other", "Other", ""),
            tags,
        ]
    }

    fn selection() -> Selection {
        Selection::from_controls(&test_controls(), CombiningOperator::And)
    }

    fn activate(selection: &mut Selection, data_label: &str, operator: TermOperator, value: &str) {
        let term = selection
            .search_terms
            .iter_mut()
            .find(|t| t.data_label == data_label)
            .expect("term exists");
        term.operator = operator;
        term.database_value = value.to_string();
        term.use_for_searching = true;
    }

    fn activate_date_times(selection: &mut Selection, lower: &str, upper: &str) {
        let mut first = true;
        for term in selection
            .search_terms
            .iter_mut()
            .filter(|t| t.data_label == column::DATE_TIME)
        {
            term.database_value = if first { lower } else { upper }.to_string();
            term.use_for_searching = true;
            first = false;
        }
    }

    fn where_clause(selection: &Selection) -> String {
        selection
            .files_where(false, &WhereOptions::default())
            .expect("compiles")
    }

    #[test]
    fn from_controls_orders_standard_terms_first() {
        let selection = selection();
        let labels: Vec<&str> = selection
            .search_terms
            .iter()
            .map(|t| t.data_label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                column::FILE,
                column::RELATIVE_PATH,
                column::DATE_TIME,
                column::DATE_TIME,
                column::DELETE_FLAG,
                "Species",
                "Count0",
                "Weight",
                "Comments",
                "Other",
                "Tags",
            ]
        );
        assert_eq!(selection.search_terms[2].operator, TermOperator::GreaterThanOrEqual);
        assert_eq!(selection.search_terms[3].operator, TermOperator::LessThanOrEqual);
        assert!(selection.search_terms.iter().all(|t| !t.use_for_searching));
    }

    #[test]
    fn from_controls_seeds_numeric_and_choice_defaults() {
        let selection = selection();
        let counter = selection.search_terms.iter().find(|t| t.data_label == "Count0").unwrap();
        assert_eq!(counter.database_value, "0");
        assert_eq!(counter.operator, TermOperator::GreaterThan);
        let species = selection.search_terms.iter().find(|t| t.data_label == "Species").unwrap();
        assert_eq!(species.choices[0], "");
        assert_eq!(species.choices[1], "deer");
    }

    #[test]
    fn no_active_terms_compile_to_nothing() {
        assert_eq!(where_clause(&selection()), "");
    }

    #[test]
    fn single_standard_term() {
        let mut selection = selection();
        activate(&mut selection, column::FILE, TermOperator::Equal, "img0001.jpg");
        assert_eq!(where_clause(&selection), "WHERE ((File = 'img0001.jpg'))");
    }

    #[test]
    fn standard_terms_stay_anded_when_combining_with_or() {
        let mut selection = selection();
        selection.term_combining_operator = CombiningOperator::Or;
        activate(&mut selection, column::FILE, TermOperator::Equal, "img0001.jpg");
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        activate(&mut selection, "Comments", TermOperator::Equal, "seen");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((File = 'img0001.jpg')) AND ((Species = 'deer' OR Comments = 'seen'))"
        );
    }

    #[test]
    fn nonstandard_terms_combine_with_and() {
        let mut selection = selection();
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        activate(&mut selection, "Count0", TermOperator::GreaterThan, "2");
        assert_eq!(
            where_clause(&selection),
            "WHERE (Species = 'deer' AND CAST(Count0 AS INTEGER) > 2)"
        );
    }

    #[test]
    fn relative_path_matches_subfolders() {
        let mut selection = selection();
        activate(&mut selection, column::RELATIVE_PATH, TermOperator::Equal, "Station1/Cam2");
        assert_eq!(
            where_clause(&selection),
            "WHERE (((RelativePath = 'Station1/Cam2' OR RelativePath GLOB 'Station1/Cam2\\*')))"
        );
    }

    #[test]
    fn empty_equal_matches_null_and_empty_string() {
        let mut selection = selection();
        activate(&mut selection, "Comments", TermOperator::Equal, "");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((Comments IS NULL OR Comments = ''))"
        );
    }

    #[test]
    fn quotation_marks_are_rejected() {
        let mut selection = selection();
        activate(&mut selection, "Comments", TermOperator::Equal, "a\"b");
        let err = selection
            .files_where(false, &WhereOptions::default())
            .unwrap_err();
        assert!(matches!(err, SelectError::SuspectValue { .. }));
    }

    #[test]
    fn date_range_compiles_through_date_function() {
        let mut selection = selection();
        activate_date_times(&mut selection, "2024-01-01 00:00:00", "2024-02-01 00:00:00");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((DATE(DateTime) >= DATE('2024-01-01 00:00:00') \
             AND DATE(DateTime) <= DATE('2024-02-01 00:00:00')))"
        );
    }

    #[test]
    fn daytime_range_stays_anded() {
        let mut selection = selection();
        selection.use_time_instead_of_date = true;
        activate_date_times(&mut selection, "08:00:00", "17:00:00");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((TIME(DateTime) >= TIME('08:00:00') AND TIME(DateTime) <= TIME('17:00:00')))"
        );
    }

    #[test]
    fn overnight_range_combines_with_or() {
        let mut selection = selection();
        selection.use_time_instead_of_date = true;
        activate_date_times(&mut selection, "22:00:00", "07:00:00");
        assert_eq!(
            where_clause(&selection),
            "WHERE (((TIME(DateTime) >= TIME('22:00:00') OR TIME(DateTime) <= TIME('07:00:00'))))"
        );
    }

    #[test]
    fn overnight_range_combines_in_reversed_operator_order() {
        let mut selection = selection();
        selection.use_time_instead_of_date = true;
        {
            let mut values = ["07:00:00", "22:00:00"].iter();
            let mut operators =
                [TermOperator::LessThanOrEqual, TermOperator::GreaterThanOrEqual].iter();
            for term in selection
                .search_terms
                .iter_mut()
                .filter(|t| t.data_label == column::DATE_TIME)
            {
                term.database_value = values.next().unwrap().to_string();
                term.operator = *operators.next().unwrap();
                term.use_for_searching = true;
            }
        }
        assert_eq!(
            where_clause(&selection),
            "WHERE (((TIME(DateTime) <= TIME('07:00:00') OR TIME(DateTime) >= TIME('22:00:00'))))"
        );
    }

    #[test]
    fn decimal_terms_cast_as_real() {
        let mut selection = selection();
        activate(&mut selection, "Weight", TermOperator::GreaterThanOrEqual, "2.5");
        assert_eq!(where_clause(&selection), "WHERE (CAST(Weight AS REAL) >= 2.5)");
    }

    #[test]
    fn non_numeric_value_against_counter_coerces_to_zero() {
        let mut selection = selection();
        activate(&mut selection, "Count0", TermOperator::GreaterThan, "lots");
        assert_eq!(where_clause(&selection), "WHERE (CAST(Count0 AS INTEGER) > 0)");
    }

    #[test]
    fn flag_comparison_is_case_insensitive() {
        let mut selection = selection();
        activate(&mut selection, column::DELETE_FLAG, TermOperator::Equal, "true");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((DeleteFlag = 'true' COLLATE NOCASE))"
        );
    }

    #[test]
    fn multichoice_includes_matches_list_positions() {
        let mut selection = selection();
        activate(&mut selection, "Tags", TermOperator::Includes, "collared");
        assert_eq!(
            where_clause(&selection),
            "WHERE ((Tags GLOB 'collared' OR Tags GLOB 'collared,*' \
             OR Tags GLOB '*,collared' OR Tags GLOB '*,collared,*'))"
        );
    }

    #[test]
    fn recognition_qualifies_data_labels() {
        let mut selection = selection();
        activate(&mut selection, column::FILE, TermOperator::Equal, "img0001.jpg");
        selection.recognition.use_recognition = true;
        selection.recognition.all_detections = false;
        selection.recognition.detection_category = "1".to_string();
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            "WHERE ((DataTable.File = 'img0001.jpg')) \
             AND Detections.category = 1 AND Detections.conf BETWEEN 0.2 AND 1"
        );
    }

    #[test]
    fn detection_category_alone_opens_with_where() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        selection.recognition.all_detections = false;
        selection.recognition.detection_category = "2".to_string();
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            "WHERE Detections.category = 2 AND Detections.conf BETWEEN 0.2 AND 1"
        );
    }

    #[test]
    fn all_detections_alone_yields_join_fragment() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            " AND Detections.conf BETWEEN 0.2 AND 1"
        );
    }

    #[test]
    fn empty_interpretation_groups_by_max_confidence() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        selection.recognition.interpret_all_detections_as_empty = true;
        selection.recognition.detection_conf_lower = 0.5;
        let clause = selection.files_where(true, &WhereOptions::default()).unwrap();
        assert!(
            clause.starts_with(" GROUP BY Detections.Id HAVING MAX(Detections.conf) BETWEEN 0 AND 0.499"),
            "unexpected clause: {clause}"
        );
    }

    #[test]
    fn rank_by_detection_confidence_widens_to_full_range() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        selection.recognition.interpret_all_detections_as_empty = true;
        selection.recognition.rank_by_detection_confidence = true;
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            " AND Detections.conf BETWEEN 0 AND 1"
        );
    }

    #[test]
    fn classification_pins_category_to_all_detections() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        selection.recognition.all_detections = false;
        selection.recognition.detection_category = "1".to_string();
        selection.recognition.classification_category = "17".to_string();
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            "WHERE Detections.category = -1 \
             AND Detections.conf BETWEEN 0.2 AND 1 \
             AND Detections.classification = '17' \
             AND Detections.classification_conf BETWEEN 0.5 AND 1"
        );
    }

    #[test]
    fn rank_by_classification_confidence_widens_both_ranges() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        selection.recognition.classification_category = "17".to_string();
        selection.recognition.rank_by_classification_confidence = true;
        assert_eq!(
            selection.files_where(true, &WhereOptions::default()).unwrap(),
            " AND Detections.conf BETWEEN 0 AND 1 \
             AND Detections.classification = '17' \
             AND Detections.classification_conf BETWEEN 0 AND 1"
        );
    }

    #[test]
    fn recognition_needs_detection_data() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        assert_eq!(selection.files_where(false, &WhereOptions::default()).unwrap(), "");
    }

    #[test]
    fn data_fields_only_skips_recognition() {
        let mut selection = selection();
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        selection.recognition.use_recognition = true;
        let opts = WhereOptions {
            data_fields_only: true,
            ..Default::default()
        };
        // Labels still qualify since the composed query joins Detections.
        assert_eq!(
            selection.files_where(true, &opts).unwrap(),
            "WHERE (DataTable.Species = 'deer')"
        );
    }

    #[test]
    fn omit_where_keyword_yields_bare_predicate() {
        let mut selection = selection();
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        let opts = WhereOptions {
            omit_where_keyword: true,
            ..Default::default()
        };
        assert_eq!(selection.files_where(false, &opts).unwrap(), "(Species = 'deer')");
    }

    #[test]
    fn ignore_recognitions_compiles_data_fields_only() {
        let mut selection = selection();
        selection.recognition.use_recognition = true;
        let opts = WhereOptions {
            ignore_recognitions: true,
            ..Default::default()
        };
        assert_eq!(selection.files_where(true, &opts).unwrap(), "");
    }

    #[test]
    fn marked_for_deletion_activates_delete_flag() {
        let mut selection = selection();
        selection.set_search_terms_from_selection(FileSelection::MarkedForDeletion, "", None);
        assert_eq!(
            where_clause(&selection),
            "WHERE ((DeleteFlag = 'true' COLLATE NOCASE))"
        );
    }

    #[test]
    fn folder_selection_activates_relative_path() {
        let mut selection = selection();
        selection.set_search_terms_from_selection(FileSelection::Folders, "Station1", None);
        assert_eq!(
            where_clause(&selection),
            "WHERE (((RelativePath = 'Station1' OR RelativePath GLOB 'Station1\\*')))"
        );
        assert_eq!(selection.relative_path_folder(), "Station1");
    }

    #[test]
    fn all_selection_with_constraint_pins_relative_path() {
        let mut selection = selection();
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        selection.set_search_terms_from_selection(FileSelection::All, "", Some("Station2"));
        assert_eq!(
            where_clause(&selection),
            "WHERE (((RelativePath = 'Station2' OR RelativePath GLOB 'Station2\\*')))"
        );
    }

    #[test]
    fn custom_selection_leaves_terms_alone() {
        let mut selection = selection();
        activate(&mut selection, "Species", TermOperator::Equal, "deer");
        selection.set_search_terms_from_selection(FileSelection::Custom, "", Some("Station2"));
        assert_eq!(where_clause(&selection), "WHERE (Species = 'deer')");
    }

    #[test]
    fn subfolder_glob_helper() {
        assert_eq!(
            relative_path_glob_to_include_subfolders(column::RELATIVE_PATH, "A/B"),
            "(RelativePath = 'A/B' OR RelativePath GLOB 'A/B\\*')"
        );
        assert_eq!(relative_path_glob_to_include_subfolders(column::RELATIVE_PATH, ""), "");
    }
}

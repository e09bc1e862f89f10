use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use cts::config::CtsConfig;
use cts::db::models::{NewFile, RecognizerFile};
use cts::db::Database;
use cts::output::{json as json_out, table};
use cts::select::sort::{sort_terms_from_search_terms, SortTerm};
use cts::select::term::{CombiningOperator, ControlDefinition, ControlKind, TermOperator};
use cts::select::{Selection, WhereOptions};

#[derive(Parser)]
#[command(name = "cts", version, about = "Camera Trap Select — custom file selections over a camera trap image database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to database file (default: ~/.cts/cts.db)
    #[arg(long, global = true, env = "CTS_DB")]
    db: Option<PathBuf>,
}

/// Selection criteria shared by select, count, and where.
#[derive(Args, Debug, Default)]
struct SelectArgs {
    /// Restrict to a folder and its subfolders
    #[arg(long)]
    path: Option<String>,

    /// Only files marked for deletion
    #[arg(long)]
    deleted: bool,

    /// Earliest timestamp, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    from: Option<String>,

    /// Latest timestamp, "YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS"
    #[arg(long)]
    to: Option<String>,

    /// Earliest time of day, "HH:MM:SS" (compares time only; a time-from
    /// later than time-to selects the overnight span across midnight)
    #[arg(long)]
    time_from: Option<String>,

    /// Latest time of day, "HH:MM:SS"
    #[arg(long)]
    time_to: Option<String>,

    /// Field criterion as "Label OP value", e.g. "Species = deer" or
    /// "Count0 > 2". Operators: = != < > <= >= ~ !~ @ !@
    #[arg(long = "term")]
    terms: Vec<String>,

    /// Combine field criteria with OR instead of AND
    #[arg(long)]
    or: bool,

    /// Only files whose best detection is in this category
    #[arg(long)]
    detection_category: Option<String>,

    /// Any detection category (the default when other recognition
    /// criteria are given)
    #[arg(long)]
    all_detections: bool,

    /// Files the recognizer found empty (no confident detection)
    #[arg(long)]
    empty: bool,

    /// Only files with a detection classified as this category
    #[arg(long)]
    classification_category: Option<String>,

    /// Lower detection confidence bound
    #[arg(long)]
    conf_lower: Option<f64>,

    /// Upper detection confidence bound
    #[arg(long)]
    conf_higher: Option<f64>,

    /// Lower classification confidence bound
    #[arg(long)]
    class_conf_lower: Option<f64>,

    /// Upper classification confidence bound
    #[arg(long)]
    class_conf_higher: Option<f64>,

    /// Order results by detection confidence, best first
    #[arg(long)]
    rank_detections: bool,

    /// Order results by classification confidence, best first
    #[arg(long)]
    rank_classifications: bool,

    /// Only files with no detection data at all
    #[arg(long)]
    missing_detections: bool,

    /// Sample this many matching files at random
    #[arg(long, default_value = "0")]
    random: u32,

    /// Include every file of an episode when any of its files match
    /// (requires episode_note_field in the config)
    #[arg(long)]
    episodes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Select files matching the given criteria
    Select {
        #[command(flatten)]
        select: SelectArgs,

        /// Sort by these fields (data labels), up to two
        #[arg(long)]
        sort: Vec<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Maximum results to display
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Count files matching the given criteria
    Count {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Print the WHERE clause the criteria compile to, without running it
    Where {
        #[command(flatten)]
        select: SelectArgs,

        /// Compile only the data-field terms, skipping recognition criteria
        #[arg(long)]
        data_fields_only: bool,

        /// Omit the leading WHERE keyword
        #[arg(long)]
        bare: bool,
    },

    /// List the template's search terms and sortable fields
    Terms,

    /// Add a field to the template
    AddField {
        /// Field type: Note, MultiLine, AlphaNumeric, Counter, IntegerAny,
        /// IntegerPositive, DecimalAny, DecimalPositive, Flag, FixedChoice,
        /// MultiChoice, DateTime
        kind: String,

        /// Column name (ascii letters, digits, underscore)
        data_label: String,

        /// Display label (defaults to the data label)
        #[arg(long)]
        label: Option<String>,

        /// Default value for new files
        #[arg(long, default_value = "")]
        default: String,

        /// Legal value for choice fields (repeatable)
        #[arg(long = "choice")]
        choices: Vec<String>,
    },

    /// Add a file record
    AddFile {
        /// Path of the file relative to the image root
        file: String,

        /// Timestamp "YYYY-MM-DD HH:MM:SS" (defaults to now)
        #[arg(long)]
        datetime: Option<String>,

        /// Field value as "Label=Value" (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Import a recognizer output file (MegaDetector batch format)
    Import {
        /// Path to the recognizer JSON file
        path: PathBuf,
    },

    /// Create the default config file at ~/.cts/config.toml
    Init,

    /// Show database statistics
    Stats,

    /// Show database info
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;
    let config = CtsConfig::load()?;

    if let Commands::Init = cli.command {
        let created = cts::config::init_config()?;
        let path = cts::config::config_path()?;
        if created {
            println!("Created {}", path.display());
        } else {
            println!("Config already exists: {}", path.display());
        }
        return Ok(());
    }

    let db_path = cli
        .db
        .or_else(|| config.database.clone())
        .map_or_else(Database::default_db_path, Ok)?;

    let db = Database::open(&db_path)?;

    match cli.command {
        Commands::Select {
            select,
            sort,
            desc,
            limit,
        } => {
            let selection = build_selection(&db, &config, &select)?;
            let sort_terms = build_sort_terms(&selection, &sort, desc)?;
            let mut files = db.select_files(&selection, &sort_terms)?;
            let total = files.len();
            files.truncate(limit);
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "total": total,
                    "files": files,
                }))?;
            } else {
                table::print_file_results(&files);
                if total > files.len() {
                    println!("({} more; raise --limit to see them)", total - files.len());
                }
            }
        }

        Commands::Count { select } => {
            let selection = build_selection(&db, &config, &select)?;
            let count = db.count_files(&selection)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "count": count }))?;
            } else {
                println!("{count}");
            }
        }

        Commands::Where {
            select,
            data_fields_only,
            bare,
        } => {
            let selection = build_selection(&db, &config, &select)?;
            let clause = selection.files_where(
                db.detections_exist()?,
                &WhereOptions {
                    data_fields_only,
                    omit_where_keyword: bare,
                    ..Default::default()
                },
            )?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "where": clause }))?;
            } else if clause.is_empty() {
                println!("(no criteria; selects every file)");
            } else {
                println!("{clause}");
            }
        }

        Commands::Terms => {
            let selection = db.default_selection()?;
            let sort_terms = sort_terms_from_search_terms(&selection.search_terms);
            if json_output {
                json_out::print_json(&serde_json::json!({
                    "search_terms": selection.search_terms,
                    "sort_fields": sort_terms
                        .iter()
                        .map(|t| t.data_label.clone())
                        .collect::<Vec<_>>(),
                }))?;
            } else {
                table::print_search_terms(&selection);
                table::print_sort_terms(&sort_terms);
            }
        }

        Commands::AddField {
            kind,
            data_label,
            label,
            default,
            choices,
        } => {
            let Some(kind) = ControlKind::from_str(&kind) else {
                bail!("Unknown field type: {kind}");
            };
            let control = ControlDefinition {
                kind,
                label: label.unwrap_or_else(|| data_label.clone()),
                data_label,
                default_value: default,
                choices,
            };
            db.add_control(&control)?;
            println!("Added field: {} ({})", control.data_label, control.kind.as_str());
        }

        Commands::AddFile {
            file,
            datetime,
            fields,
        } => {
            let normalized = file.replace('\\', "/");
            let (relative_path, file_name) = match normalized.rsplit_once('/') {
                Some((dir, name)) => (dir.to_string(), name.to_string()),
                None => (String::new(), normalized.clone()),
            };
            let date_time = match datetime {
                Some(dt) => dt,
                None => chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            };
            let mut field_values = Vec::new();
            for spec in &fields {
                let Some((label, value)) = spec.split_once('=') else {
                    bail!("Invalid --field {spec:?}; expected \"Label=Value\"");
                };
                field_values.push((label.trim().to_string(), value.trim().to_string()));
            }
            let id = db.insert_file(&NewFile {
                file: file_name,
                relative_path,
                date_time,
                fields: field_values,
            })?;
            println!("Added file {normalized} (id {id})");
        }

        Commands::Import { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let recognizer: RecognizerFile = serde_json::from_str(&content)
                .with_context(|| format!("Invalid recognizer file: {}", path.display()))?;
            let summary = db.import_recognitions(&recognizer)?;
            if json_output {
                json_out::print_json(&summary)?;
            } else {
                table::print_import_summary(&summary);
            }
        }

        Commands::Init => unreachable!("handled before the database opens"),

        Commands::Stats => {
            let stats = db.stats()?;
            if json_output {
                json_out::print_json(&stats)?;
            } else {
                table::print_stats(&stats);
            }
        }

        Commands::Info => {
            let stats = db.stats()?;
            let schema_ver: String = db
                .conn
                .query_row(
                    "SELECT value FROM cts_meta WHERE key = 'schema_version'",
                    [],
                    |r| r.get(0),
                )
                .unwrap_or_else(|_| "unknown".to_string());

            if json_output {
                json_out::print_json(&serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "schema_version": schema_ver,
                    "db_path": db.path.display().to_string(),
                    "db_size_bytes": stats.db_size_bytes,
                    "files": stats.files,
                    "detections": stats.detections,
                }))?;
            } else {
                println!("cts v{}", env!("CARGO_PKG_VERSION"));
                println!("  Schema:     v{schema_ver}");
                println!("  Database:   {}", db.path.display());
                println!("  Size:       {}", table::format_bytes(stats.db_size_bytes));
                println!("  Files:      {}", stats.files);
                println!("  Detections: {}", stats.detections);
            }
        }
    }

    Ok(())
}

/// Turn the CLI flags into a full selection against the database's template.
fn build_selection(db: &Database, config: &CtsConfig, args: &SelectArgs) -> Result<Selection> {
    let mut selection = db.default_selection()?;

    if args.or {
        selection.term_combining_operator = CombiningOperator::Or;
    }

    let path = args
        .path
        .as_deref()
        .or(config.relative_path_constraint.as_deref());
    if let Some(path) = path {
        selection.set_and_use_relative_path_term(path);
    }
    if args.deleted {
        selection.set_and_use_delete_flag_term();
    }

    if args.time_from.is_some() || args.time_to.is_some() {
        if args.from.is_some() || args.to.is_some() {
            bail!("--time-from/--time-to cannot combine with --from/--to");
        }
        selection.use_time_instead_of_date = true;
        set_date_time_terms(
            &mut selection,
            args.time_from.as_deref(),
            args.time_to.as_deref(),
            |v| v.to_string(),
        )?;
    } else if args.from.is_some() || args.to.is_some() {
        set_date_time_terms(
            &mut selection,
            args.from.as_deref(),
            args.to.as_deref(),
            normalize_date,
        )?;
    }

    for spec in &args.terms {
        apply_term_spec(&mut selection, spec)?;
    }

    let recognition = &mut selection.recognition;
    if let Some(category) = &args.detection_category {
        recognition.use_recognition = true;
        recognition.all_detections = false;
        recognition.detection_category = category.clone();
    }
    if args.all_detections {
        recognition.use_recognition = true;
        recognition.all_detections = true;
    }
    if args.empty {
        recognition.use_recognition = true;
        recognition.all_detections = true;
        recognition.interpret_all_detections_as_empty = true;
    }
    if let Some(category) = &args.classification_category {
        recognition.use_recognition = true;
        recognition.classification_category = category.clone();
    }
    if let Some(conf) = args.conf_lower {
        recognition.use_recognition = true;
        recognition.detection_conf_lower = conf;
    }
    if let Some(conf) = args.conf_higher {
        recognition.use_recognition = true;
        recognition.detection_conf_higher = conf;
    }
    if let Some(conf) = args.class_conf_lower {
        recognition.use_recognition = true;
        recognition.classification_conf_lower = conf;
    }
    if let Some(conf) = args.class_conf_higher {
        recognition.use_recognition = true;
        recognition.classification_conf_higher = conf;
    }
    if args.rank_detections {
        recognition.use_recognition = true;
        recognition.rank_by_detection_confidence = true;
    }
    if args.rank_classifications {
        recognition.use_recognition = true;
        recognition.rank_by_classification_confidence = true;
    }

    selection.show_missing_detections = args.missing_detections;
    selection.random_sample = args.random;

    if args.episodes {
        let Some(field) = &config.episode_note_field else {
            bail!("--episodes requires episode_note_field in ~/.cts/config.toml");
        };
        selection.episode_show_all_if_any_match = true;
        selection.episode_note_field = field.clone();
    }

    Ok(selection)
}

/// Activate the two timestamp terms from the CLI bounds. The first term is
/// the lower bound, the second the upper.
fn set_date_time_terms(
    selection: &mut Selection,
    lower: Option<&str>,
    upper: Option<&str>,
    normalize: impl Fn(&str) -> String,
) -> Result<()> {
    let mut date_time_terms: Vec<&mut cts::select::term::SearchTerm> = selection
        .search_terms
        .iter_mut()
        .filter(|t| t.kind == ControlKind::DateTime)
        .collect();
    if date_time_terms.len() < 2 {
        bail!("Template has no timestamp field");
    }
    if let Some(lower) = lower {
        date_time_terms[0].database_value = normalize(lower);
        date_time_terms[0].operator = TermOperator::GreaterThanOrEqual;
        date_time_terms[0].use_for_searching = true;
    }
    if let Some(upper) = upper {
        date_time_terms[1].database_value = normalize(upper);
        date_time_terms[1].operator = TermOperator::LessThanOrEqual;
        date_time_terms[1].use_for_searching = true;
    }
    Ok(())
}

/// Accept a bare date by extending it to the start of that day.
fn normalize_date(value: &str) -> String {
    if value.len() == 10 {
        format!("{value} 00:00:00")
    } else {
        value.to_string()
    }
}

/// Parse a "--term" spec into (label, operator, value).
fn parse_term_spec(spec: &str) -> Result<(String, TermOperator, String)> {
    let mut parts = spec.splitn(3, char::is_whitespace);
    let (Some(label), Some(symbol)) = (parts.next(), parts.next()) else {
        bail!("Invalid --term {spec:?}; expected \"Label OP value\"");
    };
    let Some(operator) = TermOperator::from_symbol(symbol) else {
        bail!("Unknown operator {symbol:?} in --term {spec:?}");
    };
    let value = parts.next().unwrap_or("").trim().to_string();
    Ok((label.to_string(), operator, value))
}

/// Apply one "--term" spec to the matching search term.
fn apply_term_spec(selection: &mut Selection, spec: &str) -> Result<()> {
    let (label, operator, value) = parse_term_spec(spec)?;
    let Some(term) = selection.search_terms.iter_mut().find(|t| {
        t.data_label.eq_ignore_ascii_case(&label) || t.label.eq_ignore_ascii_case(&label)
    }) else {
        bail!("No field named {label:?}; run `cts terms` to list them");
    };
    term.operator = operator;
    term.database_value = value;
    term.use_for_searching = true;
    Ok(())
}

/// Resolve the "--sort" data labels against the sortable fields.
fn build_sort_terms(selection: &Selection, sort: &[String], desc: bool) -> Result<Vec<SortTerm>> {
    if sort.len() > 2 {
        bail!("At most two sort fields are supported");
    }
    let available = sort_terms_from_search_terms(&selection.search_terms);
    let mut sort_terms = Vec::new();
    for label in sort {
        let Some(found) = available
            .iter()
            .find(|t| t.data_label.eq_ignore_ascii_case(label))
        else {
            bail!("Cannot sort by {label:?}; run `cts terms` to list sortable fields");
        };
        let mut term = found.clone();
        term.ascending = !desc;
        sort_terms.push(term);
    }
    Ok(sort_terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_spec_parses_label_operator_value() {
        let (label, op, value) = parse_term_spec("Species = white-tailed deer").unwrap();
        assert_eq!(label, "Species");
        assert_eq!(op, TermOperator::Equal);
        assert_eq!(value, "white-tailed deer");
    }

    #[test]
    fn term_spec_allows_empty_value() {
        let (label, op, value) = parse_term_spec("Comments =").unwrap();
        assert_eq!(label, "Comments");
        assert_eq!(op, TermOperator::Equal);
        assert_eq!(value, "");
    }

    #[test]
    fn term_spec_rejects_unknown_operator() {
        assert!(parse_term_spec("Count0 ** 3").is_err());
    }

    #[test]
    fn bare_dates_extend_to_midnight() {
        assert_eq!(normalize_date("2024-06-01"), "2024-06-01 00:00:00");
        assert_eq!(normalize_date("2024-06-01 13:30:00"), "2024-06-01 13:30:00");
    }
}

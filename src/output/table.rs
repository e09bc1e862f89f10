use unicode_width::UnicodeWidthStr;

use crate::db::models::{DbStats, FileRow, ImportSummary};
use crate::select::sort::SortTerm;
use crate::select::Selection;

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Full path of a file record: relative path + file name.
fn full_path(file: &FileRow) -> String {
    if file.relative_path.is_empty() {
        file.file.clone()
    } else {
        format!("{}/{}", file.relative_path, file.file)
    }
}

/// Format selected files as a table.
pub fn print_file_results(files: &[FileRow]) {
    if files.is_empty() {
        println!("No matching files.");
        return;
    }

    println!(
        "{} file{}:\n",
        files.len(),
        if files.len() == 1 { "" } else { "s" }
    );

    // Header
    println!("  {:<8} {:<44} {:<20} {:<4}", "ID", "FILE", "DATE/TIME", "DEL");
    println!("  {}", "-".repeat(80));

    for file in files {
        println!(
            "  {:<8} {:<44} {:<20} {:<4}",
            file.id,
            truncate(&full_path(file), 42),
            file.date_time,
            if file.delete_flag.eq_ignore_ascii_case("true") { "yes" } else { "" },
        );
        let fields: Vec<String> = file
            .fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(label, value)| format!("{label}={value}"))
            .collect();
        if !fields.is_empty() {
            println!("  {}", truncate(&format!("  {}", fields.join("  ")), 80));
        }
    }
    println!();
}

/// List a selection's search terms, marking the active ones.
pub fn print_search_terms(selection: &Selection) {
    println!("Search terms (* = active):\n");
    println!(
        "  {:<3} {:<28} {:<14} {:<4} {}",
        "", "LABEL", "TYPE", "OP", "VALUE"
    );
    println!("  {}", "-".repeat(72));
    for term in &selection.search_terms {
        println!(
            "  {:<3} {:<28} {:<14} {:<4} {}",
            if term.use_for_searching { "*" } else { "" },
            truncate(&format!("{} ({})", term.label, term.data_label), 26),
            term.kind.as_str(),
            term.operator.symbol(),
            truncate(&term.database_value, 24),
        );
    }
    println!();
}

/// List the fields results can be sorted by.
pub fn print_sort_terms(sort_terms: &[SortTerm]) {
    println!("Sort fields:\n");
    for term in sort_terms {
        println!("  {:<20} {}", term.data_label, term.display_label);
    }
    println!();
}

/// Print the outcome of a recognizer import.
pub fn print_import_summary(summary: &ImportSummary) {
    println!(
        "Imported {} detection{} for {} file{} ({} unmatched image{})",
        summary.detections_imported,
        if summary.detections_imported == 1 { "" } else { "s" },
        summary.files_matched,
        if summary.files_matched == 1 { "" } else { "s" },
        summary.files_unmatched,
        if summary.files_unmatched == 1 { "" } else { "s" },
    );
}

/// Print database stats.
pub fn print_stats(stats: &DbStats) {
    println!("Database Statistics:");
    println!("  Files:                  {}", stats.files);
    println!("  Folders:                {}", stats.folders);
    println!("  Detections:             {}", stats.detections);
    println!("  Classified detections:  {}", stats.classified_detections);
    println!("  Template fields:        {}", stats.controls);
    println!("  DB Size:                {}", format_bytes(stats.db_size_bytes));
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

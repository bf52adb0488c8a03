//! CLI output formatting for run and output summaries.

use std::path::Path;

use drug_enricher::{OutputSummary, RunSummary, SinkPaths};

/// Lines printed at the end of a run.
pub(crate) fn run_summary_lines(summary: &RunSummary, sinks: &SinkPaths) -> Vec<String> {
    let mut lines = vec![
        format!("Input records:      {}", summary.total_input),
        format!("Already resolved:   {}", summary.already_resolved),
        format!("Processed:          {}", summary.processed),
        format!("  Complete:         {}", summary.complete),
        format!("  Incomplete:       {}", summary.incomplete),
    ];
    if summary.skipped_rows > 0 {
        lines.push(format!("Rows without code:  {}", summary.skipped_rows));
    }
    if summary.duplicates > 0 {
        lines.push(format!("Duplicate codes:    {}", summary.duplicates));
    }
    if summary.processed == 0 {
        lines.push("Nothing left to process; every record is already in an output table.".to_string());
    } else {
        lines.push(format!("Complete table:     {}", sinks.complete.display()));
        lines.push(format!("Incomplete table:   {}", sinks.incomplete.display()));
    }
    lines
}

/// Lines printed by the `summary` command.
pub(crate) fn output_summary_lines(
    summary: &OutputSummary,
    sinks: &SinkPaths,
    cache_table: &Path,
) -> Vec<String> {
    vec![
        count_line("Complete", summary.complete, &sinks.complete),
        count_line("Incomplete", summary.incomplete, &sinks.incomplete),
        count_line("Cache", summary.cache, cache_table),
    ]
}

fn count_line(label: &str, rows: Option<usize>, path: &Path) -> String {
    match rows {
        Some(rows) => format!("{label:<11} {rows:>6} rows  {}", path.display()),
        None => format!("{label:<11} {:>6}       {} (absent)", "-", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_lines_include_counts() {
        let summary = RunSummary {
            total_input: 5,
            already_resolved: 2,
            processed: 3,
            complete: 1,
            incomplete: 2,
            ..RunSummary::default()
        };
        let lines = run_summary_lines(&summary, &SinkPaths::in_dir(Path::new("out")));

        assert!(lines.iter().any(|line| line.contains("Already resolved") && line.ends_with('2')));
        assert!(lines.iter().any(|line| line.contains("Incomplete:") && line.ends_with('2')));
        assert!(lines.iter().any(|line| line.contains("drug_info_extracted_final.csv")));
    }

    #[test]
    fn test_run_summary_lines_nothing_to_do() {
        let summary = RunSummary {
            total_input: 2,
            already_resolved: 2,
            ..RunSummary::default()
        };
        let lines = run_summary_lines(&summary, &SinkPaths::in_dir(Path::new("out")));
        assert!(lines.iter().any(|line| line.contains("Nothing left")));
    }

    #[test]
    fn test_output_summary_lines_marks_absent_files() {
        let summary = OutputSummary {
            complete: Some(4),
            incomplete: None,
            cache: None,
        };
        let lines = output_summary_lines(
            &summary,
            &SinkPaths::in_dir(Path::new("out")),
            Path::new("out/cache.csv"),
        );
        assert!(lines[0].contains("4 rows"));
        assert!(lines[1].contains("(absent)"));
        assert!(lines[2].contains("cache.csv"));
    }
}

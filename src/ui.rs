use colored::Colorize;
use patchkit::{CleanupReport, UpdateReport};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

/// One-line summary of an update pass
pub fn summarize(report: &UpdateReport) -> String {
    let mut parts = Vec::new();
    for (count, label) in [
        (report.added, "added"),
        (report.updated, "updated"),
        (report.deleted, "deleted"),
        (report.merged, "merged"),
        (report.scripts_run, "script(s) run"),
        (report.scripts_skipped, "script(s) skipped"),
    ] {
        if count > 0 {
            parts.push(format!("{count} {label}"));
        }
    }
    if parts.is_empty() {
        "no changes".to_string()
    } else {
        parts.join(", ")
    }
}

/// Print the counters of an update pass
pub fn report(report: &UpdateReport) {
    kv("Added", &report.added.to_string());
    kv("Updated", &report.updated.to_string());
    kv("Deleted", &report.deleted.to_string());
    kv("Merged", &report.merged.to_string());
    kv("Scripts run", &report.scripts_run.to_string());
    if report.scripts_skipped > 0 {
        kv("Scripts skipped", &report.scripts_skipped.to_string());
    }
    if report.backups_recorded > 0 {
        kv("Backups recorded", &report.backups_recorded.to_string());
    }
}

/// One-line summary of a cleanup pass
pub fn summarize_cleanup(report: &CleanupReport) -> String {
    let mut line = format!(
        "{} file(s), {} dir(s) removed",
        report.files_removed, report.dirs_removed
    );
    if report.failures > 0 {
        line.push_str(&format!(", {} failure(s)", report.failures));
    }
    line
}

/// Truncate a path string for display, keeping the end
pub fn truncate_path(path: &str, max_len: usize) -> String {
    let len = path.chars().count();
    if len <= max_len {
        path.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = path.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_empty_report() {
        assert_eq!(summarize(&UpdateReport::default()), "no changes");
    }

    #[test]
    fn test_summarize_skips_zero_counts() {
        let report = UpdateReport {
            added: 2,
            merged: 1,
            scripts_run: 3,
            ..Default::default()
        };
        assert_eq!(summarize(&report), "2 added, 1 merged, 3 script(s) run");
    }

    #[test]
    fn test_summarize_cleanup_mentions_failures() {
        let report = CleanupReport {
            files_removed: 4,
            dirs_removed: 1,
            failures: 2,
            root_removed: false,
        };
        assert_eq!(
            summarize_cleanup(&report),
            "4 file(s), 1 dir(s) removed, 2 failure(s)"
        );
    }

    #[test]
    fn test_truncate_path_long() {
        assert_eq!(
            truncate_path("/very/long/path/to/file.txt", 15),
            ".../to/file.txt"
        );
    }

    #[test]
    fn test_truncate_path_edge_cases() {
        assert_eq!(truncate_path("short", 10), "short");
        assert_eq!(truncate_path("test", 3), "...");
        assert_eq!(truncate_path("", 10), "");
    }
}

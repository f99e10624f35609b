//! CLI output formatting and display helpers.

use mediadl_core::RunSummary;

/// Message when no input was provided at all.
pub const NO_INPUT_GUIDANCE: &str = "No input provided. Pipe URLs via stdin or pass as arguments.";

/// Message when stdin was piped but held no URLs.
pub const EMPTY_STDIN_GUIDANCE: &str =
    "No URLs found in stdin input. Pipe text containing http(s) URLs, or pass them as arguments.";

/// Example for piping input.
pub const INPUT_PIPE_EXAMPLE: &str = "Example: echo 'https://youtu.be/dQw4w9WgXcQ' | mediadl";

/// Example for passing URLs as arguments.
pub const INPUT_ARG_EXAMPLE: &str = "Example: mediadl --audio-only https://youtu.be/dQw4w9WgXcQ";

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Prints quick-start guidance to stdout (no input, or stdin without URLs).
pub fn print_quick_start_guidance(stdin_without_urls: bool) {
    let width = terminal_width().min(80);
    let headline = if stdin_without_urls {
        EMPTY_STDIN_GUIDANCE
    } else {
        NO_INPUT_GUIDANCE
    };
    for line in [headline, INPUT_PIPE_EXAMPLE, INPUT_ARG_EXAMPLE] {
        println!("{}", truncate_to_width(line, width));
    }
}

/// Lines of the end-of-run summary.
pub fn completion_summary_lines(summary: &RunSummary, width: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "{} completed, {} failed, {} cancelled, {} rejected, {} already downloaded",
        summary.completed, summary.failed, summary.cancelled, summary.rejected, summary.duplicates
    )];
    for (_, path) in &summary.finished {
        lines.push(truncate_to_width(&format!("  ✓ {}", path.display()), width));
    }
    for (url, message) in &summary.problems {
        // Classified messages may span lines; keep only the headline here.
        let headline = message.lines().next().unwrap_or_default();
        lines.push(truncate_to_width(&format!("  ✗ {url}: {headline}"), width));
    }
    lines
}

/// Prints the end-of-run summary to stdout.
pub fn print_completion_summary(summary: &RunSummary) {
    for line in completion_summary_lines(summary, terminal_width()) {
        println!("{line}");
    }
}

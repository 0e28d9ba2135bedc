// Terminal Output
// Sweep progress lines on stderr; forwarded engine stdout stays on stdout

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Wrap `text` in an ANSI style
fn paint(style: &str, text: &str) -> String {
    format!("{}{}{}", style, text, RESET)
}

/// Task line with a right-aligned verb such as "Running" or "Would run"
pub fn status(action: &str, message: &str) {
    eprintln!("{} {}", paint("\x1b[1;36m", &format!("{:>12}", action)), message);
}

/// Completed task or finished sweep
pub fn success(message: &str) {
    eprintln!("{} {}", paint("\x1b[1;32m", "  \u{2713}"), message);
}

/// Failed task, with its reason
pub fn failure(message: &str) {
    eprintln!("{} {}", paint("\x1b[1;31m", "  \u{2717}"), message);
}

/// Task that did not run: output already present or input missing
pub fn skip(message: &str) {
    eprintln!("{} {}", paint(YELLOW, "  -"), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", paint(YELLOW, "  !"), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", paint(CYAN, "  i"), message);
}

/// Secondary detail such as a log path or a queued task
pub fn dim(message: &str) {
    eprintln!("{}", paint(DIM, message));
}

/// Per-stage tally when every task succeeded or was skipped
pub fn dim_success(message: &str) {
    eprintln!("{}", paint(GREEN, message));
}

/// Per-stage tally when some task failed
pub fn dim_failure(message: &str) {
    eprintln!("{}", paint(RED, message));
}

pub fn stage_header(stage: &str, total_tasks: usize) {
    eprintln!("{}", stage_banner(stage, total_tasks));
}

fn stage_banner(stage: &str, total_tasks: usize) -> String {
    format!(
        "{} '{}' ({} tasks)",
        paint("\x1b[1;34m", "  Stage"),
        stage,
        total_tasks
    )
}

/// A stdout line of a running engine, forwarded in verbose mode
pub fn engine_output(line: &str) {
    println!("{}", engine_line(line));
}

/// A stderr line of an engine, or one line of a failed task's stderr tail
pub fn engine_error(line: &str) {
    eprintln!("{}", paint(RED, &engine_line(line)));
}

fn engine_line(line: &str) -> String {
    format!("        | {}", line)
}

/// Sweep totals
pub fn header(message: &str) {
    eprintln!("{}", paint(BOLD, &format!("==> {}", message)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_banner_names_stage_and_task_count() {
        let banner = stage_banner("digitize", 12);
        assert!(banner.contains("'digitize'"));
        assert!(banner.ends_with("(12 tasks)"));
    }

    #[test]
    fn test_engine_lines_are_indented() {
        assert_eq!(engine_line("Event 42 done"), "        | Event 42 done");
    }

    #[test]
    fn test_paint_resets_style() {
        assert_eq!(paint(RED, "x"), "\x1b[31mx\x1b[0m");
    }
}

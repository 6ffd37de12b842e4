use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{Action, EntityKind, ExecuteSummary, Reporter, Verb};

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

/// Marker for a planned action: `+` for creations, `→` otherwise
fn action_marker(verb: Verb) -> &'static str {
    if verb.is_creation() { "+" } else { "→" }
}

/// Print a planned action
pub fn action(action: &Action) {
    let marker = action_marker(action.verb);
    if action.verb.is_creation() {
        println!("  {} {}", marker.green(), action);
    } else {
        println!("  {} {}", marker.cyan(), action);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Reporter that draws a progress bar while actions run
///
/// Planning messages go to the log; in quiet mode nothing is drawn.
pub struct ConsoleReporter {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn bar(&mut self, total: usize) -> &ProgressBar {
        let quiet = self.quiet;
        self.bar.get_or_insert_with(|| {
            let pb = if quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new(total as u64)
            };
            pb.set_style(bar_style());
            pb
        })
    }
}

impl Reporter for ConsoleReporter {
    fn checking(&mut self, kind: EntityKind, name: &str) {
        log::info!("Checking {kind} {name}");
    }

    fn need(&mut self, kind: EntityKind, name: &str, what: &str) {
        log::info!("{kind} {name}: {what}");
    }

    fn action_started(&mut self, _index: usize, total: usize, action: &Action) {
        let pb = self.bar(total);
        pb.set_message(action.target.name().to_string());
    }

    fn action_finished(&mut self, action: &Action, error: Option<&str>) {
        let quiet = self.quiet;
        let Some(pb) = &self.bar else {
            return;
        };
        match error {
            Some(e) => pb.suspend(|| {
                eprintln!("  {} {} ({})", "✗".red(), action, e);
            }),
            None if !quiet => pb.suspend(|| {
                println!("  {} {}", "✓".green(), action);
            }),
            None => {}
        }
        pb.inc(1);
    }

    fn summary(&mut self, _summary: &ExecuteSummary) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

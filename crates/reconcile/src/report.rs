//! Progress reporting
//!
//! These traits let the engine report what it does without depending on a
//! particular output device.

use crate::schema::EntityKind;
use crate::types::{Action, ExecuteSummary};

/// Progress callback for planning and execution
pub trait Reporter {
    /// Called when live state of an entity is about to be checked
    fn checking(&mut self, kind: EntityKind, name: &str);

    /// Called when an entity needs work, with a short description of it
    fn need(&mut self, kind: EntityKind, name: &str, what: &str);

    /// Called before an action runs; `index` is 1-based
    fn action_started(&mut self, index: usize, total: usize, action: &Action);

    /// Called after an action ran; `error` is set when it failed
    fn action_finished(&mut self, action: &Action, error: Option<&str>);

    /// Called once execution stops
    fn summary(&mut self, summary: &ExecuteSummary);
}

/// No-op reporter
pub struct NoReport;

impl Reporter for NoReport {
    fn checking(&mut self, _kind: EntityKind, _name: &str) {}
    fn need(&mut self, _kind: EntityKind, _name: &str, _what: &str) {}
    fn action_started(&mut self, _index: usize, _total: usize, _action: &Action) {}
    fn action_finished(&mut self, _action: &Action, _error: Option<&str>) {}
    fn summary(&mut self, _summary: &ExecuteSummary) {}
}

/// Reporter forwarding everything to the `log` facade
pub struct LogReporter;

impl Reporter for LogReporter {
    fn checking(&mut self, kind: EntityKind, name: &str) {
        log::debug!("Checking {kind} {name}");
    }

    fn need(&mut self, kind: EntityKind, name: &str, what: &str) {
        log::info!("{kind} {name}: {what}");
    }

    fn action_started(&mut self, index: usize, total: usize, action: &Action) {
        log::info!("[{index}/{total}] {action}");
    }

    fn action_finished(&mut self, action: &Action, error: Option<&str>) {
        match error {
            Some(e) => log::error!("{action} failed: {e}"),
            None => log::debug!("{action} done"),
        }
    }

    fn summary(&mut self, summary: &ExecuteSummary) {
        log::info!(
            "{} done, {} failed, {} not done",
            summary.done,
            summary.failed,
            summary.pending
        );
    }
}

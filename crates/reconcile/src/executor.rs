//! Execution engine - applies actions one at a time, stopping at the first failure

use crate::remote::Transport;
use crate::report::Reporter;
use crate::types::{Action, ExecuteSummary};
use std::collections::VecDeque;

/// Sequential, fail-fast action runner
///
/// Actions move from `pending` to `done` as they succeed. The first failure
/// is kept with its message and leaves every later action pending.
#[derive(Debug, Default)]
pub struct Executor {
    pending: VecDeque<Action>,
    done: Vec<Action>,
    error: Option<(Action, String)>,
    dry_run: bool,
}

impl Executor {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            pending: actions.into(),
            ..Default::default()
        }
    }

    /// Report every action as done without contacting the transport
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn pending(&self) -> impl Iterator<Item = &Action> {
        self.pending.iter()
    }

    pub fn done(&self) -> &[Action] {
        &self.done
    }

    /// The failed action and its error message
    pub fn error(&self) -> Option<(&Action, &str)> {
        self.error.as_ref().map(|(a, e)| (a, e.as_str()))
    }

    pub fn summary(&self) -> ExecuteSummary {
        ExecuteSummary {
            done: self.done.len(),
            failed: usize::from(self.error.is_some()),
            pending: self.pending.len(),
        }
    }

    /// Run pending actions until they are all done or one fails
    pub fn execute(
        &mut self,
        transport: &dyn Transport,
        reporter: &mut dyn Reporter,
    ) -> ExecuteSummary {
        let total = self.done.len() + self.pending.len();

        if self.error.is_none() {
            while let Some(action) = self.pending.pop_front() {
                let index = self.done.len() + 1;
                reporter.action_started(index, total, &action);

                let outcome = if self.dry_run {
                    Ok(())
                } else {
                    transport.apply(&action)
                };
                match outcome {
                    Ok(()) => {
                        reporter.action_finished(&action, None);
                        self.done.push(action);
                    }
                    Err(e) => {
                        let message = format!("{e:#}");
                        reporter.action_finished(&action, Some(&message));
                        log::debug!("Stopping after failed action {action}");
                        self.error = Some((action, message));
                        break;
                    }
                }
            }
        }

        let summary = self.summary();
        reporter.summary(&summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryTransport;
    use crate::report::NoReport;
    use crate::types::{Target, Verb};
    use serde_json::json;

    fn create(name: &str) -> Action {
        Action::new(
            Verb::CreateDatabase,
            Target::database(name),
            json!({"database-name": name}),
        )
    }

    #[test]
    fn test_execute_empty() {
        let mut executor = Executor::new(Vec::new());
        let summary = executor.execute(&MemoryTransport::new(), &mut NoReport);
        assert_eq!(summary.total(), 0);
        assert!(summary.is_success());
    }

    #[test]
    fn test_execute_all() {
        let transport = MemoryTransport::new();
        let mut executor = Executor::new(vec![create("a"), create("b")]);
        let summary = executor.execute(&transport, &mut NoReport);

        assert_eq!(summary.done, 2);
        assert!(summary.is_success());
        assert!(transport.database("b").is_some());
    }

    #[test]
    fn test_fail_fast() {
        let transport = MemoryTransport::new();
        transport.fail_on(Verb::CreateDatabase, "b", "HTTP 500: boom");
        let mut executor = Executor::new(vec![create("a"), create("b"), create("c")]);
        let summary = executor.execute(&transport, &mut NoReport);

        assert_eq!(
            summary,
            ExecuteSummary {
                done: 1,
                failed: 1,
                pending: 1
            }
        );
        assert_eq!(executor.done()[0].target.name(), "a");
        let (failed, message) = executor.error().unwrap();
        assert_eq!(failed.target.name(), "b");
        assert_eq!(message, "HTTP 500: boom");
        assert_eq!(executor.pending().next().unwrap().target.name(), "c");
        assert!(transport.database("c").is_none());

        let again = executor.execute(&transport, &mut NoReport);
        assert_eq!(again, summary);
    }

    #[test]
    fn test_dry_run_does_not_touch_transport() {
        let transport = MemoryTransport::new();
        transport.fail_on(Verb::CreateDatabase, "a", "should not be called");
        let mut executor = Executor::new(vec![create("a")]).dry_run(true);
        let summary = executor.execute(&transport, &mut NoReport);

        assert_eq!(summary.done, 1);
        assert!(transport.applied().is_empty());
        assert!(transport.database("a").is_none());
    }
}

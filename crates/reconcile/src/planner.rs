//! Action planner - turns a topology and live state into ordered actions

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::remote::Transport;
use crate::report::Reporter;
use crate::topology::Topology;
use crate::types::{Action, Verb};
use std::collections::HashSet;

/// Per-run planning state
///
/// Holds the collaborators and caches the forest catalog, which is fetched
/// at most once per run.
pub struct RunContext<'a> {
    transport: &'a dyn Transport,
    reporter: &'a mut dyn Reporter,
    forest_catalog: Option<HashSet<String>>,
}

impl<'a> RunContext<'a> {
    pub fn new(transport: &'a dyn Transport, reporter: &'a mut dyn Reporter) -> Self {
        Self {
            transport,
            reporter,
            forest_catalog: None,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport
    }

    pub fn reporter(&mut self) -> &mut dyn Reporter {
        self.reporter
    }

    /// Whether the remote system already knows a forest by this name
    pub fn forest_exists(&mut self, name: &str) -> Result<bool> {
        if self.forest_catalog.is_none() {
            let catalog = self
                .transport
                .fetch_forest_catalog()
                .map_err(Error::transport)?;
            log::debug!("Fetched forest catalog: {} forest(s)", catalog.len());
            self.forest_catalog = Some(catalog.into_iter().collect());
        }
        Ok(self
            .forest_catalog
            .as_ref()
            .is_some_and(|catalog| catalog.contains(name)))
    }
}

/// An ordered list of actions, plus the servers that cannot be reconciled
#[derive(Debug, Default)]
pub struct Plan {
    pub actions: Vec<Action>,
    /// Incompatible server changes; a plan with rejections is not executable
    pub rejections: Vec<Error>,
}

impl Plan {
    /// Check if there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_executable(&self) -> bool {
        self.rejections.is_empty()
    }

    /// Number of actions per verb, in first-seen order
    pub fn counts(&self) -> Vec<(Verb, usize)> {
        let mut counts: Vec<(Verb, usize)> = Vec::new();
        for action in &self.actions {
            match counts.iter_mut().find(|(v, _)| *v == action.verb) {
                Some((_, n)) => *n += 1,
                None => counts.push((action.verb, 1)),
            }
        }
        counts
    }

    /// Turn the plan into an executor, failing on the first rejection
    pub fn into_executor(self) -> Result<Executor> {
        match self.rejections.into_iter().next() {
            Some(rejection) => Err(rejection),
            None => Ok(Executor::new(self.actions)),
        }
    }
}

/// Plan every entity of a topology: databases in order, then servers
pub fn plan(topology: &Topology, ctx: &mut RunContext<'_>) -> Result<Plan> {
    let mut plan = Plan::default();

    for database in &topology.databases {
        plan.actions.extend(database.plan(ctx)?);
    }

    for server in &topology.servers {
        match server.plan(ctx) {
            Ok(actions) => plan.actions.extend(actions),
            Err(err @ Error::IncompatibleChange { .. }) => {
                log::warn!("Rejected server {}: {err}", server.name);
                plan.rejections.push(err);
            }
            Err(err) => return Err(err),
        }
    }

    log::debug!(
        "Planned {} action(s), {} rejection(s)",
        plan.actions.len(),
        plan.rejections.len()
    );
    Ok(plan)
}

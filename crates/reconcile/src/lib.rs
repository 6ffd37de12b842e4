//! # Reconcile
//!
//! Engine for keeping a topology of databases and application servers on a
//! remote system in line with a declarative description.
//!
//! ## Pipeline
//!
//! - **Project**: the root fragment and its transitive imports ([`project`])
//! - **Composition**: one list of databases and servers, merged or hidden
//!   per entity ([`compose`]), with `@{...}`/`${...}` references resolved
//!   ([`params`])
//! - **Linearization**: databases ordered so every link points backwards
//!   ([`graph`])
//! - **Validation**: properties parsed against typed schemas ([`schema`])
//! - **Planning**: live state fetched once per entity and diffed into an
//!   ordered action list ([`entity`], [`diff`], [`planner`])
//! - **Execution**: actions applied one by one, stopping at the first
//!   failure ([`executor`])
//!
//! ## Example
//!
//! ```
//! use reconcile::{Executor, MemorySource, MemoryTransport, NoReport, RunContext, Topology};
//! use serde_json::json;
//!
//! let source = MemorySource::new().with(
//!     "dev",
//!     json!({"dbtopo": {
//!         "format": "0.1",
//!         "databases": [{"name": "content", "forests": 2}]
//!     }}),
//! );
//! let topology = Topology::load(&source, "dev")?;
//!
//! let transport = MemoryTransport::new();
//! let mut reporter = NoReport;
//! let plan = topology.plan(&mut RunContext::new(&transport, &mut reporter))?;
//! assert_eq!(plan.len(), 3);
//!
//! let mut executor = plan.into_executor()?;
//! assert!(executor.execute(&transport, &mut reporter).is_success());
//! # Ok::<(), reconcile::Error>(())
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`ConfigSource`]: provides configuration fragments
//! - [`Transport`]: reads live state and applies actions
//! - [`Reporter`]: receives progress updates
//!
//! The engine itself never touches the file system or the network.

pub mod compose;
pub mod diff;
pub mod entity;
pub mod error;
pub mod executor;
pub mod graph;
pub mod params;
pub mod planner;
pub mod project;
pub mod remote;
pub mod report;
pub mod schema;
pub mod source;
pub mod topology;
pub mod types;

// Re-export main types at crate root
pub use compose::{ComposeMode, Composition};
pub use diff::{Change, diff};
pub use entity::{Database, Entity, EntityState, Forest, Server};
pub use error::{Error, ErrorCategory, Result};
pub use executor::Executor;
pub use graph::{EntityRef, Linearization, Linked, linearize};
pub use params::{Namespace, ParamStore, Reference};
pub use planner::{Plan, RunContext};
pub use project::{Fragment, Project};
pub use remote::{MemoryTransport, Transport};
pub use report::{LogReporter, NoReport, Reporter};
pub use schema::{EntityKind, NormalizedSet, PropValue, Schema};
pub use source::{ConfigSource, MemorySource};
pub use topology::Topology;
pub use types::{Action, ExecuteSummary, Target, Verb};

//! Error types for reconciliation.
//!
//! Every failure the engine can raise is one variant of [`Error`]. Variants are
//! grouped into [`ErrorCategory`] values so callers can pick exit codes and
//! advice without matching on every variant.

use std::fmt;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Parameter resolution, fragment format or composition problem.
    Config,
    /// Entities that cannot be put in a valid creation order.
    Graph,
    /// A property does not validate against its schema.
    Validation,
    /// Live state disagrees with desired state in a way that cannot be applied.
    Conflict,
    /// Config source or management transport failure.
    Remote,
}

impl ErrorCategory {
    /// Whether errors of this category happen before any remote mutation.
    #[must_use]
    pub fn is_pre_flight(&self) -> bool {
        !matches!(self, Self::Remote)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Config => "Invalid project configuration",
            Self::Graph => "Unsolvable entity dependencies",
            Self::Validation => "Invalid entity property",
            Self::Conflict => "Live state conflicts with configuration",
            Self::Remote => "Remote system error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Config => "Check parameters, imports and compose modes in the environment files",
            Self::Graph => {
                "Check that every schema/security/triggers/content/modules link points to a \
                 declared database"
            }
            Self::Validation => "Fix the property at the reported path",
            Self::Conflict => {
                "Change the live entity by hand or restore the previous value in the configuration"
            }
            Self::Remote => {
                "Fix the remote error, then run apply again; completed actions are not repeated"
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while composing, planning or executing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No parameter layer defines the referenced name.
    #[error("unresolved reference {sigil}{{{name}}}")]
    UnresolvedReference {
        /// `@` for the project namespace, `$` for parameters.
        sigil: char,
        /// Referenced name.
        name: String,
    },

    /// A value references itself while being resolved.
    #[error("parameter {sigil}{{{name}}} references itself")]
    SelfReference {
        /// `@` for the project namespace, `$` for parameters.
        sigil: char,
        /// Name being resolved.
        name: String,
    },

    /// A reference is not closed or its name is not a valid identifier.
    #[error("malformed reference in {text:?}: {reason}")]
    MalformedReference {
        /// The string that was being resolved.
        text: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The fragment does not carry a recognized format tag.
    #[error("unsupported fragment format in {locator}: {found}")]
    UnsupportedFormat {
        /// Fragment locator.
        locator: String,
        /// What was found instead of a known format.
        found: String,
    },

    /// Fragments cannot be composed.
    #[error("composition error: {0}")]
    Composition(String),

    /// Entities left uninstantiated after the linearization fixpoint.
    #[error("unresolved dependencies: {}", format_stuck(.databases, .servers))]
    UnresolvedDependency {
        /// Stuck databases, by id or name.
        databases: Vec<String>,
        /// Servers with an unresolvable link, by name.
        servers: Vec<String>,
    },

    /// An entity reference object is not well formed.
    #[error("invalid reference in {entity}.{field}: {reason}")]
    InvalidEntityRef {
        /// Entity owning the link.
        entity: String,
        /// Link field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A raw key has no matching schema node.
    #[error("unknown property {path} on {entity}")]
    UnknownProperty {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
    },

    /// A mandatory property has no value after defaulting.
    #[error("missing mandatory property {path} on {entity}")]
    MissingMandatoryProperty {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
    },

    /// Value outside of the enum's value set.
    #[error(
        "invalid value {value:?} for {path} on {entity}, expected one of: {}",
        .allowed.join(", ")
    )]
    InvalidEnumValue {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
        /// Offending value.
        value: String,
        /// Accepted values.
        allowed: Vec<String>,
    },

    /// Value is neither an integer nor a string of digits.
    #[error("invalid integer {value} for {path} on {entity}")]
    InvalidIntegerValue {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
        /// Offending value, as JSON.
        value: String,
    },

    /// Value is neither a boolean nor `"true"`/`"false"`.
    #[error("invalid boolean {value} for {path} on {entity}")]
    InvalidBooleanValue {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
        /// Offending value, as JSON.
        value: String,
    },

    /// A value has the wrong JSON shape (object, array or scalar).
    #[error("{path} on {entity} must be {expected}")]
    InvalidPropertyShape {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
        /// Expected shape.
        expected: &'static str,
    },

    /// A multiplexed item carries none of the variant discriminators.
    #[error("{path} on {entity} must have one of: {}", .expected.join(", "))]
    UnmatchedVariant {
        /// Entity being parsed.
        entity: String,
        /// Dotted property path.
        path: String,
        /// Discriminating keys that were looked for.
        expected: Vec<String>,
    },

    /// A schema definition is inconsistent.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// A frozen property differs from its live value.
    #[error("{entity}: property {property} cannot be changed (live {live}, desired {desired})")]
    FrozenPropertyConflict {
        /// Entity being diffed.
        entity: String,
        /// Property name.
        property: String,
        /// Live value, as JSON.
        live: String,
        /// Desired value, as JSON.
        desired: String,
    },

    /// A server change that cannot be applied to a live server.
    #[error("{entity}: {reason}")]
    IncompatibleChange {
        /// Server name.
        entity: String,
        /// Property that changed.
        property: String,
        /// Why it cannot be applied.
        reason: String,
    },

    /// The config source failed to provide a fragment.
    #[error("cannot load {locator}: {message}")]
    Source {
        /// Fragment locator.
        locator: String,
        /// Error message.
        message: String,
    },

    /// The management transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a composition error.
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    /// Create a transport error from any displayable failure.
    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport(format!("{err:#}"))
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnresolvedReference { .. }
            | Error::SelfReference { .. }
            | Error::MalformedReference { .. }
            | Error::UnsupportedFormat { .. }
            | Error::Composition(_) => ErrorCategory::Config,
            Error::UnresolvedDependency { .. } | Error::InvalidEntityRef { .. } => {
                ErrorCategory::Graph
            }
            Error::UnknownProperty { .. }
            | Error::MissingMandatoryProperty { .. }
            | Error::InvalidEnumValue { .. }
            | Error::InvalidIntegerValue { .. }
            | Error::InvalidBooleanValue { .. }
            | Error::InvalidPropertyShape { .. }
            | Error::UnmatchedVariant { .. }
            | Error::InvalidSchema(_) => ErrorCategory::Validation,
            Error::FrozenPropertyConflict { .. } | Error::IncompatibleChange { .. } => {
                ErrorCategory::Conflict
            }
            Error::Source { .. } | Error::Transport(_) => ErrorCategory::Remote,
        }
    }
}

fn format_stuck(databases: &[String], servers: &[String]) -> String {
    let mut parts = Vec::new();
    if !databases.is_empty() {
        parts.push(format!("databases [{}]", databases.join(", ")));
    }
    if !servers.is_empty() {
        parts.push(format!("servers [{}]", servers.join(", ")));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_pre_flight() {
        assert!(ErrorCategory::Config.is_pre_flight());
        assert!(ErrorCategory::Graph.is_pre_flight());
        assert!(ErrorCategory::Validation.is_pre_flight());
        assert!(ErrorCategory::Conflict.is_pre_flight());
        assert!(!ErrorCategory::Remote.is_pre_flight());
    }

    #[test]
    fn test_error_category_text() {
        assert!(!ErrorCategory::Graph.description().is_empty());
        assert!(!ErrorCategory::Graph.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Remote).contains("Remote"));
    }

    #[test]
    fn test_unresolved_dependency_lists_everything() {
        let err = Error::UnresolvedDependency {
            databases: vec!["a".to_string(), "b".to_string()],
            servers: vec!["app".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Graph);
        let display = err.to_string();
        assert!(display.contains("databases [a, b]"));
        assert!(display.contains("servers [app]"));
    }

    #[test]
    fn test_reference_display() {
        let err = Error::UnresolvedReference {
            sigil: '$',
            name: "port".to_string(),
        };
        assert_eq!(err.to_string(), "unresolved reference ${port}");
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_enum_display() {
        let err = Error::InvalidEnumValue {
            entity: "server app".to_string(),
            path: "type".to_string(),
            value: "ftp".to_string(),
            allowed: vec!["http".to_string(), "xdbc".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains("expected one of: http, xdbc"));
    }

    #[test]
    fn test_transport_constructor() {
        let err = Error::transport(anyhow::anyhow!("HTTP 500"));
        assert!(matches!(err, Error::Transport(ref m) if m == "HTTP 500"));
        assert_eq!(err.category(), ErrorCategory::Remote);
    }
}

//! Error types for the component model.
//!
//! Everything here is a construction error: a resource, component or
//! manifest has the wrong shape. None of these are worth retrying.

use thiserror::Error;

/// Errors raised while building or loading components.
#[derive(Debug, Error)]
pub enum Error {
    /// Resource failed its shape checks
    #[error("invalid resource {path:?} in {parent:?}: {reason}")]
    InvalidResource {
        /// Logical path of the offending resource
        path: String,
        /// Owning component name
        parent: String,
        /// What was wrong with it
        reason: String,
    },

    /// A resource with this path already exists in the set
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// Component failed its shape checks
    #[error("invalid component {name:?}: {reason}")]
    InvalidComponent {
        /// Component name (possibly empty)
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// Resource kind name not recognised
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// Quadlet unit could not be parsed
    #[error("invalid unit file {path} at line {line}: {message}")]
    UnitParse {
        /// Logical path of the unit
        path: String,
        /// Line number (1-indexed)
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// Template referenced a variable nobody defined
    #[error("template {path} references undefined variable {variable:?}")]
    MissingVariable {
        /// Logical path of the template
        path: String,
        /// Variable name as written in the template
        variable: String,
    },

    /// MANIFEST.toml parse error
    #[error("invalid manifest for {component}: {source}")]
    Manifest {
        /// Component the manifest belongs to
        component: String,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_resource(
        path: impl Into<String>,
        parent: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidResource {
            path: path.into(),
            parent: parent.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_component(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidComponent {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for component operations.
pub type Result<T> = std::result::Result<T, Error>;

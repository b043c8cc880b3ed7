//! Error types for cluster-gitops
//!
//! Git and Flux failures carry the operation that failed so callers can
//! tell which step of a multi-step bootstrap left state behind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// One or more pre-flight validations failed
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A git working copy operation failed
    #[error("git {operation} failed: {message}")]
    GitError { operation: String, message: String },

    /// An external tool (flux, kubectl) exited unsuccessfully
    #[error("command `{command}` failed: {message}")]
    CommandError { command: String, message: String },

    /// HTTP request to the git hosting API failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// CA generation failed
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// YAML/JSON rendering or parsing failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The operation's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// An error annotated with the step and subject that produced it
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Annotate this error with the operation and subject involved.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Error::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any `Wrapped` layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Wrapped { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the API server answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::KubeError(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// True when the API server answered 409 (a concurrent create won).
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Error::KubeError(kube::Error::Api(resp)) if resp.code == 409)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

//! Error types for the resolution engine.

use std::fmt;

/// Failure of a single disposer while closing a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalFailure {
    /// Service whose disposer failed
    pub service: String,
    /// Rendered error or panic message
    pub message: String,
}

impl fmt::Display for DisposalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.message)
    }
}

/// Dependency injection errors.
///
/// Every failure is reported synchronously to the caller of a registration or
/// resolution; the engine never recovers silently except for dependencies the
/// caller marked optional.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{DiError, ServiceCollection, Resolver};
///
/// let provider = ServiceCollection::new().build();
/// match provider.get::<String>() {
///     Err(DiError::ServiceNotRegistered { service }) => {
///         assert_eq!(service, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiError {
    /// A second default registration was attempted under `IfAlreadyRegistered::Throw`
    #[error("Unable to register duplicate default for {service_type}")]
    DuplicateDefaultRegistration { service_type: String },

    /// No eligible candidate for a required resolution
    #[error("Service not registered: {service}")]
    ServiceNotRegistered { service: String },

    /// The request appears among its own ancestors (full path included)
    #[error("Recursive dependency detected: {}", path.join(" -> "))]
    RecursiveDependencyDetected { path: Vec<String> },

    /// More than one registration answers the same explicit key
    #[error("Ambiguous registrations for {service} with key {key}")]
    AmbiguousKeyedRegistration { service: String, key: String },

    /// The inner resolution of a wrapper shape failed
    #[error("Unable to construct {wrapper}: {source}")]
    WrapperConstructionFailed {
        wrapper: String,
        #[source]
        source: Box<DiError>,
    },

    /// Downcast of a resolved instance failed
    #[error("Type mismatch for {service}: expected {expected}")]
    TypeMismatch { service: String, expected: &'static str },

    /// Scoped service resolved outside of any scope
    #[error("No current scope available to resolve scoped service {service}")]
    NoCurrentScope { service: String },

    /// `ScopedTo(name)` service resolved without an enclosing scope of that name
    #[error("No enclosing scope named {scope} for {service}")]
    NoMatchingScope { service: String, scope: String },

    /// A cached service depends on a shorter-lived one
    #[error("{consumer} ({consumer_lifetime}) depends on {dependency} with shorter lifetime {dependency_lifetime}")]
    CaptiveDependency {
        consumer: String,
        consumer_lifetime: String,
        dependency: String,
        dependency_lifetime: String,
    },

    /// Maximum recursion depth exceeded
    #[error("Max resolution depth {0} exceeded")]
    DepthExceeded(usize),

    /// The scope (or provider) was already closed
    #[error("Scope is disposed")]
    ScopeDisposed,

    /// Registration is malformed
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    /// Container rules could not be loaded
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A factory reported a failure of its own
    #[error("Factory for {service} failed: {message}")]
    FactoryFailed { service: String, message: String },

    /// One or more disposers failed while closing a scope
    #[error("{} disposer(s) failed: {}", .0.len(), render_failures(.0))]
    DisposalFailed(Vec<DisposalFailure>),
}

fn render_failures(failures: &[DisposalFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl DiError {
    /// Error to return from a factory that cannot produce its instance.
    pub fn factory(service: impl fmt::Display, message: impl fmt::Display) -> Self {
        DiError::FactoryFailed {
            service: service.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn not_registered(service: impl fmt::Display) -> Self {
        DiError::ServiceNotRegistered {
            service: service.to_string(),
        }
    }

    pub(crate) fn wrapper(wrapper: impl fmt::Display, source: DiError) -> Self {
        DiError::WrapperConstructionFailed {
            wrapper: wrapper.to_string(),
            source: Box::new(source),
        }
    }

    /// Follows `WrapperConstructionFailed` chains down to the originating error.
    pub fn root_cause(&self) -> &DiError {
        let mut current = self;
        while let DiError::WrapperConstructionFailed { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Result type for DI operations
pub type DiResult<T> = Result<T, DiError>;

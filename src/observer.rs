//! Diagnostic observers for resolution traceability.
//!
//! Observers receive resolution, plan and scope events synchronously. The
//! provider only pays for event construction when at least one observer is
//! registered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::DiError;
use crate::key::ServiceIdentity;
use crate::plan::PlanNode;

/// Observer trait for resolution events.
///
/// # Performance
///
/// Observer calls are made synchronously during resolution. Keep implementations
/// lightweight.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{DiObserver, ServiceCollection, ServiceIdentity, Resolver};
/// use parking_lot::Mutex;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Recorder {
///     resolved: Mutex<Vec<String>>,
/// }
///
/// impl DiObserver for Recorder {
///     fn resolving(&self, _service: &ServiceIdentity) {}
///
///     fn resolved(&self, service: &ServiceIdentity, _duration: Duration) {
///         self.resolved.lock().push(service.to_string());
///     }
/// }
///
/// let recorder = Arc::new(Recorder::default());
/// let mut services = ServiceCollection::new();
/// services.add_singleton(42u32);
/// services.add_observer(recorder.clone());
///
/// let provider = services.build();
/// provider.get_required::<u32>();
/// assert_eq!(*recorder.resolved.lock(), ["u32"]);
/// ```
pub trait DiObserver: Send + Sync {
    /// A root resolution started.
    fn resolving(&self, service: &ServiceIdentity);

    /// A root resolution completed.
    fn resolved(&self, service: &ServiceIdentity, duration: Duration);

    /// A root resolution failed.
    fn failed(&self, service: &ServiceIdentity, error: &DiError) {
        let _ = (service, error);
    }

    /// A plan was built for a root request (cache miss).
    fn plan_built(&self, service: &ServiceIdentity, plan: &PlanNode) {
        let _ = (service, plan);
    }

    /// A scope closed after running `disposed` disposal hooks.
    fn scope_closed(&self, scope: Option<&str>, disposed: usize) {
        let _ = (scope, disposed);
    }
}

/// Collection of observers for efficient dispatch.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn DiObserver>>,
}

impl Observers {
    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    #[inline]
    pub(crate) fn resolving(&self, service: &ServiceIdentity) {
        for observer in &self.observers {
            observer.resolving(service);
        }
    }

    #[inline]
    pub(crate) fn resolved(&self, service: &ServiceIdentity, duration: Duration) {
        for observer in &self.observers {
            observer.resolved(service, duration);
        }
    }

    #[inline]
    pub(crate) fn failed(&self, service: &ServiceIdentity, error: &DiError) {
        for observer in &self.observers {
            observer.failed(service, error);
        }
    }

    #[inline]
    pub(crate) fn plan_built(&self, service: &ServiceIdentity, plan: &PlanNode) {
        for observer in &self.observers {
            observer.plan_built(service, plan);
        }
    }

    #[inline]
    pub(crate) fn scope_closed(&self, scope: Option<&str>, disposed: usize) {
        for observer in &self.observers {
            observer.scope_closed(scope, disposed);
        }
    }
}

/// Observer forwarding every event to `tracing`.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{LoggingObserver, ServiceCollection};
/// use std::sync::Arc;
///
/// let mut services = ServiceCollection::new();
/// services.add_observer(Arc::new(LoggingObserver::with_prefix("[app]")));
/// let provider = services.build();
/// ```
pub struct LoggingObserver {
    prefix: String,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "[ferrous-ioc]".to_string(),
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl DiObserver for LoggingObserver {
    fn resolving(&self, service: &ServiceIdentity) {
        trace!("{} Resolving: {}", self.prefix, service);
    }

    fn resolved(&self, service: &ServiceIdentity, duration: Duration) {
        debug!("{} Resolved: {} in {:?}", self.prefix, service, duration);
    }

    fn failed(&self, service: &ServiceIdentity, error: &DiError) {
        warn!("{} Failed to resolve {}: {}", self.prefix, service, error);
    }

    fn plan_built(&self, service: &ServiceIdentity, plan: &PlanNode) {
        debug!("{} Plan for {}: {}", self.prefix, service, plan);
    }

    fn scope_closed(&self, scope: Option<&str>, disposed: usize) {
        debug!(
            "{} Scope {} closed, {} disposal(s)",
            self.prefix,
            scope.unwrap_or("<unnamed>"),
            disposed
        );
    }
}

/// Counts resolutions, failures and plan builds.
#[derive(Default)]
pub struct MetricsObserver {
    resolutions: AtomicU64,
    failures: AtomicU64,
    plans_built: AtomicU64,
    total_resolution_nanos: AtomicU64,
}

impl MetricsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution_count(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn plans_built(&self) -> u64 {
        self.plans_built.load(Ordering::Relaxed)
    }

    pub fn average_resolution_time(&self) -> Option<Duration> {
        let count = self.resolution_count();
        if count == 0 {
            return None;
        }
        let total = self.total_resolution_nanos.load(Ordering::Relaxed);
        Some(Duration::from_nanos(total / count))
    }
}

impl DiObserver for MetricsObserver {
    fn resolving(&self, _service: &ServiceIdentity) {}

    fn resolved(&self, _service: &ServiceIdentity, duration: Duration) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_resolution_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn failed(&self, _service: &ServiceIdentity, _error: &DiError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn plan_built(&self, _service: &ServiceIdentity, _plan: &PlanNode) {
        self.plans_built.fetch_add(1, Ordering::Relaxed);
    }
}

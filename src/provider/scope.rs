//! Scope tree nodes: per-scope instance caches, ownership and disposal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, debug_span, warn};

use super::materialize::materialize;
use super::ProviderShared;
use crate::error::{DiError, DiResult};
use crate::internal::{Disposal, DisposeBag, InstanceCache};
use crate::key::{ServiceIdentity, ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::registration::AnyArc;
use crate::request::ResolutionRequest;
use crate::traits::{Resolver, ResolverCore};

/// Lifetime scope: an instance cache plus the disposal hooks of the instances it
/// owns.
///
/// Scopes form a tree. The root is owned by the [`ServiceProvider`](crate::ServiceProvider)
/// and holds singletons; nested scopes hold scoped instances and may carry a name
/// that `ScopedTo` lifetimes look for.
///
/// Where an instance is cached:
///
/// - `Singleton`: the root
/// - `Scoped`: the scope resolving it; resolving at the root fails
/// - `ScopedTo(name)`: the nearest enclosing scope called `name`
/// - `Transient`: nowhere, but its disposer still goes to the resolving scope
///
/// ```
/// use ferrous_ioc::{Resolver, ServiceCollection};
/// use std::sync::Arc;
///
/// struct Unit;
///
/// let mut services = ServiceCollection::new();
/// services.add_scoped_to_factory::<Unit, _>("request", |_| Unit);
///
/// let provider = services.build();
/// let request = provider.create_named_scope("request");
/// let handler = request.create_scope();
///
/// assert!(Arc::ptr_eq(&handler.get_required::<Unit>(), &request.get_required::<Unit>()));
/// assert!(provider.create_scope().get::<Unit>().is_err());
/// ```
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Arc<ScopeInner>,
}

impl Scope {
    /// Opens a scope nested in this one.
    pub fn create_scope(&self) -> Scope {
        Scope {
            inner: self.inner.open_child(None),
        }
    }

    /// Opens a nested scope named `name`, the owner of `ScopedTo(name)` services
    /// resolved beneath it.
    pub fn create_named_scope(&self, name: impl Into<Arc<str>>) -> Scope {
        Scope {
            inner: self.inner.open_child(Some(name.into())),
        }
    }

    /// Disposes the instances this scope owns, last created first.
    ///
    /// Closing twice is a no-op. Every disposer runs even when some fail; the
    /// failures are returned together.
    pub fn close(&self) -> DiResult<()> {
        self.inner.close()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl ResolverCore for Scope {
    fn resolve(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> DiResult<AnyArc> {
        self.inner.resolve_required(service_type, service_key)
    }

    fn try_resolve(
        &self,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
    ) -> DiResult<Option<AnyArc>> {
        self.inner.resolve_root(service_type, service_key, false)
    }

    fn push_disposer(&self, service: &str, disposer: Disposal) {
        self.inner.track(service, disposer);
    }
}

impl Resolver for Scope {}

pub(crate) struct ScopeInner {
    pub(crate) shared: Arc<ProviderShared>,
    parent: Option<Arc<ScopeInner>>,
    name: Option<Arc<str>>,
    id: u64,
    pub(crate) instances: InstanceCache,
    disposers: Mutex<DisposeBag>,
    closed: AtomicBool,
}

impl ScopeInner {
    pub(crate) fn root(shared: Arc<ProviderShared>) -> Arc<Self> {
        let id = shared.next_scope_id();
        Arc::new(Self {
            shared,
            parent: None,
            name: None,
            id,
            instances: InstanceCache::default(),
            disposers: Mutex::new(DisposeBag::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn open_child(self: &Arc<Self>, name: Option<Arc<str>>) -> Arc<Self> {
        let id = self.shared.next_scope_id();
        debug!(scope_id = id, parent_id = self.id, name = ?name, "Scope opened");
        Arc::new(Self {
            shared: self.shared.clone(),
            parent: Some(self.clone()),
            name,
            id,
            instances: InstanceCache::default(),
            disposers: Mutex::new(DisposeBag::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails once this scope or any enclosing one is closed.
    pub(crate) fn ensure_open(&self) -> DiResult<()> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.is_closed() {
                return Err(DiError::ScopeDisposed);
            }
            current = scope.parent.as_deref();
        }
        Ok(())
    }

    fn root_scope(self: &Arc<Self>) -> &Arc<Self> {
        let mut current = self;
        while let Some(parent) = &current.parent {
            current = parent;
        }
        current
    }

    /// The scope that caches instances of `lifetime`; `None` for transients.
    pub(crate) fn owner_for(
        self: &Arc<Self>,
        lifetime: &Lifetime,
        service: &ServiceType,
    ) -> DiResult<Option<&Arc<Self>>> {
        match lifetime {
            Lifetime::Transient => Ok(None),
            Lifetime::Singleton => Ok(Some(self.root_scope())),
            Lifetime::Scoped if self.parent.is_none() => Err(DiError::NoCurrentScope {
                service: service.to_string(),
            }),
            Lifetime::Scoped => Ok(Some(self)),
            Lifetime::ScopedTo(wanted) => {
                let mut current = self;
                loop {
                    if current.name.as_deref() == Some(&**wanted) {
                        return Ok(Some(current));
                    }
                    match &current.parent {
                        Some(parent) => current = parent,
                        None => {
                            return Err(DiError::NoMatchingScope {
                                service: service.to_string(),
                                scope: wanted.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// Whether instances of `lifetime` built here get their disposer tracked.
    pub(crate) fn tracks(&self, lifetime: &Lifetime) -> bool {
        self.parent.is_some() || *lifetime != Lifetime::Transient || self.shared.rules.track_root_transients
    }

    /// Hooks arriving once the scope has closed run at once.
    pub(crate) fn track(&self, service: &str, disposal: Disposal) {
        let mut bag = self.disposers.lock();
        if !self.is_closed() {
            bag.push(service, disposal);
            return;
        }
        drop(bag);

        let mut late = DisposeBag::default();
        late.push(service, disposal);
        for failure in late.run_all_reverse() {
            warn!(scope_id = self.id, service = %failure.service, "Disposal failed: {}", failure.message);
        }
    }

    pub(crate) fn resolve_required(
        self: &Arc<Self>,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
    ) -> DiResult<AnyArc> {
        self.resolve_root(service_type, service_key, true)?.ok_or_else(|| {
            DiError::not_registered(ServiceIdentity::new(service_type.clone(), service_key.cloned()))
        })
    }

    /// Resolution entry point for callers outside of any factory.
    pub(crate) fn resolve_root(
        self: &Arc<Self>,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
        required: bool,
    ) -> DiResult<Option<AnyArc>> {
        let identity = ServiceIdentity::new(service_type.clone(), service_key.cloned());
        let span = debug_span!("resolve", service = %identity, scope_id = self.id);
        let _enter = span.enter();

        let observers = &self.shared.observers;
        let started = observers.has_observers().then(|| {
            observers.resolving(&identity);
            Instant::now()
        });

        let request = ResolutionRequest::root(service_type.clone(), service_key.cloned(), required);
        let result = self
            .ensure_open()
            .and_then(|_| self.shared.plan_for(&request))
            .and_then(|plan| materialize(self, &plan, None));

        if let Some(started) = started {
            match &result {
                Ok(_) => observers.resolved(&identity, started.elapsed()),
                Err(err) => observers.failed(&identity, err),
            }
        }
        result
    }

    /// Resolution from inside a factory: the request continues the caller's
    /// chain, so cycles through factories are detected.
    pub(crate) fn resolve_nested(
        self: &Arc<Self>,
        parent: &ResolutionRequest,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
        required: bool,
    ) -> DiResult<Option<AnyArc>> {
        self.ensure_open()?;
        let request = parent.child(
            service_type.clone(),
            service_key.cloned(),
            required,
            self.shared.rules.max_resolution_depth,
        )?;
        let plan = self.shared.nested_plan_for(&request)?;
        materialize(self, &plan, Some(&request))
    }

    pub(crate) fn close(&self) -> DiResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut bag = std::mem::take(&mut *self.disposers.lock());
        let disposed = bag.len();
        let failures = bag.run_all_reverse();
        self.instances.clear();

        debug!(scope_id = self.id, name = ?self.name, disposed, "Scope closed");
        if self.shared.observers.has_observers() {
            self.shared.observers.scope_closed(self.name.as_deref(), disposed);
        }

        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            warn!(scope_id = self.id, service = %failure.service, "Disposal failed: {}", failure.message);
        }
        Err(DiError::DisposalFailed(failures))
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        match self.close() {
            Ok(()) => debug!(scope_id = self.id, "Scope closed on drop"),
            Err(err) => warn!(scope_id = self.id, "{}", err),
        }
    }
}

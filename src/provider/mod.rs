//! The built container: registry snapshot, plan cache and the root scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ContainerRules;
use crate::descriptors::{FactoryDescriptor, ServiceDescriptor};
use crate::error::DiResult;
use crate::internal::Disposal;
use crate::key::{ServiceKey, ServiceType};
use crate::observer::Observers;
use crate::plan::cache::{CachedPlan, PlanCache, PlanKey};
use crate::plan::{PlanBuilder, PlanCacheStats, PlanNode};
use crate::registration::{AnyArc, IfAlreadyRegistered, RegisterOutcome, Registry};
use crate::request::ResolutionRequest;
use crate::traits::{GenericMatcher, MemberSelector, Resolver, ResolverCore};

mod context;
mod materialize;
mod scope;

pub use context::ResolverContext;
pub use scope::Scope;

use scope::ScopeInner;

/// State shared by every scope of one provider.
pub(crate) struct ProviderShared {
    registry: ArcSwap<Registry>,
    /// Serialises registry writers; readers never take it
    writer: Mutex<()>,
    plans: PlanCache,
    pub(crate) rules: ContainerRules,
    members: Arc<dyn MemberSelector>,
    generics: Arc<dyn GenericMatcher>,
    pub(crate) observers: Observers,
    next_scope_id: AtomicU64,
}

impl ProviderShared {
    fn snapshot(&self) -> Arc<Registry> {
        self.registry.load_full()
    }

    pub(crate) fn next_scope_id(&self) -> u64 {
        self.next_scope_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Cached plan for a root request, built on a miss.
    pub(crate) fn plan_for(&self, request: &ResolutionRequest) -> DiResult<PlanNode> {
        let registry = self.snapshot();
        let key = PlanKey::root(request);
        if let Some(cached) = self.plans.get(&key, registry.version(), |_| true) {
            trace!("Found in plan cache");
            return Ok(cached.plan);
        }

        let plan = self.builder(&registry).build(request)?;
        debug!(version = registry.version(), plan = %plan, "Plan built");
        if self.observers.has_observers() {
            self.observers.plan_built(&request.identity(), &plan);
        }
        Ok(self.plans.publish(key, CachedPlan::root(plan), registry.version()).plan)
    }

    /// Plan for a request made from inside a factory.
    ///
    /// A cached plan is reused only where its cycle and depth checks still hold
    /// for the caller's chain. Plans whose selection evaluated a registration
    /// condition depend on that chain and are never cached.
    pub(crate) fn nested_plan_for(&self, request: &ResolutionRequest) -> DiResult<PlanNode> {
        let registry = self.snapshot();
        let key = PlanKey::nested(request);
        let max_depth = self.rules.max_resolution_depth;
        if let Some(cached) = self
            .plans
            .get(&key, registry.version(), |cached| cached.fits(request, max_depth))
        {
            trace!("Found nested plan in cache");
            return Ok(cached.plan);
        }

        let builder = self.builder(&registry);
        let plan = builder.build(request)?;
        if builder.consulted_conditions() {
            trace!(plan = %plan, "Conditional nested plan left uncached");
            return Ok(plan);
        }
        trace!(version = registry.version(), plan = %plan, "Nested plan built");
        let cached = CachedPlan::nested(plan, request);
        self.plans.publish(key, cached.clone(), registry.version());
        Ok(cached.plan)
    }

    fn builder<'a>(&'a self, registry: &'a Registry) -> PlanBuilder<'a> {
        PlanBuilder::new(registry, &self.rules, &*self.members, &*self.generics)
    }
}

/// Resolves services from a frozen [`ServiceCollection`](crate::ServiceCollection).
///
/// The provider owns the root scope, where singletons live, and a plan cache:
/// the first resolution of a service compiles a construction plan from the
/// current registrations, later resolutions reuse it until the registrations
/// change.
///
/// # Thread Safety
///
/// Clones share the same root scope and cache. Cached instances are created
/// once even under concurrent first requests. Registering
/// after build publishes a new registry snapshot; resolutions already running
/// finish against the snapshot they started with.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Resolver, ServiceCollection};
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(3u8);
/// services.add_transient_factory::<String, _>(|ctx| "x".repeat(*ctx.get_required::<u8>() as usize));
///
/// let provider = services.build();
/// let _ = provider.get_required::<String>();
/// assert_eq!(*provider.get_required::<String>(), "xxx");
///
/// // the root `String` plan and the `u8` plan its factory asks for
/// let stats = provider.plan_cache_stats();
/// assert_eq!((stats.misses, stats.hits), (2, 2));
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    root: Arc<ScopeInner>,
}

impl ServiceProvider {
    pub(crate) fn new(
        registry: Registry,
        rules: ContainerRules,
        members: Arc<dyn MemberSelector>,
        generics: Arc<dyn GenericMatcher>,
        observers: Observers,
    ) -> Self {
        let shared = Arc::new(ProviderShared {
            plans: PlanCache::new(registry.version()),
            registry: ArcSwap::from_pointee(registry),
            writer: Mutex::new(()),
            rules,
            members,
            generics,
            observers,
            next_scope_id: AtomicU64::new(0),
        });
        Self {
            root: ScopeInner::root(shared),
        }
    }

    fn shared(&self) -> &ProviderShared {
        &self.root.shared
    }

    /// Opens an unnamed child of the root scope.
    ///
    /// ```
    /// use ferrous_ioc::{Resolver, ServiceCollection};
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use std::sync::Arc;
    ///
    /// static NEXT: AtomicU32 = AtomicU32::new(1);
    ///
    /// struct Tx(u32);
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_scoped_factory::<Tx, _>(|_| Tx(NEXT.fetch_add(1, Ordering::SeqCst)));
    ///
    /// let provider = services.build();
    /// let (first, second) = (provider.create_scope(), provider.create_scope());
    ///
    /// assert!(Arc::ptr_eq(&first.get_required::<Tx>(), &first.get_required::<Tx>()));
    /// assert_ne!(first.get_required::<Tx>().0, second.get_required::<Tx>().0);
    /// ```
    pub fn create_scope(&self) -> Scope {
        Scope {
            inner: self.root.open_child(None),
        }
    }

    /// Opens a scope named `name`; `ScopedTo(name)` services resolved in it or
    /// its descendants are cached here.
    pub fn create_named_scope(&self, name: impl Into<Arc<str>>) -> Scope {
        Scope {
            inner: self.root.open_child(Some(name.into())),
        }
    }

    /// Registers a descriptor after build.
    ///
    /// The registry is replaced by a new snapshot and every cached plan is
    /// dropped. Instances already cached stay cached.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{FactoryDescriptor, IfAlreadyRegistered, Implementation, Resolver,
    ///                   ServiceCollection, ServiceType};
    ///
    /// let provider = ServiceCollection::new().build();
    /// assert!(provider.get::<u8>().is_err());
    ///
    /// provider.register(
    ///     ServiceType::of::<u8>(),
    ///     FactoryDescriptor::service(Implementation::instance(7u8)),
    ///     IfAlreadyRegistered::Throw,
    /// ).unwrap();
    /// assert_eq!(*provider.get_required::<u8>(), 7);
    /// ```
    pub fn register(
        &self,
        service_type: ServiceType,
        descriptor: FactoryDescriptor,
        policy: IfAlreadyRegistered,
    ) -> DiResult<RegisterOutcome> {
        let shared = self.shared();
        let _writer = shared.writer.lock();
        let current = shared.snapshot();
        let mut next = Registry::clone(&current);
        let service_name = service_type.to_string();
        let outcome = next.register(service_type, descriptor, policy)?;
        if next.version() != current.version() {
            shared.plans.invalidate(next.version());
            shared.registry.store(Arc::new(next));
        }
        debug!(service = %service_name, ?outcome, "Registered after build");
        Ok(outcome)
    }

    /// [`register`](Self::register) with the container's default policy.
    pub fn add_service(&self, service_type: ServiceType, descriptor: FactoryDescriptor) -> DiResult<RegisterOutcome> {
        let policy = self.shared().rules.default_if_already_registered;
        self.register(service_type, descriptor, policy)
    }

    /// Removes the service registrations for `(service_type, key)`. Returns how
    /// many were removed.
    pub fn unregister(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> usize {
        let shared = self.shared();
        let _writer = shared.writer.lock();
        let mut next = Registry::clone(&shared.snapshot());
        let removed = next.unregister(service_type, service_key);
        if removed > 0 {
            shared.plans.invalidate(next.version());
            shared.registry.store(Arc::new(next));
            debug!(service = %service_type, removed, "Unregistered");
        }
        removed
    }

    /// Renders the plan that resolving `(service_type, key)` would execute, e.g.
    /// `new D2(new D1(new S()))`, without creating anything.
    pub fn explain(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> DiResult<String> {
        let request = ResolutionRequest::root(service_type.clone(), service_key.cloned(), true);
        Ok(self.shared().plan_for(&request)?.to_string())
    }

    /// Descriptors of every registration, in registration order.
    pub fn registrations(&self) -> Vec<ServiceDescriptor> {
        let shared = self.shared();
        shared
            .snapshot()
            .iter()
            .map(|r| ServiceDescriptor::describe(r, &shared.rules.default_lifetime))
            .collect()
    }

    /// Whether any registration exists for exactly `service_type`.
    pub fn is_registered(&self, service_type: &ServiceType) -> bool {
        !self.shared().snapshot().lookup(service_type).is_empty()
    }

    pub fn plan_cache_stats(&self) -> PlanCacheStats {
        self.shared().plans.stats()
    }

    pub fn rules(&self) -> &ContainerRules {
        &self.shared().rules
    }

    /// Disposes singletons and other root-owned instances, last created first.
    ///
    /// Scopes opened from this provider stop resolving afterwards.
    pub fn close(&self) -> DiResult<()> {
        self.root.close()
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_closed()
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let shared = self.shared();
        let registry = shared.snapshot();
        let mut s = String::new();
        s.push_str("=== Service Provider Debug ===\n");
        s.push_str(&format!("Registry version: {}\n", registry.version()));
        s.push_str("Registrations:\n");
        for r in registry.iter() {
            let d = ServiceDescriptor::describe(r, &shared.rules.default_lifetime);
            s.push_str(&format!("  {} {} -> {} ({})", d.setup, d.service_type, d.implementation, d.lifetime));
            if let Some(key) = &d.service_key {
                s.push_str(&format!(" [key={}]", key));
            }
            s.push('\n');
        }
        let stats = shared.plans.stats();
        s.push_str(&format!(
            "Plan cache: {} entries, {} hits, {} misses\n",
            stats.entries, stats.hits, stats.misses
        ));
        s
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.shared().snapshot().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ResolverCore for ServiceProvider {
    fn resolve(&self, service_type: &ServiceType, service_key: Option<&ServiceKey>) -> DiResult<AnyArc> {
        self.root.resolve_required(service_type, service_key)
    }

    fn try_resolve(
        &self,
        service_type: &ServiceType,
        service_key: Option<&ServiceKey>,
    ) -> DiResult<Option<AnyArc>> {
        self.root.resolve_root(service_type, service_key, false)
    }

    fn push_disposer(&self, service: &str, disposer: Disposal) {
        self.root.track(service, disposer);
    }
}

impl Resolver for ServiceProvider {}

//! Version-stamped cache of construction plans.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::key::{ServiceIdentity, ServiceKey, ServiceType};
use crate::plan::{PlanNode, WrapPlan};
use crate::registration::FactoryId;
use crate::request::ResolutionRequest;

/// Identity of a cached request.
///
/// `consumer_lifespan` is `None` for root requests. Requests made from inside a
/// factory carry the lifespan of their nearest cached consumer, which decides
/// the captive dependency checks baked into the plan, and the decorators whose
/// dependencies they belong to, which are left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PlanKey {
    pub(crate) service_type: ServiceType,
    pub(crate) service_key: Option<ServiceKey>,
    pub(crate) required: bool,
    pub(crate) consumer_lifespan: Option<u16>,
    pub(crate) enclosing_decorators: SmallVec<[FactoryId; 2]>,
}

impl PlanKey {
    pub(crate) fn root(request: &ResolutionRequest) -> Self {
        Self {
            service_type: request.service_type().clone(),
            service_key: request.service_key().cloned(),
            required: request.is_required(),
            consumer_lifespan: None,
            enclosing_decorators: SmallVec::new(),
        }
    }

    pub(crate) fn nested(request: &ResolutionRequest) -> Self {
        Self {
            consumer_lifespan: Some(request.enclosing_cached().map_or(0, |c| c.lifetime.lifespan())),
            enclosing_decorators: request.enclosing_decorators(),
            ..Self::root(request)
        }
    }
}

/// Every identity requested below a nested plan's request, and how many levels
/// the plan reaches beneath it. A cached nested plan may only be reused under a
/// chain that none of these identities appear in and that leaves room for its
/// depth.
#[derive(Debug, Default)]
pub(crate) struct Footprint {
    identities: AHashSet<ServiceIdentity>,
    height: usize,
}

impl Footprint {
    pub(crate) fn of(plan: &PlanNode, request: &ResolutionRequest) -> Self {
        let mut footprint = Footprint::default();
        footprint.visit(plan, request.depth());
        footprint
    }

    fn visit(&mut self, node: &PlanNode, base: usize) {
        match node {
            PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => {
                self.record(&invocation.request, base);
                for arg in &invocation.args {
                    self.visit(arg, base);
                }
            }
            PlanNode::Wrap(wrap) => match &**wrap {
                WrapPlan::Func { inner, .. } | WrapPlan::Lazy { inner, .. } => self.visit(inner, base),
                WrapPlan::Collection { items, .. } => {
                    for (_, item) in items {
                        self.visit(item, base);
                    }
                }
                WrapPlan::Custom(invocation) => {
                    self.record(&invocation.request, base);
                    for arg in &invocation.args {
                        self.visit(arg, base);
                    }
                }
            },
            PlanNode::Absent => {}
        }
    }

    /// Records the request and its ancestors down to the plan's own request,
    /// which covers wrapper requests that have no invocation of their own.
    fn record(&mut self, request: &ResolutionRequest, base: usize) {
        self.height = self.height.max(request.depth().saturating_sub(base));
        for r in std::iter::once(request).chain(request.ancestors()) {
            if r.depth() < base {
                break;
            }
            self.identities.insert(r.identity());
        }
    }

    /// Whether the plan can be reused for `request` without skipping a cycle
    /// or depth check the chain would have failed.
    pub(crate) fn fits(&self, request: &ResolutionRequest, max_depth: usize) -> bool {
        request.depth() + self.height <= max_depth
            && !request.ancestors().any(|r| self.identities.contains(&r.identity()))
    }
}

/// A published plan. Nested plans carry the footprint checked on reuse.
#[derive(Clone)]
pub(crate) struct CachedPlan {
    pub(crate) plan: PlanNode,
    pub(crate) footprint: Option<Arc<Footprint>>,
}

impl CachedPlan {
    pub(crate) fn root(plan: PlanNode) -> Self {
        Self { plan, footprint: None }
    }

    pub(crate) fn nested(plan: PlanNode, request: &ResolutionRequest) -> Self {
        let footprint = Footprint::of(&plan, request);
        Self {
            plan,
            footprint: Some(Arc::new(footprint)),
        }
    }

    pub(crate) fn fits(&self, request: &ResolutionRequest, max_depth: usize) -> bool {
        self.footprint
            .as_ref()
            .map_or(true, |footprint| footprint.fits(request, max_depth))
    }
}

struct PlanState {
    version: u64,
    plans: AHashMap<PlanKey, CachedPlan>,
}

/// Counters of a [`PlanCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// Plans for root requests and for requests made from inside factories, valid
/// for one registry version.
///
/// Concurrent builders may race on a miss; the first plan published wins and
/// plans built against a superseded version are dropped.
pub(crate) struct PlanCache {
    state: RwLock<PlanState>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl PlanCache {
    pub(crate) fn new(version: u64) -> Self {
        Self {
            state: RwLock::new(PlanState {
                version,
                plans: AHashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// The plan cached for `key` if it was built against `version` and
    /// `usable` accepts it.
    pub(crate) fn get(
        &self,
        key: &PlanKey,
        version: u64,
        usable: impl FnOnce(&CachedPlan) -> bool,
    ) -> Option<CachedPlan> {
        let state = self.state.read();
        let found = if state.version == version {
            state.plans.get(key).filter(|cached| usable(*cached)).cloned()
        } else {
            None
        };
        match found {
            Some(plan) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(plan)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `plan` unless the cache moved past `version`. Returns the plan now
    /// in effect for `key`.
    pub(crate) fn publish(&self, key: PlanKey, plan: CachedPlan, version: u64) -> CachedPlan {
        let mut state = self.state.write();
        if state.version != version {
            return plan;
        }
        state.plans.entry(key).or_insert(plan).clone()
    }

    /// Drops every plan; only plans built against `version` are accepted from now on.
    pub(crate) fn invalidate(&self, version: u64) {
        let mut state = self.state.write();
        state.version = version;
        state.plans.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.state.read().plans.len(),
        }
    }
}

//! Plan interpretation: turns a [`PlanNode`] into an instance within a scope.

use std::sync::{Arc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::context::ResolverContext;
use super::scope::ScopeInner;
use crate::error::{DiError, DiResult};
use crate::key::{ServiceIdentity, ServiceType};
use crate::plan::{Invocation, PlanNode, WrapPlan};
use crate::registration::AnyArc;
use crate::request::ResolutionRequest;
use crate::wrappers::{Collection, CollectionItem, Func, Lazy};

/// Produces the instance `plan` describes; `None` for an absent optional
/// dependency.
///
/// `live` is the request a reused nested plan now answers. Factories resolving
/// through their context continue from it rather than from the chain the plan
/// was built under.
pub(crate) fn materialize(
    scope: &Arc<ScopeInner>,
    plan: &PlanNode,
    live: Option<&ResolutionRequest>,
) -> DiResult<Option<AnyArc>> {
    match plan {
        PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => {
            invoke(scope, invocation, live).map(Some)
        }
        PlanNode::Wrap(wrap) => match &**wrap {
            WrapPlan::Func { service_type, inner } => {
                let deferred = Deferred::new(scope, service_type, inner, live);
                let func = Func::new(deferred.produced.clone(), move || deferred.run());
                Ok(Some(Arc::new(func)))
            }
            WrapPlan::Lazy { service_type, inner } => {
                let deferred = Deferred::new(scope, service_type, inner, live);
                let lazy = Lazy::new(deferred.produced.clone(), move || deferred.run());
                Ok(Some(Arc::new(lazy)))
            }
            WrapPlan::Collection { item_type, items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for (key, item) in items {
                    if let Some(value) = materialize(scope, item, live)? {
                        values.push(CollectionItem {
                            key: key.clone(),
                            value,
                        });
                    }
                }
                Ok(Some(Arc::new(Collection::new(item_type.clone(), values))))
            }
            WrapPlan::Custom(invocation) => invoke(scope, invocation, live).map(Some),
        },
        PlanNode::Absent => Ok(None),
    }
}

/// Runs an invocation, reusing the instance cached by the owning scope when the
/// lifetime caches.
fn invoke(scope: &Arc<ScopeInner>, invocation: &Invocation, live: Option<&ResolutionRequest>) -> DiResult<AnyArc> {
    match scope.owner_for(&invocation.lifetime, &invocation.service_type)? {
        None => construct(scope, invocation, live),
        Some(owner) => {
            owner.ensure_open()?;
            owner.instances.get_or_create(&invocation.instance_key, || {
                trace!(service = %invocation.display, lifetime = %invocation.lifetime, "Creating cached instance");
                construct(owner, invocation, live)
            })
        }
    }
}

fn construct(scope: &Arc<ScopeInner>, invocation: &Invocation, live: Option<&ResolutionRequest>) -> DiResult<AnyArc> {
    let mut args: SmallVec<[Option<AnyArc>; 4]> = SmallVec::with_capacity(invocation.args.len());
    for arg in &invocation.args {
        args.push(materialize(scope, arg, live)?);
    }

    let request = match live {
        Some(live) => invocation.request.rebased(live),
        None => invocation.request.clone(),
    };
    let context = ResolverContext::new(scope, invocation, request, &args);
    let instance = (invocation.constructor)(&context)?;

    if let Some(disposer) = invocation.disposer.as_ref().filter(|_| scope.tracks(&invocation.lifetime)) {
        let disposer = disposer.clone();
        let tracked = instance.clone();
        scope.track(&invocation.display, Box::new(move || disposer(&tracked)));
    }
    Ok(instance)
}

/// Inner plan of a `Func` or `Lazy`, run against the scope the wrapper was
/// resolved in for as long as that scope lives.
struct Deferred {
    scope: Weak<ScopeInner>,
    wrapper_type: ServiceType,
    produced: ServiceType,
    inner: PlanNode,
    live: Option<ResolutionRequest>,
}

impl Deferred {
    fn new(
        scope: &Arc<ScopeInner>,
        wrapper_type: &ServiceType,
        inner: &PlanNode,
        live: Option<&ResolutionRequest>,
    ) -> Self {
        let produced = wrapper_type
            .args()
            .first()
            .cloned()
            .unwrap_or_else(|| wrapper_type.clone());
        Self {
            scope: Arc::downgrade(scope),
            wrapper_type: wrapper_type.clone(),
            produced,
            inner: inner.clone(),
            live: live.cloned(),
        }
    }

    fn run(&self) -> DiResult<AnyArc> {
        let scope = self.scope.upgrade().ok_or(DiError::ScopeDisposed)?;
        scope.ensure_open()?;
        materialize(&scope, &self.inner, self.live.as_ref())
            .and_then(|value| {
                value.ok_or_else(|| DiError::not_registered(ServiceIdentity::new(self.produced.clone(), None)))
            })
            .map_err(|err| match err {
                DiError::ScopeDisposed => err,
                other => DiError::wrapper(&self.wrapper_type, other),
            })
    }
}

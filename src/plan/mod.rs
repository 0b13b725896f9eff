//! Construction plans.
//!
//! A plan is an immutable tree describing how to build a requested service:
//! which factory to invoke with which argument plans, which decorators wrap the
//! result, and which wrapper shapes defer or collect it. Plans are built once per
//! request and registry version and interpreted by the provider.

mod builder;
pub(crate) mod cache;

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::descriptors::{Constructor, Disposer};
use crate::internal::InstanceKey;
use crate::key::{ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::registration::FactoryId;
use crate::request::ResolutionRequest;

pub(crate) use builder::PlanBuilder;
pub use cache::PlanCacheStats;

/// Node of a construction plan.
#[derive(Clone)]
pub enum PlanNode {
    /// Invoke a service factory
    Construct(Arc<Invocation>),
    /// Invoke a decorator around the plan found among its arguments
    Decorate(Arc<Invocation>),
    /// Hand out the inner plan through a wrapper shape
    Wrap(Arc<WrapPlan>),
    /// Optional dependency with nothing registered
    Absent,
}

/// A factory invocation with its argument plans.
pub struct Invocation {
    pub(crate) factory: FactoryId,
    pub(crate) display: String,
    pub(crate) service_type: ServiceType,
    pub(crate) service_key: Option<ServiceKey>,
    pub(crate) lifetime: Lifetime,
    pub(crate) args: Vec<PlanNode>,
    /// Index of the argument holding the decorated or wrapped plan
    pub(crate) decoratee: Option<usize>,
    pub(crate) constructor: Constructor,
    pub(crate) disposer: Option<Disposer>,
    pub(crate) instance_key: InstanceKey,
    pub(crate) request: ResolutionRequest,
}

impl Invocation {
    pub fn factory(&self) -> FactoryId {
        self.factory
    }

    /// Implementation name, closed over generic arguments.
    pub fn display_name(&self) -> &str {
        &self.display
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.service_key.as_ref()
    }

    /// Effective lifetime, with the container default applied.
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn args(&self) -> &[PlanNode] {
        &self.args
    }

    fn fmt_call(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.lifetime.is_cached();
        if cached {
            write!(f, "{}(", self.lifetime)?;
        }
        write!(f, "new {}(", self.display)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")?;
        if cached {
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Wrapper node.
pub enum WrapPlan {
    Func { service_type: ServiceType, inner: PlanNode },
    Lazy { service_type: ServiceType, inner: PlanNode },
    Collection {
        service_type: ServiceType,
        item_type: ServiceType,
        items: Vec<(Option<ServiceKey>, PlanNode)>,
    },
    /// Registered wrapper; its decoratee argument holds the inner plan
    Custom(Arc<Invocation>),
}

impl PlanNode {
    /// Lifetime of the instance this node produces. Built-in wrappers are
    /// produced per resolution.
    pub fn lifetime(&self) -> Lifetime {
        match self {
            PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => invocation.lifetime.clone(),
            PlanNode::Wrap(wrap) => match &**wrap {
                WrapPlan::Custom(invocation) => invocation.lifetime.clone(),
                _ => Lifetime::Transient,
            },
            PlanNode::Absent => Lifetime::Transient,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PlanNode::Absent)
    }

    /// Name of the outermost implementation, for diagnostics.
    pub fn label(&self) -> String {
        match self {
            PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => invocation.display.clone(),
            PlanNode::Wrap(wrap) => match &**wrap {
                WrapPlan::Func { service_type, .. }
                | WrapPlan::Lazy { service_type, .. }
                | WrapPlan::Collection { service_type, .. } => service_type.to_string(),
                WrapPlan::Custom(invocation) => invocation.display.clone(),
            },
            PlanNode::Absent => "default".to_string(),
        }
    }

    /// Factories that contribute to the produced instance, outermost first.
    pub(crate) fn instance_chain(&self) -> SmallVec<[FactoryId; 4]> {
        match self {
            PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => {
                invocation.instance_key.chain.clone()
            }
            PlanNode::Wrap(wrap) => match &**wrap {
                WrapPlan::Func { inner, .. } | WrapPlan::Lazy { inner, .. } => inner.instance_chain(),
                WrapPlan::Collection { .. } => SmallVec::new(),
                WrapPlan::Custom(invocation) => invocation.instance_key.chain.clone(),
            },
            PlanNode::Absent => SmallVec::new(),
        }
    }
}

/// Renders the plan as a construction expression, e.g.
/// `new D2(new D1(new S()))`. Cached instances show their lifetime:
/// `singleton(new S())`.
impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanNode::Construct(invocation) | PlanNode::Decorate(invocation) => invocation.fmt_call(f),
            PlanNode::Wrap(wrap) => match &**wrap {
                WrapPlan::Func { inner, .. } => write!(f, "Func(() => {})", inner),
                WrapPlan::Lazy { inner, .. } => write!(f, "Lazy(() => {})", inner),
                WrapPlan::Collection { items, .. } => {
                    f.write_str("[")?;
                    for (i, (_, item)) in items.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", item)?;
                    }
                    f.write_str("]")
                }
                WrapPlan::Custom(invocation) => invocation.fmt_call(f),
            },
            PlanNode::Absent => f.write_str("default"),
        }
    }
}

impl fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlanNode({})", self)
    }
}

//! Decorator chain composition.
//!
//! Decorators wrap an already-built plan. The applicable decorators of a request
//! are ordered ascending by their order hint, ties broken by registration order,
//! and nested so that the first one wraps the base plan and the last one is
//! outermost: `D2(D1(S))`.
//!
//! # Examples
//!
//! ```rust
//! use ferrous_ioc::{FactoryDescriptor, Implementation, Parameter, ServiceCollection, ServiceType};
//! use std::sync::Arc;
//!
//! let s = ServiceType::named("S");
//! let unit = |_: &ferrous_ioc::ResolverContext<'_>| Ok(Arc::new(()) as ferrous_ioc::AnyArc);
//!
//! let mut services = ServiceCollection::new();
//! services.add_service(s.clone(), FactoryDescriptor::service(Implementation::new("S", unit))).unwrap();
//! services.add_decorator(
//!     s.clone(),
//!     FactoryDescriptor::decorator(Implementation::new("D1", unit).with_parameters([Parameter::decoratee()])),
//! ).unwrap();
//! services.add_decorator(
//!     s.clone(),
//!     FactoryDescriptor::decorator(Implementation::new("D2", unit).with_parameters([Parameter::decoratee()])),
//! ).unwrap();
//!
//! let provider = services.build();
//! assert_eq!(provider.explain(&s, None).unwrap(), "new D2(new D1(new S()))");
//! ```

use std::sync::Arc;

use smallvec::SmallVec;

use crate::descriptors::Parameter;
use crate::error::DiResult;
use crate::key::ServiceType;
use crate::plan::{PlanBuilder, PlanNode, WrapPlan};
use crate::registration::Registration;
use crate::request::ResolutionRequest;
use crate::wrappers::{WrapperShape, FUNC_FAMILY, LAZY_FAMILY};

/// Wrapper layers between a decorator parameter and the decorated service,
/// outermost first.
pub(crate) type Layers = SmallVec<[WrapperShape; 2]>;

/// Sorts decorators by order hint, then registration order.
pub(crate) fn order(mut decorators: Vec<Arc<Registration>>) -> Vec<Arc<Registration>> {
    decorators.sort_by_key(|d| (d.descriptor.order, d.seq));
    decorators
}

/// Finds the parameter receiving the decorated service.
///
/// `Any` stands for the target; `Func` and `Lazy` layers around it are peeled
/// and returned so the decoratee can be handed out wrapped.
pub(crate) fn find_decoratee(parameters: &[Parameter], target: &ServiceType) -> Option<(usize, Layers)> {
    parameters.iter().enumerate().find_map(|(index, parameter)| {
        let mut current = parameter.service_type.substitute_any(target);
        let mut layers = Layers::new();
        loop {
            if current == *target {
                return Some((index, layers));
            }
            if let Some(inner) = current.unwrap_family(FUNC_FAMILY) {
                layers.push(WrapperShape::Func);
                current = inner.clone();
            } else if let Some(inner) = current.unwrap_family(LAZY_FAMILY) {
                layers.push(WrapperShape::Lazy);
                current = inner.clone();
            } else {
                return None;
            }
        }
    })
}

/// Wraps the decoratee plan in the peeled layers, innermost first.
pub(crate) fn wrap_layers(mut plan: PlanNode, layers: &[WrapperShape], target: &ServiceType) -> PlanNode {
    let mut service_type = target.clone();
    for shape in layers.iter().rev() {
        plan = match shape {
            WrapperShape::Func => {
                service_type = ServiceType::func(service_type);
                PlanNode::Wrap(Arc::new(WrapPlan::Func {
                    service_type: service_type.clone(),
                    inner: plan,
                }))
            }
            WrapperShape::Lazy => {
                service_type = ServiceType::lazy(service_type);
                PlanNode::Wrap(Arc::new(WrapPlan::Lazy {
                    service_type: service_type.clone(),
                    inner: plan,
                }))
            }
            WrapperShape::Collection | WrapperShape::Custom(_) => plan,
        };
    }
    plan
}

/// Applies `decorators` around `base`.
pub(crate) fn compose(
    builder: &PlanBuilder<'_>,
    request: &ResolutionRequest,
    base: PlanNode,
    decorators: Vec<Arc<Registration>>,
) -> DiResult<PlanNode> {
    order(decorators)
        .iter()
        .try_fold(base, |plan, decorator| builder.build_decorator(request, decorator, plan))
}

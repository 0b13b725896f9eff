//! Builds construction plans from a registry snapshot.

use std::sync::Arc;

use smallvec::smallvec;

use crate::config::ContainerRules;
use crate::decoration::{self, find_decoratee, wrap_layers};
use crate::descriptors::{FactoryDescriptor, SetupKind};
use crate::error::{DiError, DiResult};
use crate::internal::InstanceKey;
use crate::key::{ServiceKey, ServiceType};
use crate::lifetime::Lifetime;
use crate::plan::{Invocation, PlanNode, WrapPlan};
use crate::registration::{Registration, Registry};
use crate::request::{ImplementationInfo, ResolutionRequest};
use crate::selection::FactorySelector;
use crate::traits::{GenericMatcher, MemberSelector};
use crate::wrappers::{try_unwrap, WrapperShape};

pub(crate) struct PlanBuilder<'a> {
    registry: &'a Registry,
    rules: &'a ContainerRules,
    members: &'a dyn MemberSelector,
    selector: FactorySelector<'a>,
}

impl<'a> PlanBuilder<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        rules: &'a ContainerRules,
        members: &'a dyn MemberSelector,
        generics: &'a dyn GenericMatcher,
    ) -> Self {
        Self {
            registry,
            rules,
            members,
            selector: FactorySelector::new(registry, generics),
        }
    }

    /// Whether a condition was evaluated while building. Such plans may depend
    /// on the request chain they were built under.
    pub(crate) fn consulted_conditions(&self) -> bool {
        self.selector.consulted_conditions()
    }

    /// Plan for `request`: an explicit registration first, then a wrapper shape.
    pub(crate) fn build(&self, request: &ResolutionRequest) -> DiResult<PlanNode> {
        if let Some(registration) = self.selector.single(request)? {
            return self.build_service(request, &registration, true);
        }
        if let Some((shape, inner)) = try_unwrap(self.registry, request.service_type()) {
            return self.build_wrapper(request, shape, inner);
        }
        if request.is_required() {
            Err(DiError::not_registered(request.identity()))
        } else {
            Ok(PlanNode::Absent)
        }
    }

    fn build_service(
        &self,
        request: &ResolutionRequest,
        registration: &Registration,
        include_hooks: bool,
    ) -> DiResult<PlanNode> {
        let descriptor = &registration.descriptor;
        let service_type = request.service_type();
        let display = descriptor.implementation.display_name(service_type);
        let lifetime = self.lifetime_of(descriptor);

        if let Some(consumer) = request.enclosing_cached() {
            self.check_captive(&consumer.name, &consumer.lifetime, &display, &lifetime)?;
        }

        let service_request = request.with_implementation(ImplementationInfo {
            factory: registration.id,
            name: display.clone(),
            lifetime: lifetime.clone(),
            setup: SetupKind::Service,
        });

        let mut args = Vec::new();
        for parameter in self.members.parameters(&descriptor.implementation, service_type) {
            if parameter.service_type.is_any() {
                return Err(DiError::InvalidRegistration(format!(
                    "service {} cannot take the decorated service as a parameter",
                    display
                )));
            }
            args.push(self.build_dependency(
                &service_request,
                parameter.service_type,
                parameter.service_key,
                parameter.required,
            )?);
        }

        let base = PlanNode::Construct(Arc::new(Invocation {
            factory: registration.id,
            display,
            service_type: service_type.clone(),
            service_key: request.service_key().cloned(),
            lifetime,
            args,
            decoratee: None,
            constructor: descriptor.implementation.constructor().clone(),
            disposer: descriptor.disposer.clone(),
            instance_key: InstanceKey::new(service_type.clone(), smallvec![registration.id]),
            request: service_request.clone(),
        }));

        let decorators = self.selector.decorators(&service_request, include_hooks);
        decoration::compose(self, &service_request, base, decorators)
    }

    /// Wraps `decoratee` in `decorator`. `request` carries the decorated
    /// implementation.
    pub(crate) fn build_decorator(
        &self,
        request: &ResolutionRequest,
        decorator: &Registration,
        decoratee: PlanNode,
    ) -> DiResult<PlanNode> {
        let descriptor = &decorator.descriptor;
        let target = request.service_type();
        let display = descriptor.implementation.display_name(target);
        let parameters = self.members.parameters(&descriptor.implementation, target);

        let Some((index, layers)) = find_decoratee(&parameters, target) else {
            return Err(DiError::InvalidRegistration(format!(
                "decorator {} has no parameter accepting {}",
                display, target
            )));
        };

        let decoratee_lifetime = decoratee.lifetime();
        let lifetime = if descriptor.use_decoratee_lifetime {
            decoratee_lifetime.clone()
        } else {
            self.lifetime_of(descriptor)
        };
        self.check_captive(&display, &lifetime, &decoratee.label(), &decoratee_lifetime)?;
        if let Some(consumer) = request.enclosing_cached() {
            self.check_captive(&consumer.name, &consumer.lifetime, &display, &lifetime)?;
        }

        let decorator_request = request.with_implementation(ImplementationInfo {
            factory: decorator.id,
            name: display.clone(),
            lifetime: lifetime.clone(),
            setup: SetupKind::Decorator,
        });

        let mut chain = smallvec![decorator.id];
        chain.extend(decoratee.instance_chain());

        let mut decoratee = Some(wrap_layers(decoratee, &layers, target));
        let mut args = Vec::with_capacity(parameters.len());
        for (i, parameter) in parameters.into_iter().enumerate() {
            if i == index {
                args.extend(decoratee.take());
                continue;
            }
            if parameter.service_type.is_any() {
                return Err(DiError::InvalidRegistration(format!(
                    "decorator {} takes the decorated service more than once",
                    display
                )));
            }
            args.push(self.build_dependency(
                &decorator_request,
                parameter.service_type,
                parameter.service_key,
                parameter.required,
            )?);
        }

        Ok(PlanNode::Decorate(Arc::new(Invocation {
            factory: decorator.id,
            display,
            service_type: target.clone(),
            service_key: request.service_key().cloned(),
            lifetime,
            args,
            decoratee: Some(index),
            constructor: descriptor.implementation.constructor().clone(),
            disposer: descriptor.disposer.clone(),
            instance_key: InstanceKey::new(target.clone(), chain),
            request: decorator_request,
        })))
    }

    fn build_dependency(
        &self,
        consumer: &ResolutionRequest,
        service_type: ServiceType,
        service_key: Option<ServiceKey>,
        required: bool,
    ) -> DiResult<PlanNode> {
        let request = consumer.child(service_type, service_key, required, self.rules.max_resolution_depth)?;
        self.build(&request)
    }

    fn build_wrapper(
        &self,
        request: &ResolutionRequest,
        shape: WrapperShape,
        inner: ServiceType,
    ) -> DiResult<PlanNode> {
        let wrapper_type = request.service_type().clone();
        let wrapped = |source| DiError::wrapper(&wrapper_type, source);

        let node = match shape {
            WrapperShape::Func | WrapperShape::Lazy => {
                let inner_plan = self
                    .build_dependency(request, inner, request.service_key().cloned(), request.is_required())
                    .map_err(wrapped)?;
                if inner_plan.is_absent() {
                    return Ok(PlanNode::Absent);
                }
                let service_type = wrapper_type.clone();
                PlanNode::Wrap(Arc::new(match shape {
                    WrapperShape::Func => WrapPlan::Func { service_type, inner: inner_plan },
                    _ => WrapPlan::Lazy { service_type, inner: inner_plan },
                }))
            }
            WrapperShape::Collection => {
                let items = self.collection_items(request, &inner).map_err(wrapped)?;
                PlanNode::Wrap(Arc::new(WrapPlan::Collection {
                    service_type: wrapper_type.clone(),
                    item_type: inner,
                    items,
                }))
            }
            WrapperShape::Custom(family) => match self.build_custom_wrapper(request, &family, inner)? {
                Some(node) => node,
                None => return Ok(PlanNode::Absent),
            },
        };

        let decorators = self.selector.decorators(request, false);
        decoration::compose(self, request, node, decorators)
    }

    /// Items of `Collection<item_type>`, each built through the full pipeline
    /// under its own request so that item conditions and decorators apply.
    fn collection_items(
        &self,
        request: &ResolutionRequest,
        item_type: &ServiceType,
    ) -> DiResult<Vec<(Option<ServiceKey>, PlanNode)>> {
        if !self.selector.has_services(item_type) {
            // Collection<Func<T>> and Collection<Lazy<T>>: one wrapper per item of T
            if let Some((shape @ (WrapperShape::Func | WrapperShape::Lazy), inner)) =
                try_unwrap(self.registry, item_type)
            {
                let items = self.collection_items(request, &inner)?;
                return Ok(items
                    .into_iter()
                    .map(|(key, plan)| {
                        let service_type = item_type.clone();
                        let wrap = match shape {
                            WrapperShape::Func => WrapPlan::Func { service_type, inner: plan },
                            _ => WrapPlan::Lazy { service_type, inner: plan },
                        };
                        (key, PlanNode::Wrap(Arc::new(wrap)))
                    })
                    .collect());
            }
        }

        let mut items = Vec::new();
        for registration in self.selector.all(item_type, request.service_key()) {
            let key = registration.service_key().cloned();
            let item_request =
                request.child(item_type.clone(), key.clone(), true, self.rules.max_resolution_depth)?;
            if !self.selector.condition_holds(&registration, &item_request) {
                continue;
            }
            items.push((key, self.build_service(&item_request, &registration, true)?));
        }
        Ok(items)
    }

    /// Plan for a registered wrapper family. `None` when the optional inner
    /// service is missing.
    fn build_custom_wrapper(
        &self,
        request: &ResolutionRequest,
        family: &str,
        inner: ServiceType,
    ) -> DiResult<Option<PlanNode>> {
        let wrapper_type = request.service_type();
        let Some(registration) = self.selector.wrapper_for(family) else {
            return Err(DiError::not_registered(request.identity()));
        };
        let descriptor = &registration.descriptor;
        let display = descriptor.implementation.display_name(wrapper_type);
        let lifetime = self.lifetime_of(descriptor);

        let wrapper_request = request.with_implementation(ImplementationInfo {
            factory: registration.id,
            name: display.clone(),
            lifetime: lifetime.clone(),
            setup: SetupKind::Wrapper,
        });

        let mut chain = smallvec![registration.id];
        let mut decoratee = None;
        let mut args = Vec::new();
        for (i, parameter) in self
            .members
            .parameters(&descriptor.implementation, wrapper_type)
            .into_iter()
            .enumerate()
        {
            if parameter.service_type.is_any() {
                let inner_plan = self
                    .build_dependency(
                        &wrapper_request,
                        inner.clone(),
                        request.service_key().cloned(),
                        request.is_required(),
                    )
                    .map_err(|source| DiError::wrapper(wrapper_type, source))?;
                if inner_plan.is_absent() {
                    return Ok(None);
                }
                chain.extend(inner_plan.instance_chain());
                decoratee = Some(i);
                args.push(inner_plan);
            } else {
                args.push(self.build_dependency(
                    &wrapper_request,
                    parameter.service_type,
                    parameter.service_key,
                    parameter.required,
                )?);
            }
        }

        Ok(Some(PlanNode::Wrap(Arc::new(WrapPlan::Custom(Arc::new(Invocation {
            factory: registration.id,
            display,
            service_type: wrapper_type.clone(),
            service_key: request.service_key().cloned(),
            lifetime,
            args,
            decoratee,
            constructor: descriptor.implementation.constructor().clone(),
            disposer: descriptor.disposer.clone(),
            instance_key: InstanceKey::new(wrapper_type.clone(), chain),
            request: wrapper_request,
        }))))))
    }

    fn lifetime_of(&self, descriptor: &FactoryDescriptor) -> Lifetime {
        descriptor
            .lifetime
            .clone()
            .unwrap_or_else(|| self.rules.default_lifetime.clone())
    }

    /// A cached consumer must not capture a dependency with a shorter,
    /// non-transient lifetime.
    fn check_captive(
        &self,
        consumer: &str,
        consumer_lifetime: &Lifetime,
        dependency: &str,
        dependency_lifetime: &Lifetime,
    ) -> DiResult<()> {
        let captive = dependency_lifetime.lifespan() > 0
            && dependency_lifetime.lifespan() < consumer_lifetime.lifespan();
        if captive && self.rules.throw_if_dependency_has_shorter_lifetime {
            return Err(DiError::CaptiveDependency {
                consumer: consumer.to_string(),
                consumer_lifetime: consumer_lifetime.to_string(),
                dependency: dependency.to_string(),
                dependency_lifetime: dependency_lifetime.to_string(),
            });
        }
        Ok(())
    }
}

use ferrous_ioc::{
    AnyArc, DeclaredParameters, DiError, FactoryDescriptor, Implementation, Lifetime, MemberSelector, Parameter,
    PlanCacheStats, Resolver, ResolverCore, ServiceCollection, ServiceType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn root_plans_are_built_once_per_request() {
    let mut services = ServiceCollection::new();
    services.add_singleton(1u32);
    let provider = services.build();

    provider.get_required::<u32>();
    provider.get_required::<u32>();
    provider.create_scope().get_required::<u32>();

    assert_eq!(
        provider.plan_cache_stats(),
        PlanCacheStats {
            hits: 2,
            misses: 1,
            invalidations: 0,
            entries: 1,
        }
    );
}

#[test]
fn optional_and_required_requests_are_planned_separately() {
    let mut services = ServiceCollection::new();
    services.add_singleton(1u32);
    let provider = services.build();

    provider.get_required::<u32>();
    assert!(provider.try_get::<u32>().unwrap().is_some());
    assert_eq!(provider.plan_cache_stats().entries, 2);
}

#[test]
fn factory_resolutions_reuse_their_plans() {
    struct Outer;
    let mut services = ServiceCollection::new();
    services.add_singleton(1u32);
    services.add_transient_factory::<Outer, _>(|r| {
        r.get_required::<u32>();
        Outer
    });
    let provider = services.build();

    provider.get_required::<Outer>();
    provider.get_required::<Outer>();
    let stats = provider.plan_cache_stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
}

struct CountingMembers(AtomicUsize);

impl MemberSelector for CountingMembers {
    fn parameters(&self, implementation: &Implementation, service_type: &ServiceType) -> Vec<Parameter> {
        self.0.fetch_add(1, Ordering::SeqCst);
        DeclaredParameters.parameters(implementation, service_type)
    }
}

#[test]
fn member_selection_runs_once_per_factory_dependency() {
    struct Outer;
    let members = Arc::new(CountingMembers(AtomicUsize::new(0)));
    let mut services = ServiceCollection::new().with_member_selector(members.clone());
    services.add_singleton(1u32);
    services.add_transient_factory::<Outer, _>(|r| {
        r.get_required::<u32>();
        Outer
    });
    let provider = services.build();

    provider.get_required::<Outer>();
    let after_first = members.0.load(Ordering::SeqCst);
    for _ in 0..10 {
        provider.get_required::<Outer>();
    }
    assert_eq!(members.0.load(Ordering::SeqCst), after_first);
}

#[test]
fn conditional_factory_dependencies_are_planned_each_time() {
    struct Outer;
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::of::<u32>(),
            FactoryDescriptor::service(Implementation::instance(1u32)).when(|request| !request.is_root()),
        )
        .unwrap();
    services.add_transient_factory::<Outer, _>(|r| {
        r.get_required::<u32>();
        Outer
    });
    let provider = services.build();

    provider.get_required::<Outer>();
    provider.get_required::<Outer>();
    let stats = provider.plan_cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn factory_plans_are_keyed_by_the_consumer_lifetime() {
    struct Session;
    struct Handler;
    struct Cache;

    let mut services = ServiceCollection::new();
    services.add_scoped_factory::<Session, _>(|_| Session);
    services.add_transient_factory::<Handler, _>(|r| {
        r.get_required::<Session>();
        Handler
    });
    services
        .add_service(
            ServiceType::of::<Cache>(),
            FactoryDescriptor::service(Implementation::of::<Cache, _>(|ctx| {
                ctx.get::<Session>()?;
                Ok(Cache)
            }))
            .with_lifetime(Lifetime::Singleton),
        )
        .unwrap();
    let provider = services.build();
    let scope = provider.create_scope();

    assert!(scope.get::<Handler>().is_ok());
    assert!(matches!(
        scope.get::<Cache>().err(),
        Some(DiError::CaptiveDependency { .. })
    ));
}

#[test]
fn reused_factory_plans_see_the_current_chain() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut services = ServiceCollection::new();
    for consumer in ["Report", "Audit"] {
        services
            .add_service(
                ServiceType::named(consumer),
                FactoryDescriptor::service(Implementation::new(consumer, |ctx| {
                    ctx.resolve(&ServiceType::named("Store"), None)
                })),
            )
            .unwrap();
    }
    services
        .add_service(
            ServiceType::named("Store"),
            FactoryDescriptor::service(
                Implementation::new("Store", |ctx| Ok(ctx.arg_any(0).cloned().unwrap_or_else(|| Arc::new(()) as AnyArc)))
                    .with_parameters([Parameter::new(ServiceType::named("Pool"))]),
            ),
        )
        .unwrap();
    let recorded = seen.clone();
    services
        .add_service(
            ServiceType::named("Pool"),
            FactoryDescriptor::service(Implementation::new("Pool", move |ctx| {
                let chain: Vec<String> = ctx.request().ancestors().map(|r| r.identity().to_string()).collect();
                recorded.lock().unwrap().push(chain);
                Ok(Arc::new(()) as AnyArc)
            })),
        )
        .unwrap();
    let provider = services.build();

    provider.resolve(&ServiceType::named("Report"), None).unwrap();
    provider.resolve(&ServiceType::named("Audit"), None).unwrap();

    assert_eq!(provider.plan_cache_stats().hits, 1);
    assert_eq!(*seen.lock().unwrap(), [["Store", "Report"], ["Store", "Audit"]]);
}

#[test]
fn failed_plans_are_not_cached() {
    let provider = ServiceCollection::new().build();
    assert!(provider.get::<u32>().is_err());
    assert!(provider.get::<u32>().is_err());

    let stats = provider.plan_cache_stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.entries, 0);
}

#[test]
fn registration_changes_invalidate_cached_plans() {
    let ty = ServiceType::named("Greeting");
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ty.clone(),
            FactoryDescriptor::service(Implementation::instance("hello".to_string())),
        )
        .unwrap();
    let provider = services.build();

    assert_eq!(
        *provider.resolve(&ty, None).unwrap().downcast::<String>().unwrap(),
        "hello"
    );
    provider
        .add_service(
            ty.clone(),
            FactoryDescriptor::service(Implementation::instance("hi".to_string())),
        )
        .unwrap();

    let stats = provider.plan_cache_stats();
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.entries, 0);
    assert_eq!(
        *provider.resolve(&ty, None).unwrap().downcast::<String>().unwrap(),
        "hi"
    );

    // Removing nothing keeps the cache
    assert_eq!(provider.unregister(&ServiceType::named("Unknown"), None), 0);
    assert_eq!(provider.plan_cache_stats().invalidations, 1);

    assert_eq!(provider.unregister(&ty, None), 2);
    assert_eq!(provider.plan_cache_stats().invalidations, 2);
    assert!(provider.resolve(&ty, None).is_err());
}

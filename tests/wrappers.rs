/// Func, Lazy, Collection and registered wrapper families.
use ferrous_ioc::{
    AnyArc, Collection, DiError, FactoryDescriptor, Func, Implementation, Lazy, Lifetime, Parameter, Resolver,
    ResolverCore, ServiceCollection, ServiceKey, ServiceType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(&ferrous_ioc::ResolverContext<'_>) -> ferrous_ioc::DiResult<AnyArc> + Send + Sync + 'static {
    let counter = counter.clone();
    move |_| Ok(Arc::new(counter.fetch_add(1, Ordering::SeqCst) + 1) as AnyArc)
}

#[test]
fn func_creates_a_new_transient_per_call() {
    let built = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::of::<usize>(),
            FactoryDescriptor::service(Implementation::new("Counter", counting(&built))),
        )
        .unwrap();

    let provider = services.build();
    let func = provider.get_func::<usize>().unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert_eq!(*func.call_as::<usize>().unwrap(), 1);
    assert_eq!(*func.call_as::<usize>().unwrap(), 2);
    assert_eq!(func.service_type(), &ServiceType::of::<usize>());
}

#[test]
fn func_over_singleton_returns_the_same_instance() {
    let built = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::of::<usize>(),
            FactoryDescriptor::service(Implementation::new("Counter", counting(&built)))
                .with_lifetime(Lifetime::Singleton),
        )
        .unwrap();

    let provider = services.build();
    let func = provider.get_func::<usize>().unwrap();
    let a = func.call_as::<usize>().unwrap();
    let b = func.call_as::<usize>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &provider.get_required::<usize>()));
}

#[test]
fn lazy_defers_and_memoizes() {
    let built = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::of::<usize>(),
            FactoryDescriptor::service(Implementation::new("Counter", counting(&built))),
        )
        .unwrap();

    let provider = services.build();
    let lazy = provider.get_lazy::<usize>().unwrap();
    assert!(!lazy.is_created());
    assert_eq!(built.load(Ordering::SeqCst), 0);

    let a = lazy.value_as::<usize>().unwrap();
    let b = lazy.value_as::<usize>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(lazy.is_created());
    assert_eq!(built.load(Ordering::SeqCst), 1);

    // A second Lazy is a separate deferral
    let other = provider.get_lazy::<usize>().unwrap();
    assert_eq!(*other.value_as::<usize>().unwrap(), 2);
}

#[test]
fn wrapped_dependencies_are_explained() {
    struct Consumer;
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::named("Dep"),
            FactoryDescriptor::service(Implementation::new("Dep", |_| Ok(Arc::new(()) as AnyArc))),
        )
        .unwrap();
    services
        .add_service(
            ServiceType::of::<Consumer>(),
            FactoryDescriptor::service(
                Implementation::of::<Consumer, _>(|ctx| {
                    let _func = ctx.arg::<Func>(0)?;
                    let _lazy = ctx.arg::<Lazy>(1)?;
                    Ok(Consumer)
                })
                .with_parameters([
                    Parameter::new(ServiceType::func(ServiceType::named("Dep"))),
                    Parameter::new(ServiceType::lazy(ServiceType::named("Dep"))),
                ]),
            ),
        )
        .unwrap();

    let provider = services.build();
    assert_eq!(
        provider.explain(&ServiceType::of::<Consumer>(), None).unwrap(),
        "new Consumer(Func(() => new Dep()), Lazy(() => new Dep()))"
    );
    assert!(provider.get::<Consumer>().is_ok());
}

#[test]
fn collection_carries_keys_in_registration_order() {
    let mut services = ServiceCollection::new();
    services.add_singleton(1u32);
    services.add_keyed_singleton("two", 2u32).unwrap();
    services.add_singleton(3u32);

    let provider = services.build();
    let collection = provider.get_collection::<u32>().unwrap();
    let values: Vec<u32> = collection.cast::<u32>().unwrap().iter().map(|v| **v).collect();
    assert_eq!(values, [1, 2, 3]);
    let keys: Vec<Option<&ServiceKey>> = collection.keys().collect();
    assert_eq!(keys, [None, Some(&ServiceKey::from("two")), None]);
}

#[test]
fn empty_collection_is_not_an_error() {
    let provider = ServiceCollection::new().build();
    let collection = provider.get_collection::<u32>().unwrap();
    assert!(collection.is_empty());
}

#[test]
fn collection_of_funcs_defers_every_item() {
    let built = Arc::new(AtomicUsize::new(0));
    let ty = ServiceType::named("Plugin");
    let mut services = ServiceCollection::new();
    for name in ["A", "B"] {
        let built = built.clone();
        services
            .add_service(
                ty.clone(),
                FactoryDescriptor::service(Implementation::new(name, move |_| {
                    built.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(name) as AnyArc)
                })),
            )
            .unwrap();
    }

    let provider = services.build();
    let wanted = ServiceType::collection(ServiceType::func(ty.clone()));
    let any = provider.resolve(&wanted, None).unwrap();
    let collection = any.downcast::<Collection>().unwrap();
    assert_eq!(collection.len(), 2);
    assert_eq!(built.load(Ordering::SeqCst), 0);

    let names: Vec<&'static str> = collection
        .values()
        .map(|value| {
            let func = value.clone().downcast::<Func>().unwrap();
            *func.call_as::<&'static str>().unwrap()
        })
        .collect();
    assert_eq!(names, ["A", "B"]);
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

struct Owned {
    value: AnyArc,
    label: String,
}

fn owned_wrapper() -> FactoryDescriptor {
    FactoryDescriptor::wrapper(
        Implementation::generic("Owned", |ctx| {
            Ok(Arc::new(Owned {
                value: ctx.decoratee_any()?.clone(),
                label: ctx.implementation_name().to_string(),
            }) as AnyArc)
        })
        .with_parameters([Parameter::decoratee()]),
    )
}

#[test]
fn registered_wrapper_family_receives_the_inner_service() {
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::named("Conn"),
            FactoryDescriptor::service(Implementation::new("Conn", |_| Ok(Arc::new(7u8) as AnyArc))),
        )
        .unwrap();
    services.add_wrapper("Owned", owned_wrapper()).unwrap();

    let provider = services.build();
    let wanted = ServiceType::generic("Owned", [ServiceType::named("Conn")]);
    assert_eq!(provider.explain(&wanted, None).unwrap(), "new Owned<Conn>(new Conn())");

    let owned = provider.resolve(&wanted, None).unwrap().downcast::<Owned>().unwrap();
    assert_eq!(owned.label, "Owned<Conn>");
    assert_eq!(*owned.value.clone().downcast::<u8>().unwrap(), 7);
}

#[test]
fn unregistered_family_is_not_a_wrapper() {
    let provider = ServiceCollection::new().build();
    let wanted = ServiceType::generic("Owned", [ServiceType::named("Conn")]);
    assert!(matches!(
        provider.resolve(&wanted, None),
        Err(DiError::ServiceNotRegistered { .. })
    ));
}

#[test]
fn wrapper_failures_keep_their_cause() {
    let mut services = ServiceCollection::new();
    services.add_wrapper("Owned", owned_wrapper()).unwrap();
    let provider = services.build();

    let err = provider
        .resolve(&ServiceType::generic("Owned", [ServiceType::named("Missing")]), None)
        .unwrap_err();
    assert!(matches!(err, DiError::WrapperConstructionFailed { .. }));
    assert_eq!(
        err.root_cause(),
        &DiError::ServiceNotRegistered {
            service: "Missing".to_string()
        }
    );

    let err = provider.get_func::<u64>().unwrap_err();
    assert_eq!(err.to_string(), "Unable to construct Func<u64>: Service not registered: u64");

    // Optional wrappers of a missing service are absent, not failures
    assert!(provider
        .try_resolve(&ServiceType::lazy(ServiceType::named("Missing")), None)
        .unwrap()
        .is_none());
}

#[test]
fn deferred_factory_errors_are_wrapped_and_lazy_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    let ty = ServiceType::named("Flaky");
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ty.clone(),
            FactoryDescriptor::service(Implementation::new("Flaky", move |_| {
                if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DiError::factory("Flaky", "warming up"))
                } else {
                    Ok(Arc::new(1u8) as AnyArc)
                }
            })),
        )
        .unwrap();

    let provider = services.build();
    let lazy = provider
        .resolve(&ServiceType::lazy(ty.clone()), None)
        .unwrap()
        .downcast::<Lazy>()
        .unwrap();
    let err = lazy.value().unwrap_err();
    assert!(matches!(err.root_cause(), DiError::FactoryFailed { .. }));
    assert!(!lazy.is_created());
    assert_eq!(*lazy.value_as::<u8>().unwrap(), 1);
}

#[test]
fn deferred_resolution_fails_once_the_scope_is_closed() {
    let mut services = ServiceCollection::new();
    services.add_scoped_factory::<u32, _>(|_| 5);
    let provider = services.build();

    let scope = provider.create_scope();
    let func = scope.get_func::<u32>().unwrap();
    assert_eq!(*func.call_as::<u32>().unwrap(), 5);

    scope.close().unwrap();
    assert_eq!(func.call().unwrap_err(), DiError::ScopeDisposed);
}

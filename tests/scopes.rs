use ferrous_ioc::{
    ContainerRules, DiError, FactoryDescriptor, Implementation, Lifetime, Parameter, Resolver, ResolverCore, ServiceCollection,
    ServiceType,
};
use std::sync::{Arc, Mutex};

#[test]
fn test_scoped_lifetime() {
    #[derive(Debug, Clone)]
    struct RequestContext {
        id: String,
    }

    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<RequestContext, _>(move |_| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        RequestContext {
            id: format!("req-{}", *c),
        }
    });

    let sp = sc.build();

    // Create two scopes
    let scope1 = sp.create_scope();
    let scope2 = sp.create_scope();

    let ctx1a = scope1.get_required::<RequestContext>();
    let ctx1b = scope1.get_required::<RequestContext>();
    let ctx2 = scope2.get_required::<RequestContext>();

    assert!(Arc::ptr_eq(&ctx1a, &ctx1b));
    assert!(!Arc::ptr_eq(&ctx1a, &ctx2));
    assert_eq!(ctx1a.id, "req-1");
    assert_eq!(ctx2.id, "req-2");
    assert_eq!(*counter.lock().unwrap(), 2);
}

#[test]
fn test_nested_scopes_have_their_own_instances() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<String, _>(|_| "scoped".to_string());
    let sp = sc.build();

    let outer = sp.create_scope();
    let inner = outer.create_scope();
    assert!(!Arc::ptr_eq(
        &outer.get_required::<String>(),
        &inner.get_required::<String>()
    ));
}

#[test]
fn test_scoped_at_root_fails() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<u32, _>(|_| 1);
    let sp = sc.build();

    assert_eq!(
        sp.get::<u32>().unwrap_err(),
        DiError::NoCurrentScope {
            service: "u32".to_string()
        }
    );
}

#[test]
fn test_scoped_to_uses_nearest_named_ancestor() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_to_factory::<String, _>("request", |_| "per-request".to_string());
    let sp = sc.build();

    let request = sp.create_named_scope("request");
    let child = request.create_scope();
    let grandchild = child.create_scope();
    assert_eq!(request.name(), Some("request"));
    assert_eq!(child.name(), None);

    let a = grandchild.get_required::<String>();
    let b = child.get_required::<String>();
    let c = request.get_required::<String>();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &c));

    // A nested scope with the same name owns its own instance
    let nested = grandchild.create_named_scope("request");
    assert!(!Arc::ptr_eq(&a, &nested.get_required::<String>()));
}

#[test]
fn test_scoped_to_without_matching_scope() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_to_factory::<String, _>("request", |_| "per-request".to_string());
    let sp = sc.build();

    let other = sp.create_named_scope("job");
    let err = other.get::<String>().unwrap_err();
    assert_eq!(
        err,
        DiError::NoMatchingScope {
            service: "alloc::string::String".to_string(),
            scope: "request".to_string(),
        }
    );
}

#[test]
fn test_singleton_resolved_from_scope_lives_in_root() {
    let mut sc = ServiceCollection::new();
    sc.add_singleton_factory::<u64, _>(|_| 99);
    let sp = sc.build();

    let from_scope = {
        let scope = sp.create_scope();
        let value = scope.get_required::<u64>();
        scope.close().unwrap();
        value
    };
    assert!(Arc::ptr_eq(&from_scope, &sp.get_required::<u64>()));
}

fn singleton_over_scoped(rules: ContainerRules) -> ServiceCollection {
    struct Session;
    let mut sc = ServiceCollection::new().with_rules(rules);
    sc.add_scoped_factory::<Session, _>(|_| Session);
    sc.add_service(
        ServiceType::named("Cache"),
        FactoryDescriptor::service(
            Implementation::new("Cache", |ctx| {
                let session = ctx.arg_any(0).cloned();
                Ok(Arc::new(session.is_some()) as ferrous_ioc::AnyArc)
            })
            .with_parameters([Parameter::of::<Session>()]),
        )
        .with_lifetime(Lifetime::Singleton),
    )
    .unwrap();
    sc
}

#[test]
fn test_captive_dependency_is_rejected() {
    let sp = singleton_over_scoped(ContainerRules::default()).build();
    let scope = sp.create_scope();

    let err = scope.resolve(&ServiceType::named("Cache"), None).unwrap_err();
    match err {
        DiError::CaptiveDependency {
            consumer,
            consumer_lifetime,
            dependency_lifetime,
            ..
        } => {
            assert_eq!(consumer, "Cache");
            assert_eq!(consumer_lifetime, "singleton");
            assert_eq!(dependency_lifetime, "scoped");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_captive_check_can_be_disabled() {
    let rules = ContainerRules {
        throw_if_dependency_has_shorter_lifetime: false,
        ..Default::default()
    };
    let sp = singleton_over_scoped(rules).build();
    let scope = sp.create_scope();

    // The singleton is built in the root, where no scope is current
    let err = scope.resolve(&ServiceType::named("Cache"), None).unwrap_err();
    assert!(matches!(err, DiError::NoCurrentScope { .. }));
}

#[test]
fn test_captive_check_applies_to_factory_resolutions() {
    struct Session;
    struct Cache {
        session: Result<Arc<Session>, DiError>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<Session, _>(|_| Session);
    sc.add_singleton_factory::<Cache, _>(|r| Cache {
        session: r.get::<Session>(),
    });
    let sp = sc.build();

    let scope = sp.create_scope();
    let cache = scope.get_required::<Cache>();
    assert!(matches!(cache.session, Err(DiError::CaptiveDependency { .. })));
    assert!(scope.get::<Session>().is_ok());
}

#[test]
fn test_transient_dependencies_are_never_captive() {
    struct Counter;
    struct Holder {
        _counter: Arc<Counter>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<Counter, _>(|_| Counter);
    sc.add_singleton_factory::<Holder, _>(|r| Holder {
        _counter: r.get_required::<Counter>(),
    });
    let sp = sc.build();
    assert!(sp.get::<Holder>().is_ok());
}

#[test]
fn test_closed_scope_rejects_resolution() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<u32, _>(|_| 1);
    let sp = sc.build();

    let scope = sp.create_scope();
    let child = scope.create_scope();
    scope.close().unwrap();

    assert!(scope.is_closed());
    assert_eq!(scope.get::<u32>().unwrap_err(), DiError::ScopeDisposed);
    assert_eq!(child.get::<u32>().unwrap_err(), DiError::ScopeDisposed);

    sp.close().unwrap();
    assert!(sp.is_closed());
    assert_eq!(sp.create_scope().get::<u32>().unwrap_err(), DiError::ScopeDisposed);
}

use ferrous_ioc::{
    AnyArc, ContainerRules, DiError, FactoryDescriptor, Implementation, Parameter, ResolverCore, ServiceCollection,
    ServiceType,
};
use std::sync::Arc;

fn depends_on(name: &'static str, dependency: ServiceType) -> FactoryDescriptor {
    FactoryDescriptor::service(
        Implementation::new(name, |ctx| Ok(ctx.arg_any(0).cloned().unwrap_or_else(|| Arc::new(()) as AnyArc)))
            .with_parameters([Parameter::new(dependency)]),
    )
}

fn resolving_inside(name: &'static str, dependency: &'static str) -> FactoryDescriptor {
    FactoryDescriptor::service(Implementation::new(name, move |ctx| {
        ctx.resolve(&ServiceType::named(dependency), None)
    }))
}

fn path_of(err: DiError) -> Vec<String> {
    match err {
        DiError::RecursiveDependencyDetected { path } => path,
        other => panic!("expected a recursive dependency, got: {other}"),
    }
}

#[test]
fn declared_cycle_is_detected_while_planning() {
    let mut services = ServiceCollection::new();
    services
        .add_service(ServiceType::named("A"), depends_on("A", ServiceType::named("B")))
        .unwrap();
    services
        .add_service(ServiceType::named("B"), depends_on("B", ServiceType::named("A")))
        .unwrap();

    let provider = services.build();
    let err = provider.resolve(&ServiceType::named("A"), None).unwrap_err();
    assert_eq!(path_of(err.clone()), ["A", "B", "A"]);
    assert_eq!(err.to_string(), "Recursive dependency detected: A -> B -> A");
    assert!(provider.explain(&ServiceType::named("B"), None).is_err());
}

#[test]
fn self_dependency_is_detected() {
    let mut services = ServiceCollection::new();
    services
        .add_service(ServiceType::named("A"), depends_on("A", ServiceType::named("A")))
        .unwrap();

    let provider = services.build();
    let err = provider.resolve(&ServiceType::named("A"), None).unwrap_err();
    assert_eq!(path_of(err), ["A", "A"]);
}

#[test]
fn cycle_through_factory_resolutions_is_detected() {
    let mut services = ServiceCollection::new();
    services
        .add_service(ServiceType::named("A"), resolving_inside("A", "B"))
        .unwrap();
    services
        .add_service(ServiceType::named("B"), resolving_inside("B", "C"))
        .unwrap();
    services
        .add_service(ServiceType::named("C"), resolving_inside("C", "A"))
        .unwrap();

    let provider = services.build();
    let err = provider.resolve(&ServiceType::named("A"), None).unwrap_err();
    assert_eq!(path_of(err), ["A", "B", "C", "A"]);
}

#[test]
fn deferred_wrappers_do_not_hide_cycles() {
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::named("A"),
            depends_on("A", ServiceType::func(ServiceType::named("A"))),
        )
        .unwrap();

    let provider = services.build();
    let err = provider.resolve(&ServiceType::named("A"), None).unwrap_err();
    assert_eq!(path_of(err.root_cause().clone()), ["A", "Func<A>", "A"]);
}

#[test]
fn same_type_under_another_key_is_not_a_cycle() {
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::named("Node"),
            FactoryDescriptor::service(
                Implementation::new("Outer", |ctx| Ok(ctx.arg_any(0).cloned().unwrap_or_else(|| Arc::new(()) as AnyArc)))
                    .with_parameters([Parameter::new(ServiceType::named("Node")).keyed("leaf")]),
            ),
        )
        .unwrap();
    services
        .add_service(
            ServiceType::named("Node"),
            FactoryDescriptor::service(Implementation::new("Leaf", |_| Ok(Arc::new(1u8) as AnyArc))).keyed("leaf"),
        )
        .unwrap();

    let provider = services.build();
    assert_eq!(
        provider.explain(&ServiceType::named("Node"), None).unwrap(),
        "new Outer(new Leaf())"
    );
}

#[test]
fn depth_limit_is_enforced() {
    let rules = ContainerRules {
        max_resolution_depth: 3,
        ..Default::default()
    };
    let mut services = ServiceCollection::new().with_rules(rules);
    let names = ["S0", "S1", "S2", "S3", "S4"];
    for pair in names.windows(2) {
        services
            .add_service(ServiceType::named(pair[0]), depends_on(pair[0], ServiceType::named(pair[1])))
            .unwrap();
    }
    services
        .add_service(
            ServiceType::named("S4"),
            FactoryDescriptor::service(Implementation::new("S4", |_| Ok(Arc::new(()) as AnyArc))),
        )
        .unwrap();

    let provider = services.build();
    assert_eq!(
        provider.resolve(&ServiceType::named("S0"), None).unwrap_err(),
        DiError::DepthExceeded(3)
    );
    assert!(provider.resolve(&ServiceType::named("S1"), None).is_ok());
}

#[test]
fn reused_factory_plans_still_detect_cycles() {
    let mut services = ServiceCollection::new();
    services
        .add_service(ServiceType::named("Report"), resolving_inside("Report", "Store"))
        .unwrap();
    services
        .add_service(ServiceType::named("Store"), depends_on("Store", ServiceType::named("Ledger")))
        .unwrap();
    // Ledger only reaches back for Store when it is resolved directly
    services
        .add_service(
            ServiceType::named("Ledger"),
            FactoryDescriptor::service(Implementation::new("Ledger", |ctx| {
                if ctx.request().is_root() {
                    ctx.resolve(&ServiceType::named("Store"), None)
                } else {
                    Ok(Arc::new(()) as AnyArc)
                }
            })),
        )
        .unwrap();

    let provider = services.build();
    assert!(provider.resolve(&ServiceType::named("Report"), None).is_ok());

    let err = provider.resolve(&ServiceType::named("Ledger"), None).unwrap_err();
    assert_eq!(path_of(err), ["Ledger", "Store", "Ledger"]);
}

#[test]
fn reused_factory_plans_still_respect_the_depth_limit() {
    let rules = ContainerRules {
        max_resolution_depth: 3,
        ..Default::default()
    };
    let mut services = ServiceCollection::new().with_rules(rules);
    services
        .add_service(ServiceType::named("Report"), resolving_inside("Report", "Store"))
        .unwrap();
    services
        .add_service(ServiceType::named("Audit"), resolving_inside("Audit", "Gate"))
        .unwrap();
    services
        .add_service(ServiceType::named("Gate"), resolving_inside("Gate", "Store"))
        .unwrap();
    services
        .add_service(ServiceType::named("Store"), depends_on("Store", ServiceType::named("Pool")))
        .unwrap();
    services
        .add_service(ServiceType::named("Pool"), depends_on("Pool", ServiceType::named("Conn")))
        .unwrap();
    services
        .add_service(
            ServiceType::named("Conn"),
            FactoryDescriptor::service(Implementation::new("Conn", |_| Ok(Arc::new(()) as AnyArc))),
        )
        .unwrap();

    let provider = services.build();
    assert!(provider.resolve(&ServiceType::named("Report"), None).is_ok());
    assert_eq!(
        provider.resolve(&ServiceType::named("Audit"), None).unwrap_err(),
        DiError::DepthExceeded(3)
    );
}

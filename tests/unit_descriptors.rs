/// Unit tests for registration descriptors and their introspection view
use ferrous_ioc::{
    AnyArc, ContainerRules, FactoryDescriptor, Implementation, Lifetime, Parameter, ServiceCollection, ServiceKey,
    ServiceType, SetupKind,
};
use std::sync::Arc;

fn unit(name: &'static str) -> Implementation {
    Implementation::new(name, |_| Ok(Arc::new(()) as AnyArc))
}

#[test]
fn test_builder_methods_are_reflected() {
    let descriptor = FactoryDescriptor::decorator(unit("Audit").with_parameters([Parameter::decoratee()]))
        .with_lifetime(Lifetime::Scoped)
        .keyed("audit")
        .order(-2)
        .when(|_| true);

    assert_eq!(descriptor.setup(), SetupKind::Decorator);
    assert_eq!(descriptor.lifetime(), Some(&Lifetime::Scoped));
    assert_eq!(descriptor.service_key(), Some(&ServiceKey::from("audit")));
    assert_eq!(descriptor.order_hint(), -2);
    assert!(descriptor.has_condition());
    assert_eq!(descriptor.implementation().name(), "Audit");
}

#[test]
fn test_parameters_are_declared_in_order() {
    let implementation = unit("Car").with_parameters([
        Parameter::of::<u32>(),
        Parameter::new(ServiceType::named("Wheel")).keyed("front").optional(),
    ]);
    let parameters = implementation.declared_parameters(&ServiceType::named("Car"));

    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0].service_type, ServiceType::of::<u32>());
    assert!(parameters[0].required);
    assert_eq!(parameters[1].service_key, Some(ServiceKey::from("front")));
    assert!(!parameters[1].required);
}

#[test]
fn test_collection_descriptors() {
    let rules = ContainerRules {
        default_lifetime: Lifetime::Scoped,
        ..Default::default()
    };
    let mut services = ServiceCollection::new().with_rules(rules);
    services
        .add_service(ServiceType::named("S"), FactoryDescriptor::service(unit("S")))
        .unwrap();
    services
        .add_service(
            ServiceType::named("S"),
            FactoryDescriptor::service(unit("Keyed")).keyed(9).with_lifetime(Lifetime::Singleton),
        )
        .unwrap();
    services
        .add_decorator(
            ServiceType::named("S"),
            FactoryDescriptor::decorator(unit("D").with_parameters([Parameter::decoratee()])).order(4),
        )
        .unwrap();

    let descriptors = services.get_service_descriptors();
    assert_eq!(descriptors.len(), 3);

    let plain = &descriptors[0];
    assert_eq!(plain.type_name(), "S");
    assert_eq!(plain.implementation, "S");
    assert_eq!(plain.lifetime, Lifetime::Scoped);
    assert!(!plain.is_keyed());

    let keyed = &descriptors[1];
    assert_eq!(keyed.service_key, Some(ServiceKey::from(9)));
    assert_eq!(keyed.lifetime, Lifetime::Singleton);
    assert_ne!(keyed.factory_id, plain.factory_id);

    let decorator = &descriptors[2];
    assert_eq!(decorator.setup, SetupKind::Decorator);
    assert_eq!(decorator.order, 4);
}

#[test]
fn test_generic_descriptor_names() {
    let mut services = ServiceCollection::new();
    services
        .add_service(
            ServiceType::open("Repo", 1),
            FactoryDescriptor::service(Implementation::generic("Repo", |_| Ok(Arc::new(()) as AnyArc))),
        )
        .unwrap();

    let descriptors = services.get_service_descriptors();
    assert_eq!(descriptors[0].type_name(), "Repo<>");
    assert_eq!(descriptors[0].implementation, "Repo");
    assert!(services.contains(&ServiceType::open("Repo", 1)));
    assert!(!services.contains(&ServiceType::generic("Repo", [ServiceType::named("User")])));
}

#[test]
fn test_mismatched_setup_is_rejected() {
    let mut services = ServiceCollection::new();
    assert!(services
        .add_decorator(ServiceType::named("S"), FactoryDescriptor::service(unit("S")))
        .is_err());
    assert!(services
        .add_wrapper("Owned", FactoryDescriptor::decorator(unit("Owned")))
        .is_err());
    assert!(services.is_empty());
}

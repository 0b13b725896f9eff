/// Property-based tests for registration and resolution
///
/// These tests generate registration sequences and check the ordering rules
/// that must hold for any of them.
use ferrous_ioc::{
    AnyArc, FactoryDescriptor, IfAlreadyRegistered, Implementation, Parameter, Resolver, ServiceCollection,
    ServiceType,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ServiceA {
    value: String,
}

#[derive(Debug, Clone)]
struct TestService {
    id: u32,
}

fn unit_decorator(name: String, order: i32) -> FactoryDescriptor {
    FactoryDescriptor::decorator(
        Implementation::new(name, |ctx| Ok(ctx.decoratee_any()?.clone())).with_parameters([Parameter::decoratee()]),
    )
    .order(order)
}

proptest! {
    #[test]
    fn singleton_resolution_consistency(service_value in "\\PC{0,50}") {
        let mut services = ServiceCollection::new();
        services.add_singleton(ServiceA { value: service_value.clone() });

        let provider = services.build();
        let resolved1 = provider.get_required::<ServiceA>();
        let resolved2 = provider.create_scope().get_required::<ServiceA>();

        prop_assert!(Arc::ptr_eq(&resolved1, &resolved2));
        prop_assert_eq!(&resolved1.value, &service_value);
    }
}

proptest! {
    #[test]
    fn last_registration_wins_and_collections_keep_order(ids in prop::collection::vec(0u32..1000, 1..10)) {
        let mut services = ServiceCollection::new();
        for id in &ids {
            services.add_singleton(TestService { id: *id });
        }

        let provider = services.build();
        prop_assert_eq!(provider.get_required::<TestService>().id, *ids.last().unwrap());

        let all: Vec<u32> = provider.get_all::<TestService>().unwrap().iter().map(|s| s.id).collect();
        prop_assert_eq!(all, ids);
    }
}

proptest! {
    #[test]
    fn keep_policy_preserves_the_first_registration(ids in prop::collection::vec(0u32..1000, 1..10)) {
        let ty = ServiceType::of::<TestService>();
        let mut services = ServiceCollection::new();
        for id in &ids {
            services
                .register(
                    ty.clone(),
                    FactoryDescriptor::service(Implementation::instance(TestService { id: *id })),
                    IfAlreadyRegistered::Keep,
                )
                .unwrap();
        }

        let provider = services.build();
        prop_assert_eq!(provider.get_required::<TestService>().id, ids[0]);
        prop_assert_eq!(provider.get_all::<TestService>().unwrap().len(), 1);
    }
}

proptest! {
    #[test]
    fn keyed_resolution_matches_registered_keys(entries in prop::collection::btree_map("[a-z]{1,8}", 0u32..1000, 1..8)) {
        let mut services = ServiceCollection::new();
        for (key, id) in &entries {
            services.add_keyed_singleton(key.as_str(), TestService { id: *id }).unwrap();
        }

        let provider = services.build();
        for (key, id) in &entries {
            prop_assert_eq!(provider.get_keyed::<TestService>(key.as_str()).unwrap().id, *id);
        }
        prop_assert!(provider.get::<TestService>().is_err());
    }
}

proptest! {
    #[test]
    fn decorators_nest_by_order_then_registration(orders in prop::collection::vec(-3i32..3, 1..6)) {
        let s = ServiceType::named("S");
        let mut services = ServiceCollection::new();
        services
            .add_service(s.clone(), FactoryDescriptor::service(Implementation::new("S", |_| Ok(Arc::new(()) as AnyArc))))
            .unwrap();
        for (i, order) in orders.iter().enumerate() {
            services.add_decorator(s.clone(), unit_decorator(format!("D{}", i), *order)).unwrap();
        }

        // Innermost first: ascending order, ties by registration
        let mut sorted: BTreeMap<(i32, usize), String> = BTreeMap::new();
        for (i, order) in orders.iter().enumerate() {
            sorted.insert((*order, i), format!("D{}", i));
        }
        let mut expected = "new S()".to_string();
        for name in sorted.values() {
            expected = format!("new {}({})", name, expected);
        }

        let provider = services.build();
        prop_assert_eq!(provider.explain(&s, None).unwrap(), expected);
    }
}

proptest! {
    #[test]
    fn optional_resolution_matches_registration_state(register_service in any::<bool>()) {
        let mut services = ServiceCollection::new();
        if register_service {
            services.add_singleton(TestService { id: 42 });
        }

        let provider = services.build();
        prop_assert_eq!(provider.try_get::<TestService>().unwrap().is_some(), register_service);
        prop_assert_eq!(provider.get::<TestService>().is_ok(), register_service);
    }
}

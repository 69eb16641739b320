use cdolog::{
    graph::{
        GraphError,
        builder::GraphBuilder,
        global_id::GlobalId,
        node::PropertyValue,
    },
    metadata::{
        ConfigurationError,
        classifier::TypeMapper,
        registry::{EntityDefinition, PropertyDecl, TypeRef, TypeRegistry, ValueObjectDefinition},
    },
    object::{Instance, ObjectHeap, Value},
    types::Scalar,
};

fn types() -> TypeMapper {
    let registry = TypeRegistry::new()
        .entity(
            EntityDefinition::new("Person")
                .property(PropertyDecl::new("id", TypeRef::int()).id())
                .property(PropertyDecl::new("name", TypeRef::string()))
                .property(PropertyDecl::new("address", TypeRef::named("Address")))
                .property(PropertyDecl::new("addresses", TypeRef::list(TypeRef::named("Address"))))
                .property(PropertyDecl::new("homes", TypeRef::set(TypeRef::named("Address"))))
                .property(PropertyDecl::new(
                    "places",
                    TypeRef::map(TypeRef::string(), TypeRef::named("Address")),
                ))
                .property(PropertyDecl::new("friend", TypeRef::named("Person")))
                .property(PropertyDecl::new("session", TypeRef::named("Session")))
                .property(PropertyDecl::new("link", TypeRef::named("Link")))
                .property(PropertyDecl::new("password", TypeRef::string()).ignored()),
        )
        .value_object(
            ValueObjectDefinition::new("Address")
                .property(PropertyDecl::new("city", TypeRef::string()))
                .property(PropertyDecl::new("geo", TypeRef::named("Geo"))),
        )
        .value_object(
            ValueObjectDefinition::new("Geo")
                .property(PropertyDecl::new("lat", TypeRef::float()))
                .property(PropertyDecl::new("lon", TypeRef::float())),
        )
        .value_object(
            ValueObjectDefinition::new("Link")
                .property(PropertyDecl::new("label", TypeRef::string()))
                .property(PropertyDecl::new("next", TypeRef::named("Link"))),
        )
        .ignored("Session");
    TypeMapper::new(&registry).expect("valid registry")
}

fn address(heap: &mut ObjectHeap, city: &str) -> cdolog::object::ObjRef {
    heap.alloc(Instance::new("Address").with("city", city))
}

#[test]
fn entity_with_value_objects_gets_path_ids() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let geo = heap.alloc(Instance::new("Geo").with("lat", 48.85).with("lon", 2.35));
    let home = heap.alloc(Instance::new("Address").with("city", "Paris").with("geo", geo));
    let first = address(&mut heap, "Lyon");
    let second = address(&mut heap, "Nice");
    let person = heap.alloc(
        Instance::new("Person")
            .with("id", 1_i64)
            .with("name", "Ann")
            .with("address", home)
            .with("addresses", Value::refs([first, second])),
    );

    let graph = GraphBuilder::new(&types)
        .build(&heap, &[person])
        .expect("graph");

    let ids: Vec<String> = graph.ids().map(ToString::to_string).collect();
    assert_eq!(
        ids,
        vec![
            "Person/1",
            "Person/1#address",
            "Person/1#address/geo",
            "Person/1#addresses/0",
            "Person/1#addresses/1",
        ]
    );

    let root = graph.get(&GlobalId::instance("Person", 1_i64)).expect("root node");
    assert_eq!(root.type_name(), "Person");
    assert_eq!(root.get("name"), &PropertyValue::Scalar(Scalar::Text("Ann".to_string())));
    assert_eq!(
        root.get("address").as_reference().map(ToString::to_string),
        Some("Person/1#address".to_string())
    );
    assert!(root.get("friend").is_null());
    assert_eq!(graph.roots(), &[GlobalId::instance("Person", 1_i64)]);
}

#[test]
fn value_object_root_is_unbounded() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let home = address(&mut heap, "Paris");

    let graph = GraphBuilder::new(&types).build(&heap, &[home]).expect("graph");

    assert_eq!(graph.len(), 1);
    let id = GlobalId::unbounded("Address");
    assert_eq!(id.to_string(), "Address/");
    assert!(graph.contains(&id));
}

#[test]
fn cycles_between_entities_yield_one_node_each() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let a = heap.alloc(Instance::new("Person").with("id", 1_i64));
    let b = heap.alloc(Instance::new("Person").with("id", 2_i64).with("friend", a));
    heap.get_mut(a).expect("a").set("friend", b);

    let graph = GraphBuilder::new(&types).build(&heap, &[a]).expect("graph");

    assert_eq!(graph.len(), 2);
    let node_b = graph.get(&GlobalId::instance("Person", 2_i64)).expect("b");
    assert_eq!(
        node_b.get("friend").as_reference(),
        Some(&GlobalId::instance("Person", 1_i64))
    );
}

#[test]
fn cycles_between_value_objects_terminate_with_first_path_ids() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let first = heap.alloc(Instance::new("Link").with("label", "a"));
    let second = heap.alloc(Instance::new("Link").with("label", "b").with("next", first));
    heap.get_mut(first).expect("first").set("next", second);
    let person = heap.alloc(Instance::new("Person").with("id", 1_i64).with("link", first));

    let graph = GraphBuilder::new(&types).build(&heap, &[person]).expect("graph");

    let ids: Vec<String> = graph.ids().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["Person/1", "Person/1#link", "Person/1#link/next"]);
    let head = GlobalId::instance("Person", 1_i64).child("link");
    let tail = graph.get(&head.child("next")).expect("tail");
    assert_eq!(tail.get("next").as_reference(), Some(&head));
}

#[test]
fn self_referencing_value_object_root_is_one_node() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let ring = heap.alloc(Instance::new("Link").with("label", "loop"));
    heap.get_mut(ring).expect("ring").set("next", ring);

    let graph = GraphBuilder::new(&types).build(&heap, &[ring]).expect("graph");

    assert_eq!(graph.len(), 1);
    let id = GlobalId::unbounded("Link");
    assert_eq!(graph.get(&id).expect("ring").get("next").as_reference(), Some(&id));
}

#[test]
fn nested_owner_ids_order_consistently_with_equality() {
    let person = GlobalId::instance("Person", 1_i64);
    let nested = GlobalId::ValueObject {
        owner: Box::new(person.child("a")),
        fragment: "b".to_string(),
    };
    let sibling = person.child("b");
    let flat = person.child("a").child("b");

    assert_ne!(nested, sibling);
    assert_ne!(nested.cmp(&sibling), std::cmp::Ordering::Equal);
    assert_ne!(nested, flat);
    assert_ne!(nested.cmp(&flat), std::cmp::Ordering::Equal);
    assert!(person < person.child("a"));
    assert!(person.child("a") < nested);

    let ordered: std::collections::BTreeSet<GlobalId> =
        [nested.clone(), sibling.clone(), flat.clone()].into_iter().collect();
    assert_eq!(ordered.len(), 3);
}

#[test]
fn set_elements_are_identified_by_content() {
    let types = types();

    let build = |cities: [&str; 2]| {
        let mut heap = ObjectHeap::new();
        let a = address(&mut heap, cities[0]);
        let b = address(&mut heap, cities[1]);
        let person = heap.alloc(
            Instance::new("Person")
                .with("id", 1_i64)
                .with("homes", Value::refs([a, b])),
        );
        GraphBuilder::new(&types).build(&heap, &[person]).expect("graph")
    };

    let forward = build(["Paris", "Rome"]);
    let backward = build(["Rome", "Paris"]);
    let forward_ids: Vec<&GlobalId> = forward.ids().collect();
    let backward_ids: Vec<&GlobalId> = backward.ids().collect();
    assert_eq!(forward_ids, backward_ids);
    assert_eq!(forward.len(), 3);
    assert!(
        forward
            .ids()
            .filter(|id| id.is_value_object())
            .all(|id| id.to_string().starts_with("Person/1#homes/"))
    );
}

#[test]
fn map_values_are_identified_by_key() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let home = address(&mut heap, "Paris");
    let person = heap.alloc(
        Instance::new("Person")
            .with("id", 1_i64)
            .with("places", Value::Map(vec![(Value::text("home"), Value::Ref(home))])),
    );

    let graph = GraphBuilder::new(&types).build(&heap, &[person]).expect("graph");

    let id = GlobalId::instance("Person", 1_i64).child("places/home");
    assert_eq!(id.to_string(), "Person/1#places/home");
    assert!(graph.contains(&id));
}

#[test]
fn ignored_properties_and_classes_are_not_captured() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let session = heap.alloc(Instance::new("Session").with("token", "abc"));
    let person = heap.alloc(
        Instance::new("Person")
            .with("id", 1_i64)
            .with("password", "hunter2")
            .with("session", session),
    );

    let graph = GraphBuilder::new(&types).build(&heap, &[person]).expect("graph");

    assert_eq!(graph.len(), 1);
    let node = graph.get(&GlobalId::instance("Person", 1_i64)).expect("node");
    assert!(node.get("password").is_null());
    assert!(node.get("session").is_null());
    let names: Vec<&str> = node.state().names().collect();
    assert_eq!(names, vec!["id"]);
}

#[test]
fn identity_errors_are_reported() {
    let types = types();
    let mut heap = ObjectHeap::new();
    let nameless = heap.alloc(Instance::new("Person").with("name", "Ann"));
    let floating = heap.alloc(Instance::new("Person").with("id", 1.5));
    let stranger = heap.alloc(Instance::new("Alien").with("id", 1_i64));
    let builder = GraphBuilder::new(&types);

    assert!(matches!(
        builder.build(&heap, &[nameless]),
        Err(GraphError::NullIdentity { .. })
    ));
    assert!(matches!(
        builder.build(&heap, &[floating]),
        Err(GraphError::InvalidIdentity { .. })
    ));
    assert!(matches!(
        builder.build(&heap, &[stranger]),
        Err(GraphError::Configuration(ConfigurationError::UnregisteredClass { .. }))
    ));
}

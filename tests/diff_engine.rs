use std::sync::Arc;

use cdolog::{
    diff::{
        DiffEngine, DiffOptions, ListCompareAlgorithm,
        change::{ChangeKind, ElementChange},
    },
    graph::{
        builder::GraphBuilder,
        global_id::GlobalId,
        node::{Node, ObjectGraph, PropertyMap, PropertyValue},
    },
    metadata::{
        classifier::TypeMapper,
        registry::{
            CustomComparator, EntityDefinition, PropertyDecl, TypeRef, TypeRegistry,
            ValueComparator, ValueObjectDefinition,
        },
    },
    object::{Instance, ObjRef, ObjectHeap, Value},
    types::Scalar,
};

struct CaseInsensitive;

impl ValueComparator for CaseInsensitive {
    fn equals(&self, left: &Scalar, right: &Scalar) -> bool {
        match (left, right) {
            (Scalar::Text(a), Scalar::Text(b)) => a.eq_ignore_ascii_case(b),
            _ => left == right,
        }
    }

    fn to_display(&self, value: &Scalar) -> String {
        format!("<{value}>")
    }
}

struct RoundedMoney;

impl CustomComparator for RoundedMoney {
    fn equals(&self, left: &PropertyValue, right: &PropertyValue) -> bool {
        match (left, right) {
            (PropertyValue::Scalar(Scalar::Float(a)), PropertyValue::Scalar(Scalar::Float(b))) => {
                (a - b).abs() < 0.01
            }
            _ => left == right,
        }
    }
}

fn types() -> TypeMapper {
    let registry = TypeRegistry::new()
        .entity(
            EntityDefinition::new("Person")
                .property(PropertyDecl::new("id", TypeRef::int()).id())
                .property(PropertyDecl::new("name", TypeRef::string()))
                .property(PropertyDecl::new("email", TypeRef::named("Email")))
                .property(PropertyDecl::new("scores", TypeRef::list(TypeRef::int())))
                .property(PropertyDecl::new("tags", TypeRef::set(TypeRef::string())))
                .property(PropertyDecl::new(
                    "ratings",
                    TypeRef::map(TypeRef::string(), TypeRef::int()),
                ))
                .property(PropertyDecl::new("slots", TypeRef::array(TypeRef::int())))
                .property(PropertyDecl::new("friend", TypeRef::named("Person")))
                .property(PropertyDecl::new("address", TypeRef::named("Address")))
                .property(PropertyDecl::new("balance", TypeRef::named("Money")))
                .property(PropertyDecl::new("rating", TypeRef::float())),
        )
        .value_object(
            ValueObjectDefinition::new("Address")
                .property(PropertyDecl::new("city", TypeRef::string())),
        )
        .value_with_comparator("Email", Arc::new(CaseInsensitive))
        .custom("Money", Arc::new(RoundedMoney));
    TypeMapper::new(&registry).expect("valid registry")
}

fn graph_of(types: &TypeMapper, heap: &ObjectHeap, root: ObjRef) -> ObjectGraph {
    GraphBuilder::new(types).build(heap, &[root]).expect("graph")
}

fn single(types: &TypeMapper, instance: Instance) -> ObjectGraph {
    let mut heap = ObjectHeap::new();
    let root = heap.alloc(instance);
    graph_of(types, &heap, root)
}

fn ann() -> Instance {
    Instance::new("Person").with("id", 1_i64).with("name", "Ann")
}

fn int(v: i64) -> PropertyValue {
    PropertyValue::Scalar(Scalar::Int(v))
}

fn simple(types: &TypeMapper) -> DiffEngine<'_> {
    DiffEngine::new(types, DiffOptions::default())
}

fn levenshtein(types: &TypeMapper) -> DiffEngine<'_> {
    DiffEngine::new(
        types,
        DiffOptions {
            list_algorithm: ListCompareAlgorithm::LevenshteinDistance,
            ..DiffOptions::default()
        },
    )
}

#[test]
fn identical_graphs_have_no_changes() {
    let types = types();
    let old = single(&types, ann().with("scores", Value::ints([1, 2])));
    let new = single(&types, ann().with("scores", Value::ints([1, 2])));
    let diff = simple(&types).diff(&old, &new);
    assert!(diff.is_empty());
    assert!(!diff.has_changes());
}

#[test]
fn renamed_person_yields_one_value_change() {
    let types = types();
    let old = single(&types, ann());
    let new = single(&types, ann().with("name", "Anna"));

    let diff = simple(&types).diff(&old, &new);

    assert_eq!(diff.len(), 1);
    let change = &diff.changes()[0];
    assert_eq!(change.affected(), &GlobalId::instance("Person", 1_i64));
    assert_eq!(change.property(), Some("name"));
    match change.kind() {
        ChangeKind::ValueChange {
            left_display,
            right_display,
            ..
        } => {
            assert_eq!(left_display, "Ann");
            assert_eq!(right_display, "Anna");
        }
        other => panic!("unexpected change {other:?}"),
    }
}

#[test]
fn removing_middle_element_differs_by_algorithm() {
    let types = types();
    let old = single(&types, ann().with("scores", Value::ints([1, 2, 3])));
    let new = single(&types, ann().with("scores", Value::ints([1, 3])));

    let aligned = levenshtein(&types).diff(&old, &new);
    assert_eq!(aligned.len(), 1);
    assert_eq!(
        aligned.changes()[0].kind(),
        &ChangeKind::ListChange {
            property: "scores".to_string(),
            changes: vec![ElementChange::ValueRemoved {
                index: 1,
                value: int(2)
            }],
        }
    );

    let positional = simple(&types).diff(&old, &new);
    assert_eq!(positional.len(), 1);
    assert_eq!(
        positional.changes()[0].kind(),
        &ChangeKind::ListChange {
            property: "scores".to_string(),
            changes: vec![
                ElementChange::ElementValueChange {
                    index: 1,
                    left: int(2),
                    right: int(3)
                },
                ElementChange::ValueRemoved {
                    index: 2,
                    value: int(3)
                },
            ],
        }
    );
}

#[test]
fn set_map_and_array_changes() {
    let types = types();
    let old = single(
        &types,
        ann()
            .with("tags", Value::Seq(vec![Value::text("a"), Value::text("b")]))
            .with(
                "ratings",
                Value::Map(vec![
                    (Value::text("x"), Value::int(1)),
                    (Value::text("y"), Value::int(2)),
                ]),
            )
            .with("slots", Value::ints([1, 2])),
    );
    let new = single(
        &types,
        ann()
            .with("tags", Value::Seq(vec![Value::text("b"), Value::text("c")]))
            .with(
                "ratings",
                Value::Map(vec![
                    (Value::text("y"), Value::int(3)),
                    (Value::text("z"), Value::int(4)),
                ]),
            )
            .with("slots", Value::ints([1, 2, 5])),
    );

    let diff = simple(&types).diff(&old, &new);
    let props: Vec<&str> = diff.changes().iter().filter_map(|c| c.property()).collect();
    assert_eq!(props, vec!["tags", "ratings", "slots"]);

    let text = |s: &str| PropertyValue::Scalar(Scalar::Text(s.to_string()));
    match diff.changes()[0].kind() {
        ChangeKind::SetChange { added, removed, .. } => {
            assert_eq!(added, &vec![text("c")]);
            assert_eq!(removed, &vec![text("a")]);
        }
        other => panic!("unexpected change {other:?}"),
    }
    match diff.changes()[1].kind() {
        ChangeKind::MapChange {
            added,
            removed,
            changed,
            ..
        } => {
            assert_eq!(added, &vec![(text("z"), int(4))]);
            assert_eq!(removed, &vec![(text("x"), int(1))]);
            assert_eq!(changed.len(), 1);
            assert_eq!(changed[0].key, text("y"));
            assert_eq!((changed[0].left.clone(), changed[0].right.clone()), (int(2), int(3)));
        }
        other => panic!("unexpected change {other:?}"),
    }
    assert_eq!(
        diff.changes()[2].kind(),
        &ChangeKind::ArrayChange {
            property: "slots".to_string(),
            changes: vec![ElementChange::ValueAdded {
                index: 2,
                value: int(5)
            }],
        }
    );
}

#[test]
fn references_are_compared_by_global_id() {
    let types = types();
    let build = |friend_id: i64| {
        let mut heap = ObjectHeap::new();
        let friend = heap.alloc(Instance::new("Person").with("id", friend_id));
        let root = heap.alloc(ann().with("friend", friend));
        graph_of(&types, &heap, root)
    };

    let diff = simple(&types).diff(&build(2), &build(3));

    let person = GlobalId::instance("Person", 1_i64);
    let reference = diff
        .changes()
        .iter()
        .find(|c| c.affected() == &person)
        .expect("reference change");
    assert_eq!(
        reference.kind(),
        &ChangeKind::ReferenceChange {
            property: "friend".to_string(),
            left: Some(GlobalId::instance("Person", 2_i64)),
            right: Some(GlobalId::instance("Person", 3_i64)),
        }
    );
    let objects: Vec<String> = diff
        .changes()
        .iter()
        .filter(|c| c.is_object_change())
        .map(ToString::to_string)
        .collect();
    assert_eq!(objects, vec!["object removed Person/2", "new object Person/3"]);
}

#[test]
fn new_value_object_is_reported_after_owner_changes() {
    let types = types();
    let old = single(&types, ann());
    let mut heap = ObjectHeap::new();
    let home = heap.alloc(Instance::new("Address").with("city", "Paris"));
    let root = heap.alloc(ann().with("address", home));
    let new = graph_of(&types, &heap, root);

    let diff = simple(&types).diff(&old, &new);

    assert_eq!(diff.len(), 2);
    let owner = GlobalId::instance("Person", 1_i64);
    let address = owner.child("address");
    assert_eq!(
        diff.changes()[0].kind(),
        &ChangeKind::ReferenceChange {
            property: "address".to_string(),
            left: None,
            right: Some(address.clone()),
        }
    );
    assert_eq!(diff.changes()[1].affected(), &address);
    assert_eq!(diff.changes()[1].kind(), &ChangeKind::NewObject);

    let grouped = diff.changes_by_object();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&owner].len(), 1);
}

#[test]
fn registered_equality_and_printing_are_used() {
    let types = types();
    let old = single(&types, ann().with("email", "Ann@Example.org").with("balance", 10.0));
    let same = single(&types, ann().with("email", "ann@example.org").with("balance", 10.001));
    assert!(simple(&types).diff(&old, &same).is_empty());

    let other = single(&types, ann().with("email", "bob@example.org").with("balance", 12.5));
    let diff = simple(&types).diff(&old, &other);
    assert_eq!(diff.len(), 2);
    match diff.changes()[0].kind() {
        ChangeKind::ValueChange {
            property,
            left_display,
            right_display,
            ..
        } => {
            assert_eq!(property, "email");
            assert_eq!(left_display, "<Ann@Example.org>");
            assert_eq!(right_display, "<bob@example.org>");
        }
        other => panic!("unexpected change {other:?}"),
    }
    assert_eq!(diff.changes()[1].property(), Some("balance"));
}

#[test]
fn unregistered_node_types_are_compared_property_by_property() {
    let types = types();
    let id = GlobalId::instance("Legacy", 9_i64);
    let mut old_state = PropertyMap::new();
    old_state.insert("label", int(1));
    old_state.insert("items", PropertyValue::Collection(vec![int(1)]));
    let mut new_state = PropertyMap::new();
    new_state.insert("label", int(2));
    new_state.insert("items", PropertyValue::Collection(vec![int(1), int(2)]));

    let mut old = ObjectGraph::new();
    old.insert(Node::new(id.clone(), "Legacy", old_state));
    let mut new = ObjectGraph::new();
    new.insert(Node::new(id.clone(), "Legacy", new_state));

    let diff = simple(&types).diff(&old, &new);
    let props: Vec<&str> = diff.changes().iter().filter_map(|c| c.property()).collect();
    assert_eq!(props, vec!["label", "items"]);
    assert!(matches!(diff.changes()[1].kind(), ChangeKind::ListChange { .. }));
}

#[test]
fn inverse_swaps_sides_and_pretty_print_lists_objects() {
    let types = types();
    let old = single(&types, ann().with("scores", Value::ints([1])));
    let new = single(&types, ann().with("name", "Anna").with("scores", Value::ints([1, 2])));

    let diff = simple(&types).diff(&old, &new);
    let back = simple(&types).diff(&new, &old);
    assert_eq!(diff.inverse(), back);
    assert_eq!(diff.inverse().inverse(), diff);

    let printed = diff.pretty_print();
    assert!(printed.starts_with("Diff:"));
    assert!(printed.contains("* Person/1"));
    assert!(printed.contains("Person/1.name: 'Ann' -> 'Anna'"));
    assert_eq!(simple(&types).diff(&old, &old).pretty_print(), "Diff: <empty>");
}

#[test]
fn reversed_list_diff_is_the_exact_inverse() {
    let types = types();
    let cases: [(&[i64], &[i64]); 4] = [
        (&[1, 2], &[3, 4, 5]),
        (&[5, 1, 2, 3], &[1, 3, 4]),
        (&[1, 2, 3, 4], &[4]),
        (&[2, 1], &[1, 2]),
    ];
    for (from, to) in cases {
        let old = single(&types, ann().with("scores", Value::ints(from.iter().copied())));
        let new = single(&types, ann().with("scores", Value::ints(to.iter().copied())));
        for engine in [simple(&types), levenshtein(&types)] {
            let forward = engine.diff(&old, &new);
            let backward = engine.diff(&new, &old);
            assert_eq!(forward.inverse(), backward, "{from:?} -> {to:?}");
            assert_eq!(
                forward.inverse().apply_to(&new).nodes().collect::<Vec<_>>(),
                old.nodes().collect::<Vec<_>>()
            );
        }
    }
}

#[test]
fn surplus_elements_are_removed_at_the_end_of_the_common_prefix() {
    let types = types();
    let old = single(&types, ann().with("scores", Value::ints([1, 2, 3])));
    let new = single(&types, ann().with("scores", Value::ints([1])));

    let diff = simple(&types).diff(&old, &new);
    assert_eq!(
        diff.changes()[0].kind(),
        &ChangeKind::ListChange {
            property: "scores".to_string(),
            changes: vec![
                ElementChange::ValueRemoved {
                    index: 1,
                    value: int(2)
                },
                ElementChange::ValueRemoved {
                    index: 1,
                    value: int(3)
                },
            ],
        }
    );
}

#[test]
fn non_finite_floats_equal_themselves() {
    let types = types();
    for rating in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let old = single(&types, ann().with("rating", rating));
        let new = single(&types, ann().with("rating", rating));
        assert!(simple(&types).diff(&old, &new).is_empty(), "{rating}");
        assert!(simple(&types).diff(&old, &old).is_empty(), "{rating}");
    }

    let finite = single(&types, ann().with("rating", 1.5));
    let nan = single(&types, ann().with("rating", f64::NAN));
    let diff = simple(&types).diff(&finite, &nan);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.changes()[0].property(), Some("rating"));
}

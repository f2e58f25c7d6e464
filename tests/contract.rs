//! Properties every buffer strategy must uphold, checked through [`BufferedGraph`].
mod common;

use changeset::{
    BufferKind, BufferedGraph, Changeset, KeyValue, NodeTree, Options, ValidatorMap,
    validation::{ValidationContext, Verdict},
};
use common::{BACKENDS, init_tracing, plain};
use futures::executor::block_on;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use serde_json::{Value, json};

/// Paths written by the generated scenarios. None is an ancestor of another.
const PATHS: &[&str] = &["name", "count", "org.eu", "org.usa.ny", "org.usa.ca", "fresh.key"];

fn content() -> Value {
    json!({
        "name": "foo",
        "count": 0,
        "org": {"eu": 1, "usa": {"ny": "NY"}},
        "tags": ["a", "b"],
    })
}

#[derive(Debug, Clone)]
struct Write {
    path: &'static str,
    value: Value,
}

fn scalar(g: &mut Gen) -> Value {
    match u8::arbitrary(g) % 4 {
        0 => json!(i64::arbitrary(g) % 8),
        1 => json!(bool::arbitrary(g)),
        2 => json!(*g.choose(&["foo", "bar", "NY", ""]).unwrap()),
        _ => Value::Null,
    }
}

impl Arbitrary for Write {
    fn arbitrary(g: &mut Gen) -> Self {
        Write {
            path: *g.choose(PATHS).unwrap(),
            value: scalar(g),
        }
    }
}

/// A write that may swap in a whole object or array.
#[derive(Debug, Clone)]
struct StructuralWrite(Write);

impl Arbitrary for StructuralWrite {
    fn arbitrary(g: &mut Gen) -> Self {
        let path = *g
            .choose(&["name", "org", "org.usa", "org.usa.ny", "tags", "fresh", "fresh.key"])
            .unwrap();
        let value = match u8::arbitrary(g) % 3 {
            0 => json!({"x": scalar(g)}),
            1 => json!([scalar(g)]),
            _ => scalar(g),
        };
        StructuralWrite(Write { path, value })
    }
}

fn apply(buffer: &mut dyn BufferedGraph, writes: &[Write]) {
    for write in writes {
        buffer.set(write.path, write.value.clone()).unwrap();
    }
}

#[quickcheck]
fn writing_twice_is_idempotent(writes: Vec<Write>, last: Write) -> bool {
    BACKENDS.iter().all(|&kind| {
        let mut buffer = plain(kind, content());
        apply(&mut *buffer, &writes);
        apply(&mut *buffer, std::slice::from_ref(&last));
        let once = buffer.changes();
        apply(&mut *buffer, std::slice::from_ref(&last));
        buffer.changes() == once
    })
}

#[quickcheck]
fn reads_return_the_last_write(writes: Vec<Write>) -> bool {
    BACKENDS.iter().all(|&kind| {
        let mut buffer = plain(kind, content());
        writes.iter().all(|write| {
            buffer.set(write.path, write.value.clone()).unwrap();
            buffer.get(write.path) == Some(write.value.clone())
        })
    })
}

#[test]
fn writing_the_original_value_back_collapses() {
    init_tracing();
    for kind in BACKENDS {
        let mut buffer = plain(kind, json!({"name": "foo"}));
        buffer.set("name", json!("bar")).unwrap();
        assert_eq!(
            buffer.changes(),
            [KeyValue {
                key: "name".into(),
                value: json!("bar")
            }],
            "{kind:?}"
        );
        buffer.set("name", json!("foo")).unwrap();
        assert!(buffer.changes().is_empty(), "{kind:?}");
        assert!(buffer.is_pristine(), "{kind:?}");
    }
}

#[test]
fn invalid_buffers_do_not_execute() {
    init_tracing();
    let validators = ValidatorMap::new()
        .with("name", |_: &ValidationContext<'_>| Verdict::from("never valid"));
    let mut flat = Changeset::new(json!({"name": "foo"}), validators);
    BufferedGraph::set(&mut flat, "name", json!("x")).unwrap();
    BufferedGraph::execute(&mut flat);
    assert!(BufferedGraph::is_invalid(&flat));
    assert_eq!(flat.data(), json!({"name": "foo"}));

    let mut tree = NodeTree::new(json!({"name": "foo"}), Options::new()).unwrap();
    tree.set("name", "x").unwrap();
    tree.add_error("name", "never valid");
    BufferedGraph::execute(&mut tree);
    assert!(BufferedGraph::is_invalid(&tree));
    assert_eq!(tree.data(), json!({"name": "foo"}));
}

#[quickcheck]
fn rollback_leaves_a_pristine_buffer(writes: Vec<Write>) -> bool {
    BACKENDS.iter().all(|&kind| {
        let mut buffer = plain(kind, content());
        apply(&mut *buffer, &writes);
        buffer.rollback();
        buffer.changes().is_empty() && buffer.is_pristine() && buffer.is_valid()
    })
}

#[test]
fn flat_rollback_also_clears_errors() {
    let buffer = Changeset::new(content(), ValidatorMap::new());
    buffer.set("name", "bar").unwrap();
    buffer.add_error("org.eu", "manual");
    buffer.rollback();
    assert!(buffer.changes().is_empty());
    assert!(buffer.errors().is_empty());
    assert!(buffer.is_pristine());
}

#[test]
fn merge_takes_both_sides_and_touches_neither() {
    init_tracing();
    let a = Changeset::new(json!({}), ValidatorMap::new());
    let b = Changeset::new(a.content(), ValidatorMap::new());
    a.set("firstName", "Jim").unwrap();
    b.set("lastName", "Bob").unwrap();

    let merged = a.merge(&b).unwrap();
    let keys: Vec<_> = merged.changes().into_iter().map(|kv| kv.key).collect();
    assert_eq!(keys, ["firstName", "lastName"]);
    assert_eq!(a.changes().len(), 1);
    assert_eq!(b.changes().len(), 1);
    assert!(!merged.ptr_eq(&a));
}

#[test]
fn merge_through_the_shared_interface() {
    let a = Changeset::new(json!({}), ValidatorMap::new());
    let b = Changeset::new(a.content(), ValidatorMap::new());
    a.set("n", 1).unwrap();
    b.set("n", 2).unwrap();
    let merged = BufferedGraph::merge(&a, &b).unwrap();
    assert_eq!(merged.kind(), BufferKind::Flat);
    assert_eq!(merged.changes()[0].value, json!(2));
}

#[quickcheck]
fn restoring_a_snapshot_reproduces_the_views(writes: Vec<Write>) -> bool {
    let validators = || {
        ValidatorMap::new().with("count", |cx: &ValidationContext<'_>| {
            if cx.new_value.is_number() {
                Verdict::Valid
            } else {
                Verdict::from("count must be a number")
            }
        })
    };
    let original = Changeset::new(content(), validators());
    for write in &writes {
        original.set(write.path, write.value.clone()).unwrap();
    }
    let restored = Changeset::new(original.content(), validators());
    restored.restore(&original.snapshot()).unwrap();
    restored.changes() == original.changes() && restored.errors() == original.errors()
}

#[test]
fn sibling_paths_are_isolated() {
    let buffer = Changeset::new(content(), ValidatorMap::new());
    buffer.set("org.usa.ny", "x").unwrap();
    buffer.set("org.usa.ca", "y").unwrap();
    assert_eq!(buffer.get("org.usa"), Some(json!({"ny": "x", "ca": "y"})));

    buffer.rollback_property("org.usa.ny");
    assert_eq!(
        buffer.changes(),
        [KeyValue {
            key: "org.usa.ca".into(),
            value: json!("y")
        }]
    );
    assert_eq!(buffer.get("org.usa.ny"), Some(json!("NY")));
}

#[test]
fn sibling_paths_are_isolated_in_node_trees() {
    let mut tree = NodeTree::new(content(), Options::new()).unwrap();
    tree.set("org.usa.ny", "x").unwrap();
    tree.set("org.usa.ca", "y").unwrap();
    assert_eq!(tree.get("org.usa"), Some(json!({"ny": "x", "ca": "y"})));
    let keys: Vec<_> = tree.changes().into_iter().map(|kv| kv.key).collect();
    assert_eq!(keys, ["org.usa.ca", "org.usa.ny"]);
}

#[quickcheck]
fn node_tree_rollback_inverts_execute(setup: Vec<Write>, writes: Vec<StructuralWrite>) -> bool {
    let mut tree = NodeTree::new(content(), Options::new()).unwrap();
    // Saving forgets the execute, so only the writes below are rolled back.
    for write in &setup {
        tree.set(write.path, write.value.clone()).unwrap();
    }
    block_on(tree.save(&Value::Null)).unwrap();

    let before = tree.data();
    for StructuralWrite(write) in &writes {
        // Indexing an array with a name is refused without staging anything.
        let _ = tree.set(write.path, write.value.clone());
    }
    tree.execute();
    tree.rollback();
    tree.data() == before && tree.is_pristine()
}

#[test]
fn node_tree_rollback_deletes_added_keys() {
    init_tracing();
    let original = content();
    let mut tree = NodeTree::new(original.clone(), Options::new()).unwrap();
    tree.set("org", json!({"usa": 1})).unwrap();
    tree.set("org.eu.de", "DE").unwrap();
    tree.set("fresh.deep.key", 1).unwrap();
    tree.array("tags").unwrap().push("c");
    tree.execute();
    assert_eq!(
        tree.data(),
        json!({
            "name": "foo",
            "count": 0,
            "org": {"usa": 1, "eu": {"de": "DE"}},
            "tags": ["a", "b", "c"],
            "fresh": {"deep": {"key": 1}},
        })
    );
    tree.rollback();
    assert_eq!(tree.data(), original);
}

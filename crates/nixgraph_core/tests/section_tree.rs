use nixgraph_core::{Entity, EntityId, File, ModelError, Value};
use proptest::prelude::*;
use std::collections::HashSet;

#[test]
fn sibling_names_are_unique_but_cousins_may_share() {
    let mut file = File::new();
    let root = file.create_section("recording", None).unwrap();
    let a = file.create_child_section(root, "a", None).unwrap();
    let b = file.create_child_section(root, "b", None).unwrap();
    assert!(matches!(
        file.create_child_section(root, "a", None),
        Err(ModelError::DuplicateName { .. })
    ));
    file.create_child_section(a, "settings", None).unwrap();
    file.create_child_section(b, "settings", None).unwrap();
    assert!(matches!(
        file.move_section(b, Some(a)),
        Ok(())
    ));
    assert_eq!(file.parent_section(b).unwrap(), Some(a));
}

#[test]
fn moving_under_a_descendant_is_cyclic() {
    let mut file = File::new();
    let root = file.create_section("root", None).unwrap();
    let child = file.create_child_section(root, "child", None).unwrap();
    let grandchild = file.create_child_section(child, "grandchild", None).unwrap();
    assert!(matches!(
        file.move_section(root, Some(grandchild)),
        Err(ModelError::CyclicReference { .. })
    ));
    assert_eq!(file.parent_section(root).unwrap(), None);
}

#[test]
fn properties_require_one_value_type() {
    let mut file = File::new();
    let section = file.create_section("subject", None).unwrap();
    assert!(matches!(
        file.set_property(section, "age", vec![Value::from(3_i64), Value::from("three")]),
        Err(ModelError::TypeMismatch { .. })
    ));
    assert!(matches!(
        file.property(section, "age"),
        Err(ModelError::PropertyNotFound { .. })
    ));
    let id = file
        .set_property(section, "age", vec![Value::from(3_i64), Value::from(4_i64)])
        .unwrap();
    let again = file
        .set_property(section, "age", vec![Value::from(5_i64)])
        .unwrap();
    assert_eq!(id, again);
    assert_eq!(file.property(section, "age").unwrap().values().len(), 1);
}

#[test]
fn link_chains_are_cycle_safe() {
    let mut file = File::new();
    let a = file.create_section("a", None).unwrap();
    let b = file.create_section("b", None).unwrap();
    file.link_section(a, b).unwrap();
    file.link_section(b, a).unwrap();
    assert_eq!(file.follow_link_chain(a).unwrap(), vec![b]);
    assert!(matches!(
        file.link_section(a, a),
        Err(ModelError::InvalidLink { .. })
    ));
}

#[test]
fn moving_under_a_link_target_is_rejected() {
    let mut file = File::new();
    let a = file.create_section("a", None).unwrap();
    let b = file.create_section("b", None).unwrap();
    file.link_section(a, b).unwrap();
    assert!(matches!(
        file.move_section(a, Some(b)),
        Err(ModelError::InvalidLink { section, target }) if section == a && target == b
    ));
    assert_eq!(file.parent_section(a).unwrap(), None);
    assert!(file.sections().children(b).is_empty());
}

#[test]
fn moved_descendants_may_not_link_to_new_ancestors() {
    let mut file = File::new();
    let top = file.create_section("top", None).unwrap();
    let dest = file.create_child_section(top, "dest", None).unwrap();
    let moved = file.create_section("moved", None).unwrap();
    let leaf = file.create_child_section(moved, "leaf", None).unwrap();
    file.link_section(leaf, top).unwrap();
    assert!(matches!(
        file.move_section(moved, Some(dest)),
        Err(ModelError::InvalidLink { section, target }) if section == leaf && target == top
    ));
    assert_eq!(file.parent_section(moved).unwrap(), None);

    file.unlink_section(leaf).unwrap();
    file.link_section(top, leaf).unwrap();
    file.move_section(moved, Some(dest)).unwrap();
    assert_eq!(file.parent_section(moved).unwrap(), Some(dest));
    assert_eq!(file.resolve_link(top).unwrap().unwrap().name(), "leaf");
}

#[test]
fn deep_copies_get_fresh_ids_and_follow_internal_links() {
    let mut file = File::new();
    let recording = file.create_section("recording", None).unwrap();
    let subject = file
        .create_child_section(recording, "subject", Some("odml.subject"))
        .unwrap();
    let notes = file.create_child_section(recording, "notes", None).unwrap();
    let age = file
        .set_property(subject, "age", vec![Value::from(12_i64)])
        .unwrap();
    file.link_section(notes, subject).unwrap();
    let archive = file.create_section("archive", None).unwrap();

    let copy = file.copy_section(recording, Some(archive), None, true).unwrap();
    assert_ne!(copy, recording);
    assert_eq!(file.parent_section(copy).unwrap(), Some(archive));
    assert_eq!(file.section(copy).unwrap().name(), "recording");
    assert_eq!(file.sections().len(), 7);

    let children = file.sections().children(copy).to_vec();
    assert_eq!(children.len(), 2);
    let copied_subject = file.section(children[0]).unwrap();
    assert_ne!(copied_subject.id(), subject);
    assert_eq!(copied_subject.entity_type(), Some("odml.subject"));
    let copied_age = copied_subject.property("age").unwrap();
    assert_ne!(copied_age.id(), age);
    assert_eq!(copied_age.values(), &[Value::from(12_i64)]);
    assert_eq!(file.section(children[1]).unwrap().link(), Some(children[0]));
    assert_eq!(file.section(notes).unwrap().link(), Some(subject));
}

#[test]
fn shallow_copies_need_a_free_name() {
    let mut file = File::new();
    let recording = file.create_section("recording", None).unwrap();
    file.create_child_section(recording, "subject", None).unwrap();
    file.set_property(recording, "date", vec![Value::from("2024-05-01")])
        .unwrap();
    assert!(matches!(
        file.copy_section(recording, None, None, false),
        Err(ModelError::DuplicateName { .. })
    ));

    let copy = file
        .copy_section(recording, None, Some("recording-2"), false)
        .unwrap();
    assert!(file.sections().children(copy).is_empty());
    assert!(file.section(copy).unwrap().has_property("date"));
    assert_eq!(file.sections().roots().len(), 2);
}

#[test]
fn copies_may_not_link_to_their_new_ancestors() {
    let mut file = File::new();
    let x = file.create_section("x", None).unwrap();
    let y = file.create_section("y", None).unwrap();
    file.link_section(x, y).unwrap();
    assert!(matches!(
        file.copy_section(x, Some(y), None, true),
        Err(ModelError::InvalidLink { target, .. }) if target == y
    ));
    assert_eq!(file.sections().len(), 2);
    assert!(file.sections().children(y).is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Child { parent: usize },
    Link { from: usize, to: usize },
    Move { node: usize, parent: Option<usize> },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<usize>().prop_map(|parent| Op::Child { parent }),
        (any::<usize>(), any::<usize>()).prop_map(|(from, to)| Op::Link { from, to }),
        (any::<usize>(), proptest::option::of(any::<usize>()))
            .prop_map(|(node, parent)| Op::Move { node, parent }),
    ]
}

fn ownership_dfs_is_acyclic(file: &File) -> bool {
    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut stack: Vec<EntityId> = file.sections().roots().to_vec();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            return false;
        }
        stack.extend(file.sections().children(id).iter().copied());
    }
    visited.len() == file.sections().len()
}

fn no_link_targets_an_ancestor(file: &File) -> bool {
    file.sections().iter().all(|section| match section.link() {
        Some(target) => {
            target != section.id() && !file.sections().is_ancestor(target, section.id())
        }
        None => true,
    })
}

proptest! {
    #[test]
    fn ownership_never_cycles(ops in proptest::collection::vec(op(), 1..60)) {
        let mut file = File::new();
        let mut ids = vec![file.create_section("root", None).unwrap()];
        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Child { parent } => {
                    let parent = ids[parent % ids.len()];
                    let id = file
                        .create_child_section(parent, &format!("s{step}"), None)
                        .unwrap();
                    ids.push(id);
                }
                Op::Link { from, to } => {
                    let _ = file.link_section(ids[from % ids.len()], ids[to % ids.len()]);
                }
                Op::Move { node, parent } => {
                    let node = ids[node % ids.len()];
                    let parent = parent.map(|p| ids[p % ids.len()]);
                    let _ = file.move_section(node, parent);
                }
            }
            prop_assert!(ownership_dfs_is_acyclic(&file));
            prop_assert!(no_link_targets_an_ancestor(&file));
        }
    }
}

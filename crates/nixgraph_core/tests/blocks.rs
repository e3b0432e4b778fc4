use nixgraph_core::{
    DataType, EntityKind, File, MemoryJournal, ModelError, Operation,
};

#[test]
fn array_names_are_scoped_to_their_block() {
    let mut file = File::new();
    let first = file.create_block("session-1", None).unwrap();
    let second = file.create_block("session-2", None).unwrap();

    file.create_data_array(first, "signal", None, DataType::Double, vec![4])
        .unwrap();
    assert!(matches!(
        file.create_data_array(first, "signal", None, DataType::Double, vec![4]),
        Err(ModelError::DuplicateName {
            kind: EntityKind::DataArray,
            ..
        })
    ));
    file.create_data_array(second, "signal", None, DataType::Double, vec![4])
        .unwrap();
    file.create_simple_tag(first, "signal", None, vec![0.0]).unwrap();
}

#[test]
fn deleting_a_block_cascades_but_foreign_sources_survive() {
    let journal = MemoryJournal::new();
    let mut file = File::new();
    file.set_commit_hook(Box::new(journal.clone()));

    let doomed = file.create_block("doomed", None).unwrap();
    let keeper = file.create_block("keeper", None).unwrap();
    let source = file.create_source(keeper, "rig", None).unwrap();
    let local = file.create_source(doomed, "local", None).unwrap();

    let array = file
        .create_data_array(doomed, "signal", None, DataType::Double, vec![8])
        .unwrap();
    file.add_source(array, source).unwrap();
    let tag = file.create_simple_tag(doomed, "stim", None, vec![1.0]).unwrap();
    file.attach_reference(tag, array).unwrap();

    let survivor = file
        .create_data_array(keeper, "other", None, DataType::Double, vec![2])
        .unwrap();
    file.add_source(survivor, local).unwrap();
    file.add_source(keeper, local).unwrap();

    journal.clear();
    file.delete_block(doomed).unwrap();

    assert!(!file.contains(array));
    assert!(!file.contains(tag));
    assert!(!file.contains(local));
    assert!(file.source(source).is_ok());
    assert!(file.data_array(survivor).unwrap().sources().is_empty());
    assert!(file.block(keeper).unwrap().source_refs().is_empty());

    let events = journal.events();
    let deleted = events
        .iter()
        .filter(|event| event.operation == Operation::Delete)
        .count();
    assert_eq!(deleted, 4);
    assert!(events
        .iter()
        .any(|event| event.entity_id == survivor && event.field == Some("sources")));
}

#[test]
fn metadata_is_shared_by_reference() {
    let mut file = File::new();
    let a = file.create_block("a", None).unwrap();
    let b = file.create_block("b", None).unwrap();
    let section = file.create_section("experiment", None).unwrap();
    file.set_metadata(a, section).unwrap();
    file.set_metadata(b, section).unwrap();

    file.delete_block(a).unwrap();
    assert!(file.section(section).is_ok());
    assert_eq!(file.block(b).unwrap().metadata(), Some(section));

    let missing = nixgraph_core::create_id();
    assert!(matches!(
        file.set_metadata(b, missing),
        Err(ModelError::NotFound(id)) if id == missing
    ));
}

#[test]
fn source_operations_are_idempotent() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let source = file.create_source(block, "rig", None).unwrap();
    let array = file
        .create_data_array(block, "signal", None, DataType::Int, vec![1])
        .unwrap();
    file.add_source(array, source).unwrap();
    file.add_source(array, source).unwrap();
    file.remove_source(array, source).unwrap();
    file.remove_source(array, source).unwrap();
    assert!(file.data_array(array).unwrap().sources().is_empty());
    assert!(matches!(
        file.add_source(array, array),
        Err(ModelError::NotFound(_))
    ));
}

use nixgraph_core::{ArrayBuffer, DataType, File, LinkType, ModelError, Tag};

#[test]
fn attach_checks_position_rank() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let array = file
        .create_data_array(block, "image", None, DataType::Double, vec![10, 20])
        .unwrap();

    let wrong = file
        .create_simple_tag(block, "wrong", None, vec![1.0, 1.0, 1.0])
        .unwrap();
    assert!(matches!(
        file.attach_reference(wrong, array),
        Err(ModelError::ShapeMismatch { .. })
    ));

    let right = file
        .create_simple_tag(block, "right", None, vec![5.0, 5.0])
        .unwrap();
    file.attach_reference(right, array).unwrap();
    assert!(file.simple_tag(right).unwrap().has_reference(array));
}

#[test]
fn detaching_keeps_the_array() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let array = file
        .create_data_array(block, "trace", None, DataType::Double, vec![5])
        .unwrap();
    let tag = file.create_simple_tag(block, "stim", None, vec![0.0]).unwrap();
    file.attach_reference(tag, array).unwrap();

    assert!(matches!(
        file.delete_data_array(array),
        Err(ModelError::ReferencedEntity { .. })
    ));
    assert!(file.detach_reference(tag, array).unwrap());
    assert!(!file.detach_reference(tag, array).unwrap());
    assert!(file.data_array(array).is_ok());
    file.delete_data_array(array).unwrap();
}

#[test]
fn references_stay_inside_the_block() {
    let mut file = File::new();
    let home = file.create_block("home", None).unwrap();
    let away = file.create_block("away", None).unwrap();
    let foreign = file
        .create_data_array(away, "trace", None, DataType::Double, vec![5])
        .unwrap();
    let tag = file.create_simple_tag(home, "stim", None, vec![0.0]).unwrap();
    assert!(matches!(
        file.attach_reference(tag, foreign),
        Err(ModelError::NotFound(_))
    ));
}

#[test]
fn data_tag_positions_must_be_numeric_matrices() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let names = file
        .create_data_array(block, "names", None, DataType::String, vec![2])
        .unwrap();
    assert!(matches!(
        file.create_data_tag(block, "events", None, names),
        Err(ModelError::TypeMismatch { .. })
    ));
    let cube = file
        .create_data_array(block, "cube", None, DataType::Double, vec![2, 2, 2])
        .unwrap();
    assert!(matches!(
        file.create_data_tag(block, "events", None, cube),
        Err(ModelError::ShapeMismatch { .. })
    ));
    assert!(file.block(block).unwrap().data_tag_by_name("events").is_none());
}

#[test]
fn data_tag_regions_select_per_reference() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let image = file
        .create_data_array(block, "image", None, DataType::Int, vec![3, 3])
        .unwrap();
    file.write_all(image, (0..9_i64).collect::<Vec<_>>().into())
        .unwrap();
    let positions = file
        .create_data_array(block, "positions", None, DataType::Double, vec![2, 2])
        .unwrap();
    file.write_all(positions, vec![0.0, 0.0, 1.0, 1.0].into())
        .unwrap();
    let extents = file
        .create_data_array(block, "extents", None, DataType::Double, vec![2, 2])
        .unwrap();
    file.write_all(extents, vec![0.0, 1.0, 1.0, 1.0].into())
        .unwrap();

    let tag = file
        .create_data_tag(block, "rois", None, positions)
        .unwrap();
    file.set_data_tag_extents(tag, Some(extents)).unwrap();
    file.attach_reference(tag, image).unwrap();

    assert_eq!(
        file.tagged_region_data(tag, 0, 0).unwrap(),
        ArrayBuffer::Int(vec![0, 1])
    );
    assert_eq!(
        file.tagged_region_data(tag, 1, 0).unwrap(),
        ArrayBuffer::Int(vec![4, 5, 7, 8])
    );
    assert!(matches!(
        file.tagged_region_data(tag, 2, 0),
        Err(ModelError::OutOfBounds(_))
    ));

    let per_region = file
        .create_data_array(block, "scores", None, DataType::Double, vec![2, 3, 3])
        .unwrap();
    file.write_all(per_region, (0..18).map(f64::from).collect::<Vec<_>>().into())
        .unwrap();
    let feature = file
        .create_feature(tag, per_region, LinkType::Tagged)
        .unwrap();
    assert_eq!(
        file.feature_data(tag, feature, 1).unwrap(),
        ArrayBuffer::Double(vec![13.0, 14.0, 16.0, 17.0])
    );
}

#[test]
fn tagged_features_must_hold_every_region() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let positions = file
        .create_data_array(block, "positions", None, DataType::Double, vec![2, 1])
        .unwrap();
    file.write_all(positions, vec![0.0, 3.0].into()).unwrap();
    let tag = file
        .create_data_tag(block, "events", None, positions)
        .unwrap();

    let short = file
        .create_data_array(block, "short", None, DataType::Double, vec![2, 3])
        .unwrap();
    assert!(matches!(
        file.create_feature(tag, short, LinkType::Tagged),
        Err(ModelError::ShapeMismatch { expected: 3, actual: 4 })
    ));
    let long = file
        .create_data_array(block, "long", None, DataType::Double, vec![2, 4])
        .unwrap();
    let feature = file.create_feature(tag, long, LinkType::Tagged).unwrap();
    assert_eq!(
        file.feature_data(tag, feature, 1).unwrap(),
        ArrayBuffer::Double(vec![0.0])
    );
}

#[test]
fn untagged_features_return_the_whole_array() {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let trace = file
        .create_data_array(block, "trace", None, DataType::Double, vec![4])
        .unwrap();
    let notes = file
        .create_data_array(block, "notes", None, DataType::String, vec![2, 2])
        .unwrap();
    let tag = file.create_simple_tag(block, "stim", None, vec![3.0]).unwrap();
    file.attach_reference(tag, trace).unwrap();
    let feature = file.create_feature(tag, notes, LinkType::Untagged).unwrap();
    assert_eq!(
        file.feature_data(tag, feature, 0).unwrap(),
        ArrayBuffer::String(vec![String::new(); 4])
    );
    assert_eq!(
        file.feature(feature).unwrap().to_string(),
        format!("Feature: {{id = {feature}, link_type = untagged}}")
    );

    file.set_feature_link_type(feature, LinkType::Indexed).unwrap();
    assert!(matches!(
        file.feature_data(tag, feature, 0),
        Err(ModelError::OutOfBounds(_))
    ));
    file.delete_feature(feature).unwrap();
    assert!(!file.contains(feature));
    file.delete_data_array(notes).unwrap();
}

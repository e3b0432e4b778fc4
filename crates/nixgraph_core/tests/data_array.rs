use nixgraph_core::{ArrayBuffer, DataType, File, ModelError, Region};
use proptest::prelude::*;

fn file_with_array(shape: Vec<usize>, data_type: DataType) -> (File, nixgraph_core::EntityId) {
    let mut file = File::new();
    let block = file.create_block("session", None).unwrap();
    let array = file
        .create_data_array(block, "signal", None, data_type, shape)
        .unwrap();
    (file, array)
}

#[test]
fn fresh_arrays_hold_defaults_until_written() {
    let (mut file, array) = file_with_array(vec![2, 2], DataType::Bool);
    assert!(!file.data_array(array).unwrap().has_data());
    assert_eq!(
        file.read_all(array).unwrap(),
        ArrayBuffer::Bool(vec![false; 4])
    );
    file.write_region(array, &Region::new(vec![1, 1], vec![1, 1]), vec![true].into())
        .unwrap();
    assert!(file.data_array(array).unwrap().has_data());
}

#[test]
fn out_of_bounds_writes_leave_data_unchanged() {
    let (mut file, array) = file_with_array(vec![3, 4], DataType::Int);
    let all: Vec<i64> = (0..12).collect();
    file.write_all(array, all.clone().into()).unwrap();

    let outside = Region::new(vec![2, 2], vec![2, 2]);
    assert!(matches!(
        file.write_region(array, &outside, vec![9_i64; 4].into()),
        Err(ModelError::OutOfBounds(_))
    ));
    assert!(matches!(
        file.write_region(array, &Region::new(vec![0, 0], vec![1, 1]), vec![1.5].into()),
        Err(ModelError::TypeMismatch { .. })
    ));
    assert_eq!(file.read_all(array).unwrap(), ArrayBuffer::Int(all));
}

#[test]
fn labels_and_units_distinguish_absent_from_set() {
    let (mut file, array) = file_with_array(vec![4], DataType::Double);
    assert_eq!(file.data_array(array).unwrap().label(), None);
    file.set_data_array_label(array, Some("")).unwrap();
    assert_eq!(file.data_array(array).unwrap().label(), Some(""));
    file.set_data_array_unit(array, Some(" µ V ")).unwrap();
    assert_eq!(file.data_array(array).unwrap().unit(), Some("uV"));
    file.set_data_array_unit(array, None).unwrap();
    assert_eq!(file.data_array(array).unwrap().unit(), None);
}

#[test]
fn calibration_applies_origin_and_polynomial() {
    let (mut file, array) = file_with_array(vec![3], DataType::Int);
    file.write_all(array, vec![1_i64, 2, 3].into()).unwrap();
    file.set_expansion_origin(array, Some(1.0)).unwrap();
    file.set_polynom_coefficients(array, vec![10.0, 2.0]).unwrap();
    let calibrated = file
        .read_calibrated(array, &Region::full(&[3]))
        .unwrap();
    assert_eq!(calibrated, vec![10.0, 12.0, 14.0]);

    let (strings, text) = file_with_array(vec![1], DataType::String);
    assert!(matches!(
        strings.read_calibrated(text, &Region::full(&[1])),
        Err(ModelError::TypeMismatch { .. })
    ));
}

fn shape_and_region() -> impl Strategy<Value = (Vec<usize>, Region)> {
    proptest::collection::vec(1usize..6, 1..4).prop_flat_map(|shape| {
        let axes: Vec<_> = shape
            .iter()
            .map(|&extent| (0..extent).prop_flat_map(move |start| (Just(start), 1..=extent - start)))
            .collect();
        (Just(shape), axes).prop_map(|(shape, axes)| {
            let (offset, extent) = axes.into_iter().unzip();
            (shape, Region::new(offset, extent))
        })
    })
}

proptest! {
    #[test]
    fn region_writes_read_back((shape, region) in shape_and_region(), seed in any::<i64>()) {
        let (mut file, array) = file_with_array(shape, DataType::Int);
        let values: Vec<i64> = (0..region.count() as i64).map(|i| seed.wrapping_add(i)).collect();
        file.write_region(array, &region, values.clone().into()).unwrap();
        prop_assert_eq!(file.read_region(array, &region).unwrap(), ArrayBuffer::Int(values));
    }
}

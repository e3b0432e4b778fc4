use nixgraph_core::{DataType, File, Region};
use std::sync::{Arc, RwLock};
use std::thread;

#[test]
fn blocks_can_be_filled_from_several_threads() {
    let file = Arc::new(RwLock::new(File::new()));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let file = Arc::clone(&file);
            thread::spawn(move || {
                let mut guard = file.write().unwrap();
                let block = guard
                    .create_block(&format!("worker-{worker}"), None)
                    .unwrap();
                let array = guard
                    .create_data_array(block, "signal", None, DataType::Int, vec![3])
                    .unwrap();
                guard
                    .write_all(array, vec![worker as i64; 3].into())
                    .unwrap();
                array
            })
        })
        .collect();
    let arrays: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let readers: Vec<_> = arrays
        .iter()
        .map(|array| {
            let file = Arc::clone(&file);
            let array = *array;
            thread::spawn(move || {
                let guard = file.read().unwrap();
                let shape = guard.data_array(array).unwrap().shape().to_vec();
                let values = guard.read_region(array, &Region::full(&shape)).unwrap();
                values.len()
            })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), 3);
    }
    assert_eq!(file.read().unwrap().blocks().len(), 4);
}

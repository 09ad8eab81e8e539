use std::{error::Error, sync::Arc};

use chunkhub::{
    array::{DataType, Selector, TensorView},
    dataset::{Dataset, FieldSpec, Sample},
    storage::store::MemoryStore,
};
use itertools::Itertools;

const SAMPLES: u64 = 20;
const SAMPLE_SHAPE: [u64; 2] = [6, 5];

fn value(indices: &[u64]) -> i32 {
    (indices[0] * 100 + indices[1] * 10 + indices[2]) as i32
}

fn field() -> Result<TensorView<MemoryStore>, Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let mut dataset = Dataset::create(
        store,
        "d",
        &[FieldSpec::tensor("x", DataType::Int32, SAMPLE_SHAPE.to_vec(), 4)
            .with_chunk_shape(vec![4, 4, 2])],
    )?;
    dataset.extend((0..SAMPLES).map(|i| {
        let elements = (0..SAMPLE_SHAPE[0])
            .cartesian_product(0..SAMPLE_SHAPE[1])
            .map(|(j, k)| value(&[i, j, k]))
            .collect::<Vec<_>>();
        Sample::new().with_elements("x", SAMPLE_SHAPE.to_vec(), &elements)
    }))?;
    Ok(dataset.field("x")?)
}

/// The elements at the cartesian product of `indices`, in order.
fn reference(indices: &[Vec<u64>]) -> Vec<i32> {
    indices
        .iter()
        .multi_cartesian_product()
        .map(|index| value(&index.into_iter().copied().collect::<Vec<_>>()))
        .collect()
}

#[test]
fn tensor_view_strided_and_fancy() -> Result<(), Box<dyn Error>> {
    let view = field()?;
    assert_eq!(view.shape(), vec![20, 6, 5]);

    let sliced = view.slice(&[
        Selector::range_step(2, 17, 3),
        Selector::list([5, 0, 3]),
        Selector::full(),
    ])?;
    assert_eq!(sliced.shape(), vec![5, 3, 5]);
    let tensor = sliced.compute()?;
    assert_eq!(tensor.shape(), &[5, 3, 5]);
    assert_eq!(
        tensor.to_elements::<i32>()?,
        reference(&[vec![2, 5, 8, 11, 14], vec![5, 0, 3], (0..5).collect()])
    );

    let last = view.slice(&[Selector::index(-1), Selector::list([-1, 0]), Selector::range(1, 3)])?;
    assert_eq!(last.shape(), vec![2, 2]);
    assert_eq!(
        last.compute()?.to_elements::<i32>()?,
        reference(&[vec![19], vec![5, 0], vec![1, 2]])
    );
    Ok(())
}

#[test]
fn tensor_view_composed_slices() -> Result<(), Box<dyn Error>> {
    let view = field()?;
    let composed = view
        .slice(&[Selector::range(1, 19)])?
        .slice(&[Selector::range_step(0, 18, 4), Selector::index(2)])?;
    assert_eq!(composed.shape(), vec![5, 5]);
    assert_eq!(
        composed.compute()?.to_elements::<i32>()?,
        reference(&[vec![1, 5, 9, 13, 17], vec![2], (0..5).collect()])
    );

    let composed = composed.slice(&[Selector::list([4, 0]), Selector::range_from(3)])?;
    assert_eq!(
        composed.compute()?.to_elements::<i32>()?,
        reference(&[vec![17, 1], vec![2], vec![3, 4]])
    );

    // ranges clamp, indices do not
    assert_eq!(view.slice(&[Selector::range(15, 100)])?.len(), 5);
    assert!(view.get(20).is_err());
    assert!(view.get(-21).is_err());
    assert!(view.slice(&[Selector::full(), Selector::list([6])]).is_err());
    assert!(view.slice(&[Selector::full(), Selector::full(), Selector::full(), Selector::full()]).is_err());
    Ok(())
}

#[test]
fn tensor_view_empty_selection() -> Result<(), Box<dyn Error>> {
    let view = field()?.slice(&[Selector::range(5, 5)])?;
    assert!(view.is_empty());
    assert!(view.chunk_keys()?.is_empty());
    let tensor = view.compute()?;
    assert_eq!(tensor.shape(), &[0, 6, 5]);
    assert_eq!(tensor.num_elements(), 0);
    Ok(())
}

#[test]
fn tensor_view_iter() -> Result<(), Box<dyn Error>> {
    let view = field()?.slice(&[Selector::range(3, 7), Selector::index(1)])?;
    assert_eq!(view.iter().len(), 4);
    for (i, sample) in view.iter().enumerate() {
        assert_eq!(sample.shape(), vec![5]);
        assert_eq!(
            sample.compute()?.to_elements::<i32>()?,
            reference(&[vec![3 + i as u64], vec![1], (0..5).collect()])
        );
    }
    // iteration restarts from the beginning
    assert_eq!((&view).into_iter().count(), 4);
    Ok(())
}

#[test]
fn tensor_view_chunk_keys() -> Result<(), Box<dyn Error>> {
    let view = field()?;
    let keys = view
        .slice(&[Selector::range(3, 5), Selector::index(5), Selector::range(0, 3)])?
        .chunk_keys()?;
    let keys = keys.iter().map(|key| key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["d/x/c/0/1/0", "d/x/c/0/1/1", "d/x/c/1/1/0", "d/x/c/1/1/1"]);
    Ok(())
}

#[cfg(feature = "ndarray")]
#[test]
fn tensor_view_ndarray() -> Result<(), Box<dyn Error>> {
    let view = field()?.slice(&[Selector::list([0, 10]), Selector::range(4, 6), Selector::index(3)])?;
    let array = view.compute()?.to_ndarray::<i32>()?;
    assert_eq!(array.shape(), &[2, 2]);
    assert_eq!(array[[1, 0]], value(&[10, 4, 3]));
    assert_eq!(array[[0, 1]], value(&[0, 5, 3]));
    assert!(view.compute()?.to_ndarray::<f64>().is_err());
    Ok(())
}

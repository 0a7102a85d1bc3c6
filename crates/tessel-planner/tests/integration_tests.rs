//! Integration tests for the planning pipeline

use tessel_core::{DType, IndexDType, PlatformInfo, Reduction, TensorShape, TilingError};
use tessel_planner::{
    encode_key, partition, plan_scatter, DispatchKey, KeyField, OrderingMode, Regime,
    ScatterRequest, SplitTarget, TilingConfig, WorkLayout,
};

fn shape(dims: &[u64]) -> TensorShape {
    TensorShape::new(dims).unwrap()
}

#[test]
fn test_scenario_a_rejected_before_partitioning() {
    let request = ScatterRequest::new(
        shape(&[10, 38, 26]),
        shape(&[10, 18, 26]),
        shape(&[10, 28, 96]),
    )
    .with_axis(2)
    .with_reduction(Reduction::Add);

    let err = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default())
        .unwrap_err();
    assert!(matches!(err, TilingError::ShapeMismatch(_)));
    assert!(err.to_string().contains("dimension 1"));
}

#[test]
fn test_scenarios_b_c_d() {
    let b = partition(10, 48).unwrap();
    assert_eq!(b.used_cores, 10);
    assert!((0..10).all(|core| b.units_for(core) == 1));

    let c = partition(4096, 64).unwrap();
    assert_eq!(
        (c.front_units_per_core, c.front_cores, c.tail_cores),
        (64, 64, 0)
    );

    let d = partition(4097, 64).unwrap();
    assert_eq!(
        (
            d.front_cores,
            d.front_units_per_core,
            d.tail_cores,
            d.tail_units_per_core
        ),
        (1, 65, 63, 64)
    );
}

#[test]
fn test_plan_lines_follow_partition() {
    // 10 lines on 48 cores: one line per core
    let request = ScatterRequest::new(shape(&[10, 100]), shape(&[10, 30]), shape(&[10, 30]))
        .with_axis(1)
        .with_reduction(Reduction::Add);
    let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default())
        .unwrap();
    assert_eq!(plan.work, WorkLayout::Lines(partition(10, 48).unwrap()));
}

#[test]
fn test_negative_axis_matches_positive() {
    let make = |axis| {
        ScatterRequest::new(shape(&[6, 7, 8]), shape(&[6, 7, 3]), shape(&[6, 7, 3]))
            .with_axis(axis)
            .with_reduction(Reduction::Mul)
    };
    let platform = PlatformInfo::default();
    let config = TilingConfig::default();
    assert_eq!(
        plan_scatter(&make(-1), &platform, &config).unwrap(),
        plan_scatter(&make(2), &platform, &config).unwrap()
    );
}

#[test]
fn test_plan_is_deterministic() {
    let request = ScatterRequest::new(shape(&[300]), shape(&[5000]), shape(&[5000]))
        .with_reduction(Reduction::Add)
        .with_deterministic(true);
    let platform = PlatformInfo::default().with_core_num(16);
    let config = TilingConfig::default();
    let first = plan_scatter(&request, &platform, &config).unwrap();
    let second = plan_scatter(&request, &platform, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_sort_cap_shrinks_tile() {
    let request = ScatterRequest::new(shape(&[100_000]), shape(&[1 << 20]), shape(&[1 << 20]))
        .with_reduction(Reduction::Add)
        .with_index_dtype(IndexDType::I64)
        .with_deterministic(true);
    let platform = PlatformInfo::default().with_core_num(8);

    let roomy = TilingConfig::default().with_sort_shared_cap(1 << 20);
    let tight = TilingConfig::default().with_sort_shared_cap(4096);

    let large = plan_scatter(&request, &platform, &roomy).unwrap();
    let small = plan_scatter(&request, &platform, &tight).unwrap();
    assert_eq!(large.ordering, OrderingMode::Sorted);
    assert!(small.tile.tile_elems < large.tile.tile_elems);
    assert!(small.tile.aux_scratch_bytes <= 4096);
}

#[test]
fn test_outer_split_targets() {
    let base = ScatterRequest::new(shape(&[64]), shape(&[4096]), shape(&[4096]))
        .with_reduction(Reduction::Add);
    let platform = PlatformInfo::default().with_core_num(4);
    let config = TilingConfig::default().with_min_split_elems(1);

    let racing = plan_scatter(&base, &platform, &config).unwrap();
    assert_eq!(racing.regime, Regime::Outer);
    assert!(matches!(
        racing.work,
        WorkLayout::SplitLines {
            target: SplitTarget::Sources,
            ..
        }
    ));

    let ordered = plan_scatter(&base.clone().with_deterministic(true), &platform, &config)
        .unwrap();
    assert!(matches!(
        ordered.work,
        WorkLayout::SplitLines {
            target: SplitTarget::Destinations,
            ..
        }
    ));
    assert_ne!(racing.key, ordered.key);
}

#[test]
fn test_key_reflects_request() {
    let request = ScatterRequest::new(shape(&[16, 32]), shape(&[16, 8]), shape(&[16, 8]))
        .with_axis(1)
        .with_reduction(Reduction::Mul)
        .with_dtype(DType::I16)
        .with_index_dtype(IndexDType::I32);
    let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default())
        .unwrap();

    let expected =
        encode_key(DType::I16, Reduction::Mul, IndexDType::I32, false, Regime::Inner).unwrap();
    assert_eq!(plan.key, expected);
    assert_eq!(KeyField::DType.extract(plan.key.value()), DType::I16.key_code());
    assert_eq!(plan.key.decode().unwrap().reduction, Reduction::Mul);
    assert_ne!(plan.key, DispatchKey::EMPTY);
}

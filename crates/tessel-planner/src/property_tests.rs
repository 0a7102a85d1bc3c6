//! Property-based tests for the planner
//!
//! These tests use `proptest` to check the partition, tile-size, key and
//! normalization invariants over random inputs.

#[cfg(test)]
mod tests {
    use crate::{
        normalize, order_for_determinism, partition, plan_scatter, plan_work, solve_tile_size,
        supported_variants, tree_reduce, Contribution, CostModel, Normalized, OrderingMode, Regime,
        ScatterRequest, SplitTarget, TilingConfig,
    };
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tessel_core::{DType, IndexDType, PlatformInfo, Reduction, TensorShape};

    proptest! {
        /// Front and tail shares differ by at most one and cover every unit
        #[test]
        fn prop_partition_load_balance(
            total in 0u64..100_000,
            cores in 1u32..=256,
        ) {
            let plan = partition(total, cores).unwrap();
            prop_assert!(plan.front_units_per_core >= plan.tail_units_per_core);
            prop_assert!(plan.front_units_per_core - plan.tail_units_per_core <= 1);
            prop_assert_eq!(plan.assigned_units(), total);
            prop_assert!(plan.used_cores <= cores);
            prop_assert_eq!(plan.used_cores, plan.front_cores + plan.tail_cores);

            let covered: u64 = (0..plan.used_cores).map(|c| plan.unit_range(c).end - plan.unit_range(c).start).sum();
            prop_assert_eq!(covered, total);
        }

        /// Split layouts never hand out more cores than exist
        #[test]
        fn prop_work_layout_within_core_limit(
            lines in 1u64..64,
            extent in 1u64..10_000,
            cores in 1u32..=128,
            min_split in 1u64..64,
            sources in any::<bool>(),
        ) {
            let target = if sources { SplitTarget::Sources } else { SplitTarget::Destinations };
            let work = plan_work(Regime::Outer, lines, extent, extent, target, cores, min_split).unwrap();
            prop_assert!(work.used_cores() <= cores);
            prop_assert!(work.used_cores() >= 1);
            for core in 0..work.used_cores() {
                prop_assert!(work.assignment(core).is_some());
            }
        }

        /// The solved tile is the largest that fits
        #[test]
        fn prop_tile_budget_respected(
            per_elem in 1u64..64,
            quad in 0u64..8,
            fixed in 0u64..4096,
            budget in 0u64..200_000,
            upper in 1u64..100_000,
        ) {
            let cost = |t: u64| per_elem * t + quad * t * t / 64 + fixed;
            let tile = solve_tile_size(1, upper, budget, cost);
            prop_assert!((1..=upper).contains(&tile));
            if cost(1) <= budget {
                prop_assert!(cost(tile) <= budget);
                if tile < upper {
                    prop_assert!(cost(tile + 1) > budget);
                }
            } else {
                prop_assert_eq!(tile, 1);
            }
        }

        /// Sorted cost models are monotone and the solver respects them
        #[test]
        fn prop_sorted_model_budget(
            dtype_idx in 0usize..10,
            wide in any::<bool>(),
            key_bytes in prop::sample::select(vec![1u64, 2, 4, 8]),
            cap in 1024u64..65_536,
            budget in 4096u64..200_000,
        ) {
            let dtype = DType::ALL[dtype_idx];
            let index = if wide { IndexDType::I64 } else { IndexDType::I32 };
            let model = CostModel::sorted(dtype, index, key_bytes, 512, cap, 32);
            let tile = solve_tile_size(1, 50_000, budget, |t| model.cost(t));
            if model.cost(1) <= budget {
                prop_assert!(model.cost(tile) <= budget);
            }
            prop_assert!(model.cost(tile) <= model.cost(tile + 1));
        }

        /// Any request that plans stays within the budget
        #[test]
        fn prop_plan_validates_tile(
            pre in 1u64..16,
            data_mid in 1u64..512,
            idx_mid in 1u64..512,
            post in 1u64..16,
            axis_outer in any::<bool>(),
            deterministic in any::<bool>(),
            cores in 1u32..=64,
        ) {
            let (data, indices) = if axis_outer {
                (vec![data_mid, pre, post], vec![idx_mid, pre, post])
            } else {
                (vec![pre, data_mid, post], vec![pre, idx_mid, post])
            };
            let axis = if axis_outer { 0 } else { 1 };
            let indices = TensorShape::new(&indices).unwrap();
            let request = ScatterRequest::new(TensorShape::new(&data).unwrap(), indices.clone(), indices)
                .with_axis(axis)
                .with_reduction(Reduction::Add)
                .with_deterministic(deterministic);
            let platform = PlatformInfo::default().with_core_num(cores);
            let plan = plan_scatter(&request, &platform, &TilingConfig::default()).unwrap();
            prop_assert!(plan.tile.total_bytes <= plan.budget_bytes);
            prop_assert!(plan.tile.tile_elems >= 1);
            prop_assert!(plan.used_cores() <= cores);
            prop_assert!(!plan.work.shares_destinations() || !deterministic);
            prop_assert_eq!(deterministic, plan.ordering == OrderingMode::Sorted);
            prop_assert!(plan.lines_per_chunk == 1 || plan.ordering == OrderingMode::Encounter);
        }

        /// Canonical three-axis views normalize to themselves
        #[test]
        fn prop_normalize_idempotent(
            pre in 1u64..32,
            data_mid in 1u64..64,
            idx_mid in 1u64..64,
            post in 1u64..32,
        ) {
            let data = TensorShape::new(&[pre, data_mid, post]).unwrap();
            let indices = TensorShape::new(&[pre, idx_mid, post]).unwrap();
            let Normalized::Layout(layout) = normalize(&data, &indices, &indices, 1).unwrap() else {
                return Err(TestCaseError::fail("unexpected empty problem"));
            };
            prop_assert_eq!((layout.indices.pre, layout.indices.mid, layout.indices.post), (pre, idx_mid, post));
            prop_assert_eq!((layout.data.pre, layout.data.mid, layout.data.post), (pre, data_mid, post));

            let f = &layout.folded;
            let Normalized::Layout(again) = normalize(&f.data, &f.indices, &f.updates, f.axis as i64).unwrap() else {
                return Err(TestCaseError::fail("unexpected empty problem"));
            };
            prop_assert_eq!(again, layout);
        }

        /// Folding preserves element counts
        #[test]
        fn prop_fold_preserves_numel(
            dims in prop::collection::vec(1u64..6, 1..=7),
            axis_seed in 0usize..7,
            shrink in 0u64..5,
        ) {
            let axis = axis_seed % dims.len();
            let mut idx = dims.clone();
            idx[axis] = (dims[axis].saturating_sub(shrink)).max(1);
            let data = TensorShape::new(&dims).unwrap();
            let indices = TensorShape::new(&idx).unwrap();
            let Normalized::Layout(layout) = normalize(&data, &indices, &indices, axis as i64).unwrap() else {
                return Err(TestCaseError::fail("unexpected empty problem"));
            };
            prop_assert_eq!(layout.data.numel(), data.numel());
            prop_assert_eq!(layout.indices.numel(), indices.numel());
            prop_assert!(layout.folded.data.rank() <= data.rank());
        }

        /// Ordered groups are sorted and independent of input order
        #[test]
        fn prop_order_groups_sorted(
            dests in prop::collection::vec(0u64..50, 0..200),
            axis_size in prop::sample::select(vec![50u64, 1 << 30]),
        ) {
            let input: Vec<Contribution> = dests
                .iter()
                .enumerate()
                .map(|(p, &d)| Contribution { dest: d, position: p as u64 })
                .collect();
            let mut reversed = input.clone();
            reversed.reverse();

            let ordered = order_for_determinism(&input, axis_size);
            prop_assert_eq!(&ordered, &order_for_determinism(&reversed, axis_size));
            prop_assert_eq!(ordered.len(), input.len());
            for pair in ordered.entries().windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            let unique: HashSet<u64> = dests.iter().copied().collect();
            prop_assert_eq!(ordered.groups().len(), unique.len());
        }

        /// Tree reduction of integers equals the plain sum
        #[test]
        fn prop_tree_reduce_matches_sum(values in prop::collection::vec(-1000i64..1000, 1..300)) {
            let expected: i64 = values.iter().sum();
            let mut scratch = values.clone();
            prop_assert_eq!(tree_reduce(&mut scratch, |a, b| a + b), Some(expected));
        }
    }

    #[test]
    fn test_supported_keys_pairwise_distinct() {
        let keys: Vec<u64> = supported_variants()
            .map(|f| f.encode().unwrap().value())
            .collect();
        let unique: HashSet<u64> = keys.iter().copied().collect();
        assert_eq!(unique.len(), keys.len());
    }
}

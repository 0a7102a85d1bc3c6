//! Print the decisions the planner makes for a few scatter problems.
//!
//! Run with: cargo run --example plan_report -p tessel-planner

use tessel_core::{PlatformInfo, Reduction, TensorShape};
use tessel_planner::{plan_scatter, ScatterRequest, TilingConfig, WorkLayout};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let platform = PlatformInfo::default();
    let config = TilingConfig::default();

    let problems = [
        ("embedding grad", vec![50_000u64, 256], vec![4096u64, 256], 0i64, true),
        ("row scatter", vec![64, 10_000], vec![64, 2_000], 1, false),
        ("1-D histogram", vec![1024], vec![1_000_000], 0, true),
    ];

    for (name, data, indices, axis, deterministic) in problems {
        let indices = TensorShape::new(&indices)?;
        let request = ScatterRequest::new(TensorShape::new(&data)?, indices.clone(), indices)
            .with_axis(axis)
            .with_reduction(Reduction::Add)
            .with_deterministic(deterministic);
        let plan = plan_scatter(&request, &platform, &config)?;

        println!("== {} ==", name);
        println!("  regime:   {:?}", plan.regime);
        println!("  ordering: {:?}", plan.ordering);
        println!("  cores:    {}", plan.used_cores());
        match plan.work {
            WorkLayout::Lines(core_plan) => println!(
                "  lines:    {} front x {} + {} tail x {}",
                core_plan.front_cores,
                core_plan.front_units_per_core,
                core_plan.tail_cores,
                core_plan.tail_units_per_core
            ),
            WorkLayout::SplitLines {
                lines,
                target,
                line_plan,
            } => println!(
                "  split:    {} line(s), {:?} across {} cores each",
                lines, target, line_plan.used_cores
            ),
            WorkLayout::Empty => println!("  nothing to do"),
        }
        println!(
            "  tile:     {} elems over {} line(s), {} of {} bytes",
            plan.tile.tile_elems, plan.lines_per_chunk, plan.tile.total_bytes, plan.budget_bytes
        );
        println!("  key:      {}", plan.key);
    }

    Ok(())
}

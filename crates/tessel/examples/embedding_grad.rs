//! Accumulate embedding gradients with and without deterministic ordering.
//!
//! Run with: cargo run --example embedding_grad -p tessel --features tracing
//! Set `RUST_LOG=tessel_exec=debug` to see the scatter spans.

use anyhow::Result;
use tessel::prelude::*;
use tessel::tracing_support::{init_tracing, TracingConfig};

fn main() -> Result<()> {
    init_tracing(TracingConfig::default())?;

    let (vocab, width, tokens) = (16u64, 4u64, 256u64);
    let ids: Vec<i64> = (0..tokens).map(|t| ((t * 7) % vocab) as i64).collect();
    let indices: Vec<i64> = ids
        .iter()
        .flat_map(|&id| std::iter::repeat(id).take(width as usize))
        .collect();
    let grads: Vec<f32> = (0..tokens * width)
        .map(|i| ((i % 13) as f32 - 6.0) * 1.0e-3)
        .collect();

    let platform = PlatformInfo::from_env();
    let data_shape = [vocab, width];
    let index_shape = [tokens, width];
    for deterministic in [false, true] {
        let builder = scatter_ex(&data_shape, &index_shape)
            .axis(0)
            .reduction(Reduction::Add)
            .deterministic(deterministic)
            .platform(platform)
            .config(TilingConfig::default().with_min_split_elems(1));

        let plan = builder.plan::<f32, i64>()?;
        println!("== deterministic: {} ==", deterministic);
        println!("  key:      {}", plan.key);
        println!("  ordering: {:?}", plan.ordering);
        println!("  cores:    {}", plan.used_cores());
        println!(
            "  tile:     {} elements over {} line(s)",
            plan.tile.tile_elems, plan.lines_per_chunk
        );

        let mut table = vec![0.0f32; (vocab * width) as usize];
        let report = builder.run(&mut table, &indices, &grads)?;
        println!(
            "  applied:  {} over {} chunks, row 0 = {:?}",
            report.applied,
            report.chunks,
            &table[..width as usize]
        );
    }

    Ok(())
}

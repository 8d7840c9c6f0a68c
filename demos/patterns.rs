//! Pattern generation demo: renders each device-generated test pattern as
//! ASCII art.
//!
//! Run with `cargo run --example patterns`.  Requires a compute-capable
//! adapter.

use tileconv::pattern::generate;
use tileconv::{GpuContext, Pattern, Session};

const SHADES: &[u8] = b" .:-=+*#%@";

fn main() {
    env_logger::init();

    let context = GpuContext::new_blocking().expect("failed to initialise GPU context");
    let mut session = Session::new(&context);

    let (height, width) = (24usize, 48usize);
    for pattern in [
        Pattern::Sawtooth,
        Pattern::Checkerboard,
        Pattern::DiagonalStripes,
        Pattern::ConcentricRings,
    ] {
        let values = generate(&mut session, pattern, height, width).expect("dispatch failed");
        let max = values.iter().cloned().fold(0.0f32, f32::max).max(1.0);
        println!("{pattern:?}:");
        for y in 0..height {
            let row: String = (0..width)
                .map(|x| {
                    let level = values[y * width + x] / max;
                    let idx = (level * (SHADES.len() - 1) as f32).round() as usize;
                    SHADES[idx.min(SHADES.len() - 1)] as char
                })
                .collect();
            println!("  {row}");
        }
        println!();
    }
}

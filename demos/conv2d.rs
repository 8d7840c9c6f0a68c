//! 2D convolution demo: runs the same filter through every tiling strategy
//! and checks each result against the scalar oracle.
//!
//! Run with `cargo run --example conv2d`.  Requires a compute-capable
//! adapter.

use rand::Rng;

use tileconv::{
    compare, reference, ConvolutionJob, Filter, GpuContext, Image, Session, Strategy, Tolerance,
};

fn main() {
    env_logger::init();

    let context = GpuContext::new_blocking().expect("failed to initialise GPU context");
    let mut session = Session::new(&context);

    let mut rng = rand::thread_rng();
    let (height, width) = (256usize, 256usize);
    let image = Image::new(
        (0..height * width).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        height,
        width,
        1,
    );
    // A 5x5 box blur.
    let filter = Filter::filled(5, 1.0 / 25.0);

    let expected = reference(&image, &filter, 1).expect("geometry");

    for strategy in [Strategy::HaloTile, Strategy::DirectGrid] {
        let job = ConvolutionJob {
            image: &image,
            filter: &filter,
            stride: 1,
            strategy,
        };
        let out = job.run(&mut session).expect("dispatch failed");
        match compare(&expected.data, &out.data, Tolerance::default()) {
            Ok(()) => println!(
                "{strategy:?}: {}x{} output matches the oracle",
                out.height, out.width
            ),
            Err(e) => println!("{strategy:?}: MISMATCH: {e}"),
        }
    }

    // The whole-image strategy only fits small images under default limits.
    let small = Image::new(
        (0..14 * 14).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        14,
        14,
        1,
    );
    let expected = reference(&small, &filter, 1).expect("geometry");
    let out = ConvolutionJob {
        image: &small,
        filter: &filter,
        stride: 1,
        strategy: Strategy::WholeImageTile,
    }
    .run(&mut session)
    .expect("dispatch failed");
    match compare(&expected.data, &out.data, Tolerance::default()) {
        Ok(()) => println!(
            "WholeImageTile: {}x{} output matches the oracle",
            out.height, out.width
        ),
        Err(e) => println!("WholeImageTile: MISMATCH: {e}"),
    }
}

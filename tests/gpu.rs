//! Integration tests that need a real compute-capable adapter.
//!
//! Every test here is `#[ignore]`d so `cargo test` passes on CI machines
//! without a GPU.  Run them locally with:
//!
//!     cargo test --test gpu -- --include-ignored

use rand::Rng;

use tileconv::pattern::generate;
use tileconv::{
    compare, reference, reference_forward, reference_transpose, transpose, ComputeError,
    ConvolutionJob, Filter, ForwardJob, GpuContext, Image, Launch, Pattern, Session,
    SpecializationOptions, Strategy, Tolerance,
};

fn ctx() -> GpuContext {
    GpuContext::new_blocking().expect("compute-capable adapter")
}

fn random_image(height: usize, width: usize, channels: usize) -> Image {
    let mut rng = rand::thread_rng();
    let data = (0..height * width * channels)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();
    Image::new(data, height, width, channels)
}

fn random_filter(size: usize) -> Filter {
    let mut rng = rand::thread_rng();
    Filter::new((0..size * size).map(|_| rng.gen_range(-1.0..1.0)).collect(), size)
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn halo_boundary_all_ones() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    // 18x18 of ones, 3x3 of twos: every output element is 2 * 9 = 18.
    let image = Image::filled(18, 18, 1, 1.0);
    let filter = Filter::filled(3, 2.0);
    let job = ConvolutionJob {
        image: &image,
        filter: &filter,
        stride: 1,
        strategy: Strategy::HaloTile,
    };
    let out = job.run(&mut session).unwrap();
    assert_eq!((out.height, out.width), (16, 16));
    assert!(out.data.iter().all(|&v| v == 18.0), "{:?}", &out.data[..8]);
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn whole_image_tile_matches_oracle() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    // Small enough that one group covers the whole image under default
    // wgpu limits (14 * 14 = 196 <= 256 invocations).
    let image = random_image(14, 14, 1);
    let filter = random_filter(3);
    let job = ConvolutionJob {
        image: &image,
        filter: &filter,
        stride: 1,
        strategy: Strategy::WholeImageTile,
    };
    let out = job.run(&mut session).unwrap();
    let expected = reference(&image, &filter, 1).unwrap();
    compare(&expected.data, &out.data, Tolerance::default()).unwrap();
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn strategies_agree_with_oracle() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let image = random_image(64, 48, 2);
    let filter = random_filter(5);
    let expected = reference(&image, &filter, 1).unwrap();
    for strategy in [Strategy::HaloTile, Strategy::DirectGrid] {
        let job = ConvolutionJob {
            image: &image,
            filter: &filter,
            stride: 1,
            strategy,
        };
        let out = job.run(&mut session).unwrap();
        assert_eq!((out.height, out.width), (expected.height, expected.width));
        compare(&expected.data, &out.data, Tolerance::default())
            .unwrap_or_else(|e| panic!("{strategy:?}: {e}"));
    }
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn strided_strategies_agree_with_oracle() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let image = random_image(37, 41, 1);
    let filter = random_filter(3);
    let expected = reference(&image, &filter, 2).unwrap();
    for strategy in [Strategy::HaloTile, Strategy::DirectGrid] {
        let job = ConvolutionJob {
            image: &image,
            filter: &filter,
            stride: 2,
            strategy,
        };
        let out = job.run(&mut session).unwrap();
        compare(&expected.data, &out.data, Tolerance::default())
            .unwrap_or_else(|e| panic!("{strategy:?}: {e}"));
    }
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn forward_unit_filter_counts_the_window() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let input = vec![1.0f32; 18 * 18];
    let filters = vec![1.0f32; 9];
    let job = ForwardJob {
        input: &input,
        filters: &filters,
        batch: 1,
        in_channels: 1,
        out_maps: 1,
        height: 18,
        width: 18,
        kernel_size: 3,
    };
    let out = job.run(&mut session).unwrap();
    assert_eq!(out.len(), 16 * 16);
    assert!(out.iter().all(|&v| v == 9.0), "{:?}", &out[..8]);
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn forward_batched_matches_oracle() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let mut rng = rand::thread_rng();
    let (b, c, m, h, w, k) = (2usize, 3usize, 4usize, 20usize, 24usize, 3usize);
    let input: Vec<f32> = (0..b * c * h * w).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let filters: Vec<f32> = (0..m * c * k * k).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let job = ForwardJob {
        input: &input,
        filters: &filters,
        batch: b,
        in_channels: c,
        out_maps: m,
        height: h,
        width: w,
        kernel_size: k,
    };
    let out = job.run(&mut session).unwrap();
    let expected = reference_forward(&input, &filters, b, c, m, h, w, k).unwrap();
    compare(&expected, &out, Tolerance::default()).unwrap();
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn transpose_matches_reference() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let mut rng = rand::thread_rng();
    let (rows, cols) = (100usize, 60usize);
    let m: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(0.0..1.0)).collect();
    let out = transpose(&mut session, &m, rows, cols).unwrap();
    assert_eq!(out, reference_transpose(&m, rows, cols));
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn checkerboard_pattern_matches_formula() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let out = generate(&mut session, Pattern::Checkerboard, 16, 16).unwrap();
    for y in 0..16 {
        for x in 0..16 {
            let expected = ((x / 4 + y / 4) % 2) as f32;
            assert_eq!(out[y * 16 + x], expected, "at ({x}, {y})");
        }
    }
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn identical_jobs_are_bit_identical() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let image = random_image(50, 50, 1);
    let filter = random_filter(5);
    let job = ConvolutionJob {
        image: &image,
        filter: &filter,
        stride: 1,
        strategy: Strategy::HaloTile,
    };
    let first = job.run(&mut session).unwrap();
    let second = job.run(&mut session).unwrap();
    let bits = |img: &Image| img.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first), bits(&second));
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn pipeline_cache_reuses_variants() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let image = random_image(32, 32, 1);
    let small = random_filter(3);
    let large = random_filter(5);
    let run = |session: &mut Session, filter: &Filter| {
        ConvolutionJob {
            image: &image,
            filter,
            stride: 1,
            strategy: Strategy::HaloTile,
        }
        .run(session)
        .unwrap()
    };
    run(&mut session, &small);
    run(&mut session, &small);
    assert_eq!(session.cached_variants(), 1);
    // A different filter size changes the baked halo radius and therefore
    // the compiled variant.
    run(&mut session, &large);
    assert_eq!(session.cached_variants(), 2);
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn missing_entry_point_is_reported() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let launch = Launch {
        entry_point: "nonexistent",
        body: "@compute @workgroup_size(1) fn other() {}",
        options: SpecializationOptions::new(),
        grid: (1, 1, 1),
    };
    let err = session
        .run_f32(&launch, &[], &0u32, 1)
        .unwrap_err();
    assert!(matches!(err, ComputeError::KernelNotFound { .. }), "{err}");
}

#[test]
#[ignore = "requires a compute-capable GPU adapter"]
fn invalid_wgsl_carries_the_build_log() {
    let ctx = ctx();
    let mut session = Session::new(&ctx);
    let launch = Launch {
        entry_point: "broken",
        body: "@compute @workgroup_size(1) fn broken() { not wgsl at all }",
        options: SpecializationOptions::new(),
        grid: (1, 1, 1),
    };
    let err = session.run_f32(&launch, &[], &0u32, 1).unwrap_err();
    match err {
        ComputeError::KernelBuild { log } => assert!(!log.is_empty()),
        other => panic!("expected KernelBuild, got {other}"),
    }
}

//! Device-generated test patterns.
//!
//! Each pattern kernel writes a function of its pixel coordinate into an
//! uninitialized output buffer; there are no storage inputs at all.  The
//! kernels share one WGSL source with multiple entry points, selected by
//! name at pipeline creation, so generating a different pattern never
//! recompiles the module.

use bytemuck::{Pod, Zeroable};

use crate::error::ComputeError;
use crate::session::{Launch, Session, SpecializationOptions};

/// Workgroup edge for pattern dispatches.  Patterns are tiny; 8x8 keeps
/// partial edge groups small.
const PATTERN_GROUP: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PatternParams {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
}

const PATTERN_SRC: &str = r#"
struct Params {
    width: u32,
    height: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read_write> outp: array<f32>;
@group(0) @binding(1) var<uniform> params: Params;

@compute @workgroup_size(GROUP_DIM, GROUP_DIM)
fn sawtooth(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    outp[gid.y * params.width + gid.x] = f32((gid.x + gid.y) % 8u);
}

@compute @workgroup_size(GROUP_DIM, GROUP_DIM)
fn checkerboard(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    outp[gid.y * params.width + gid.x] = f32((gid.x / 4u + gid.y / 4u) % 2u);
}

@compute @workgroup_size(GROUP_DIM, GROUP_DIM)
fn diagonal_stripes(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    outp[gid.y * params.width + gid.x] = f32(((gid.x + gid.y) / 4u) % 4u);
}

@compute @workgroup_size(GROUP_DIM, GROUP_DIM)
fn concentric_rings(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let dx = f32(gid.x) - f32(params.width) / 2.0;
    let dy = f32(gid.y) - f32(params.height) / 2.0;
    let r = sqrt(dx * dx + dy * dy);
    outp[gid.y * params.width + gid.x] = f32(u32(r) % 4u);
}
"#;

/// The available generator kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Sawtooth,
    Checkerboard,
    DiagonalStripes,
    ConcentricRings,
}

impl Pattern {
    /// The WGSL entry point implementing this pattern.
    pub fn entry_point(&self) -> &'static str {
        match self {
            Pattern::Sawtooth => "sawtooth",
            Pattern::Checkerboard => "checkerboard",
            Pattern::DiagonalStripes => "diagonal_stripes",
            Pattern::ConcentricRings => "concentric_rings",
        }
    }
}

/// Generate a `height x width` pattern on the device.
pub fn generate(
    session: &mut Session<'_>,
    pattern: Pattern,
    height: usize,
    width: usize,
) -> Result<Vec<f32>, ComputeError> {
    let params = PatternParams {
        width: width as u32,
        height: height as u32,
        _pad0: 0,
        _pad1: 0,
    };
    let grid_x = (width as u32 + PATTERN_GROUP - 1) / PATTERN_GROUP;
    let grid_y = (height as u32 + PATTERN_GROUP - 1) / PATTERN_GROUP;

    let launch = Launch {
        entry_point: pattern.entry_point(),
        body: PATTERN_SRC,
        options: SpecializationOptions::new().with("GROUP_DIM", PATTERN_GROUP),
        grid: (grid_x, grid_y, 1),
    };
    session.run_f32(&launch, &[], &params, height * width)
}

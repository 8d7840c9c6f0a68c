//! Tiled matrix transpose.
//!
//! The same shared-memory machinery as the halo convolution, applied to
//! transposition: each group stages a square tile, barriers, then writes it
//! back with the axes swapped.  The shared tile is padded by one column so
//! the column-order reads in the write phase do not hit shared-memory bank
//! conflicts.

use bytemuck::{Pod, Zeroable};

use crate::error::ComputeError;
use crate::geometry::TILE_WIDTH;
use crate::session::{Launch, Session, SpecializationOptions};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TransposeParams {
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}

const TRANSPOSE_SRC: &str = r#"
struct Params {
    rows: u32,
    cols: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read_write> outp: array<f32>;
@group(0) @binding(1) var<storage, read> inp: array<f32>;
@group(0) @binding(2) var<uniform> params: Params;

// +1 column of padding against bank conflicts on the transposed reads.
const SH_W: u32 = TILE_DIM + 1u;

var<workgroup> tile: array<f32, SH_W * TILE_DIM>;

@compute @workgroup_size(TILE_DIM, TILE_DIM)
fn transpose_tiled(@builtin(local_invocation_id) lid: vec3<u32>,
                   @builtin(workgroup_id) wid: vec3<u32>) {
    let x = wid.x * TILE_DIM + lid.x;
    let y = wid.y * TILE_DIM + lid.y;
    if (x < params.cols && y < params.rows) {
        tile[lid.y * SH_W + lid.x] = inp[y * params.cols + x];
    }
    workgroupBarrier();

    // This thread's coordinates in the transposed output; note the swapped
    // workgroup ids and the swapped local indices into the shared tile.
    let tx = wid.y * TILE_DIM + lid.x;
    let ty = wid.x * TILE_DIM + lid.y;
    if (tx < params.rows && ty < params.cols) {
        outp[ty * params.rows + tx] = tile[lid.x * SH_W + lid.y];
    }
}
"#;

/// Transpose a dense row-major `rows x cols` matrix on the device,
/// returning the `cols x rows` result.
pub fn transpose(
    session: &mut Session<'_>,
    input: &[f32],
    rows: usize,
    cols: usize,
) -> Result<Vec<f32>, ComputeError> {
    assert_eq!(
        input.len(),
        rows * cols,
        "matrix buffer length does not match shape ({rows}, {cols})"
    );

    let params = TransposeParams {
        rows: rows as u32,
        cols: cols as u32,
        _pad0: 0,
        _pad1: 0,
    };
    let grid_x = (cols as u32 + TILE_WIDTH - 1) / TILE_WIDTH;
    let grid_y = (rows as u32 + TILE_WIDTH - 1) / TILE_WIDTH;

    let launch = Launch {
        entry_point: "transpose_tiled",
        body: TRANSPOSE_SRC,
        options: SpecializationOptions::new().with("TILE_DIM", TILE_WIDTH),
        grid: (grid_x, grid_y, 1),
    };
    session.run_f32(&launch, &[input], &params, rows * cols)
}

/// Scalar reference transpose for verification.
pub fn reference_transpose(input: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; rows * cols];
    for y in 0..rows {
        for x in 0..cols {
            out[x * rows + y] = input[y * cols + x];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_transpose_swaps_axes() {
        let m: Vec<f32> = (0..6).map(|i| i as f32).collect();
        // 2x3 -> 3x2
        let t = reference_transpose(&m, 2, 3);
        assert_eq!(t, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn reference_transpose_is_an_involution() {
        let m: Vec<f32> = (0..12).map(|i| (i * 7 % 5) as f32).collect();
        let t = reference_transpose(&m, 3, 4);
        assert_eq!(reference_transpose(&t, 4, 3), m);
    }

    #[test]
    fn transpose_source_declares_its_entry_point() {
        assert!(TRANSPOSE_SRC.contains("fn transpose_tiled"));
    }
}

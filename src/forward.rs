//! Batched channel-reduction forward convolution.
//!
//! Generalizes the plain kernel with two extra loop axes: the input
//! channels are reduced into each output map, and a batch dimension is
//! flattened into the launch z axis together with the output map index.
//! This variant feeds a CNN forward pass, is always consumed by the
//! direct-grid kernel, and uses no halo optimization; stride is fixed at 1.

use bytemuck::{Pod, Zeroable};

use crate::error::ComputeError;
use crate::geometry::{output_shape, plan, Strategy, TILE_WIDTH};
use crate::session::{Launch, Session, SpecializationOptions};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ForwardParams {
    height: u32,
    width: u32,
    out_h: u32,
    out_w: u32,
    kernel_size: u32,
    in_channels: u32,
    out_maps: u32,
    w_grid: u32,
}

const FORWARD_SRC: &str = r#"
struct Params {
    height: u32,
    width: u32,
    out_h: u32,
    out_w: u32,
    kernel_size: u32,
    in_channels: u32,
    out_maps: u32,
    w_grid: u32,
}

@group(0) @binding(0) var<storage, read_write> y: array<f32>;
@group(0) @binding(1) var<storage, read> x: array<f32>;
@group(0) @binding(2) var<storage, read> k: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(TILE_WIDTH, TILE_WIDTH)
fn conv_forward(@builtin(local_invocation_id) lid: vec3<u32>,
                @builtin(workgroup_id) wid: vec3<u32>) {
    // z flattens (batch, output map); x flattens the two tile axes.
    let b = wid.z / params.out_maps;
    let m = wid.z % params.out_maps;
    let tile_y = wid.x / params.w_grid;
    let tile_x = wid.x % params.w_grid;

    let oy = tile_y * TILE_WIDTH + lid.y;
    let ox = tile_x * TILE_WIDTH + lid.x;
    if (oy >= params.out_h || ox >= params.out_w) {
        return;
    }
    var sum = 0.0;
    for (var c = 0u; c < params.in_channels; c = c + 1u) {
        for (var p = 0u; p < params.kernel_size; p = p + 1u) {
            for (var q = 0u; q < params.kernel_size; q = q + 1u) {
                let xi = ((b * params.in_channels + c) * params.height + oy + p)
                    * params.width + ox + q;
                let ki = ((m * params.in_channels + c) * params.kernel_size + p)
                    * params.kernel_size + q;
                sum = sum + x[xi] * k[ki];
            }
        }
    }
    y[((b * params.out_maps + m) * params.out_h + oy) * params.out_w + ox] = sum;
}
"#;

/// One forward-pass launch over a batch of feature maps.
///
/// `input` has shape `(batch, in_channels, height, width)` and `filters`
/// `(out_maps, in_channels, kernel_size, kernel_size)`, both dense
/// row-major.
pub struct ForwardJob<'a> {
    pub input: &'a [f32],
    pub filters: &'a [f32],
    pub batch: usize,
    pub in_channels: usize,
    pub out_maps: usize,
    pub height: usize,
    pub width: usize,
    pub kernel_size: usize,
}

impl ForwardJob<'_> {
    /// Dispatch the forward kernel and read back a
    /// `(batch, out_maps, out_h, out_w)` buffer.
    pub fn run(&self, session: &mut Session<'_>) -> Result<Vec<f32>, ComputeError> {
        assert_eq!(
            self.input.len(),
            self.batch * self.in_channels * self.height * self.width,
            "input buffer length does not match shape"
        );
        assert_eq!(
            self.filters.len(),
            self.out_maps * self.in_channels * self.kernel_size * self.kernel_size,
            "filter buffer length does not match shape"
        );

        let limits = session.limits();
        let geometry = plan(
            self.height,
            self.width,
            self.kernel_size,
            1,
            Strategy::DirectGrid,
            &limits,
        )?;
        let (out_h, out_w) = output_shape(self.height, self.width, self.kernel_size, 1)?;

        let params = ForwardParams {
            height: self.height as u32,
            width: self.width as u32,
            out_h: out_h as u32,
            out_w: out_w as u32,
            kernel_size: self.kernel_size as u32,
            in_channels: self.in_channels as u32,
            out_maps: self.out_maps as u32,
            w_grid: geometry.grid_dim.0,
        };

        log::debug!(
            "forward: batch {} x {}ch {}x{} -> {} maps {}x{}",
            self.batch,
            self.in_channels,
            self.height,
            self.width,
            self.out_maps,
            out_h,
            out_w,
        );

        let launch = Launch {
            entry_point: "conv_forward",
            body: FORWARD_SRC,
            options: SpecializationOptions::new().with("TILE_WIDTH", TILE_WIDTH),
            grid: (
                geometry.grid_dim.0 * geometry.grid_dim.1,
                1,
                (self.batch * self.out_maps) as u32,
            ),
        };
        session.run_f32(
            &launch,
            &[self.input, self.filters],
            &params,
            self.batch * self.out_maps * out_h * out_w,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_source_declares_its_entry_point() {
        assert!(FORWARD_SRC.contains("fn conv_forward"));
    }

    #[test]
    fn forward_params_match_the_wgsl_struct() {
        assert_eq!(std::mem::size_of::<ForwardParams>(), 32);
    }
}

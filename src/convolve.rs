//! The three tiled convolution kernels and the job that launches them.
//!
//! All three strategies compute the same "valid" convolution
//! `out[i,j] = sum_{m,n} in[i*s + m, j*s + n] * mask[m,n]` and differ only
//! in how the output domain maps onto work groups:
//!
//! - `conv_halo_tile`: fixed 16x16 groups; each group cooperatively loads
//!   its output tile plus halo into workgroup memory, barriers, then every
//!   thread accumulates from the shared tile.
//! - `conv_whole_image`: the degenerate case with one group sized to the
//!   full input load span.  Only valid while the group fits device limits.
//! - `conv_direct`: no shared memory; threads read global memory directly.
//!   The grid-tile counts travel in the params so the flattened x launch
//!   dimension can recover each group's tile coordinates.
//!
//! Channels are independent: the launch z dimension selects the channel and
//! the same mask is applied to each.

use bytemuck::{Pod, Zeroable};

use crate::error::ComputeError;
use crate::geometry::{output_shape, plan, Strategy, TILE_WIDTH};
use crate::image::{Filter, Image};
use crate::session::{Launch, Session, SpecializationOptions};

/// Scalar kernel arguments shared by all convolution kernels.
///
/// The layout must match the `Params` struct each WGSL body declares;
/// fields unused by a given strategy (baked as specialization constants
/// instead) are simply not read by that kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ConvParams {
    pub height: u32,
    pub width: u32,
    pub out_h: u32,
    pub out_w: u32,
    pub kernel_size: u32,
    pub stride: u32,
    pub channels: u32,
    pub w_grid: u32,
}

const HALO_TILE_SRC: &str = r#"
struct Params {
    height: u32,
    width: u32,
    out_h: u32,
    out_w: u32,
    kernel_size: u32,
    stride: u32,
    channels: u32,
    w_grid: u32,
}

@group(0) @binding(0) var<storage, read_write> outp: array<f32>;
@group(0) @binding(1) var<storage, read> img: array<f32>;
@group(0) @binding(2) var<storage, read> mask: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

const KERNEL_SIZE: u32 = 2u * HALO_RADIUS + 1u;
const SMEM_SPAN: u32 = (TILE_WIDTH - 1u) * STRIDE + KERNEL_SIZE;

var<workgroup> tile: array<f32, SMEM_SPAN * SMEM_SPAN>;

@compute @workgroup_size(TILE_WIDTH, TILE_WIDTH)
fn conv_halo_tile(@builtin(local_invocation_id) lid: vec3<u32>,
                  @builtin(workgroup_id) wid: vec3<u32>) {
    let c = wid.z;
    // Top-left input sample covered by this group's shared tile.
    let base_y = wid.y * TILE_WIDTH * STRIDE;
    let base_x = wid.x * TILE_WIDTH * STRIDE;

    // Cooperative load: the whole group strides across the SMEM_SPAN^2
    // window.  Threads whose output lies outside the valid region still
    // participate here; they only skip the write phase below.
    let lane = lid.y * TILE_WIDTH + lid.x;
    var i = lane;
    while (i < SMEM_SPAN * SMEM_SPAN) {
        let ty = i / SMEM_SPAN;
        let tx = i % SMEM_SPAN;
        let gy = base_y + ty;
        let gx = base_x + tx;
        var v = 0.0;
        if (gy < params.height && gx < params.width) {
            v = img[(gy * params.width + gx) * params.channels + c];
        }
        tile[i] = v;
        i = i + TILE_WIDTH * TILE_WIDTH;
    }

    // Every halo sample must be visible before any thread consumes one.
    workgroupBarrier();

    let oy = wid.y * TILE_WIDTH + lid.y;
    let ox = wid.x * TILE_WIDTH + lid.x;
    if (oy >= params.out_h || ox >= params.out_w) {
        return;
    }
    var sum = 0.0;
    for (var m = 0u; m < KERNEL_SIZE; m = m + 1u) {
        for (var n = 0u; n < KERNEL_SIZE; n = n + 1u) {
            let ty = lid.y * STRIDE + m;
            let tx = lid.x * STRIDE + n;
            sum = sum + tile[ty * SMEM_SPAN + tx] * mask[m * KERNEL_SIZE + n];
        }
    }
    outp[(oy * params.out_w + ox) * params.channels + c] = sum;
}
"#;

const WHOLE_IMAGE_SRC: &str = r#"
struct Params {
    height: u32,
    width: u32,
    out_h: u32,
    out_w: u32,
    kernel_size: u32,
    stride: u32,
    channels: u32,
    w_grid: u32,
}

@group(0) @binding(0) var<storage, read_write> outp: array<f32>;
@group(0) @binding(1) var<storage, read> img: array<f32>;
@group(0) @binding(2) var<storage, read> mask: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

const KERNEL_SIZE: u32 = 2u * HALO_RADIUS + 1u;

var<workgroup> tile: array<f32, GROUP_X * GROUP_Y>;

@compute @workgroup_size(GROUP_X, GROUP_Y)
fn conv_whole_image(@builtin(local_invocation_id) lid: vec3<u32>,
                    @builtin(workgroup_id) wid: vec3<u32>) {
    let c = wid.z;
    // One thread per sample of the load span; the span never exceeds the
    // input, so the bounds check only trims the edge when stride > 1.
    var v = 0.0;
    if (lid.y < params.height && lid.x < params.width) {
        v = img[(lid.y * params.width + lid.x) * params.channels + c];
    }
    tile[lid.y * GROUP_X + lid.x] = v;
    workgroupBarrier();

    if (lid.y >= params.out_h || lid.x >= params.out_w) {
        return;
    }
    var sum = 0.0;
    for (var m = 0u; m < KERNEL_SIZE; m = m + 1u) {
        for (var n = 0u; n < KERNEL_SIZE; n = n + 1u) {
            let ty = lid.y * STRIDE + m;
            let tx = lid.x * STRIDE + n;
            sum = sum + tile[ty * GROUP_X + tx] * mask[m * KERNEL_SIZE + n];
        }
    }
    outp[(lid.y * params.out_w + lid.x) * params.channels + c] = sum;
}
"#;

const DIRECT_GRID_SRC: &str = r#"
struct Params {
    height: u32,
    width: u32,
    out_h: u32,
    out_w: u32,
    kernel_size: u32,
    stride: u32,
    channels: u32,
    w_grid: u32,
}

@group(0) @binding(0) var<storage, read_write> outp: array<f32>;
@group(0) @binding(1) var<storage, read> img: array<f32>;
@group(0) @binding(2) var<storage, read> mask: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(TILE_WIDTH, TILE_WIDTH)
fn conv_direct(@builtin(local_invocation_id) lid: vec3<u32>,
               @builtin(workgroup_id) wid: vec3<u32>) {
    // Both tile axes are flattened into the x launch dimension; the grid
    // tile count recovers this group's tile coordinates.
    let tile_y = wid.x / params.w_grid;
    let tile_x = wid.x % params.w_grid;
    let c = wid.z;

    let oy = tile_y * TILE_WIDTH + lid.y;
    let ox = tile_x * TILE_WIDTH + lid.x;
    if (oy >= params.out_h || ox >= params.out_w) {
        return;
    }
    var sum = 0.0;
    for (var m = 0u; m < params.kernel_size; m = m + 1u) {
        for (var n = 0u; n < params.kernel_size; n = n + 1u) {
            let gy = oy * params.stride + m;
            let gx = ox * params.stride + n;
            sum = sum + img[(gy * params.width + gx) * params.channels + c]
                * mask[m * params.kernel_size + n];
        }
    }
    outp[(oy * params.out_w + ox) * params.channels + c] = sum;
}
"#;

/// Immutable description of a single convolution launch.
pub struct ConvolutionJob<'a> {
    pub image: &'a Image,
    pub filter: &'a Filter,
    pub stride: usize,
    pub strategy: Strategy,
}

impl ConvolutionJob<'_> {
    /// `(out_height, out_width)` for this job, or the geometry error the
    /// launch would fail with.
    pub fn output_shape(&self) -> Result<(usize, usize), ComputeError> {
        output_shape(
            self.image.height,
            self.image.width,
            self.filter.size,
            self.stride,
        )
        .map_err(Into::into)
    }

    /// Plan the geometry, stage the buffers, dispatch and read back.
    ///
    /// Device buffers live only for the duration of this call; the
    /// compiled kernel variant stays cached in the session.
    pub fn run(&self, session: &mut Session<'_>) -> Result<Image, ComputeError> {
        let limits = session.limits();
        let geometry = plan(
            self.image.height,
            self.image.width,
            self.filter.size,
            self.stride,
            self.strategy,
            &limits,
        )?;
        let (out_h, out_w) = self.output_shape()?;
        let channels = self.image.channels as u32;

        let params = ConvParams {
            height: self.image.height as u32,
            width: self.image.width as u32,
            out_h: out_h as u32,
            out_w: out_w as u32,
            kernel_size: self.filter.size as u32,
            stride: self.stride as u32,
            channels,
            w_grid: geometry.grid_dim.0,
        };

        let (entry_point, body, options, grid) = match self.strategy {
            Strategy::HaloTile => (
                "conv_halo_tile",
                HALO_TILE_SRC,
                SpecializationOptions::new()
                    .with("TILE_WIDTH", TILE_WIDTH)
                    .with("HALO_RADIUS", geometry.halo_radius)
                    .with("STRIDE", self.stride as u32),
                (geometry.grid_dim.0, geometry.grid_dim.1, channels),
            ),
            Strategy::WholeImageTile => (
                "conv_whole_image",
                WHOLE_IMAGE_SRC,
                SpecializationOptions::new()
                    .with("GROUP_X", geometry.group_dim.0)
                    .with("GROUP_Y", geometry.group_dim.1)
                    .with("HALO_RADIUS", geometry.halo_radius)
                    .with("STRIDE", self.stride as u32),
                (1, 1, channels),
            ),
            Strategy::DirectGrid => (
                "conv_direct",
                DIRECT_GRID_SRC,
                SpecializationOptions::new().with("TILE_WIDTH", TILE_WIDTH),
                (geometry.grid_dim.0 * geometry.grid_dim.1, 1, channels),
            ),
        };

        log::debug!(
            "convolution {:?}: {}x{}x{} * {}^2 stride {} -> {}x{}, groups {:?} grid {:?}",
            self.strategy,
            self.image.height,
            self.image.width,
            self.image.channels,
            self.filter.size,
            self.stride,
            out_h,
            out_w,
            geometry.group_dim,
            geometry.grid_dim,
        );

        let launch = Launch {
            entry_point,
            body,
            options,
            grid,
        };
        let data = session.run_f32(
            &launch,
            &[&self.image.data, &self.filter.data],
            &params,
            out_h * out_w * self.image.channels,
        )?;
        Ok(Image::new(data, out_h, out_w, self.image.channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_sources_declare_their_entry_points() {
        assert!(HALO_TILE_SRC.contains("fn conv_halo_tile"));
        assert!(WHOLE_IMAGE_SRC.contains("fn conv_whole_image"));
        assert!(DIRECT_GRID_SRC.contains("fn conv_direct"));
    }

    #[test]
    fn params_struct_is_uniform_sized() {
        // Must stay in sync with the WGSL `Params` struct: 8 u32 fields.
        assert_eq!(std::mem::size_of::<ConvParams>(), 32);
    }

    #[test]
    fn job_shape_errors_surface_before_launch() {
        let image = Image::filled(2, 2, 1, 1.0);
        let filter = Filter::filled(3, 1.0);
        let job = ConvolutionJob {
            image: &image,
            filter: &filter,
            stride: 1,
            strategy: Strategy::DirectGrid,
        };
        assert!(job.output_shape().is_err());
    }
}

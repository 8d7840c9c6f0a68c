//! Tile geometry planning.
//!
//! The planner is a pure function: given the image shape, filter size,
//! stride, a tiling strategy and the device limits, it produces the
//! work-group and grid dimensions for one launch, or a
//! [`GeometryError`] when the request cannot run on the device.  Nothing
//! here touches the GPU, so every rule is unit-testable against
//! [`wgpu::Limits::default()`].

use crate::error::GeometryError;

/// Output tile edge for the halo and direct-grid strategies, in threads.
///
/// Baked into the kernel as a specialization constant; 16x16 = 256 threads
/// fits every wgpu-supported device's invocation limit.
pub const TILE_WIDTH: u32 = 16;

/// How the output domain is partitioned across work groups.
///
/// Selection is a caller policy; the planner never picks a strategy from
/// the image size on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Fixed-size groups that cooperatively load their output tile plus a
    /// halo border into workgroup memory before computing.
    HaloTile,
    /// Degenerate halo tiling: a single group sized to cover the whole
    /// output image plus halo.  Only valid while the group fits the
    /// device's thread-count and workgroup-memory limits.
    WholeImageTile,
    /// No shared-memory reuse; every thread reads the input and filter
    /// straight from global memory.  Grid-tile counts are passed to the
    /// kernel so a flattened launch dimension can recover its tile offset.
    DirectGrid,
}

/// Launch dimensions for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    /// Threads per work group, `(x, y)`.
    pub group_dim: (u32, u32),
    /// Work groups in the launch, `(x, y)`.
    pub grid_dim: (u32, u32),
    /// Halo border width `(k - 1) / 2`, or 0 when no shared tile is used.
    pub halo_radius: u32,
}

impl TileGeometry {
    /// Ceiling-tiling invariant: the launch covers the full output domain.
    pub fn covers(&self, out_w: u32, out_h: u32) -> bool {
        self.grid_dim.0 * self.group_dim.0 >= out_w && self.grid_dim.1 * self.group_dim.1 >= out_h
    }
}

/// Valid-convolution output shape `(out_height, out_width)`.
///
/// Fails rather than ever producing a zero or negative dimension.
pub fn output_shape(
    height: usize,
    width: usize,
    kernel_size: usize,
    stride: usize,
) -> Result<(usize, usize), GeometryError> {
    if stride == 0 {
        return Err(GeometryError::ZeroStride);
    }
    if kernel_size == 0 || height < kernel_size || width < kernel_size {
        return Err(GeometryError::EmptyOutput {
            height,
            width,
            kernel_size,
            stride,
        });
    }
    Ok((
        (height - kernel_size) / stride + 1,
        (width - kernel_size) / stride + 1,
    ))
}

/// The input span one group must load to produce `group_dim` outputs:
/// `(group_dim - 1) * stride + k`.  For stride 1 this is the familiar
/// `group_dim + 2 * halo_radius`.
pub fn shared_tile_span(group_dim: u32, stride: u32, kernel_size: u32) -> u32 {
    (group_dim - 1) * stride + kernel_size
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Plan the launch geometry for one convolution job.
pub fn plan(
    height: usize,
    width: usize,
    kernel_size: usize,
    stride: usize,
    strategy: Strategy,
    limits: &wgpu::Limits,
) -> Result<TileGeometry, GeometryError> {
    let (out_h, out_w) = output_shape(height, width, kernel_size, stride)?;
    let (out_h, out_w) = (out_h as u32, out_w as u32);
    let k = kernel_size as u32;
    let stride = stride as u32;

    match strategy {
        Strategy::HaloTile => {
            let halo_radius = require_odd(kernel_size)?;
            let span = shared_tile_span(TILE_WIDTH, stride, k);
            check_shared_bytes(span, span, limits)?;
            let grid = (ceil_div(out_w, TILE_WIDTH), ceil_div(out_h, TILE_WIDTH));
            check_grid(grid.0.max(grid.1), limits)?;
            Ok(TileGeometry {
                group_dim: (TILE_WIDTH, TILE_WIDTH),
                grid_dim: grid,
                halo_radius,
            })
        }
        Strategy::WholeImageTile => {
            let halo_radius = require_odd(kernel_size)?;
            // One group loads the full input load span and computes the
            // full output image.
            let span_x = shared_tile_span(out_w, stride, k);
            let span_y = shared_tile_span(out_h, stride, k);
            if span_x > limits.max_compute_workgroup_size_x
                || span_y > limits.max_compute_workgroup_size_y
                || span_x * span_y > limits.max_compute_invocations_per_workgroup
            {
                return Err(GeometryError::GroupTooLarge {
                    x: span_x,
                    y: span_y,
                    max_x: limits.max_compute_workgroup_size_x,
                    max_y: limits.max_compute_workgroup_size_y,
                    max_invocations: limits.max_compute_invocations_per_workgroup,
                });
            }
            check_shared_bytes(span_x, span_y, limits)?;
            Ok(TileGeometry {
                group_dim: (span_x, span_y),
                grid_dim: (1, 1),
                halo_radius,
            })
        }
        Strategy::DirectGrid => {
            let grid = (ceil_div(out_w, TILE_WIDTH), ceil_div(out_h, TILE_WIDTH));
            // The direct kernel flattens both tile axes into the x launch
            // dimension, so the product is what the limit constrains.
            check_grid(grid.0 * grid.1, limits)?;
            Ok(TileGeometry {
                group_dim: (TILE_WIDTH, TILE_WIDTH),
                grid_dim: grid,
                halo_radius: 0,
            })
        }
    }
}

fn require_odd(kernel_size: usize) -> Result<u32, GeometryError> {
    if kernel_size % 2 == 0 {
        return Err(GeometryError::EvenKernel { kernel_size });
    }
    Ok(((kernel_size - 1) / 2) as u32)
}

fn check_shared_bytes(span_x: u32, span_y: u32, limits: &wgpu::Limits) -> Result<(), GeometryError> {
    let bytes = span_x * span_y * std::mem::size_of::<f32>() as u32;
    if bytes > limits.max_compute_workgroup_storage_size {
        return Err(GeometryError::SharedMemoryExceeded {
            bytes,
            max: limits.max_compute_workgroup_storage_size,
        });
    }
    Ok(())
}

fn check_grid(groups: u32, limits: &wgpu::Limits) -> Result<(), GeometryError> {
    if groups > limits.max_compute_workgroups_per_dimension {
        return Err(GeometryError::GridTooLarge {
            groups,
            max: limits.max_compute_workgroups_per_dimension,
        });
    }
    Ok(())
}

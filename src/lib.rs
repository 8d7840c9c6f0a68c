//! Tiled 2D convolution, matrix transposition and pattern generation on the
//! GPU using [wgpu](https://github.com/gfx-rs/wgpu).  The host side stages
//! data into device buffers, launches compute kernels and reads results
//! back; the device side applies a small stationary filter across a large
//! input under one of three tiling strategies that trade work-group size,
//! shared-memory reuse and direct global-memory access against each other.
//! A scalar reference oracle validates every kernel.  The API is
//! synchronous and blocking: each job fully completes before the next
//! begins.

pub mod buffer;
pub mod context;
pub mod convolve;
pub mod error;
pub mod forward;
pub mod geometry;
pub mod image;
pub mod pattern;
pub mod reference;
pub mod session;
pub mod transpose;

// Re-export the most common types at the crate root so that users can
// simply `use tileconv::*;`.
pub use buffer::GpuBuffer;
pub use context::GpuContext;
pub use convolve::ConvolutionJob;
pub use error::{ComputeError, GeometryError, MismatchError};
pub use forward::ForwardJob;
pub use geometry::{output_shape, plan, Strategy, TileGeometry, TILE_WIDTH};
pub use image::{Filter, Image};
pub use pattern::Pattern;
pub use reference::{compare, reference, reference_forward, Tolerance};
pub use session::{Launch, Session, SpecializationOptions};
pub use transpose::{reference_transpose, transpose};

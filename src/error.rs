//! Error types for device setup, kernel compilation, tiling geometry and
//! buffer transfers.
//!
//! Every fallible operation in this crate returns a typed error instead of
//! terminating the process, so a caller can decide whether a failed job is
//! fatal.  Verification mismatches are deliberately kept out of
//! [`ComputeError`]: disagreeing with the reference oracle is a test
//! assertion, not a runtime condition, so [`MismatchError`] is only ever
//! returned by [`crate::reference::compare`].

use thiserror::Error;

/// Top-level error for a convolution, transpose or pattern job.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// No adapter was found, or the selected adapter cannot run compute
    /// shaders.
    #[error("no usable compute device: {0}")]
    DeviceUnavailable(String),

    /// WGSL compilation or pipeline creation failed.  `log` carries the
    /// validation diagnostic verbatim.
    #[error("kernel build failed:\n{log}")]
    KernelBuild { log: String },

    /// The requested entry point does not exist in the kernel source.
    #[error("entry point `{entry_point}` not found in kernel source")]
    KernelNotFound { entry_point: String },

    /// The requested tiling geometry is invalid or exceeds device limits.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Buffer allocation or transfer failed.
    #[error("buffer error: {0}")]
    Buffer(String),
}

/// Errors from the tile geometry planner.
///
/// The planner is a pure function of the image shape, filter shape, stride
/// and device limits; all of these are detected before any device resource
/// is allocated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// `(dim - kernel_size) / stride + 1` would be zero or negative in at
    /// least one axis.
    #[error(
        "empty output: {height}x{width} input with kernel {kernel_size} and stride {stride}"
    )]
    EmptyOutput {
        height: usize,
        width: usize,
        kernel_size: usize,
        stride: usize,
    },

    /// A stride of zero never advances the filter window.
    #[error("stride must be at least 1")]
    ZeroStride,

    /// Halo tiling derives its radius as `(k - 1) / 2`, which is only
    /// symmetric for odd kernel sizes.
    #[error("halo tiling requires an odd kernel size, got {kernel_size}")]
    EvenKernel { kernel_size: usize },

    /// The requested work group exceeds the device's per-dimension size or
    /// total invocation limits.
    #[error(
        "work group {x}x{y} exceeds device limits ({max_x}x{max_y}, {max_invocations} invocations)"
    )]
    GroupTooLarge {
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
        max_invocations: u32,
    },

    /// The grid needs more work groups than the device allows in one launch
    /// dimension.
    #[error("grid of {groups} work groups exceeds the per-dimension limit {max}")]
    GridTooLarge { groups: u32, max: u32 },

    /// The shared input tile does not fit in workgroup memory.
    #[error("shared tile needs {bytes} bytes of workgroup memory, device allows {max}")]
    SharedMemoryExceeded { bytes: u32, max: u32 },
}

/// A device result disagreed with the reference oracle beyond tolerance.
///
/// `index` is the first failing flat index; `max_abs_diff` is taken over the
/// whole buffer so the magnitude of the disagreement is visible even when
/// only the first offender is reported.
#[derive(Debug, Error, Clone, PartialEq)]
#[error(
    "mismatch at index {index}: expected {expected}, got {actual} (max abs diff {max_abs_diff})"
)]
pub struct MismatchError {
    pub index: usize,
    pub expected: f32,
    pub actual: f32,
    pub max_abs_diff: f32,
}

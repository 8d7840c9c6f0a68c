//! GPU context initialization.
//!
//! A [`GpuContext`] wraps wgpu's instance, adapter, device and queue.  It is
//! created once and passed by reference to every operation that needs device
//! access; there is no ambient global state.  The `new_blocking` constructor
//! hides the asynchronous adapter and device requests behind
//! [`pollster::block_on`].

use wgpu::{Adapter, Device, Instance, Queue};

use crate::error::ComputeError;

/// All state needed to submit compute work to one device.
///
/// The wrapped wgpu types are internally reference counted, so the context
/// itself is cheap to share by reference.  Construction picks the default
/// adapter on the system and fails with
/// [`ComputeError::DeviceUnavailable`] if none exists or the one found
/// cannot run compute shaders.
pub struct GpuContext {
    /// The global GPU instance.  Required to request an adapter even in
    /// headless compute applications.
    pub instance: Instance,
    /// The physical device selected for computation.
    pub adapter: Adapter,
    /// Logical device used to create resources and command encoders.
    pub device: Device,
    /// Command submission queue.
    pub queue: Queue,
}

impl GpuContext {
    /// Create a new GPU context, blocking until the adapter and device
    /// requests finish.
    pub fn new_blocking() -> Result<Self, ComputeError> {
        pollster::block_on(Self::new_async())
    }

    /// Create a new GPU context from inside an async runtime.
    pub async fn new_async() -> Result<Self, ComputeError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| ComputeError::DeviceUnavailable(format!("no adapter: {e}")))?;

        // Downlevel devices may not support compute on all backends; abort
        // before creating any resources.
        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(ComputeError::DeviceUnavailable(format!(
                "adapter `{}` does not support compute shaders",
                adapter.get_info().name
            )));
        }

        log::info!(
            "using adapter `{}` ({:?}, {:?})",
            adapter.get_info().name,
            adapter.get_info().backend,
            adapter.get_info().device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tileconv_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ComputeError::DeviceUnavailable(format!("device request failed: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// The limits the logical device was created with.  The tile geometry
    /// planner validates every launch against these.
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}

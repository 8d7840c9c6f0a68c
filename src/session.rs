//! Kernel sessions: specialization, compilation caching and dispatch.
//!
//! A [`Session`] owns the compiled pipeline variants for a context.  Kernel
//! sources are WGSL bodies that reference integer constants (tile width,
//! halo radius, baked dimensions); [`SpecializationOptions`] renders those
//! constants into a `const` header prepended to the body, the WGSL analog
//! of `-DNAME=value` build options.  Compiled pipelines are cached keyed by
//! `(entry_point, options)`, so re-running a job with the same filter
//! configuration never recompiles, while changing a baked constant compiles
//! a fresh variant.
//!
//! Dispatch is synchronous: [`Session::run_f32`] stages the inputs, encodes
//! one compute pass, submits, copies the output into a download buffer and
//! blocks until the results are readable on the host.  One job is in flight
//! at a time.

use std::collections::HashMap;
use std::num::NonZeroU64;

use bytemuck::Pod;
use wgpu::{ShaderModuleDescriptor, ShaderSource};

use crate::buffer::GpuBuffer;
use crate::context::GpuContext;
use crate::error::{ComputeError, GeometryError};

/// Compile-time integer constants baked into a kernel variant.
///
/// Rendered as a `const NAME: u32 = <value>u;` header, so the kernel body
/// can size `var<workgroup>` arrays and `@workgroup_size` attributes with
/// them.  Changing any value requires (and triggers) recompilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecializationOptions {
    consts: Vec<(String, u32)>,
}

impl SpecializationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one named constant.  Order is part of the cache key, so callers
    /// should build options deterministically.
    pub fn with(mut self, name: &str, value: u32) -> Self {
        self.consts.push((name.to_string(), value));
        self
    }

    /// Render the WGSL `const` header.
    pub fn render(&self) -> String {
        let mut header = String::new();
        for (name, value) in &self.consts {
            header.push_str(&format!("const {name}: u32 = {value}u;\n"));
        }
        header
    }
}

/// One launch request: which kernel, with which baked constants, over which
/// grid of work groups.
pub struct Launch<'a> {
    pub entry_point: &'a str,
    pub body: &'a str,
    pub options: SpecializationOptions,
    pub grid: (u32, u32, u32),
}

struct Compiled {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// Owns the pipeline cache for one [`GpuContext`].
///
/// Sessions are cheap to keep alive across jobs; the expensive part (shader
/// compilation) happens once per `(entry_point, options)` pair.
pub struct Session<'a> {
    ctx: &'a GpuContext,
    pipelines: HashMap<(String, SpecializationOptions), Compiled>,
}

impl<'a> Session<'a> {
    pub fn new(ctx: &'a GpuContext) -> Self {
        Self {
            ctx,
            pipelines: HashMap::new(),
        }
    }

    /// The device limits launches are validated against.
    pub fn limits(&self) -> wgpu::Limits {
        self.ctx.limits()
    }

    /// Number of compiled pipeline variants currently cached.
    pub fn cached_variants(&self) -> usize {
        self.pipelines.len()
    }

    /// Dispatch a kernel over `f32` storage buffers and read the output
    /// back.
    ///
    /// Bindings follow a fixed positional order mirroring the launch
    /// interface: binding 0 is the read-write output, bindings `1..=n` are
    /// the read-only inputs in the order given (input image first, filter
    /// second for convolution kernels), and the last binding is a uniform
    /// struct carrying the scalar dimensions.  The kernel body must declare
    /// the same layout.
    pub fn run_f32<P: Pod>(
        &mut self,
        launch: &Launch<'_>,
        inputs: &[&[f32]],
        params: &P,
        output_len: usize,
    ) -> Result<Vec<f32>, ComputeError> {
        let ctx = self.ctx;

        let limits = ctx.limits();
        for groups in [launch.grid.0, launch.grid.1, launch.grid.2] {
            if groups > limits.max_compute_workgroups_per_dimension {
                return Err(GeometryError::GridTooLarge {
                    groups,
                    max: limits.max_compute_workgroups_per_dimension,
                }
                .into());
            }
        }
        debug_assert!(
            launch.grid.0 > 0 && launch.grid.1 > 0 && launch.grid.2 > 0,
            "empty dispatch grid"
        );

        let key = (launch.entry_point.to_string(), launch.options.clone());
        if !self.pipelines.contains_key(&key) {
            let compiled = compile(ctx, launch, inputs.len())?;
            self.pipelines.insert(key.clone(), compiled);
        }
        let compiled = &self.pipelines[&key];

        // Stage all device buffers.  Ownership keeps them alive until the
        // end of this call and releases each exactly once on every path.
        let output = GpuBuffer::<f32>::output(ctx, output_len)?;
        let staged: Vec<GpuBuffer<f32>> = inputs
            .iter()
            .map(|data| GpuBuffer::stage(ctx, data))
            .collect::<Result<_, _>>()?;
        let params_buffer = GpuBuffer::uniform(ctx, params);
        let download = GpuBuffer::<f32>::download(ctx, output_len);

        let mut entries = Vec::with_capacity(inputs.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: output.buffer.as_entire_binding(),
        });
        for (i, staged) in staged.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: staged.buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: (inputs.len() + 1) as u32,
            resource: params_buffer.buffer.as_entire_binding(),
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tileconv_bind_group"),
            layout: &compiled.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tileconv_encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(launch.entry_point),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&compiled.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(launch.grid.0, launch.grid.1, launch.grid.2);
        }
        encoder.copy_buffer_to_buffer(&output.buffer, 0, &download.buffer, 0, output.byte_len());
        ctx.queue.submit([encoder.finish()]);

        log::debug!(
            "dispatched `{}` over {:?} work groups, {} output elements",
            launch.entry_point,
            launch.grid,
            output_len
        );

        download.read_to_vec(ctx)
    }
}

/// Compile one kernel variant, capturing validation diagnostics.
fn compile(
    ctx: &GpuContext,
    launch: &Launch<'_>,
    storage_inputs: usize,
) -> Result<Compiled, ComputeError> {
    // wgpu reports a missing entry point as a generic validation error at
    // pipeline creation; checking the source up front gives the caller the
    // distinct failure the taxonomy promises.
    if !launch.body.contains(&format!("fn {}", launch.entry_point)) {
        return Err(ComputeError::KernelNotFound {
            entry_point: launch.entry_point.to_string(),
        });
    }

    let source = format!("{}{}", launch.options.render(), launch.body);

    // Validation errors surface through an error scope rather than a panic
    // so the diagnostic log can be carried verbatim.
    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = ctx.device.create_shader_module(ShaderModuleDescriptor {
        label: Some(launch.entry_point),
        source: ShaderSource::Wgsl(source.into()),
    });
    if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
        return Err(ComputeError::KernelBuild {
            log: err.to_string(),
        });
    }

    let bind_group_layout = bind_group_layout(ctx, storage_inputs);
    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tileconv_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = ctx
        .device
        .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(launch.entry_point),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(launch.entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
    if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
        return Err(ComputeError::KernelBuild {
            log: err.to_string(),
        });
    }

    log::debug!(
        "compiled `{}` with {} storage input(s)",
        launch.entry_point,
        storage_inputs
    );

    Ok(Compiled {
        pipeline,
        bind_group_layout,
    })
}

/// Fixed positional layout: read-write output at 0, `storage_inputs`
/// read-only buffers after it, uniform params last.
fn bind_group_layout(ctx: &GpuContext, storage_inputs: usize) -> wgpu::BindGroupLayout {
    let element_size = NonZeroU64::new(std::mem::size_of::<f32>() as u64);
    let mut entries = Vec::with_capacity(storage_inputs + 2);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: element_size,
        },
        count: None,
    });
    for i in 0..storage_inputs {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (i + 1) as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: element_size,
            },
            count: None,
        });
    }
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: (storage_inputs + 1) as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    ctx.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tileconv_bind_group_layout"),
            entries: &entries,
        })
}

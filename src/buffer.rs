//! Typed GPU buffers and host readback.
//!
//! [`GpuBuffer`] wraps a [`wgpu::Buffer`] together with the number of typed
//! elements it holds.  Read-only inputs are populated at staging time,
//! write-only outputs are device-allocated uninitialized, and download
//! buffers are host-mappable copies of an output.  Each buffer is uniquely
//! owned; device memory is released exactly once when the wrapper drops,
//! which holds on every exit path including errors.

use std::marker::PhantomData;
use std::sync::mpsc;

use bytemuck::{cast_slice, Pod};
use wgpu::{Buffer, BufferDescriptor, BufferUsages};

use crate::context::GpuContext;
use crate::error::ComputeError;

/// A typed GPU buffer.
///
/// `len` records how many elements of type `T` are stored; the underlying
/// size in bytes is `len * size_of::<T>()`.
pub struct GpuBuffer<T: Pod> {
    pub buffer: Buffer,
    pub len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Stage a read-only input buffer, populated from `data`.
    ///
    /// The contents are written through the queue, which avoids requiring
    /// the `MAP_WRITE` usage flag.  Writing immediately after creation is
    /// safe because the GPU has not yet seen the buffer.
    pub fn stage(context: &GpuContext, data: &[T]) -> Result<Self, ComputeError> {
        if data.is_empty() {
            return Err(ComputeError::Buffer("cannot stage an empty buffer".into()));
        }
        let bytes = cast_slice(data);
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("tileconv_input"),
            size: bytes.len() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        context.queue.write_buffer(&buffer, 0, bytes);
        Ok(Self {
            buffer,
            len: data.len(),
            _marker: PhantomData,
        })
    }

    /// Stage a small uniform buffer holding a single `T`, used for the
    /// scalar kernel parameters that follow the storage bindings.
    pub fn uniform(context: &GpuContext, value: &T) -> Self {
        let bytes = bytemuck::bytes_of(value);
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("tileconv_params"),
            size: bytes.len() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        context.queue.write_buffer(&buffer, 0, bytes);
        Self {
            buffer,
            len: 1,
            _marker: PhantomData,
        }
    }

    /// Allocate a write-only output buffer of `len` elements.
    ///
    /// The contents are uninitialized until a kernel writes them.  The
    /// buffer carries `COPY_SRC` so it can be copied into a download buffer
    /// after the dispatch.
    pub fn output(context: &GpuContext, len: usize) -> Result<Self, ComputeError> {
        if len == 0 {
            return Err(ComputeError::Buffer(
                "cannot allocate a zero-length output buffer".into(),
            ));
        }
        let size = (len * std::mem::size_of::<T>()) as u64;
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("tileconv_output"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(Self {
            buffer,
            len,
            _marker: PhantomData,
        })
    }

    /// Allocate a host-mappable download buffer of `len` elements.  It
    /// cannot be bound to a shader; outputs are copied into it with
    /// `copy_buffer_to_buffer`.
    pub fn download(context: &GpuContext, len: usize) -> Self {
        let size = (len * std::mem::size_of::<T>()) as u64;
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("tileconv_download"),
            size,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            len,
            _marker: PhantomData,
        }
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> u64 {
        (self.len * std::mem::size_of::<T>()) as u64
    }

    /// Block until the GPU has finished writing and read the contents back
    /// to the host.  Only valid on download buffers.
    pub fn read_to_vec(&self, context: &GpuContext) -> Result<Vec<T>, ComputeError> {
        let slice = self.buffer.slice(..);

        // The map callback fires once the device signals completion; the
        // channel carries the map result back to this thread.
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ComputeError::Buffer(format!("device poll failed: {e:?}")))?;

        rx.recv()
            .map_err(|_| ComputeError::Buffer("map callback dropped".into()))?
            .map_err(|e| ComputeError::Buffer(format!("readback mapping failed: {e:?}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<T> = cast_slice(&data).to_vec();
        // The mapped view borrows the buffer; drop it before unmapping.
        drop(data);
        self.buffer.unmap();
        Ok(result)
    }
}

use wgpu::util::DeviceExt;

use crate::shared::error::DetectionError;

use super::gpu_context::GpuContext;
use super::gpu_program::GpuProgram;

const FILL_WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuFillParams {
    value: u32,
    len: u32,
    _pad0: u32,
    _pad1: u32,
}

/// A device storage buffer of `u32` with a host-side mirror.
///
/// Device work on the buffer is only enqueued. The mirror keeps whatever it
/// last held, and can be read freely while work is pending, until
/// [`read_back`](Self::read_back) blocks on the queue and copies the device
/// contents over it.
pub struct StagedBuffer {
    host: Vec<u32>,
    device: wgpu::Buffer,
    staging: wgpu::Buffer,
}

impl StagedBuffer {
    /// Zeroed buffer of `len` elements on both sides.
    pub fn new(ctx: &GpuContext, label: &str, len: usize) -> Result<Self, DetectionError> {
        Self::from_host(ctx, label, vec![0; len])
    }

    /// Buffer initialised from `host`, uploaded immediately.
    pub fn from_host(ctx: &GpuContext, label: &str, host: Vec<u32>) -> Result<Self, DetectionError> {
        // zero-length bindings are invalid
        let mut contents = bytemuck::cast_slice::<u32, u8>(&host).to_vec();
        if contents.is_empty() {
            contents.resize(4, 0);
        }
        let bytes = contents.len() as u64;
        ctx.check_storage_size(label, bytes)?;

        let device = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &contents,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            host,
            device,
            staging,
        })
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Host mirror as of the last read-back.
    pub fn host(&self) -> &[u32] {
        &self.host
    }

    pub fn host_sum(&self) -> u64 {
        self.host.iter().map(|&v| v as u64).sum()
    }

    pub fn device_buffer(&self) -> &wgpu::Buffer {
        &self.device
    }

    /// Enqueue a kernel setting every element to `value` and return without
    /// waiting for it.
    pub fn fill_on_device(&self, ctx: &GpuContext, program: &GpuProgram, value: u32) {
        if self.host.is_empty() {
            return;
        }
        let len = self.host.len() as u32;
        let params = GpuFillParams {
            value,
            len,
            _pad0: 0,
            _pad1: 0,
        };
        let params_buf = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("fill-params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fill-bind-group"),
            layout: &program.fill.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.device.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });

        let (groups_x, groups_y) = fill_workgroups(len, ctx.device.limits().max_compute_workgroups_per_dimension);
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fill-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fill"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.fill);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));
    }

    /// Wait for all queued work, then copy the device contents into the host
    /// mirror.
    pub fn read_back(&mut self, ctx: &GpuContext) -> Result<(), DetectionError> {
        let bytes = self.staging.size();
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read-back-encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.device, 0, &self.staging, 0, bytes);
        ctx.queue.submit(Some(encoder.finish()));

        let slice = self.staging.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(DetectionError::TransferFailure(e.to_string())),
            Err(_) => {
                return Err(DetectionError::TransferFailure(
                    "buffer map callback never ran".into(),
                ))
            }
        }

        {
            let mapped = slice.get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&mapped);
            let len = self.host.len();
            self.host.copy_from_slice(&words[..len]);
        }
        self.staging.unmap();
        Ok(())
    }
}

/// Split `len` elements into a 2D grid so no dimension exceeds `max_per_dim`.
fn fill_workgroups(len: u32, max_per_dim: u32) -> (u32, u32) {
    let groups = len.div_ceil(FILL_WORKGROUP_SIZE).max(1);
    let x = groups.min(max_per_dim.max(1));
    (x, groups.div_ceil(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceleration::domain::program_cache::compile_program;
    use crate::acceleration::infrastructure::gpu_program::PROGRAM_SOURCE;

    #[test]
    fn test_fill_workgroups_stays_within_limit() {
        assert_eq!(fill_workgroups(1, 65535), (1, 1));
        assert_eq!(fill_workgroups(64, 65535), (1, 1));
        assert_eq!(fill_workgroups(65, 65535), (2, 1));
        let (x, y) = fill_workgroups(u32::MAX, 65535);
        assert!(x <= 65535);
        assert!(x as u64 * y as u64 * 64 >= u32::MAX as u64);
    }

    #[test]
    fn test_host_sum_changes_only_after_read_back() {
        let ctx = match GpuContext::new() {
            Some(c) => c,
            None => return,
        };
        let program = compile_program(PROGRAM_SOURCE, std::slice::from_ref(&ctx)).unwrap();
        let (_, binary) = &program.binaries()[0];

        const N: usize = 1000;
        let mut buffer = StagedBuffer::new(&ctx, "fill-test", N).unwrap();
        buffer.fill_on_device(&ctx, binary, 1);
        assert_eq!(buffer.host_sum(), 0);

        buffer.read_back(&ctx).unwrap();
        assert_eq!(buffer.host_sum(), N as u64);
    }

    #[test]
    fn test_read_back_returns_uploaded_contents() {
        let ctx = match GpuContext::new() {
            Some(c) => c,
            None => return,
        };
        let mut buffer = StagedBuffer::from_host(&ctx, "upload-test", vec![3, 1, 4, 1, 5]).unwrap();
        buffer.read_back(&ctx).unwrap();
        assert_eq!(buffer.host(), &[3, 1, 4, 1, 5]);
    }

    #[test]
    fn test_empty_buffer_reads_back_nothing() {
        let ctx = match GpuContext::new() {
            Some(c) => c,
            None => return,
        };
        let mut buffer = StagedBuffer::new(&ctx, "empty", 0).unwrap();
        assert!(buffer.is_empty());
        buffer.read_back(&ctx).unwrap();
        assert_eq!(buffer.host_sum(), 0);
    }
}

//! Generic kernel dispatch over flat `f32` storage buffers.
//!
//! Buffers are bound as storage buffers in the order given (group 0,
//! binding `i` for the `i`'th buffer). Every buffer flagged as output is
//! copied to a staging buffer after the pass and read back in the same
//! order.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::context::{GpuContext, GpuError};

/// Size of one buffer element in bytes.
pub const FLOAT32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// Interval between device polls while waiting on a bounded readback.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A host buffer handed to a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedBuffer {
    /// Debug label for the device-side buffer.
    pub label: String,
    /// Buffer contents.
    pub data: Vec<f32>,
    /// Bind as `read-only-storage` instead of `storage`.
    pub read_only: bool,
    /// Copy back to the host after the dispatch.
    pub is_output: bool,
}

impl NamedBuffer {
    /// A read-only input buffer.
    pub fn input(label: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            data,
            read_only: true,
            is_output: false,
        }
    }

    /// A read-write buffer that is not read back.
    pub fn scratch(label: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            data,
            read_only: false,
            is_output: false,
        }
    }

    /// A read-write buffer that is read back after the dispatch.
    pub fn output(label: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            label: label.into(),
            data,
            read_only: false,
            is_output: true,
        }
    }

    /// Size of the buffer contents in bytes.
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64 * FLOAT32_SIZE
    }
}

/// WGSL program text plus the entry point to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelProgram {
    /// Debug label used for the shader module and pipeline.
    pub label: String,
    /// WGSL source.
    pub source: String,
    /// Name of the `@compute` entry point.
    pub entry_point: String,
}

impl KernelProgram {
    /// A WGSL program with entry point `main`.
    pub fn wgsl(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            entry_point: "main".into(),
        }
    }
}

/// Tuning knobs for a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on the wait for readback. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Number of workgroups needed to cover `work_item_count` items.
pub fn workgroup_count(work_item_count: u32, group_size: u32) -> Result<u32, GpuError> {
    if group_size == 0 {
        return Err(GpuError::InvalidGrid("group size must be positive".into()));
    }
    if work_item_count == 0 {
        return Err(GpuError::InvalidGrid(
            "work item count must be positive".into(),
        ));
    }
    Ok(work_item_count.div_ceil(group_size))
}

/// Check buffers and grid against device limits before touching the device.
fn validate_dispatch(
    buffers: &[NamedBuffer],
    work_item_count: u32,
    group_size: u32,
    limits: &wgpu::Limits,
) -> Result<u32, GpuError> {
    let groups = workgroup_count(work_item_count, group_size)?;
    if groups > limits.max_compute_workgroups_per_dimension {
        return Err(GpuError::InvalidGrid(format!(
            "{groups} workgroups exceeds the device limit of {}",
            limits.max_compute_workgroups_per_dimension
        )));
    }
    if group_size > limits.max_compute_workgroup_size_x {
        return Err(GpuError::InvalidGrid(format!(
            "group size {group_size} exceeds the workgroup size limit of {}",
            limits.max_compute_workgroup_size_x
        )));
    }
    if group_size > limits.max_compute_invocations_per_workgroup {
        return Err(GpuError::InvalidGrid(format!(
            "group size {group_size} exceeds the invocations per workgroup limit of {}",
            limits.max_compute_invocations_per_workgroup
        )));
    }
    if buffers.len() as u32 > limits.max_storage_buffers_per_shader_stage {
        return Err(GpuError::InvalidGrid(format!(
            "{} storage buffers exceeds the device limit of {}",
            buffers.len(),
            limits.max_storage_buffers_per_shader_stage
        )));
    }
    for (binding, buffer) in buffers.iter().enumerate() {
        if buffer.data.is_empty() {
            return Err(GpuError::EmptyBuffer {
                binding: binding as u32,
                label: buffer.label.clone(),
            });
        }
        if buffer.byte_len() > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(GpuError::BufferTooLarge {
                label: buffer.label.clone(),
                bytes: buffer.byte_len(),
                limit: u64::from(limits.max_storage_buffer_binding_size),
            });
        }
    }
    Ok(groups)
}

type MapReceiver = Receiver<Result<(), wgpu::BufferAsyncError>>;

/// Runs kernels against one [`GpuContext`], one dispatch at a time.
///
/// `run` takes `&mut self`, so a dispatcher can never have two kernels in
/// flight.
pub struct KernelDispatcher {
    ctx: GpuContext,
    options: DispatchOptions,
}

impl KernelDispatcher {
    /// Create a dispatcher that owns `ctx`.
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            options: DispatchOptions::default(),
        }
    }

    /// Replace the dispatch options.
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying context.
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// The underlying context, mutably (for draining device events).
    pub fn context_mut(&mut self) -> &mut GpuContext {
        &mut self.ctx
    }

    /// Give back the context.
    pub fn into_context(self) -> GpuContext {
        self.ctx
    }

    /// Run `program` once over `ceil(work_item_count / group_size)` workgroups.
    ///
    /// Returns one `Vec<f32>` per buffer flagged `is_output`, in the order
    /// the buffers were given. Device buffers live only for this call.
    pub fn run(
        &mut self,
        program: &KernelProgram,
        buffers: &[NamedBuffer],
        work_item_count: u32,
        group_size: u32,
    ) -> Result<Vec<Vec<f32>>, GpuError> {
        self.ctx.ensure_alive()?;
        let groups = validate_dispatch(buffers, work_item_count, group_size, self.ctx.limits())?;
        debug!(
            "Dispatching {:?}: {} work items, {} workgroups of {}",
            program.label, work_item_count, groups, group_size
        );

        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let gpu_buffers: Vec<wgpu::Buffer> = buffers
            .iter()
            .map(|buf| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(buf.label.as_str()),
                    contents: bytemuck::cast_slice(&buf.data),
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                })
            })
            .collect();

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: buf.read_only,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(program.label.as_str()),
            entries: &layout_entries,
        });

        let bind_entries: Vec<wgpu::BindGroupEntry> = gpu_buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.label.as_str()),
            layout: &bind_group_layout,
            entries: &bind_entries,
        });

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(program.source.as_str().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(program.label.as_str()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(program.label.as_str()),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some(program.entry_point.as_str()),
            compilation_options: Default::default(),
            cache: None,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(program.label.as_str()),
        });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.label.as_str()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }

        // Staging buffers are the only host-mappable copies of the outputs.
        let staging_buffers: Vec<wgpu::Buffer> = buffers
            .iter()
            .zip(&gpu_buffers)
            .filter(|(buf, _)| buf.is_output)
            .map(|(buf, gpu_buffer)| {
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(buf.label.as_str()),
                    size: buf.byte_len(),
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(gpu_buffer, 0, &staging, 0, buf.byte_len());
                staging
            })
            .collect();

        let start_time = Instant::now();
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.ctx.device.pop_error_scope()) {
            return Err(GpuError::Validation(err.to_string()));
        }

        let pending: Vec<MapReceiver> = staging_buffers
            .iter()
            .map(|staging| {
                let (tx, rx) = mpsc::channel();
                staging
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = tx.send(result);
                    });
                rx
            })
            .collect();

        self.await_mapping(pending)?;
        let elapsed = start_time.elapsed();
        info!(
            "{}: dispatch to readback took {:.3}s",
            program.label,
            elapsed.as_secs_f64()
        );

        let outputs = staging_buffers
            .iter()
            .map(|staging| {
                let data = staging.slice(..).get_mapped_range();
                let values: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
                drop(data);
                staging.unmap();
                values
            })
            .collect();

        Ok(outputs)
    }

    /// Block until every staging buffer is mapped, honoring the timeout.
    fn await_mapping(&mut self, pending: Vec<MapReceiver>) -> Result<(), GpuError> {
        let deadline = self.options.timeout.map(|t| (t, Instant::now() + t));

        for rx in pending {
            let result = match deadline {
                None => {
                    self.ctx.device.poll(wgpu::Maintain::Wait);
                    rx.recv().map_err(|_| GpuError::BufferMapping)?
                }
                Some((timeout, deadline)) => loop {
                    self.ctx.device.poll(wgpu::Maintain::Poll);
                    match rx.try_recv() {
                        Ok(result) => break result,
                        Err(TryRecvError::Disconnected) => return Err(GpuError::BufferMapping),
                        Err(TryRecvError::Empty) => {
                            self.ctx.ensure_alive()?;
                            if Instant::now() >= deadline {
                                warn!("GPU readback still pending after {timeout:?}");
                                return Err(GpuError::Timeout(timeout));
                            }
                            std::thread::sleep(POLL_INTERVAL);
                        }
                    }
                },
            };

            if result.is_err() {
                // A lost device fails every mapping; report the root cause.
                self.ctx.ensure_alive()?;
                return Err(GpuError::BufferMapping);
            }
        }
        Ok(())
    }
}

/// Acquire a device, run `program` once, and release the device.
///
/// Returns `Ok(None)` when the environment has no compute-capable adapter.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_kernel(
    program: &KernelProgram,
    buffers: &[NamedBuffer],
    work_item_count: u32,
    group_size: u32,
) -> Result<Option<Vec<Vec<f32>>>, GpuError> {
    let Some(ctx) = GpuContext::probe_blocking()? else {
        warn!("Aborted: no compute-capable GPU adapter available");
        return Ok(None);
    };
    let mut dispatcher = KernelDispatcher::new(ctx);
    dispatcher
        .run(program, buffers, work_item_count, group_size)
        .map(Some)
}

//! GPU context management for wgpu device and queue.

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use log::{debug, error, info};
use thiserror::Error;
use wgpu::{AdapterInfo, Device, Instance, Limits, Queue};

/// Errors that can occur during GPU operations.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    #[error("No compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Buffer mapping failed.
    #[error("Buffer mapping failed")]
    BufferMapping,

    /// The device went away before or during a dispatch.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Readback did not complete within the configured timeout.
    #[error("GPU readback did not complete within {0:?}")]
    Timeout(Duration),

    /// The device rejected a resource, pipeline, or submission.
    #[error("GPU validation error: {0}")]
    Validation(String),

    /// A zero-length buffer cannot be bound as storage.
    #[error("buffer {label:?} at binding {binding} is empty")]
    EmptyBuffer {
        /// Binding slot of the offending buffer.
        binding: u32,
        /// Debug label of the offending buffer.
        label: String,
    },

    /// A buffer is larger than the device allows for one storage binding.
    #[error("buffer {label:?} is {bytes} bytes, above the binding limit of {limit}")]
    BufferTooLarge {
        /// Debug label of the offending buffer.
        label: String,
        /// Size of the buffer.
        bytes: u64,
        /// The device's `max_storage_buffer_binding_size`.
        limit: u64,
    },

    /// The requested work-item count or group size cannot be dispatched.
    #[error("invalid dispatch grid: {0}")]
    InvalidGrid(String),
}

/// Why a device was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    /// The device was destroyed or dropped on purpose.
    Destroyed,
    /// The driver, OS, or hardware took the device away.
    Unexpected,
}

impl From<wgpu::DeviceLostReason> for LossReason {
    fn from(reason: wgpu::DeviceLostReason) -> Self {
        match reason {
            wgpu::DeviceLostReason::Destroyed | wgpu::DeviceLostReason::Dropped => {
                LossReason::Destroyed
            }
            _ => LossReason::Unexpected,
        }
    }
}

/// Out-of-band notification delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device is gone; no further work can be submitted to it.
    Lost {
        /// Whether the loss was intentional.
        reason: LossReason,
        /// Driver-provided message.
        message: String,
    },
}

/// A wgpu device and queue, plus the channel its loss notifications arrive on.
///
/// Each context is created explicitly by its owner; nothing is cached
/// process-wide.
pub struct GpuContext {
    /// The wgpu device for creating resources and pipelines.
    pub device: Device,
    /// The command queue for submitting work.
    pub queue: Queue,
    adapter_info: AdapterInfo,
    limits: Limits,
    events: Receiver<DeviceEvent>,
    lost: Option<String>,
}

impl GpuContext {
    /// Acquire a high-performance adapter and open a device on it.
    pub async fn init() -> Result<Self, GpuError> {
        let instance = Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            "Selected GPU adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("trihit device"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let (tx, events) = mpsc::channel();
        device.set_device_lost_callback(move |reason, message| {
            let reason = LossReason::from(reason);
            match reason {
                LossReason::Destroyed => debug!("GPU device released: {message}"),
                LossReason::Unexpected => error!("GPU device was lost: {message}"),
            }
            // The receiver is gone once the context is dropped.
            let _ = tx.send(DeviceEvent::Lost { reason, message });
        });

        let limits = device.limits();

        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
            events,
            lost: None,
        })
    }

    /// Like [`GpuContext::init`], but reports a missing adapter as `Ok(None)`.
    ///
    /// A missing adapter means the environment cannot run kernels at all,
    /// which callers handle differently from a failing device.
    pub async fn probe() -> Result<Option<Self>, GpuError> {
        match Self::init().await {
            Ok(ctx) => Ok(Some(ctx)),
            Err(GpuError::NoAdapter) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Initialize the GPU context synchronously (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn init_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::init())
    }

    /// Probe for a GPU context synchronously (native only).
    #[cfg(not(target_arch = "wasm32"))]
    pub fn probe_blocking() -> Result<Option<Self>, GpuError> {
        pollster::block_on(Self::probe())
    }

    /// Information about the adapter the device was opened on.
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    /// Limits of the opened device.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Take the next pending device event, if any.
    ///
    /// A loss event is also remembered, so [`GpuContext::ensure_alive`] keeps
    /// failing after the event has been consumed here.
    pub fn next_event(&mut self) -> Option<DeviceEvent> {
        let event = self.events.try_recv().ok()?;
        let DeviceEvent::Lost { message, .. } = &event;
        self.lost.get_or_insert_with(|| message.clone());
        Some(event)
    }

    /// Fail with [`GpuError::DeviceLost`] if the device has been lost.
    pub fn ensure_alive(&mut self) -> Result<(), GpuError> {
        while self.next_event().is_some() {}
        match &self.lost {
            Some(message) => Err(GpuError::DeviceLost(message.clone())),
            None => Ok(()),
        }
    }

    /// Destroy the device on purpose.
    ///
    /// The resulting loss event carries [`LossReason::Destroyed`].
    pub fn destroy(&mut self) {
        self.device.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_reason_mapping() {
        assert_eq!(
            LossReason::from(wgpu::DeviceLostReason::Destroyed),
            LossReason::Destroyed
        );
        assert_eq!(
            LossReason::from(wgpu::DeviceLostReason::Dropped),
            LossReason::Destroyed
        );
        assert_eq!(
            LossReason::from(wgpu::DeviceLostReason::Unknown),
            LossReason::Unexpected
        );
    }

    #[test]
    fn test_error_messages() {
        let err = GpuError::EmptyBuffer {
            binding: 2,
            label: "results".into(),
        };
        assert_eq!(err.to_string(), "buffer \"results\" at binding 2 is empty");
        let err = GpuError::BufferTooLarge {
            label: "rays".into(),
            bytes: 24,
            limit: 16,
        };
        assert_eq!(
            err.to_string(),
            "buffer \"rays\" is 24 bytes, above the binding limit of 16"
        );
        assert!(GpuError::Timeout(Duration::from_secs(3))
            .to_string()
            .contains("3s"));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_gpu_init() {
        let ctx = GpuContext::init_blocking();
        assert!(ctx.is_ok() || matches!(ctx, Err(GpuError::NoAdapter)));
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_destroy_reports_intentional_loss() {
        let Some(mut ctx) = GpuContext::probe_blocking().unwrap() else {
            return;
        };
        ctx.destroy();
        ctx.device.poll(wgpu::Maintain::Wait);
        match ctx.next_event() {
            Some(DeviceEvent::Lost { reason, .. }) => assert_eq!(reason, LossReason::Destroyed),
            None => panic!("expected a loss event after destroy"),
        }
        assert!(matches!(ctx.ensure_alive(), Err(GpuError::DeviceLost(_))));
    }
}

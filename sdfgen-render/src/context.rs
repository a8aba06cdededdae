//! GPU context: owns the `wgpu::Device`, `Queue` and `Adapter`.
//!
//! Two construction paths:
//!
//! 1. **Headless** (`GpuContext::new_headless`): requests its own
//!    adapter and device. Used by tests, benchmarks and the generator's
//!    `headless()` constructor.
//!
//! 2. **Borrowed device** (`GpuContext::from_parts`): wraps a device the
//!    host application already owns.
//!
//! Each context gets a fresh [`ContextId`] and registers a device-lost
//! listener exactly once, at construction.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;
use wgpu::{
    Adapter, Device, DeviceDescriptor, Instance, InstanceDescriptor, Limits, Queue,
    RequestAdapterOptions, TextureFormat, TextureFormatFeatureFlags, TextureUsages,
};

use crate::error::GpuError;

/// Identity of one device instance. Session caches and surfaces are
/// tied to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device state shared by the session and every surface created on it.
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    pub adapter: Adapter,
    id: ContextId,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Create a headless context (no window, no surface).
    pub async fn new_headless() -> Result<Self, GpuError> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("sdfgen-headless"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        Ok(Self::from_parts(adapter, device, queue))
    }

    /// Wrap an existing device.
    pub fn from_parts(adapter: Adapter, device: Device, queue: Queue) -> Self {
        let id = ContextId::new();
        let lost = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::warn!("GPU context {id} lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });
        // Errors are collected through error scopes; anything escaping
        // them must not abort the process.
        device.on_uncaptured_error(Box::new(move |err| {
            log::error!("Uncaptured wgpu error on context {id}: {err}");
        }));

        log::debug!("Created GPU context {id} on {:?}", adapter.get_info().name);
        Self {
            device,
            queue,
            adapter,
            id,
            lost,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Whether the device-lost listener has fired.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Destroy the device, as a driver reset would.
    pub fn lose_context(&self) {
        self.device.destroy();
        self.lost.store(true, Ordering::SeqCst);
    }

    pub fn limits(&self) -> Limits {
        self.device.limits()
    }

    /// Whether `format` supports all of `usages` and `flags` on this adapter.
    pub fn supports_format(
        &self,
        format: TextureFormat,
        usages: TextureUsages,
        flags: TextureFormatFeatureFlags,
    ) -> bool {
        let features = self.adapter.get_texture_format_features(format);
        features.allowed_usages.contains(usages) && features.flags.contains(flags)
    }
}

// ===================================================================
// Tests
// ===================================================================

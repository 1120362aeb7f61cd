//! Explicit execution context threaded through every explanation call.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::mode::ExecutionMode;

/// Which kind of device the caller would like computations to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DevicePreference {
    /// Always run on the backend's default (CPU) device.
    #[default]
    Cpu,
    /// Prefer an accelerator, fall back to the default device if none exists.
    Accelerator,
}

/// Device and mode for a sequence of forward/backward passes.
///
/// Replaces ambient "current device" and per-model train/eval toggles: the
/// context is passed by reference into every explanation routine.
#[derive(Debug, Clone)]
pub struct ExecutionContext<B: Backend> {
    device: B::Device,
    mode: ExecutionMode,
}

impl<B: Backend> ExecutionContext<B> {
    /// Create a context on `device` with the given mode.
    pub fn new(device: B::Device, mode: ExecutionMode) -> Self {
        Self { device, mode }
    }

    /// Create an inference-mode context on `device`.
    pub fn inference(device: B::Device) -> Self {
        Self::new(device, ExecutionMode::Inference)
    }

    /// Resolve a [`DevicePreference`] against the accelerator actually found.
    ///
    /// A missing accelerator is not an error: the context degrades to the
    /// backend's default device and logs a warning.
    pub fn resolve(preference: DevicePreference, accelerator: Option<B::Device>) -> Self {
        let device = match (preference, accelerator) {
            (DevicePreference::Accelerator, Some(device)) => device,
            (DevicePreference::Accelerator, None) => {
                tracing::warn!(
                    "Accelerator requested but unavailable; falling back to the default device"
                );
                B::Device::default()
            }
            (DevicePreference::Cpu, _) => B::Device::default(),
        };
        tracing::debug!("Execution device: {:?}", device);
        Self::inference(device)
    }

    /// Get the device.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Get the execution mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Return a copy of this context with a different mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

impl<B: Backend> Default for ExecutionContext<B> {
    fn default() -> Self {
        Self::inference(B::Device::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_default_context_is_inference() {
        let ctx = ExecutionContext::<NdArray>::default();
        assert!(ctx.mode().is_inference());
        assert_eq!(*ctx.device(), NdArrayDevice::Cpu);
    }

    #[test]
    fn test_resolve_falls_back_without_accelerator() {
        let ctx = ExecutionContext::<NdArray>::resolve(DevicePreference::Accelerator, None);
        assert_eq!(*ctx.device(), NdArrayDevice::Cpu);
        assert!(ctx.mode().is_inference());
    }

    #[test]
    fn test_resolve_uses_accelerator_when_present() {
        let ctx = ExecutionContext::<NdArray>::resolve(
            DevicePreference::Accelerator,
            Some(NdArrayDevice::Cpu),
        );
        assert_eq!(*ctx.device(), NdArrayDevice::Cpu);
    }

    #[test]
    fn test_with_mode() {
        let ctx = ExecutionContext::<NdArray>::default().with_mode(ExecutionMode::Training);
        assert!(ctx.mode().is_training());
    }
}

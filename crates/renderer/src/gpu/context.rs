use tracing::{debug, error, info};

use crate::error::{AllocationError, GpuInitError, RuntimeGpuError};

use super::tracking::ObjectLedger;

/// Human-readable description of the adapter, printed once at startup.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
    pub driver: String,
    pub driver_info: String,
}

impl AdapterProfile {
    fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
            driver: info.driver.clone(),
            driver_info: info.driver_info.clone(),
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }

    /// Prints the vendor/renderer/version block operators expect at startup.
    pub fn log(&self) {
        info!("GPU vendor   : {:#06x}", self.vendor);
        info!("GPU renderer : {} ({:?})", self.name, self.device_type);
        info!("GPU driver   : {} {}", self.driver, self.driver_info);
        info!("GPU backend  : {:?}", self.backend);
    }
}

/// Device, queue and adapter facts shared by every pass.
pub struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    adapter_profile: AdapterProfile,
    max_texture_dimension: u32,
    filterable_float: bool,
    ledger: ObjectLedger,
}

impl GpuContext {
    /// Opens a device with no presentation surface, for tests and headless runs.
    pub fn headless() -> Result<Self, GpuInitError> {
        Self::from_instance(create_instance(), None)
    }

    pub(crate) fn from_instance(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuInitError> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        }))
        .map_err(|_| GpuInitError::NoAdapter)?;

        let adapter_profile = AdapterProfile::from_wgpu(&adapter.get_info());
        let limits = adapter.limits();
        debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            is_software = adapter_profile.is_software(),
            "selected GPU adapter"
        );

        // RGBA32F can only be sampled with a linear filter when the adapter says so.
        let filterable_float = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let mut required_features = wgpu::Features::empty();
        if filterable_float {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("aoquad device"),
            required_features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;
        // Errors raised outside an error scope are logged; wgpu's default handler panics.
        device.on_uncaptured_error(Box::new(|err| {
            error!("uncaptured GPU error: {err}");
        }));

        Ok(Self {
            _instance: instance,
            device,
            queue,
            adapter,
            adapter_profile,
            max_texture_dimension: limits.max_texture_dimension_2d,
            filterable_float,
            ledger: ObjectLedger::default(),
        })
    }

    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.adapter_profile
    }

    pub(crate) fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn ledger(&self) -> &ObjectLedger {
        &self.ledger
    }

    pub(crate) fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// Whether RGBA32F textures may be sampled with linear filtering.
    pub fn filterable_float(&self) -> bool {
        self.filterable_float
    }

    /// Runs `f` inside validation and out-of-memory error scopes.
    ///
    /// Returns the closure's value together with the first device error
    /// raised while it ran, so callers can turn wgpu's asynchronous error
    /// reporting into a `Result` at the call site.
    pub(crate) fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(out_of_memory))
    }

    /// Runs `f` in an error scope, reporting a device error as a failed `operation`.
    pub(crate) fn checked<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, RuntimeGpuError> {
        match self.scoped(f) {
            (value, None) => Ok(value),
            (_, Some(error)) => Err(RuntimeGpuError::Operation {
                operation,
                diagnostic: error.to_string(),
            }),
        }
    }

    /// Runs `f` in an error scope, reporting a device error as a rejected allocation.
    pub(crate) fn allocate<T>(
        &self,
        resource: &'static str,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, AllocationError> {
        match self.scoped(f) {
            (value, None) => Ok(value),
            (_, Some(error)) => Err(AllocationError::Rejected {
                resource,
                diagnostic: error.to_string(),
            }),
        }
    }

    /// Fails with [`AllocationError::InvalidSize`] unless both sides fit a 2D texture.
    pub(crate) fn check_extent(&self, width: u32, height: u32) -> Result<(), AllocationError> {
        let limit = self.max_texture_dimension();
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(AllocationError::InvalidSize {
                width,
                height,
                limit,
            });
        }
        Ok(())
    }
}

pub(crate) fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

/// Opens a headless context for GPU tests, or `None` when the machine has no adapter.
#[cfg(test)]
pub(crate) fn test_context() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(context) => Some(context),
        Err(GpuInitError::NoAdapter) => {
            eprintln!("Skipping GPU test: no adapter available");
            None
        }
        Err(err) => panic!("failed to create GPU context: {err}"),
    }
}

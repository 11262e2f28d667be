//! Manager registry keyed by device name.
//!
//! A [`HwMgrRegistry`] holds at most one [`IspHwMgr`] per device name. The
//! process-wide instance behind [`init`], [`deinit`] and [`get`] serves
//! the session layer; tests build their own registries so several managers
//! can coexist.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::config::IspHwMgrConfig;
use crate::error::{IspError, IspResult};
use crate::hw::IspHwLineOps;
use crate::manager::IspHwMgr;

/// Memory-management domain handle of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IommuHandle(pub i32);

/// What the platform knows about one named device.
pub struct PlatformDevice {
    pub lines: Vec<Arc<dyn IspHwLineOps>>,
    pub iommu: IommuHandle,
}

/// Platform binding collaborator: finds a device's hardware lines.
pub trait IspPlatform {
    /// Returns the device named `device_name`, or `None` if it is absent.
    fn probe(&self, device_name: &str) -> Option<PlatformDevice>;
}

/// Registry of live managers.
pub struct HwMgrRegistry {
    managers: Mutex<BTreeMap<String, Arc<IspHwMgr>>>,
}

impl HwMgrRegistry {
    pub const fn new() -> Self {
        Self {
            managers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Binds a manager to `device_name`.
    ///
    /// # Errors
    ///
    /// - [`IspError::AlreadyInitialized`] if the name is already bound.
    /// - [`IspError::InitFailed`] if the platform has no such device.
    pub fn init(
        &self,
        device_name: &str,
        platform: &dyn IspPlatform,
        config: IspHwMgrConfig,
    ) -> IspResult<(Arc<IspHwMgr>, IommuHandle)> {
        let mut managers = self.managers.lock();
        if managers.contains_key(device_name) {
            return Err(IspError::AlreadyInitialized);
        }

        let Some(device) = platform.probe(device_name) else {
            warn!("device {} not present", device_name);
            return Err(IspError::InitFailed);
        };
        let iommu = device.iommu;
        let mgr = Arc::new(IspHwMgr::new(device_name, device.lines, iommu, config));
        managers.insert(String::from(device_name), mgr.clone());
        info!("{}: initialized, iommu handle {}", device_name, iommu.0);
        Ok((mgr, iommu))
    }

    /// Tears down the manager bound to `device_name`. Contexts still
    /// acquired are force-released. Unknown names are ignored.
    pub fn deinit(&self, device_name: &str) {
        let Some(mgr) = self.managers.lock().remove(device_name) else {
            debug!("deinit of unknown device {}", device_name);
            return;
        };
        let leftover = mgr.release_all();
        if leftover > 0 {
            warn!("{}: deinit with {} contexts still acquired, released", device_name, leftover);
        }
        info!("{}: deinitialized", device_name);
    }

    pub fn get(&self, device_name: &str) -> Option<Arc<IspHwMgr>> {
        self.managers.lock().get(device_name).cloned()
    }

    /// Names of the bound devices.
    pub fn devices(&self) -> Vec<String> {
        self.managers.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}

impl Default for HwMgrRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: HwMgrRegistry = HwMgrRegistry::new();

/// Binds a manager to `device_name` in the process-wide registry.
///
/// Returns the manager handle and the device's IOMMU handle.
pub fn init(
    device_name: &str,
    platform: &dyn IspPlatform,
    config: IspHwMgrConfig,
) -> IspResult<(Arc<IspHwMgr>, IommuHandle)> {
    GLOBAL_REGISTRY.init(device_name, platform, config)
}

/// Tears down the manager bound to `device_name`. Always succeeds.
pub fn deinit(device_name: &str) {
    GLOBAL_REGISTRY.deinit(device_name)
}

/// Manager bound to `device_name`, if any.
pub fn get(device_name: &str) -> Option<Arc<IspHwMgr>> {
    GLOBAL_REGISTRY.get(device_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl IspPlatform for Empty {
        fn probe(&self, device_name: &str) -> Option<PlatformDevice> {
            (device_name == "cam-isp").then(|| PlatformDevice {
                lines: Vec::new(),
                iommu: IommuHandle(7),
            })
        }
    }

    #[test]
    fn test_registry_init_and_deinit() {
        let registry = HwMgrRegistry::new();
        let (mgr, iommu) = registry
            .init("cam-isp", &Empty, IspHwMgrConfig::default())
            .unwrap();
        assert_eq!(iommu, IommuHandle(7));
        assert_eq!(mgr.name(), "cam-isp");
        assert!(registry.get("cam-isp").is_some());

        assert_eq!(
            registry
                .init("cam-isp", &Empty, IspHwMgrConfig::default())
                .unwrap_err(),
            IspError::AlreadyInitialized
        );

        registry.deinit("cam-isp");
        assert!(registry.is_empty());
        registry.deinit("cam-isp");
    }

    #[test]
    fn test_registry_missing_device() {
        let registry = HwMgrRegistry::new();
        assert_eq!(
            registry
                .init("cam-tfe", &Empty, IspHwMgrConfig::default())
                .unwrap_err(),
            IspError::InitFailed
        );
        assert!(registry.devices().is_empty());
    }
}

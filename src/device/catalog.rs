//! Device discovery and per-position caching

use crate::errors::CameraError;
use crate::platform::CaptureBackend;
use crate::types::{CameraPosition, DeviceDescriptor, DeviceKind};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Back camera preference, composites first
pub const BACK_PRIORITY: [DeviceKind; 6] = [
    DeviceKind::TripleCamera,
    DeviceKind::DualWideCamera,
    DeviceKind::DualCamera,
    DeviceKind::WideAngle,
    DeviceKind::UltraWide,
    DeviceKind::Telephoto,
];

pub const FRONT_PRIORITY: [DeviceKind; 3] = [
    DeviceKind::TrueDepth,
    DeviceKind::WideAngle,
    DeviceKind::UltraWide,
];

pub fn priority(position: CameraPosition) -> &'static [DeviceKind] {
    match position {
        CameraPosition::Back => &BACK_PRIORITY,
        CameraPosition::Front => &FRONT_PRIORITY,
    }
}

/// Resolves the best device per position and remembers it until it disconnects
pub struct DeviceCatalog {
    backend: Arc<dyn CaptureBackend>,
    cache: HashMap<CameraPosition, DeviceDescriptor>,
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    /// Best connected device at `position`
    pub fn find_device(&mut self, position: CameraPosition) -> Result<DeviceDescriptor, CameraError> {
        if let Some(cached) = self.cache.get(&position) {
            if self.backend.is_connected(&cached.id) {
                return Ok(cached.clone());
            }
            log::info!("Cached {} camera {} disconnected", position.as_str(), cached.name);
            self.cache.remove(&position);
        }

        let device = self
            .backend
            .discover(position, priority(position))
            .into_iter()
            .next()
            .or_else(|| self.backend.default_device(position))
            .ok_or(CameraError::DeviceUnavailable)?;

        log::info!(
            "Selected {} camera: {} ({:?})",
            position.as_str(),
            device.name,
            device.kind
        );
        self.cache.insert(position, device.clone());
        Ok(device)
    }

    pub fn cached(&self, position: CameraPosition) -> Option<&DeviceDescriptor> {
        self.cache.get(&position)
    }

    /// Positions with at least one usable device
    pub fn available_positions(&mut self) -> BTreeSet<CameraPosition> {
        [CameraPosition::Front, CameraPosition::Back]
            .into_iter()
            .filter(|position| self.find_device(*position).is_ok())
            .collect()
    }

    pub fn invalidate(&mut self, position: CameraPosition) {
        self.cache.remove(&position);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SyntheticBackend;

    fn device(id: &str, position: CameraPosition, kind: DeviceKind) -> DeviceDescriptor {
        DeviceDescriptor::new(id, id, position, kind)
    }

    #[test]
    fn test_back_prefers_composites() {
        let backend = SyntheticBackend::new(vec![
            device("wide", CameraPosition::Back, DeviceKind::WideAngle),
            device("dual-wide", CameraPosition::Back, DeviceKind::DualWideCamera),
            device("tele", CameraPosition::Back, DeviceKind::Telephoto),
        ]);
        let mut catalog = DeviceCatalog::new(Arc::new(backend));
        assert_eq!(catalog.find_device(CameraPosition::Back).unwrap().id, "dual-wide");
    }

    #[test]
    fn test_front_prefers_true_depth() {
        let backend = SyntheticBackend::new(vec![
            device("front-wide", CameraPosition::Front, DeviceKind::WideAngle),
            device("true-depth", CameraPosition::Front, DeviceKind::TrueDepth),
        ]);
        let mut catalog = DeviceCatalog::new(Arc::new(backend));
        assert_eq!(catalog.find_device(CameraPosition::Front).unwrap().id, "true-depth");
    }

    #[test]
    fn test_front_falls_back_to_default_device() {
        // Telephoto is not in the front priority list.
        let backend = SyntheticBackend::new(vec![device(
            "odd-front",
            CameraPosition::Front,
            DeviceKind::Telephoto,
        )]);
        let mut catalog = DeviceCatalog::new(Arc::new(backend));
        assert_eq!(catalog.find_device(CameraPosition::Front).unwrap().id, "odd-front");
    }

    #[test]
    fn test_missing_position_is_unavailable() {
        let backend = SyntheticBackend::new(vec![device(
            "back",
            CameraPosition::Back,
            DeviceKind::WideAngle,
        )]);
        let mut catalog = DeviceCatalog::new(Arc::new(backend));
        assert!(matches!(
            catalog.find_device(CameraPosition::Front),
            Err(CameraError::DeviceUnavailable)
        ));
        let positions = catalog.available_positions();
        assert_eq!(positions.len(), 1);
        assert!(positions.contains(&CameraPosition::Back));
    }

    #[test]
    fn test_cache_invalidated_on_disconnect() {
        let backend = SyntheticBackend::new(vec![
            device("triple", CameraPosition::Back, DeviceKind::TripleCamera),
            device("wide", CameraPosition::Back, DeviceKind::WideAngle),
        ]);
        let inspector = backend.inspector();
        let mut catalog = DeviceCatalog::new(Arc::new(backend));

        assert_eq!(catalog.find_device(CameraPosition::Back).unwrap().id, "triple");
        assert!(catalog.cached(CameraPosition::Back).is_some());

        inspector.disconnect("triple");
        assert_eq!(catalog.find_device(CameraPosition::Back).unwrap().id, "wide");
    }
}

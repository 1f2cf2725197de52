//! Camera input topologies
//!
//! Chosen once per configuration. A single-camera session owns one switchable
//! input; a dual-camera session keeps both inputs attached and only moves the
//! active position.

use crate::device::{DualFormatChoice, FormatChoice};
use crate::platform::InputId;
use crate::types::{CameraPosition, DeviceDescriptor, Resolution, SessionTopology};

/// One device attached to the capture graph
#[derive(Debug, Clone)]
pub struct AttachedCamera {
    pub input: InputId,
    pub device: DeviceDescriptor,
}

impl AttachedCamera {
    pub fn position(&self) -> CameraPosition {
        self.device.position
    }
}

#[derive(Debug, Clone)]
pub struct SingleCameraTopology {
    pub camera: AttachedCamera,
    /// `None` when the device offers no usable format
    pub format: Option<FormatChoice>,
}

impl SingleCameraTopology {
    /// Record the camera that replaced the previous input
    pub fn replace(&mut self, camera: AttachedCamera, format: Option<FormatChoice>) -> AttachedCamera {
        self.format = format;
        std::mem::replace(&mut self.camera, camera)
    }
}

#[derive(Debug, Clone)]
pub struct DualCameraTopology {
    pub back: AttachedCamera,
    pub front: AttachedCamera,
    pub active: CameraPosition,
    pub format: Option<DualFormatChoice>,
}

impl DualCameraTopology {
    /// Flip the active position; inputs stay untouched
    pub fn switch(&mut self) -> CameraPosition {
        self.active = self.active.opposite();
        self.active
    }
}

#[derive(Debug, Clone)]
pub enum Topology {
    Single(SingleCameraTopology),
    Dual(DualCameraTopology),
}

impl Topology {
    pub fn kind(&self) -> SessionTopology {
        match self {
            Topology::Single(_) => SessionTopology::SingleCamera,
            Topology::Dual(_) => SessionTopology::DualCamera,
        }
    }

    pub fn active_position(&self) -> CameraPosition {
        match self {
            Topology::Single(single) => single.camera.position(),
            Topology::Dual(dual) => dual.active,
        }
    }

    /// Camera feeding preview, photos and recording
    pub fn active_camera(&self) -> &AttachedCamera {
        match self {
            Topology::Single(single) => &single.camera,
            Topology::Dual(dual) => match dual.active {
                CameraPosition::Back => &dual.back,
                CameraPosition::Front => &dual.front,
            },
        }
    }

    pub fn attached(&self) -> Vec<&AttachedCamera> {
        match self {
            Topology::Single(single) => vec![&single.camera],
            Topology::Dual(dual) => vec![&dual.back, &dual.front],
        }
    }

    /// Negotiated encoder size and rate, if any
    pub fn recording_format(&self) -> (Option<Resolution>, Option<f64>) {
        match self {
            Topology::Single(single) => match &single.format {
                Some(choice) => (Some(choice.resolution), Some(choice.frame_rate)),
                None => (None, None),
            },
            Topology::Dual(dual) => match &dual.format {
                Some(choice) => (Some(choice.output), Some(choice.frame_rate)),
                None => (None, None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceKind;

    fn attached(id: u64, position: CameraPosition) -> AttachedCamera {
        AttachedCamera {
            input: InputId(id),
            device: DeviceDescriptor::new(format!("cam-{}", id), "cam", position, DeviceKind::WideAngle),
        }
    }

    #[test]
    fn test_dual_switch_only_moves_active() {
        let mut topology = Topology::Dual(DualCameraTopology {
            back: attached(1, CameraPosition::Back),
            front: attached(2, CameraPosition::Front),
            active: CameraPosition::Back,
            format: None,
        });
        let before: Vec<InputId> = topology.attached().iter().map(|c| c.input).collect();

        if let Topology::Dual(dual) = &mut topology {
            assert_eq!(dual.switch(), CameraPosition::Front);
        }
        assert_eq!(topology.active_camera().input, InputId(2));
        let after: Vec<InputId> = topology.attached().iter().map(|c| c.input).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_single_replace_returns_previous() {
        let mut single = SingleCameraTopology {
            camera: attached(1, CameraPosition::Back),
            format: None,
        };
        let previous = single.replace(attached(2, CameraPosition::Front), None);
        assert_eq!(previous.input, InputId(1));
        assert_eq!(single.camera.position(), CameraPosition::Front);
        assert_eq!(Topology::Single(single).recording_format(), (None, None));
    }
}

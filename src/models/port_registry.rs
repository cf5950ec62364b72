use std::{collections::HashMap, fmt::Display};

use common::physical::DeviceType;

use crate::error::HubError;

/// A physical (or virtual) connector on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub port_id: u8,
    pub device_type: DeviceType,
    pub attached: bool,

    /// Mode the hub confirmed for value notifications, if any.
    pub input_mode: Option<u8>,
}

impl Display for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(Port 0x{:02X}: {})", self.port_id, self.device_type)
    }
}

/// Tracks which device sits on which port, as reported by attach and detach
/// notifications. Only attached ports are kept.
#[derive(Debug, Default)]
pub struct PortRegistry {
    ports: HashMap<u8, Port>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device on a port, replacing whatever was there.
    pub fn attach(&mut self, port_id: u8, device_type: DeviceType) -> Port {
        let port = Port {
            port_id,
            device_type,
            attached: true,
            input_mode: None,
        };
        self.ports.insert(port_id, port);
        port
    }

    pub fn detach(&mut self, port_id: u8) -> Option<Port> {
        self.ports.remove(&port_id).map(|port| Port {
            attached: false,
            ..port
        })
    }

    /// Returns `false` when the port isn't attached.
    pub fn set_input_mode(&mut self, port_id: u8, mode: u8) -> bool {
        match self.ports.get_mut(&port_id) {
            Some(port) => {
                port.input_mode = Some(mode);
                true
            }
            None => false,
        }
    }

    /// `None` means unattached.
    pub fn resolve(&self, port_id: u8) -> Option<DeviceType> {
        self.ports.get(&port_id).map(|port| port.device_type)
    }

    pub fn get(&self, port_id: u8) -> Option<Port> {
        self.ports.get(&port_id).copied()
    }

    /// Lowest port id carrying the given device type.
    pub fn find(&self, device_type: DeviceType) -> Option<u8> {
        self.ports
            .values()
            .filter(|port| port.device_type == device_type)
            .map(|port| port.port_id)
            .min()
    }

    /// Fail fast for commands addressed to a port with nothing on it.
    pub fn require_attached(&self, port_id: u8) -> Result<DeviceType, HubError> {
        self.resolve(port_id).ok_or_else(|| {
            HubError::InvalidArgument(format!("Port 0x{:02X} is not attached.", port_id))
        })
    }

    /// All attached ports ordered by id.
    pub fn ports(&self) -> Vec<Port> {
        let mut ports: Vec<Port> = self.ports.values().copied().collect();
        ports.sort_by_key(|port| port.port_id);
        ports
    }

    pub fn clear(&mut self) {
        self.ports.clear();
    }
}

use std::{collections::HashMap, fmt::Display};

use common::physical::SensorKey;
use tokio::time::Instant;

/// Latest value reported for one key of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    pub port_id: u8,
    pub key: SensorKey,
    pub value: i32,
    pub timestamp: Instant,
}

impl Display for SensorReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(SensorReading: port=0x{:02X}, {}={})",
            self.port_id, self.key, self.value
        )
    }
}

/// Keyed store of the latest sensor readings. A new reading replaces the old
/// one for the same `(port, key)`; nothing is queued.
#[derive(Debug, Default)]
pub struct ValueStore {
    readings: HashMap<(u8, SensorKey), SensorReading>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, port_id: u8, key: SensorKey, value: i32) -> SensorReading {
        let reading = SensorReading {
            port_id,
            key,
            value,
            timestamp: Instant::now(),
        };
        self.readings.insert((port_id, key), reading);
        reading
    }

    pub fn get(&self, port_id: u8, key: SensorKey) -> Option<SensorReading> {
        self.readings.get(&(port_id, key)).copied()
    }

    /// Latest value, or `default` when the sensor hasn't reported yet.
    pub fn read(&self, port_id: u8, key: SensorKey, default: i32) -> i32 {
        self.get(port_id, key)
            .map(|reading| reading.value)
            .unwrap_or(default)
    }

    /// Forget every reading of one port, e.g. when its device changes.
    pub fn clear_port(&mut self, port_id: u8) {
        self.readings.retain(|(port, _), _| *port != port_id);
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_defaults_when_absent() {
        let store = ValueStore::new();
        assert_eq!(store.read(0x12, SensorKey::Color, -1), -1);
        assert_eq!(store.read(0x13, SensorKey::DrivingDistance, 0), 0);
        assert_eq!(store.get(0x12, SensorKey::Color), None);
    }

    #[test]
    fn test_latest_value_wins() {
        let mut store = ValueStore::new();
        store.update(0x12, SensorKey::Color, 3);
        store.update(0x12, SensorKey::Color, 9);
        assert_eq!(store.read(0x12, SensorKey::Color, -1), 9);

        // keys and ports are independent
        assert_eq!(store.read(0x12, SensorKey::DrivingDistance, 0), 0);
        assert_eq!(store.read(0x13, SensorKey::Color, -1), -1);
    }

    #[test]
    fn test_clear_port_keeps_other_ports() {
        let mut store = ValueStore::new();
        store.update(0x12, SensorKey::Color, 3);
        store.update(0x13, SensorKey::DrivingDistance, 40);

        store.clear_port(0x12);
        assert_eq!(store.get(0x12, SensorKey::Color), None);
        assert_eq!(store.read(0x13, SensorKey::DrivingDistance, 0), 40);
    }
}

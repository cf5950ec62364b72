use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GATT service every LWP3 hub advertises.
pub const LWP3_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001623_1212_efde_1623_785feabcd123);

/// The single characteristic used for both commands and notifications.
pub const LWP3_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00001624_1212_efde_1623_785feabcd123);

/// Bluetooth SIG company identifier of LEGO.
pub const LEGO_COMPANY_ID: u16 = 0x0397;

/// System type id advertised by the DUPLO train base.
pub const DUPLO_TRAIN_SYSTEM_TYPE: u8 = 0x20;

const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MIN_SEND_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_NOTIFICATION_DELTA: u32 = 1;

/// Which advertising peripherals count as our hub.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HubFilter {
    pub service: Uuid,

    /// When set, the LEGO manufacturer data must carry this system type.
    pub system_type: Option<u8>,
}

impl HubFilter {
    /// Check advertised services and manufacturer data against the filter.
    /// `manufacturer_data` is keyed by company id with the id stripped from
    /// the value, as BLE stacks report it.
    pub fn matches(&self, services: &[Uuid], manufacturer_data: &HashMap<u16, Vec<u8>>) -> bool {
        if !services.contains(&self.service) {
            return false;
        }
        match self.system_type {
            None => true,
            Some(system_type) => manufacturer_data
                .get(&LEGO_COMPANY_ID)
                // button state, then system type
                .and_then(|data| data.get(1))
                .is_some_and(|advertised| *advertised == system_type),
        }
    }
}

impl Default for HubFilter {
    fn default() -> Self {
        Self {
            service: LWP3_SERVICE_UUID,
            system_type: Some(DUPLO_TRAIN_SYSTEM_TYPE),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub filter: HubFilter,

    /// How long `connect` may scan before giving up.
    pub scan_timeout: Duration,

    /// Minimum time between two write submissions. The hub drops commands
    /// that arrive faster than its input buffer drains.
    pub min_send_interval: Duration,

    /// Change required before a sensor sends a new value.
    pub notification_delta: u32,
}

impl HubConfig {
    pub fn with_filter(mut self, filter: HubFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn with_min_send_interval(mut self, interval: Duration) -> Self {
        self.min_send_interval = interval;
        self
    }

    pub fn with_notification_delta(mut self, delta: u32) -> Self {
        self.notification_delta = delta;
        self
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            filter: HubFilter::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            min_send_interval: DEFAULT_MIN_SEND_INTERVAL,
            notification_delta: DEFAULT_NOTIFICATION_DELTA,
        }
    }
}

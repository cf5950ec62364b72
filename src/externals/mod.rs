pub mod ble;
pub mod event_logging;

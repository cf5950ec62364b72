pub mod config;
pub mod hub_event;
pub mod port_registry;
pub mod session_state;
pub mod value_store;

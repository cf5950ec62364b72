//! Driver for LEGO hubs speaking the LWP3 protocol over BLE, with a facade
//! for the DUPLO train base.

pub mod decoder;
pub mod error;
pub mod externals;
pub mod hub;
pub mod models;
pub mod session;
pub mod tasks;
pub mod train;

pub use error::HubError;
pub use hub::Hub;
pub use train::DuploTrain;

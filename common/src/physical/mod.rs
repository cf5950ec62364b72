mod color;
mod device;
mod power;
mod sensor;
mod sound;

pub use color::*;
pub use device::*;
pub use power::*;
pub use sensor::*;
pub use sound::*;

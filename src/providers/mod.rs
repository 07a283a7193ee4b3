//! Device driver implementations shipped with the crate

pub mod simulated;

pub use simulated::{SimulatedBehavior, SimulatedDevice, SimulatedDriver};

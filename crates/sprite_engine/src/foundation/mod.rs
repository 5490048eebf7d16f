//! Foundation utilities: logging and math types

pub mod logging;
pub mod math;

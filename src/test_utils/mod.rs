//! Components shared by the unit tests.
mod common;
mod scripted_driver;

pub use common::*;
pub use scripted_driver::*;

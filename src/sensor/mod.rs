//! I2C sensor drivers.
//!
//! Both drivers own the bus handle they are given, so they work equally with
//! a dedicated bus (as on the reference board, one bus per sensor) or with a
//! shared-bus device wrapper.

pub mod aht10;
pub mod bh1750;

pub use aht10::{Aht10, Climate};
pub use bh1750::{Bh1750, LightMode};

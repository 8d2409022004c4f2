//! Device drivers.

pub mod ps2_keyboard;

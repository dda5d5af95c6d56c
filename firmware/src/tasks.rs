//! タスクモジュール

pub mod control;
pub mod usb;

pub use control::control_task;
pub use usb::usb_task;

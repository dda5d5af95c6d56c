//! # wall-driver
//!
//! Closed-loop torque/position control for a single "wall" actuator, driven from a magnetic
//! rotary encoder and a current-sense input, and inspected over USB vendor requests.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`encoder`] | AS5048A-class SPI framing, parity and register reads |
//! | [`sensing`] | Current-sense ADC word to torque estimate |
//! | [`control`] | Wall control law and two-channel PWM actuator |
//! | [`usb_protocol`] | Vendor request codes and payload encoding |
//! | [`dispatcher`] | Vendor request state machine |
//! | [`device`] | Peripheral bundle the dispatcher and control loop act on |
//! | [`scheduler`] | Cooperative main-loop tick |
//! | [`config`] | Defaults and the persistent configuration record |
//! | [`hal`] | Hardware seams (analog input, PWM pair, indicator) |
//!
//! The crate is `no_std`; the `firmware/` package binds it to an STM32G431 with embassy.
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod config;
pub mod control;
pub mod device;
pub mod dispatcher;
pub mod encoder;
pub mod hal;
pub mod scheduler;
pub mod sensing;
pub mod usb_protocol;

pub use config::WallConfig;
pub use control::{Actuator, ControlLaw, PwmChannel, WallController};
pub use device::WallDevice;
pub use dispatcher::{DispatchState, Dispatcher, RequestError};
pub use encoder::{As5048a, EncoderError, EncoderRegisterAddress, RegisterValue};
pub use scheduler::{LoopStats, Scheduler, Transport};
pub use sensing::CurrentSense;
pub use usb_protocol::{SetupPacket, VendorCommand};

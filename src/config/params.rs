//! Default parameters for the wall controller and its peripherals

use crate::control::ControlLaw;

/// Wall threshold angle (14-bit encoder counts, default value)
pub const DEFAULT_WALL_THRESHOLD: u16 = 0x2000;

/// Proportional gain of the corrected law (default value)
pub const DEFAULT_PROPORTIONAL_GAIN: f32 = 1.0 / 3.0;

/// Ideal torque at or beyond the wall (30 of 42.4 rated, default value)
pub const DEFAULT_SAFETY_CEILING: f32 = crate::control::SAFE_MAX_TORQUE;

/// Control law variant (default value)
pub const DEFAULT_CONTROL_LAW: ControlLaw = ControlLaw::Corrected;

/// Reject encoder responses with bad parity (default value)
pub const DEFAULT_VERIFY_PARITY: bool = true;

/// Control period [us] (1 kHz, default value)
pub const DEFAULT_CONTROL_PERIOD_US: u32 = 1_000;

/// Largest accepted control period [us]
pub const MAX_CONTROL_PERIOD_US: u32 = 1_000_000;

/// PWM settings
pub mod pwm {
    /// PWM frequency [Hz]
    pub const FREQUENCY_HZ: u32 = 10_000;

    /// Primary channel duty at boot
    pub const INITIAL_PRIMARY_DUTY: u16 = 0x8000;

    /// Secondary channel duty at boot
    pub const INITIAL_SECONDARY_DUTY: u16 = 0;
}

/// Encoder bus settings
pub mod spi {
    /// SPI clock [Hz]
    pub const FREQUENCY_HZ: u32 = 2_000_000;
}

/// USB device identity
pub mod usb {
    pub const VENDOR_ID: u16 = 0x6666;
    pub const PRODUCT_ID: u16 = 0x0003;
    pub const MANUFACTURER: &str = "wall-driver";
    pub const PRODUCT: &str = "Wall Actuator";

    /// EP0 max packet size
    pub const MAX_PACKET_SIZE_0: u8 = 64;
}

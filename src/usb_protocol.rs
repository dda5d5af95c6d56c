// USB vendor request definitions for the wall actuator

/// Vendor request codes (`bRequest`)
pub mod request_codes {
    /// Toggle the status LED (no data stage)
    pub const TOGGLE_LED: u8 = 1;

    /// Set the primary PWM duty from `wValue`, zero the secondary (no data stage)
    pub const SET_DUTY: u8 = 2;

    /// Primary PWM channel duty register (u16, 2 bytes)
    pub const GET_DUTY: u8 = 3;

    /// Encoder angle register (u16, 2 bytes, 14-bit)
    pub const GET_ANGLE: u8 = 4;

    /// Encoder magnitude register (u16, 2 bytes, 14-bit)
    pub const GET_MAGNITUDE: u8 = 5;

    /// Arbitrary encoder register, address in `wValue` (u16, 2 bytes, 14-bit)
    pub const GET_ENCODER: u8 = 6;

    /// Torque estimate (f32, 4 bytes)
    pub const GET_TORQUE: u8 = 7;

    /// Wall threshold (u16, 2 bytes)
    pub const GET_THRESHOLD: u8 = 8;

    /// Set the wall threshold from `wValue` (no data stage)
    pub const SET_THRESHOLD: u8 = 9;

    /// Persist the live configuration (no data stage)
    pub const SAVE_CONFIG: u8 = 10;
}

/// Request-error flag raised for unsupported or failed requests.
pub const REQUEST_ERROR: u8 = 0x01;

/// Largest IN payload any request produces.
pub const MAX_RESPONSE_LEN: usize = 4;

/// Decoded 8-byte SETUP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Parse a SETUP packet (all multi-byte fields little-endian)
    pub fn parse(data: &[u8; 8]) -> Self {
        Self {
            request_type: data[0],
            request: data[1],
            value: u16::from_le_bytes([data[2], data[3]]),
            index: u16::from_le_bytes([data[4], data[5]]),
            length: u16::from_le_bytes([data[6], data[7]]),
        }
    }

    /// Direction bit of `bmRequestType`: true for device-to-host.
    #[inline]
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    /// Type field of `bmRequestType` equals vendor (2).
    #[inline]
    pub fn is_vendor(&self) -> bool {
        (self.request_type >> 5) & 0x03 == 0x02
    }
}

/// A recognized vendor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VendorCommand {
    ToggleIndicator,
    SetDuty(u16),
    GetDuty,
    GetAngle,
    GetMagnitude,
    GetEncoder(u16),
    GetTorque,
    GetThreshold,
    SetThreshold(u16),
    SaveConfig,
}

impl VendorCommand {
    /// Decode a request code and its `wValue`
    ///
    /// # Returns
    /// * `Some(command)` for a known code
    /// * `None` otherwise
    pub fn decode(request: u8, value: u16) -> Option<Self> {
        use request_codes::*;
        let command = match request {
            TOGGLE_LED => Self::ToggleIndicator,
            SET_DUTY => Self::SetDuty(value),
            GET_DUTY => Self::GetDuty,
            GET_ANGLE => Self::GetAngle,
            GET_MAGNITUDE => Self::GetMagnitude,
            GET_ENCODER => Self::GetEncoder(value),
            GET_TORQUE => Self::GetTorque,
            GET_THRESHOLD => Self::GetThreshold,
            SET_THRESHOLD => Self::SetThreshold(value),
            SAVE_CONFIG => Self::SaveConfig,
            _ => return None,
        };
        Some(command)
    }

    /// Request code of this command
    pub fn code(&self) -> u8 {
        use request_codes::*;
        match self {
            Self::ToggleIndicator => TOGGLE_LED,
            Self::SetDuty(_) => SET_DUTY,
            Self::GetDuty => GET_DUTY,
            Self::GetAngle => GET_ANGLE,
            Self::GetMagnitude => GET_MAGNITUDE,
            Self::GetEncoder(_) => GET_ENCODER,
            Self::GetTorque => GET_TORQUE,
            Self::GetThreshold => GET_THRESHOLD,
            Self::SetThreshold(_) => SET_THRESHOLD,
            Self::SaveConfig => SAVE_CONFIG,
        }
    }

    /// Number of IN bytes the request produces
    pub fn response_len(&self) -> usize {
        match self {
            Self::GetDuty
            | Self::GetAngle
            | Self::GetMagnitude
            | Self::GetEncoder(_)
            | Self::GetThreshold => 2,
            Self::GetTorque => 4,
            Self::ToggleIndicator | Self::SetDuty(_) | Self::SetThreshold(_) | Self::SaveConfig => {
                0
            }
        }
    }
}

/// Encode a 16-bit word response
///
/// # Returns
/// * `Some(2)` on success
/// * `None` if the buffer is shorter than 2 bytes
pub fn encode_word(value: u16, buffer: &mut [u8]) -> Option<usize> {
    let out = buffer.get_mut(..2)?;
    out.copy_from_slice(&value.to_le_bytes());
    Some(2)
}

/// Encode an f32 response
///
/// # Returns
/// * `Some(4)` on success
/// * `None` if the buffer is shorter than 4 bytes
pub fn encode_f32(value: f32, buffer: &mut [u8]) -> Option<usize> {
    let out = buffer.get_mut(..4)?;
    out.copy_from_slice(&value.to_le_bytes());
    Some(4)
}

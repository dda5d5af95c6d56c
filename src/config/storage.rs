//! Persistent configuration record
//!
//! Fixed 32-byte little-endian layout, written to the last flash page by the firmware:
//!
//! | Offset | Size | Field |
//! | ------ | ---- | ----- |
//! | 0  | 4 | magic `"WAL1"` |
//! | 4  | 2 | version |
//! | 6  | 2 | wall threshold |
//! | 8  | 4 | proportional gain (f32) |
//! | 12 | 4 | safety ceiling (f32) |
//! | 16 | 4 | control period [us] |
//! | 20 | 1 | control law tag |
//! | 21 | 1 | verify parity (0/1) |
//! | 22 | 2 | reserved (0) |
//! | 24 | 4 | CRC-32 of bytes 0..24 |
//! | 28 | 4 | padding to a flash double-word |

use super::params;
use crate::control::ControlLaw;
use crate::encoder::ADDRESS_MASK;

/// Magic number of the record ("WAL1" in ASCII)
pub const CONFIG_MAGIC: u32 = 0x314C_4157;

/// Current record version
pub const CONFIG_VERSION: u16 = 1;

/// Encoded size, a multiple of the 8-byte flash programming unit.
pub const RECORD_SIZE: usize = 32;

/// Bytes covered by the checksum.
const CRC_SPAN: usize = 24;
const CRC_OFFSET: usize = 24;

/// CRC-32 engine fed with little-endian words (hardware CRC unit on target).
pub trait Crc32 {
    fn checksum(&mut self, words: &[u32]) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Magic number mismatch (blank or foreign page)
    InvalidMagic,
    /// Unknown record version
    VersionMismatch,
    /// Checksum mismatch
    CrcMismatch,
    /// A field holds a value outside its domain
    InvalidField,
    /// Buffer shorter than a record
    InvalidSize,
}

/// Runtime tunables of the wall controller.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WallConfig {
    /// Encoder angle at which the wall engages
    pub wall_threshold: u16,
    /// Proportional gain (Corrected law)
    pub proportional_gain: f32,
    /// Ideal torque beyond the wall
    pub safety_ceiling: f32,
    pub control_law: ControlLaw,
    /// Reject encoder frames with bad parity
    pub verify_parity: bool,
    /// Control loop period [us]
    pub control_period_us: u32,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            wall_threshold: params::DEFAULT_WALL_THRESHOLD,
            proportional_gain: params::DEFAULT_PROPORTIONAL_GAIN,
            safety_ceiling: params::DEFAULT_SAFETY_CEILING,
            control_law: params::DEFAULT_CONTROL_LAW,
            verify_parity: params::DEFAULT_VERIFY_PARITY,
            control_period_us: params::DEFAULT_CONTROL_PERIOD_US,
        }
    }
}

impl WallConfig {
    /// Serialize into a flash record
    ///
    /// # Arguments
    /// * `crc` - CRC-32 engine
    pub fn encode(&self, crc: &mut impl Crc32) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[0..4].copy_from_slice(&CONFIG_MAGIC.to_le_bytes());
        record[4..6].copy_from_slice(&CONFIG_VERSION.to_le_bytes());
        record[6..8].copy_from_slice(&self.wall_threshold.to_le_bytes());
        record[8..12].copy_from_slice(&self.proportional_gain.to_le_bytes());
        record[12..16].copy_from_slice(&self.safety_ceiling.to_le_bytes());
        record[16..20].copy_from_slice(&self.control_period_us.to_le_bytes());
        record[20] = self.control_law.to_u8();
        record[21] = self.verify_parity as u8;

        let checksum = record_crc(&record, crc);
        record[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&checksum.to_le_bytes());
        record
    }

    /// Parse and validate a flash record
    ///
    /// # Returns
    /// * `Ok(WallConfig)` if header, checksum and every field are valid
    /// * `Err(ConfigError)` otherwise
    pub fn decode(bytes: &[u8], crc: &mut impl Crc32) -> Result<Self, ConfigError> {
        let record: &[u8; RECORD_SIZE] = bytes
            .get(..RECORD_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(ConfigError::InvalidSize)?;

        let magic = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        if magic != CONFIG_MAGIC {
            return Err(ConfigError::InvalidMagic);
        }
        let version = u16::from_le_bytes([record[4], record[5]]);
        if version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch);
        }
        let stored = u32::from_le_bytes([
            record[CRC_OFFSET],
            record[CRC_OFFSET + 1],
            record[CRC_OFFSET + 2],
            record[CRC_OFFSET + 3],
        ]);
        if record_crc(record, crc) != stored {
            return Err(ConfigError::CrcMismatch);
        }

        let wall_threshold = u16::from_le_bytes([record[6], record[7]]);
        let proportional_gain = f32::from_le_bytes([record[8], record[9], record[10], record[11]]);
        let safety_ceiling = f32::from_le_bytes([record[12], record[13], record[14], record[15]]);
        let control_period_us =
            u32::from_le_bytes([record[16], record[17], record[18], record[19]]);
        let control_law = ControlLaw::from_u8(record[20]).ok_or(ConfigError::InvalidField)?;
        let verify_parity = match record[21] {
            0 => false,
            1 => true,
            _ => return Err(ConfigError::InvalidField),
        };

        let config = Self {
            wall_threshold,
            proportional_gain,
            safety_ceiling,
            control_law,
            verify_parity,
            control_period_us,
        };
        if !config.is_valid() {
            return Err(ConfigError::InvalidField);
        }
        Ok(config)
    }

    /// Field domain check
    pub fn is_valid(&self) -> bool {
        self.wall_threshold <= ADDRESS_MASK
            && self.proportional_gain.is_finite()
            && self.proportional_gain >= 0.0
            && self.safety_ceiling.is_finite()
            && (0.0..=crate::control::RATED_MAX_TORQUE).contains(&self.safety_ceiling)
            && self.control_period_us > 0
            && self.control_period_us <= params::MAX_CONTROL_PERIOD_US
    }
}

fn record_crc(record: &[u8; RECORD_SIZE], crc: &mut impl Crc32) -> u32 {
    let mut words = [0u32; CRC_SPAN / 4];
    for (word, chunk) in words.iter_mut().zip(record[..CRC_SPAN].chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    crc.checksum(&words)
}

//! AS5048A magnetic angle sensor over SPI
//!
//! Frames are 16 bits, MSB first, SPI mode 1.
//!
//! Command frame: `PAR | R/W | ADDR[13:0]` with R/W = 1 for a read.
//! Response frame: `PAR | EF | DATA[13:0]`.
//!
//! PAR makes the number of set bits in the whole frame even. A read is two transactions:
//! the command, then a dummy frame during which the sensor shifts out the requested register.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{Error as _, ErrorKind, SpiBus};

/// Read flag in a command frame.
pub const READ_FLAG: u16 = 0x4000;

/// Parity bit position (bit 15).
pub const PARITY_SHIFT: u16 = 15;

/// Address / data field.
pub const ADDRESS_MASK: u16 = 0x3FFF;

/// Mask applied to the low response byte to drop everything above the payload.
pub const SENSOR_MASK: u8 = 0x3F;

/// Error flag in a response frame.
pub const ERROR_FLAG: u16 = 0x4000;

/// 14-bit register address on the angle sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderRegisterAddress(u16);

impl EncoderRegisterAddress {
    pub const NOP: Self = Self(0x0000);
    pub const CLEAR_ERROR_FLAG: Self = Self(0x0001);
    /// Diagnostics + automatic gain control.
    pub const DIAGNOSTICS: Self = Self(0x3FFD);
    pub const MAGNITUDE: Self = Self(0x3FFE);
    pub const ANGLE: Self = Self(0x3FFF);

    /// Build an address; bits above the 14-bit field are discarded so they can never
    /// collide with the read flag or parity bit.
    pub const fn new(raw: u16) -> Self {
        Self(raw & ADDRESS_MASK)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl From<u16> for EncoderRegisterAddress {
    fn from(raw: u16) -> Self {
        Self::new(raw)
    }
}

/// Even parity of the low 15 bits: 1 when they hold an odd number of ones.
#[inline]
pub const fn even_parity(word: u16) -> u16 {
    ((word & 0x7FFF).count_ones() & 1) as u16
}

/// Build the read command frame for `address`.
pub const fn encode_command(address: EncoderRegisterAddress) -> u16 {
    let cmd = READ_FLAG | address.raw();
    cmd | (even_parity(cmd) << PARITY_SHIFT)
}

/// Payload of a read, as clocked in from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterValue {
    frame: u16,
}

impl RegisterValue {
    /// Wrap the two response bytes (first byte received is the MSB).
    pub const fn from_bytes(msb: u8, lsb: u8) -> Self {
        Self {
            frame: u16::from_be_bytes([msb, lsb]),
        }
    }

    /// Raw 16-bit response frame, status bits included.
    #[inline]
    pub const fn frame(&self) -> u16 {
        self.frame
    }

    /// True when the frame has an even number of set bits.
    #[inline]
    pub const fn parity_ok(&self) -> bool {
        self.frame.count_ones() % 2 == 0
    }

    /// Sensor-side error flag (framing/command/parity error latched in the sensor).
    #[inline]
    pub const fn error_flag(&self) -> bool {
        self.frame & ERROR_FLAG != 0
    }

    /// 14-bit register contents.
    ///
    /// The low byte goes through [`SENSOR_MASK`] and the result is confined to the data field.
    #[inline]
    pub const fn data(&self) -> u16 {
        let [msb, lsb] = self.frame.to_be_bytes();
        (((msb as u16) << 8) | (lsb & SENSOR_MASK) as u16) & ADDRESS_MASK
    }
}

/// Diagnostics + AGC register (0x3FFD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    /// Magnetic field too weak.
    pub comp_high: bool,
    /// Magnetic field too strong.
    pub comp_low: bool,
    /// CORDIC overflow, angle and magnitude invalid.
    pub cordic_overflow: bool,
    /// Offset compensation finished.
    pub offset_compensated: bool,
    /// Automatic gain control value (0 = strong field, 255 = weak field).
    pub agc: u8,
}

impl Diagnostics {
    pub const fn from_register(data: u16) -> Self {
        Self {
            comp_high: data & 0x0800 != 0,
            comp_low: data & 0x0400 != 0,
            cordic_overflow: data & 0x0200 != 0,
            offset_compensated: data & 0x0100 != 0,
            agc: (data & 0xFF) as u8,
        }
    }

    pub fn is_okay(&self) -> bool {
        !self.comp_high && !self.comp_low && !self.cordic_overflow && self.offset_compensated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncoderError {
    /// SPI transfer failed.
    Bus(ErrorKind),
    /// Chip-select pin could not be driven.
    ChipSelect,
    /// Response frame failed the even-parity check.
    Parity { frame: u16 },
}

/// AS5048A on an exclusively owned SPI bus and active-low chip select.
pub struct As5048a<SPI, CS> {
    spi: SPI,
    cs: CS,
    verify_parity: bool,
}

impl<SPI, CS> As5048a<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// Take ownership of the bus and chip select. The chip select is driven inactive.
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        cs.set_high().ok();
        Self {
            spi,
            cs,
            verify_parity: true,
        }
    }

    /// Reject responses with bad parity (default) or accept them unchecked.
    pub fn set_verify_parity(&mut self, verify: bool) {
        self.verify_parity = verify;
    }

    #[inline]
    pub fn verify_parity(&self) -> bool {
        self.verify_parity
    }

    /// Read one register: command transaction, then a dummy transaction returning the data.
    pub fn read_register(
        &mut self,
        address: EncoderRegisterAddress,
    ) -> Result<RegisterValue, EncoderError> {
        let mut command = encode_command(address).to_be_bytes();
        self.transaction(&mut command)?;

        let mut response = [0x00u8; 2];
        self.transaction(&mut response)?;

        let value = RegisterValue::from_bytes(response[0], response[1]);
        if self.verify_parity && !value.parity_ok() {
            warn!(
                "Encoder parity error: addr=0x{:04X}, frame=0x{:04X}",
                address.raw(),
                value.frame()
            );
            return Err(EncoderError::Parity {
                frame: value.frame(),
            });
        }
        Ok(value)
    }

    /// 14-bit angle (0..=16383, one mechanical revolution).
    pub fn read_angle(&mut self) -> Result<u16, EncoderError> {
        Ok(self.read_register(EncoderRegisterAddress::ANGLE)?.data())
    }

    /// 14-bit CORDIC magnitude.
    pub fn read_magnitude(&mut self) -> Result<u16, EncoderError> {
        Ok(self.read_register(EncoderRegisterAddress::MAGNITUDE)?.data())
    }

    /// Diagnostics register. Decoded from the unmasked frame, since the AGC value occupies the
    /// whole low byte.
    pub fn read_diagnostics(&mut self) -> Result<Diagnostics, EncoderError> {
        let value = self.read_register(EncoderRegisterAddress::DIAGNOSTICS)?;
        Ok(Diagnostics::from_register(value.frame() & ADDRESS_MASK))
    }

    /// One chip-select bracketed 16-bit exchange. The chip select is released even when the
    /// transfer fails.
    fn transaction(&mut self, words: &mut [u8; 2]) -> Result<(), EncoderError> {
        self.cs.set_low().map_err(|_| EncoderError::ChipSelect)?;
        let transfer = self
            .spi
            .transfer_in_place(words)
            .and_then(|()| self.spi.flush());
        self.cs.set_high().map_err(|_| EncoderError::ChipSelect)?;
        transfer.map_err(|e| EncoderError::Bus(e.kind()))
    }
}

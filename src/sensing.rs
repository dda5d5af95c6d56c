//! Current-sense input to torque estimate

use crate::control::ControlLaw;
use crate::hal::AnalogInput;

/// Bits of the high byte that are copied into the low byte of a sample.
pub const ANALOG_MASK: u8 = 0xC0;

/// Bits of a sample kept by the corrected combine (top 10 bits).
pub const CORRECTED_MASK: u16 = 0xFFC0;

/// ADC reference voltage.
pub const VREF: f32 = 3.3;

/// Full-scale sample value.
pub const FULL_SCALE: f32 = 65535.0;

/// Sense amplifier output at zero current.
pub const ZERO_CURRENT_VOLTS: f32 = 1.6;

/// Sense amplifier gain, amps per volt away from the zero point.
pub const AMPS_PER_VOLT: f32 = 0.075;

/// Torque constant, torque units per amp.
pub const TORQUE_CONSTANT: f32 = 4.0;

/// Reduce a raw 16-bit ADC word to the value fed to the voltage conversion.
///
/// Both laws first overwrite the low byte with `hi & 0xC0`.
/// - `Literal`: the two bytes are summed (`hi + (hi & 0xC0)`), so the result is at most 447.
/// - `Corrected`: the bytes are reassembled into a word, which equals `raw & 0xFFC0`.
pub fn combine_sample(raw: u16, law: ControlLaw) -> u16 {
    let hi = (raw >> 8) as u8;
    let lo = hi & ANALOG_MASK;
    match law {
        ControlLaw::Literal => hi as u16 + lo as u16,
        ControlLaw::Corrected => raw & CORRECTED_MASK,
    }
}

/// Sample value to volts at the ADC pin.
#[inline]
pub fn volts(value: u16) -> f32 {
    value as f32 * VREF / FULL_SCALE
}

#[inline]
pub fn amps(volts: f32) -> f32 {
    (volts - ZERO_CURRENT_VOLTS) * AMPS_PER_VOLT
}

#[inline]
pub fn torque(amps: f32) -> f32 {
    TORQUE_CONSTANT * amps
}

/// Full conversion chain from a raw ADC word.
///
/// The `Literal` law keeps volts, amps and torque in integers, truncating toward zero after
/// every stage. With the byte-sum combine the volts stage is always 0, so the estimate is too.
pub fn torque_from_raw(raw: u16, law: ControlLaw) -> f32 {
    let value = combine_sample(raw, law);
    match law {
        ControlLaw::Literal => {
            let volts = volts(value) as i32;
            let amps = amps(volts as f32) as i32;
            torque(amps as f32) as i32 as f32
        }
        ControlLaw::Corrected => torque(amps(volts(value))),
    }
}

/// Current-sense channel. Stateless apart from the combine convention.
pub struct CurrentSense<A> {
    input: A,
    law: ControlLaw,
}

impl<A: AnalogInput> CurrentSense<A> {
    pub fn new(input: A, law: ControlLaw) -> Self {
        Self { input, law }
    }

    pub fn set_law(&mut self, law: ControlLaw) {
        self.law = law;
    }

    #[inline]
    pub fn law(&self) -> ControlLaw {
        self.law
    }

    /// Take one sample and convert it.
    pub fn estimate_torque(&mut self) -> f32 {
        let raw = self.input.read_raw();
        let torque = torque_from_raw(raw, self.law);
        trace!("Current sense raw=0x{:04X}, torque={}", raw, torque);
        torque
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::FixedAdc;

    #[test]
    fn test_combine_literal_adds_bytes() {
        assert_eq!(combine_sample(0xFFFF, ControlLaw::Literal), 0xFF + 0xC0);
        assert_eq!(combine_sample(0x4012, ControlLaw::Literal), 0x40 + 0x40);
        assert_eq!(combine_sample(0x3FFF, ControlLaw::Literal), 0x3F);
    }

    #[test]
    fn test_combine_corrected_keeps_top_bits() {
        assert_eq!(combine_sample(0xFFFF, ControlLaw::Corrected), 0xFFC0);
        assert_eq!(combine_sample(0x803F, ControlLaw::Corrected), 0x8000);
        assert_eq!(combine_sample(0x0000, ControlLaw::Corrected), 0);
    }

    #[test]
    fn test_full_scale_torque_bit_exact() {
        let mut sense = CurrentSense::new(FixedAdc(0xFFFF), ControlLaw::Corrected);
        let combined = 0xFFC0 as f32;
        let expected = 4.0f32 * ((combined * 3.3f32 / 65535.0f32 - 1.6f32) * 0.075f32);
        assert_eq!(sense.estimate_torque().to_bits(), expected.to_bits());
    }

    #[test]
    fn test_literal_torque_truncates_to_zero() {
        // int volts = 447 * 3.3 / 65535 = 0; int amps = (0 - 1.6) * 0.075 = 0
        for raw in [0x0000, 0x7C00, 0xC0C0, 0xFFFF] {
            let mut sense = CurrentSense::new(FixedAdc(raw), ControlLaw::Literal);
            assert_eq!(sense.estimate_torque().to_bits(), 0.0f32.to_bits());
        }
        assert!(torque_from_raw(0xFFFF, ControlLaw::Corrected) > 0.0);
    }

    #[test]
    fn test_stages() {
        assert_eq!(volts(0), 0.0);
        assert!((volts(0xFFFF) - 3.3).abs() < 1e-6);
        assert!(amps(1.6).abs() < 1e-7);
        assert!((torque(amps(3.3)) - 0.51).abs() < 1e-5);
    }

    #[test]
    fn test_estimate_is_stateless() {
        let mut sense = CurrentSense::new(FixedAdc(0x9A00), ControlLaw::Corrected);
        let first = sense.estimate_torque();
        let second = sense.estimate_torque();
        assert_eq!(first.to_bits(), second.to_bits());

        sense.inner_mut().0 = 0x0000;
        assert!(sense.estimate_torque() < first);
    }
}

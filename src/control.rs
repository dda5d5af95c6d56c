// Wall control law and the two-channel PWM actuator

use crate::hal::PwmPair;

/// "Safe" maximum torque commanded once the wall is reached.
pub const SAFE_MAX_TORQUE: f32 = 30.0;

/// Rated maximum torque of the actuator.
pub const RATED_MAX_TORQUE: f32 = 42.4;

/// Duty counts per unit of torque error: full-scale duty over rated torque.
pub const DUTY_PER_TORQUE: f32 = 65535.0 / RATED_MAX_TORQUE;

/// Integer-division gain of the legacy law.
const LITERAL_GAIN: i32 = 1 / 3;

/// Selects between the legacy arithmetic and the corrected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlLaw {
    /// Byte-sum current combine, integer gain (always 0), ideal torque only ever raised.
    Literal,
    /// Word current combine, fractional gain in duty counts, ideal torque released below the wall.
    #[default]
    Corrected,
}

impl ControlLaw {
    pub const fn to_u8(self) -> u8 {
        match self {
            ControlLaw::Literal => 0,
            ControlLaw::Corrected => 1,
        }
    }

    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ControlLaw::Literal),
            1 => Some(ControlLaw::Corrected),
            _ => None,
        }
    }
}

/// Output-compare channel currently carrying the drive signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmChannel {
    Primary,
    Secondary,
}

/// Proportional torque controller gated by the wall position.
pub struct WallController {
    law: ControlLaw,
    /// Proportional gain (Corrected law only)
    kp: f32,
    /// Ideal torque once the wall is reached
    safety_ceiling: f32,
    /// Ideal torque carried between iterations (Literal law only reads it back)
    ideal_torque: Option<f32>,
}

impl WallController {
    /// Create a new controller
    ///
    /// # Arguments
    /// * `law` - Arithmetic variant
    /// * `kp` - Proportional gain applied to the torque error (Corrected law)
    /// * `safety_ceiling` - Ideal torque at or beyond the wall threshold
    pub fn new(law: ControlLaw, kp: f32, safety_ceiling: f32) -> Self {
        Self {
            law,
            kp,
            safety_ceiling,
            ideal_torque: None,
        }
    }

    /// Compute the next duty cycle
    ///
    /// # Arguments
    /// * `position` - Encoder angle (14-bit)
    /// * `threshold` - Wall threshold angle
    /// * `torque` - Current torque estimate
    /// * `duty` - Duty currently applied on the active channel
    ///
    /// # Returns
    /// Duty to write back to the active channel
    pub fn compute_duty(&mut self, position: u16, threshold: u16, torque: f32, duty: u16) -> u16 {
        if position >= threshold {
            self.ideal_torque = Some(self.safety_ceiling);
        } else if self.law == ControlLaw::Corrected {
            self.ideal_torque = Some(0.0);
        }

        let Some(ideal) = self.ideal_torque else {
            // Literal law before the wall was ever reached
            return duty;
        };

        match self.law {
            ControlLaw::Literal => {
                let error = (ideal - torque) as i32;
                let next = duty as i32 + LITERAL_GAIN * error;
                next.clamp(0, u16::MAX as i32) as u16
            }
            ControlLaw::Corrected => {
                let step = self.kp * (ideal - torque) * DUTY_PER_TORQUE;
                let next = libm::roundf(duty as f32 + step);
                next.clamp(0.0, u16::MAX as f32) as u16
            }
        }
    }

    /// Ideal torque used by the last iteration, if any.
    #[inline]
    pub fn ideal_torque(&self) -> Option<f32> {
        self.ideal_torque
    }

    #[inline]
    pub fn law(&self) -> ControlLaw {
        self.law
    }

    /// Switch law. The carried ideal torque is dropped.
    pub fn set_law(&mut self, law: ControlLaw) {
        self.law = law;
        self.ideal_torque = None;
    }

    pub fn set_gain(&mut self, kp: f32) {
        self.kp = kp;
    }

    pub fn set_safety_ceiling(&mut self, ceiling: f32) {
        self.safety_ceiling = ceiling;
    }
}

/// Two-channel PWM output with an explicitly tracked active channel.
pub struct Actuator<P> {
    pwm: P,
    active: PwmChannel,
}

impl<P: PwmPair> Actuator<P> {
    /// Wrap the PWM pair. The active channel is the primary one unless its duty reads zero.
    pub fn new(mut pwm: P) -> Self {
        let active = if pwm.duty(PwmChannel::Primary) == 0 {
            PwmChannel::Secondary
        } else {
            PwmChannel::Primary
        };
        debug!("Actuator active channel: {}", active);
        Self { pwm, active }
    }

    #[inline]
    pub fn active(&self) -> PwmChannel {
        self.active
    }

    /// Duty of the active channel.
    pub fn duty(&mut self) -> u16 {
        self.pwm.duty(self.active)
    }

    /// Write the active channel.
    pub fn write(&mut self, duty: u16) {
        self.pwm.set_duty(self.active, duty);
    }

    /// Drive the primary channel only; the secondary is zeroed and the primary becomes active.
    pub fn set_primary(&mut self, duty: u16) {
        self.pwm.set_duty(PwmChannel::Primary, duty);
        self.pwm.set_duty(PwmChannel::Secondary, 0);
        self.active = PwmChannel::Primary;
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.pwm
    }
}

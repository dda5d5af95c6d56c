//! Wall actuator device context
//!
//! Owns every peripheral the request dispatcher and the control loop act on, plus the live
//! configuration. Both actors run on the same thread and borrow it in turn.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::config::WallConfig;
use crate::control::{Actuator, PwmChannel, WallController};
use crate::encoder::{
    As5048a, Diagnostics, EncoderError, EncoderRegisterAddress, RegisterValue, ADDRESS_MASK,
};
use crate::hal::{AnalogInput, Indicator, PwmPair};
use crate::sensing::CurrentSense;

pub struct WallDevice<SPI, CS, A, P, L> {
    encoder: As5048a<SPI, CS>,
    sense: CurrentSense<A>,
    actuator: Actuator<P>,
    indicator: L,
    controller: WallController,
    config: WallConfig,
}

impl<SPI, CS, A, P, L> WallDevice<SPI, CS, A, P, L>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    A: AnalogInput,
    P: PwmPair,
    L: Indicator,
{
    /// Assemble the device. The PWM pair must already carry its boot duties so the active
    /// channel can be detected.
    pub fn new(
        encoder: As5048a<SPI, CS>,
        analog: A,
        pwm: P,
        indicator: L,
        config: WallConfig,
    ) -> Self {
        let mut device = Self {
            encoder,
            sense: CurrentSense::new(analog, config.control_law),
            actuator: Actuator::new(pwm),
            indicator,
            controller: WallController::new(
                config.control_law,
                config.proportional_gain,
                config.safety_ceiling,
            ),
            config,
        };
        device.apply_config(config);
        device
    }

    #[inline]
    pub fn config(&self) -> &WallConfig {
        &self.config
    }

    /// Replace the live configuration and push it into every component.
    pub fn apply_config(&mut self, config: WallConfig) {
        self.encoder.set_verify_parity(config.verify_parity);
        self.sense.set_law(config.control_law);
        if self.controller.law() != config.control_law {
            self.controller.set_law(config.control_law);
        }
        self.controller.set_gain(config.proportional_gain);
        self.controller.set_safety_ceiling(config.safety_ceiling);
        self.config = config;
        info!(
            "Config applied: threshold=0x{:04X}, kp={}, ceiling={}, law={}, parity={}",
            config.wall_threshold,
            config.proportional_gain,
            config.safety_ceiling,
            config.control_law,
            config.verify_parity
        );
    }

    #[inline]
    pub fn wall_threshold(&self) -> u16 {
        self.config.wall_threshold
    }

    /// Set the wall threshold; bits above the 14-bit angle range are dropped.
    pub fn set_wall_threshold(&mut self, threshold: u16) {
        self.config.wall_threshold = threshold & ADDRESS_MASK;
    }

    pub fn toggle_indicator(&mut self) {
        self.indicator.toggle();
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    /// Duty of the active PWM channel.
    pub fn duty(&mut self) -> u16 {
        self.actuator.duty()
    }

    /// Primary channel duty register, whichever channel is active.
    pub fn primary_duty(&mut self) -> u16 {
        self.actuator.inner_mut().duty(PwmChannel::Primary)
    }

    /// Host-commanded duty: primary channel only.
    pub fn set_duty(&mut self, duty: u16) {
        self.actuator.set_primary(duty);
    }

    pub fn read_angle(&mut self) -> Result<u16, EncoderError> {
        self.encoder.read_angle()
    }

    pub fn read_magnitude(&mut self) -> Result<u16, EncoderError> {
        self.encoder.read_magnitude()
    }

    pub fn read_diagnostics(&mut self) -> Result<Diagnostics, EncoderError> {
        self.encoder.read_diagnostics()
    }

    pub fn read_register(&mut self, address: u16) -> Result<RegisterValue, EncoderError> {
        self.encoder.read_register(EncoderRegisterAddress::new(address))
    }

    pub fn estimate_torque(&mut self) -> f32 {
        self.sense.estimate_torque()
    }

    /// One pass of the wall law for a known position: estimate torque, compare against the
    /// threshold, update the active channel.
    ///
    /// # Returns
    /// Duty written to the active channel
    pub fn compute_duty(&mut self, position: u16) -> u16 {
        let torque = self.sense.estimate_torque();
        let threshold = self.config.wall_threshold;
        let duty = self.actuator.duty();
        let next = self.controller.compute_duty(position, threshold, torque, duty);
        self.actuator.write(next);
        trace!(
            "Control: pos={}, thr={}, torque={}, duty {} -> {}",
            position,
            threshold,
            torque,
            duty,
            next
        );
        next
    }

    /// Read the angle and run [`Self::compute_duty`]. The duty is untouched if the read fails.
    pub fn control_step(&mut self) -> Result<u16, EncoderError> {
        let position = self.encoder.read_angle()?;
        Ok(self.compute_duty(position))
    }

    pub fn controller(&self) -> &WallController {
        &self.controller
    }

    pub fn actuator_mut(&mut self) -> &mut Actuator<P> {
        &mut self.actuator
    }

    pub fn sense_mut(&mut self) -> &mut CurrentSense<A> {
        &mut self.sense
    }
}

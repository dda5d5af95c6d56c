//! Vendor request dispatcher
//!
//! `Idle -> Dispatching -> Responding -> Idle`. A setup event runs the request to completion
//! synchronously and leaves the response in the transport's buffer; the transport calls
//! [`Dispatcher::complete`] once it has sent it (or stalled).

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::device::WallDevice;
use crate::encoder::EncoderError;
use crate::hal::{AnalogInput, Indicator, PwmPair};
use crate::usb_protocol::{encode_f32, encode_word, VendorCommand, REQUEST_ERROR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchState {
    Idle,
    Dispatching,
    Responding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Request code not recognized
    Unsupported(u8),
    /// Encoder read failed while serving the request
    Encoder(EncoderError),
    /// Transport buffer cannot hold the response
    BufferTooSmall,
}

impl From<EncoderError> for RequestError {
    fn from(e: EncoderError) -> Self {
        RequestError::Encoder(e)
    }
}

pub struct Dispatcher {
    state: DispatchState,
    /// Sticky until taken by the transport
    error_flags: u8,
    save_requested: bool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub const fn new() -> Self {
        Self {
            state: DispatchState::Idle,
            error_flags: 0,
            save_requested: false,
        }
    }

    #[inline]
    pub fn state(&self) -> DispatchState {
        self.state
    }

    #[inline]
    pub fn error_flags(&self) -> u8 {
        self.error_flags
    }

    /// Read and clear the error flags.
    pub fn take_error_flags(&mut self) -> u8 {
        core::mem::take(&mut self.error_flags)
    }

    /// Read and clear the request-error flag. True means the transport must stall.
    pub fn take_request_error(&mut self) -> bool {
        let set = self.error_flags & REQUEST_ERROR != 0;
        self.error_flags &= !REQUEST_ERROR;
        set
    }

    /// Read and clear a pending SaveConfig request.
    pub fn take_save_request(&mut self) -> bool {
        core::mem::take(&mut self.save_requested)
    }

    /// Serve one vendor request
    ///
    /// # Arguments
    /// * `device` - Device context
    /// * `request` - `bRequest`
    /// * `value` - `wValue`
    /// * `buffer` - Transport-owned IN buffer
    ///
    /// # Returns
    /// * `Ok(len)` - number of response bytes written to `buffer`
    /// * `Err(RequestError)` - nothing written; the request-error flag is set
    pub fn dispatch<SPI, CS, A, P, L>(
        &mut self,
        device: &mut WallDevice<SPI, CS, A, P, L>,
        request: u8,
        value: u16,
        buffer: &mut [u8],
    ) -> Result<usize, RequestError>
    where
        SPI: SpiBus<u8>,
        CS: OutputPin,
        A: AnalogInput,
        P: PwmPair,
        L: Indicator,
    {
        self.state = DispatchState::Dispatching;
        let result = self.execute(device, request, value, buffer);
        if let Err(e) = result {
            warn!("Vendor request {} failed: {:?}", request, e);
            self.error_flags |= REQUEST_ERROR;
        }
        self.state = DispatchState::Responding;
        result
    }

    /// Transport finished the data/status stage.
    pub fn complete(&mut self) {
        self.state = DispatchState::Idle;
    }

    fn execute<SPI, CS, A, P, L>(
        &mut self,
        device: &mut WallDevice<SPI, CS, A, P, L>,
        request: u8,
        value: u16,
        buffer: &mut [u8],
    ) -> Result<usize, RequestError>
    where
        SPI: SpiBus<u8>,
        CS: OutputPin,
        A: AnalogInput,
        P: PwmPair,
        L: Indicator,
    {
        let command =
            VendorCommand::decode(request, value).ok_or(RequestError::Unsupported(request))?;
        if buffer.len() < command.response_len() {
            return Err(RequestError::BufferTooSmall);
        }
        debug!("Vendor request: {:?}", command);

        let word = match command {
            VendorCommand::ToggleIndicator => {
                device.toggle_indicator();
                return Ok(0);
            }
            VendorCommand::SetDuty(duty) => {
                device.set_duty(duty);
                return Ok(0);
            }
            VendorCommand::SetThreshold(threshold) => {
                device.set_wall_threshold(threshold);
                return Ok(0);
            }
            VendorCommand::SaveConfig => {
                self.save_requested = true;
                return Ok(0);
            }
            VendorCommand::GetTorque => {
                let torque = device.estimate_torque();
                return encode_f32(torque, buffer).ok_or(RequestError::BufferTooSmall);
            }
            VendorCommand::GetDuty => device.primary_duty(),
            VendorCommand::GetAngle => device.read_angle()?,
            VendorCommand::GetMagnitude => device.read_magnitude()?,
            VendorCommand::GetEncoder(address) => device.read_register(address)?.data(),
            VendorCommand::GetThreshold => device.wall_threshold(),
        };
        encode_word(word, buffer).ok_or(RequestError::BufferTooSmall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WallConfig;
    use crate::control::PwmChannel;
    use crate::device::tests::{angle_reply, device_with, device_with_pwm};
    use crate::hal::mock::MockPwm;
    use crate::hal::Indicator;
    use crate::usb_protocol::request_codes::*;

    #[test]
    fn test_toggle_indicator() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, TOGGLE_LED, 0, &mut buf), Ok(0));
        assert!(device.indicator().is_on());
        assert_eq!(dispatcher.dispatch(&mut device, TOGGLE_LED, 0, &mut buf), Ok(0));
        assert!(!device.indicator().is_on());
    }

    #[test]
    fn test_set_duty_round_trip() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        device.actuator_mut().inner_mut().secondary = 0x1111;
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];

        assert_eq!(dispatcher.dispatch(&mut device, SET_DUTY, 0x1234, &mut buf), Ok(0));
        assert_eq!(dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0x34, 0x12]);
        assert_eq!(
            *device.actuator_mut().inner_mut(),
            MockPwm { primary: 0x1234, secondary: 0 }
        );
        assert_eq!(device.actuator_mut().active(), PwmChannel::Primary);
    }

    #[test]
    fn test_set_duty_zero_keeps_primary_active() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        dispatcher.dispatch(&mut device, SET_DUTY, 0, &mut buf).unwrap();
        assert_eq!(device.actuator_mut().active(), PwmChannel::Primary);
        assert_eq!(dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0, 0]);
    }

    #[test]
    fn test_get_duty_after_boot_on_secondary() {
        let mut device = device_with_pwm(MockPwm {
            primary: 0,
            secondary: 0x4000,
        });
        assert_eq!(device.actuator_mut().active(), PwmChannel::Secondary);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0, 0]);
        assert_eq!(device.duty(), 0x4000);
    }

    #[test]
    fn test_get_angle_masks_low_byte() {
        // 0x00FF: even parity
        let mut device = device_with(WallConfig::default(), &[0, 0, 0x00, 0xFF], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, GET_ANGLE, 0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0x3F, 0x00]);
    }

    #[test]
    fn test_get_magnitude_masks_low_byte() {
        let mut device = device_with(WallConfig::default(), &[0, 0, 0x00, 0xFF], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, GET_MAGNITUDE, 0, &mut buf), Ok(2));
        assert_eq!(buf[0], 0x3F);
    }

    #[test]
    fn test_get_encoder_register() {
        let mut device = device_with(WallConfig::default(), &angle_reply(0x1ABC), 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, GET_ENCODER, 0x3FFF, &mut buf), Ok(2));
        assert_eq!(u16::from_le_bytes([buf[0], buf[1]]), 0x1A3C);
    }

    #[test]
    fn test_unsupported_request_sets_flag() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0xAAu8; 8];
        assert_eq!(
            dispatcher.dispatch(&mut device, 99, 0, &mut buf),
            Err(RequestError::Unsupported(99))
        );
        assert_eq!(buf, [0xAA; 8]);
        assert_eq!(dispatcher.error_flags(), REQUEST_ERROR);
        assert_eq!(dispatcher.state(), DispatchState::Responding);

        // sticky until taken
        dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf).unwrap();
        assert!(dispatcher.take_request_error());
        assert!(!dispatcher.take_request_error());
        assert_eq!(device.duty(), 0x8000);
    }

    #[test]
    fn test_encoder_failure_sets_flag() {
        let mut device = device_with(WallConfig::default(), &[0, 0, 0x00, 0x01], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(
            dispatcher.dispatch(&mut device, GET_ANGLE, 0, &mut buf),
            Err(RequestError::Encoder(EncoderError::Parity { frame: 0x0001 }))
        );
        assert_eq!(dispatcher.take_error_flags(), REQUEST_ERROR);
        assert_eq!(dispatcher.error_flags(), 0);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 3];
        assert_eq!(
            dispatcher.dispatch(&mut device, GET_TORQUE, 0, &mut buf),
            Err(RequestError::BufferTooSmall)
        );
        assert_eq!(
            dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf[..1]),
            Err(RequestError::BufferTooSmall)
        );
        assert!(dispatcher.take_request_error());
    }

    #[test]
    fn test_threshold_and_save() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.dispatch(&mut device, SET_THRESHOLD, 0x1800, &mut buf), Ok(0));
        assert_eq!(dispatcher.dispatch(&mut device, GET_THRESHOLD, 0, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0x00, 0x18]);

        assert!(!dispatcher.take_save_request());
        assert_eq!(dispatcher.dispatch(&mut device, SAVE_CONFIG, 0, &mut buf), Ok(0));
        assert!(dispatcher.take_save_request());
        assert!(!dispatcher.take_save_request());
    }

    #[test]
    fn test_get_torque() {
        let mut device = device_with(WallConfig::default(), &[], 0xFFFF);
        let expected = device.estimate_torque();
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 4];
        assert_eq!(dispatcher.dispatch(&mut device, GET_TORQUE, 0, &mut buf), Ok(4));
        assert_eq!(f32::from_le_bytes(buf).to_bits(), expected.to_bits());
    }

    #[test]
    fn test_state_machine() {
        let mut device = device_with(WallConfig::default(), &[], 0);
        let mut dispatcher = Dispatcher::new();
        let mut buf = [0u8; 8];
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        dispatcher.dispatch(&mut device, GET_DUTY, 0, &mut buf).unwrap();
        assert_eq!(dispatcher.state(), DispatchState::Responding);
        dispatcher.complete();
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }
}

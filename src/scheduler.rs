//! Cooperative main loop
//!
//! One [`Scheduler::tick`] drains every pending vendor request, then runs exactly one control
//! iteration. Transports that deliver setup packets by callback use
//! [`Scheduler::service_request`] and [`Scheduler::control_step`] directly instead.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::config::WallConfig;
use crate::device::WallDevice;
use crate::dispatcher::Dispatcher;
use crate::hal::{AnalogInput, Indicator, PwmPair};
use crate::usb_protocol::SetupPacket;

/// Control-endpoint transport polled by [`Scheduler::tick`].
pub trait Transport {
    /// Next pending vendor setup packet, if any.
    fn poll_setup(&mut self) -> Option<SetupPacket>;

    /// Outbound (IN) buffer for the current request.
    fn in_buffer(&mut self) -> &mut [u8];

    /// Send `len` bytes of the IN buffer (zero for a status-only request).
    fn complete(&mut self, len: usize);

    /// Stall the control endpoint.
    fn stall(&mut self);
}

/// Main loop counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopStats {
    pub iterations: u32,
    /// Control iterations dropped because the encoder read failed
    pub skipped: u32,
    pub requests_served: u32,
    pub requests_stalled: u32,
}

pub struct Scheduler<SPI, CS, A, P, L> {
    device: WallDevice<SPI, CS, A, P, L>,
    dispatcher: Dispatcher,
    stats: LoopStats,
}

impl<SPI, CS, A, P, L> Scheduler<SPI, CS, A, P, L>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    A: AnalogInput,
    P: PwmPair,
    L: Indicator,
{
    pub fn new(device: WallDevice<SPI, CS, A, P, L>) -> Self {
        Self {
            device,
            dispatcher: Dispatcher::new(),
            stats: LoopStats::default(),
        }
    }

    /// One main-loop pass: every queued request, then one control iteration.
    pub fn tick(&mut self, transport: &mut impl Transport) {
        while let Some(setup) = transport.poll_setup() {
            let response = self.service_request(setup.request, setup.value, transport.in_buffer());
            match response {
                Some(len) => transport.complete(len.min(setup.length as usize)),
                None => transport.stall(),
            }
        }
        self.control_step();
    }

    /// Serve one vendor request and return the dispatcher to idle
    ///
    /// # Returns
    /// * `Some(len)` - response bytes written to `buffer`
    /// * `None` - the request must be stalled
    pub fn service_request(&mut self, request: u8, value: u16, buffer: &mut [u8]) -> Option<usize> {
        let result = self
            .dispatcher
            .dispatch(&mut self.device, request, value, buffer);
        let stall = self.dispatcher.take_request_error();
        self.dispatcher.complete();

        if stall {
            self.stats.requests_stalled = self.stats.requests_stalled.wrapping_add(1);
            return None;
        }
        self.stats.requests_served = self.stats.requests_served.wrapping_add(1);
        result.ok()
    }

    /// One control iteration
    ///
    /// # Returns
    /// * `Some(duty)` - duty written to the active channel
    /// * `None` - encoder read failed, duty untouched
    pub fn control_step(&mut self) -> Option<u16> {
        self.stats.iterations = self.stats.iterations.wrapping_add(1);
        match self.device.control_step() {
            Ok(duty) => Some(duty),
            Err(e) => {
                self.stats.skipped = self.stats.skipped.wrapping_add(1);
                warn!("Control iteration skipped: {:?}", e);
                None
            }
        }
    }

    /// Live configuration if a SaveConfig request is pending.
    pub fn take_save_request(&mut self) -> Option<WallConfig> {
        self.dispatcher
            .take_save_request()
            .then(|| *self.device.config())
    }

    #[inline]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn device(&self) -> &WallDevice<SPI, CS, A, P, L> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut WallDevice<SPI, CS, A, P, L> {
        &mut self.device
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::vec;
    use std::vec::Vec;

    use super::*;
    use crate::device::tests::{angle_reply, device_with};
    use crate::dispatcher::DispatchState;
    use crate::usb_protocol::request_codes::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Data(Vec<u8>),
        Stall,
    }

    struct MockTransport {
        pending: VecDeque<SetupPacket>,
        buffer: [u8; 64],
        sent: Vec<Sent>,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                pending: VecDeque::new(),
                buffer: [0; 64],
                sent: Vec::new(),
            }
        }
    }

    impl MockTransport {
        fn queue(&mut self, request_type: u8, request: u8, value: u16, length: u16) {
            self.pending.push_back(SetupPacket {
                request_type,
                request,
                value,
                index: 0,
                length,
            });
        }
    }

    impl Transport for MockTransport {
        fn poll_setup(&mut self) -> Option<SetupPacket> {
            self.pending.pop_front()
        }

        fn in_buffer(&mut self) -> &mut [u8] {
            &mut self.buffer
        }

        fn complete(&mut self, len: usize) {
            self.sent.push(Sent::Data(self.buffer[..len].to_vec()));
        }

        fn stall(&mut self) {
            self.sent.push(Sent::Stall);
        }
    }

    #[test]
    fn test_tick_serves_requests_before_control() {
        let device = device_with(WallConfig::default(), &angle_reply(0x3000), 0x7C00);
        let mut scheduler = Scheduler::new(device);
        let mut transport = MockTransport::default();
        transport.queue(0x40, SET_DUTY, 0x1000, 0);
        transport.queue(0xC0, GET_DUTY, 0, 2);
        transport.queue(0xC0, 99, 0, 2);

        scheduler.tick(&mut transport);

        // GET_DUTY saw the commanded duty, not the post-control one
        assert_eq!(
            transport.sent,
            vec![Sent::Data(vec![]), Sent::Data(vec![0x00, 0x10]), Sent::Stall]
        );
        assert!(transport.pending.is_empty());
        assert!(scheduler.device_mut().duty() > 0x1000);
        assert_eq!(
            scheduler.stats(),
            LoopStats {
                iterations: 1,
                skipped: 0,
                requests_served: 2,
                requests_stalled: 1,
            }
        );
        assert_eq!(scheduler.dispatcher().state(), DispatchState::Idle);
        assert_eq!(scheduler.dispatcher().error_flags(), 0);
    }

    #[test]
    fn test_tick_without_requests_runs_control_once() {
        let device = device_with(WallConfig::default(), &angle_reply(0x3000), 0x7C00);
        let mut scheduler = Scheduler::new(device);
        let mut transport = MockTransport::default();
        scheduler.tick(&mut transport);
        assert!(transport.sent.is_empty());
        assert_eq!(scheduler.stats().iterations, 1);
    }

    #[test]
    fn test_response_clamped_to_requested_length() {
        let device = device_with(WallConfig::default(), &[], 0xFFFF);
        let mut scheduler = Scheduler::new(device);
        let mut transport = MockTransport::default();
        transport.queue(0xC0, GET_TORQUE, 0, 2);
        scheduler.tick(&mut transport);
        assert!(matches!(&transport.sent[0], Sent::Data(bytes) if bytes.len() == 2));
    }

    #[test]
    fn test_encoder_failure_skips_iteration() {
        let device = device_with(WallConfig::default(), &[0, 0, 0x00, 0x01], 0);
        let mut scheduler = Scheduler::new(device);
        assert_eq!(scheduler.control_step(), None);
        assert_eq!(scheduler.device_mut().duty(), 0x8000);
        assert_eq!(scheduler.stats().skipped, 1);
        assert_eq!(scheduler.stats().iterations, 1);
    }

    #[test]
    fn test_save_request_carries_live_config() {
        let device = device_with(WallConfig::default(), &[], 0);
        let mut scheduler = Scheduler::new(device);
        let mut buf = [0u8; 8];
        assert_eq!(scheduler.service_request(SET_THRESHOLD, 0x1234, &mut buf), Some(0));
        assert_eq!(scheduler.take_save_request(), None);
        assert_eq!(scheduler.service_request(SAVE_CONFIG, 0, &mut buf), Some(0));

        let saved = scheduler.take_save_request().unwrap();
        assert_eq!(saved.wall_threshold, 0x1234);
        assert_eq!(scheduler.take_save_request(), None);
    }
}

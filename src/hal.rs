//! Hardware seams
//!
//! The control loop and dispatcher never touch peripheral registers directly. The firmware
//! implements these traits over embassy-stm32 peripherals; tests implement them over plain
//! memory.

use embedded_hal::digital::OutputPin;

use crate::control::PwmChannel;

/// Single-ended analog input returning a left-justified 16-bit word.
pub trait AnalogInput {
    fn read_raw(&mut self) -> u16;
}

/// Two output-compare channels driving the actuator.
///
/// Duty values are the full 16-bit range; implementations scale to their timer resolution.
pub trait PwmPair {
    fn duty(&mut self, channel: PwmChannel) -> u16;
    fn set_duty(&mut self, channel: PwmChannel, duty: u16);
}

/// Boolean indicator output (status LED).
pub trait Indicator {
    fn toggle(&mut self);
    fn is_on(&self) -> bool;
}

/// Whether the LED is driven active-high or active-low on the board wiring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    High,
    Low,
}

/// LED on a GPIO output, remembering its active level and last commanded state.
pub struct Led<PIN: OutputPin> {
    pin: PIN,
    active: ActiveLevel,
    is_on: bool,
}

impl<PIN: OutputPin> Led<PIN> {
    /// Create an LED wrapper, initializing it to OFF.
    pub fn new(mut pin: PIN, active: ActiveLevel) -> Self {
        match active {
            ActiveLevel::High => pin.set_low().ok(),
            ActiveLevel::Low => pin.set_high().ok(),
        };
        Self {
            pin,
            active,
            is_on: false,
        }
    }

    /// Drive the LED logically ON (true) or OFF (false).
    pub fn set(&mut self, on: bool) {
        let high = match self.active {
            ActiveLevel::High => on,
            ActiveLevel::Low => !on,
        };
        if high {
            self.pin.set_high().ok();
        } else {
            self.pin.set_low().ok();
        }
        self.is_on = on;
    }
}

impl<PIN: OutputPin> Indicator for Led<PIN> {
    fn toggle(&mut self) {
        self.set(!self.is_on);
    }

    #[inline]
    fn is_on(&self) -> bool {
        self.is_on
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory peripherals shared by the unit tests of several modules.

    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    use embedded_hal::digital::{self, OutputPin};
    use embedded_hal::spi::{self, ErrorKind, SpiBus};

    use super::{AnalogInput, Indicator, PwmPair};
    use crate::control::PwmChannel;

    /// Bus activity observed by the mock SPI bus and chip-select pin, in order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BusEvent {
        Select,
        Deselect,
        Byte { sent: u8, received: u8 },
    }

    pub type BusLog = Rc<RefCell<Vec<BusEvent>>>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusFault;

    impl spi::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Overrun
        }
    }

    /// SPI bus answering each transferred byte from a queue (0x00 once empty).
    pub struct MockSpi {
        pub log: BusLog,
        pub replies: VecDeque<u8>,
        pub fail: bool,
    }

    impl MockSpi {
        pub fn new(log: BusLog, replies: &[u8]) -> Self {
            Self {
                log,
                replies: replies.iter().copied().collect(),
                fail: false,
            }
        }

        pub fn failing(log: BusLog) -> Self {
            Self {
                log,
                replies: VecDeque::new(),
                fail: true,
            }
        }
    }

    impl spi::ErrorType for MockSpi {
        type Error = BusFault;
    }

    impl SpiBus<u8> for MockSpi {
        fn read(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
            for w in words.iter_mut() {
                *w = 0;
            }
            self.transfer_in_place(words)
        }

        fn write(&mut self, words: &[u8]) -> Result<(), BusFault> {
            let mut buf = words.to_vec();
            self.transfer_in_place(&mut buf)
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusFault> {
            let mut buf = write.to_vec();
            buf.resize(read.len().max(write.len()), 0);
            self.transfer_in_place(&mut buf)?;
            read.copy_from_slice(&buf[..read.len()]);
            Ok(())
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
            if self.fail {
                return Err(BusFault);
            }
            for w in words.iter_mut() {
                let received = self.replies.pop_front().unwrap_or(0);
                self.log.borrow_mut().push(BusEvent::Byte {
                    sent: *w,
                    received,
                });
                *w = received;
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), BusFault> {
            Ok(())
        }
    }

    /// Active-low chip select recording its transitions into the shared log.
    pub struct MockCs {
        pub log: BusLog,
        pub high: bool,
    }

    impl MockCs {
        pub fn new(log: BusLog) -> Self {
            Self { log, high: true }
        }
    }

    impl digital::ErrorType for MockCs {
        type Error = Infallible;
    }

    impl OutputPin for MockCs {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.log.borrow_mut().push(BusEvent::Select);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.log.borrow_mut().push(BusEvent::Deselect);
            Ok(())
        }
    }

    /// Plain GPIO state for LED tests.
    #[derive(Default)]
    pub struct MockPin {
        pub high: bool,
    }

    impl digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    /// ADC returning a fixed word.
    pub struct FixedAdc(pub u16);

    impl AnalogInput for FixedAdc {
        fn read_raw(&mut self) -> u16 {
            self.0
        }
    }

    /// Two duty registers in memory.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MockPwm {
        pub primary: u16,
        pub secondary: u16,
    }

    impl PwmPair for MockPwm {
        fn duty(&mut self, channel: PwmChannel) -> u16 {
            match channel {
                PwmChannel::Primary => self.primary,
                PwmChannel::Secondary => self.secondary,
            }
        }

        fn set_duty(&mut self, channel: PwmChannel, duty: u16) {
            match channel {
                PwmChannel::Primary => self.primary = duty,
                PwmChannel::Secondary => self.secondary = duty,
            }
        }
    }

    #[derive(Default)]
    pub struct MockIndicator {
        pub on: bool,
        pub toggles: u32,
    }

    impl Indicator for MockIndicator {
        fn toggle(&mut self) {
            self.on = !self.on;
            self.toggles += 1;
        }

        fn is_on(&self) -> bool {
            self.on
        }
    }
}

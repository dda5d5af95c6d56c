#![no_std]
#![no_main]

mod fmt;

mod actuator_pwm;
mod current_sense;
mod eeprom;
mod hardware;
mod state;
mod tasks;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::{
    adc::{Adc, AdcChannel, SampleTime},
    crc::{Config as CrcConfig, Crc, InputReverseConfig, PolySize},
    flash::Flash,
    gpio::{Level, Output, OutputType, Speed},
    spi::{self, Spi},
    time::Hertz,
    timer::{complementary_pwm::ComplementaryPwm, low_level::CountingMode, simple_pwm::PwmPin},
    usb::Driver,
};
use embassy_sync::mutex::Mutex;
use wall_driver::config::{pwm, spi as spi_params};
use wall_driver::hal::{ActiveLevel, Led};
use wall_driver::{As5048a, Scheduler, WallDevice};

use actuator_pwm::ActuatorPwm;
use current_sense::CurrentSenseAdc;
use eeprom::HardwareCrc;
use hardware::Irqs;
use tasks::{control_task, usb_task};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = hardware::create_clock_config();
    let p = embassy_stm32::init(config);

    info!("wall-driver • STM32G431VB @ 170MHz");

    // フラッシュとCRC初期化（STM32デフォルト設定: CRC-32、poly=0x04C11DB7）
    let mut flash = Flash::new_blocking(p.FLASH);
    let crc_config = unwrap!(CrcConfig::new(
        InputReverseConfig::None,
        false,
        PolySize::Width32,
        0xFFFFFFFF,
        0x04C11DB7,
    ));
    let mut crc = HardwareCrc::new(Crc::new(p.CRC, crc_config));

    info!("Loading configuration from flash...");
    let wall_config = eeprom::load_or_initialize_config(&mut flash, &mut crc);

    // ステータスLED
    let led = Led::new(Output::new(p.PC13, Level::Low, Speed::Low), ActiveLevel::High);

    // エンコーダ: SPI1 モード1、PA5=SCK、PA6=MISO、PA7=MOSI、PA4=CS
    let mut spi_config = spi::Config::default();
    spi_config.mode = spi::MODE_1;
    spi_config.frequency = Hertz(spi_params::FREQUENCY_HZ);
    let spi_bus = Spi::new_blocking(p.SPI1, p.PA5, p.PA7, p.PA6, spi_config);
    let cs = Output::new(p.PA4, Level::High, Speed::VeryHigh);
    let encoder = As5048a::new(spi_bus, cs);

    // 電流センス: PA0 = ADC1_IN1
    let mut adc = Adc::new(p.ADC1);
    adc.set_sample_time(SampleTime::CYCLES640_5);
    let current = CurrentSenseAdc::new(adc, p.PA0.degrade_adc());

    // アクチュエータ: TIM1 CH1 (PE9) プライマリ、CH2 (PE11) セカンダリ
    let tim1 = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        None,
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        None,
        None,
        None,
        None,
        None,
        Hertz(pwm::FREQUENCY_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let actuator = ActuatorPwm::new(
        tim1,
        pwm::INITIAL_PRIMARY_DUTY,
        pwm::INITIAL_SECONDARY_DUTY,
    );
    info!(
        "PWM: {}Hz, max_duty={}",
        pwm::FREQUENCY_HZ,
        actuator.max_duty()
    );

    let mut device = WallDevice::new(encoder, current, actuator, led, wall_config);
    match device.read_diagnostics() {
        Ok(diag) if diag.is_okay() => info!("Encoder magnet OK: agc={}", diag.agc),
        Ok(diag) => warn!("Encoder magnet out of range: {:?}", diag),
        Err(e) => error!("Encoder diagnostics read failed: {:?}", e),
    }
    let scheduler: &'static state::SharedScheduler =
        state::SCHEDULER.init(Mutex::new(Scheduler::new(device)));

    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);
    let usb = tasks::usb::build_usb(driver, scheduler);

    info!("Starting wall control...");
    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(control_task(
        scheduler,
        flash,
        crc,
        wall_config.control_period_us
    )));
}

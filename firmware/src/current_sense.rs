//! 電流センスADC入力（PA0 = ADC1_IN1）

use embassy_stm32::{
    adc::{Adc, AnyAdcChannel},
    peripherals,
};
use wall_driver::hal::AnalogInput;

/// ADC分解能 [bit]
const ADC_BITS: u32 = 12;

pub struct CurrentSenseAdc {
    adc: Adc<'static, peripherals::ADC1>,
    pin: AnyAdcChannel<peripherals::ADC1>,
}

impl CurrentSenseAdc {
    pub fn new(adc: Adc<'static, peripherals::ADC1>, pin: AnyAdcChannel<peripherals::ADC1>) -> Self {
        Self { adc, pin }
    }
}

impl AnalogInput for CurrentSenseAdc {
    /// 12bit変換結果を16bitに左詰め
    fn read_raw(&mut self) -> u16 {
        let sample = self.adc.blocking_read(&mut self.pin);
        sample << (16 - ADC_BITS)
    }
}

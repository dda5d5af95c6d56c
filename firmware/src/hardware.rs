//! ハードウェア初期化
//!
//! クロック設定と割り込みバインディング

use embassy_stm32::{bind_interrupts, peripherals, usb, Config};

bind_interrupts!(pub struct Irqs {
    USB_LP => usb::InterruptHandler<peripherals::USB>;
});

/// RCCクロック設定
///
/// HSI -> PLL (/4 x85 /2) = 170MHz システムクロック。
/// USBはHSI48（SOFパケットでトリミング）から供給。
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, Clk48sel, ClockMux};
        use embassy_stm32::rcc::{Hsi48Config, Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        clock_mux.clk48sel = Clk48sel::HSI48;
        config.rcc.mux = clock_mux;
    }
    config
}

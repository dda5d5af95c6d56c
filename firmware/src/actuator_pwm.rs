//! アクチュエータPWM出力
//!
//! TIM1 CH1 (PE9) がプライマリ、CH2 (PE11) がセカンダリ。
//! Duty比は16bitフルスケールで保持し、書き込み時にタイマー周期へスケーリングします。

use embassy_stm32::{
    peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};
use wall_driver::hal::PwmPair;
use wall_driver::PwmChannel;

pub struct ActuatorPwm {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    max_duty: u16,
    /// 各チャネルの最終指令Duty（16bitスケール）
    duty: [u16; 2],
}

impl ActuatorPwm {
    /// 起動時Dutyを設定して両チャネルを有効化
    ///
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1）
    /// * `primary` - プライマリの起動時Duty
    /// * `secondary` - セカンダリの起動時Duty
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>, primary: u16, secondary: u16) -> Self {
        let max_duty = pwm.get_max_duty();
        let mut driver = Self {
            pwm,
            max_duty,
            duty: [0; 2],
        };
        driver.set_duty(PwmChannel::Primary, primary);
        driver.set_duty(PwmChannel::Secondary, secondary);
        driver.pwm.enable(Channel::Ch1);
        driver.pwm.enable(Channel::Ch2);
        driver
    }

    #[inline]
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    fn timer_channel(channel: PwmChannel) -> Channel {
        match channel {
            PwmChannel::Primary => Channel::Ch1,
            PwmChannel::Secondary => Channel::Ch2,
        }
    }

    fn slot(channel: PwmChannel) -> usize {
        match channel {
            PwmChannel::Primary => 0,
            PwmChannel::Secondary => 1,
        }
    }

    /// 16bit Dutyをコンペア値に変換
    fn to_compare(&self, duty: u16) -> u16 {
        (duty as u32 * self.max_duty as u32 / u16::MAX as u32) as u16
    }
}

impl PwmPair for ActuatorPwm {
    fn duty(&mut self, channel: PwmChannel) -> u16 {
        self.duty[Self::slot(channel)]
    }

    fn set_duty(&mut self, channel: PwmChannel, duty: u16) {
        self.duty[Self::slot(channel)] = duty;
        let compare = self.to_compare(duty);
        self.pwm.set_duty(Self::timer_channel(channel), compare);
    }
}

//! グローバル共有状態管理
//!
//! USBハンドラと制御タスクが共有するのはスケジューラのみです。
//! どちらもスレッドモードExecutor上で動作し、USBハンドラは`try_lock`のみ使用します。

use embassy_stm32::{gpio::Output, mode::Blocking, spi::Spi};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use static_cell::StaticCell;
use wall_driver::hal::Led;
use wall_driver::Scheduler;

use crate::actuator_pwm::ActuatorPwm;
use crate::current_sense::CurrentSenseAdc;

/// 実機ペリフェラルで具体化したスケジューラ
pub type WallScheduler = Scheduler<
    Spi<'static, Blocking>,
    Output<'static>,
    CurrentSenseAdc,
    ActuatorPwm,
    Led<Output<'static>>,
>;

/// タスク間で共有するスケジューラ
pub type SharedScheduler = Mutex<NoopRawMutex, WallScheduler>;

/// スケジューラ本体（main で一度だけ初期化）
pub static SCHEDULER: StaticCell<SharedScheduler> = StaticCell::new();

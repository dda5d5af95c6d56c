//! 制御ループタスク
//!
//! 周期ごとに制御を1回実行し、ホストから要求があれば設定をフラッシュに保存します。

use embassy_stm32::{flash::Flash, mode::Blocking};
use embassy_time::{Duration, Ticker};

use crate::eeprom::{self, HardwareCrc};
use crate::state::SharedScheduler;

/// 統計ログ出力間隔 [us]
const LOG_INTERVAL_US: u32 = 1_000_000;

#[embassy_executor::task]
pub async fn control_task(
    scheduler: &'static SharedScheduler,
    mut flash: Flash<'static, Blocking>,
    mut crc: HardwareCrc<'static>,
    period_us: u32,
) {
    info!("Control task started: period={}us", period_us);

    let mut ticker = Ticker::every(Duration::from_micros(period_us as u64));
    let log_every = (LOG_INTERVAL_US / period_us).max(1);
    let mut log_counter = 0u32;

    loop {
        ticker.next().await;

        // 次のawait前にガードを解放（USBハンドラのtry_lockを常に成功させる）
        let (save, stats) = {
            let mut scheduler = scheduler.lock().await;
            scheduler.control_step();
            (scheduler.take_save_request(), scheduler.stats())
        };

        if let Some(config) = save {
            match eeprom::write_config(&mut flash, &mut crc, &config) {
                Ok(()) => info!("Configuration saved"),
                Err(e) => error!("Configuration save failed: {:?}", e),
            }
        }

        log_counter += 1;
        if log_counter >= log_every {
            log_counter = 0;
            debug!(
                "Loop: iterations={}, skipped={}, served={}, stalled={}",
                stats.iterations,
                stats.skipped,
                stats.requests_served,
                stats.requests_stalled
            );
        }
    }
}

//! フラッシュメモリベースのEEPROM実装
//!
//! STM32G431VBの最終フラッシュページ（ページ63）の先頭に設定レコードを保存

use embassy_stm32::{crc::Crc, flash::Flash, mode::Blocking};
use wall_driver::config::{ConfigError, Crc32, WallConfig, RECORD_SIZE};

/// STM32G431VBのフラッシュページサイズ（2KB）
pub const FLASH_PAGE_SIZE: u32 = 2048;

/// 最終ページ番号（ページ63、0ベース）
pub const LAST_PAGE_NUMBER: u8 = 63;

/// フラッシュ先頭からの最終ページオフセット（絶対アドレス 0x0801F800）
pub const LAST_PAGE_OFFSET: u32 = 0x1F800;

/// EEPROM操作のエラー型
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EepromError {
    /// フラッシュ書き込みエラー
    FlashWriteError,

    /// フラッシュ消去エラー
    FlashEraseError,

    /// フラッシュ読み取りエラー
    FlashReadError,

    /// レコード不正（マジック、バージョン、CRC、値域）
    InvalidRecord(ConfigError),
}

/// ハードウェアCRCユニット（計算ごとにリセット）
pub struct HardwareCrc<'d>(Crc<'d>);

impl<'d> HardwareCrc<'d> {
    pub fn new(crc: Crc<'d>) -> Self {
        Self(crc)
    }
}

impl Crc32 for HardwareCrc<'_> {
    fn checksum(&mut self, words: &[u32]) -> u32 {
        self.0.reset();
        self.0.feed_words(words)
    }
}

/// フラッシュメモリから設定を読み込む
///
/// # Arguments
/// * `flash` - Flashペリフェラル
/// * `crc` - CRCペリフェラル
///
/// # Returns
/// * `Ok(WallConfig)` - 読み込み成功
/// * `Err(EepromError)` - 読み込み失敗（CRCエラー、バージョン不一致など）
pub fn read_config(
    flash: &mut Flash<'_, Blocking>,
    crc: &mut HardwareCrc<'_>,
) -> Result<WallConfig, EepromError> {
    info!("Reading config from flash offset 0x{:05X}", LAST_PAGE_OFFSET);

    let mut buffer = [0u8; RECORD_SIZE];
    flash
        .blocking_read(LAST_PAGE_OFFSET, &mut buffer)
        .map_err(|e| {
            error!("Flash read failed: {:?}", e);
            EepromError::FlashReadError
        })?;

    let config = WallConfig::decode(&buffer, crc).map_err(EepromError::InvalidRecord)?;
    info!("Config loaded successfully");
    Ok(config)
}

/// 最終ページを消去して設定を書き込む
///
/// # Arguments
/// * `flash` - Flashペリフェラル
/// * `crc` - CRCペリフェラル
/// * `config` - 保存する設定
pub fn write_config(
    flash: &mut Flash<'_, Blocking>,
    crc: &mut HardwareCrc<'_>,
    config: &WallConfig,
) -> Result<(), EepromError> {
    let record = config.encode(crc);

    info!("Erasing flash page {}", LAST_PAGE_NUMBER);
    flash
        .blocking_erase(LAST_PAGE_OFFSET, LAST_PAGE_OFFSET + FLASH_PAGE_SIZE)
        .map_err(|e| {
            error!("Flash erase failed: {:?}", e);
            EepromError::FlashEraseError
        })?;

    info!("Writing {} bytes to flash", record.len());
    flash
        .blocking_write(LAST_PAGE_OFFSET, &record)
        .map_err(|e| {
            error!("Flash write failed: {:?}", e);
            EepromError::FlashWriteError
        })?;

    info!("Config saved successfully");
    Ok(())
}

/// 設定を読み込み、失敗時はデフォルト設定を書き込んで返す
pub fn load_or_initialize_config(
    flash: &mut Flash<'_, Blocking>,
    crc: &mut HardwareCrc<'_>,
) -> WallConfig {
    match read_config(flash, crc) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {:?}, initializing with defaults", e);
            let config = WallConfig::default();
            if let Err(e) = write_config(flash, crc, &config) {
                error!("Failed to initialize default config: {:?}, using in-memory defaults", e);
            }
            config
        }
    }
}

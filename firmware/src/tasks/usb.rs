//! USBデバイスタスクとベンダーリクエストハンドラ

use embassy_stm32::{peripherals, usb::Driver};
use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
use embassy_usb::{Builder, Handler, UsbDevice};
use static_cell::StaticCell;
use wall_driver::config::usb;
use wall_driver::usb_protocol::MAX_RESPONSE_LEN;

use crate::state::SharedScheduler;

pub type UsbDriver = Driver<'static, peripherals::USB>;

static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static HANDLER: StaticCell<VendorHandler> = StaticCell::new();

/// デバイス宛てベンダーリクエストをスケジューラへ振り分け
pub struct VendorHandler {
    scheduler: &'static SharedScheduler,
}

impl VendorHandler {
    fn accepts(req: &Request) -> bool {
        req.request_type == RequestType::Vendor && req.recipient == Recipient::Device
    }

    /// リクエストを処理して`buf`に応答を書き込む。`None`はストール
    fn serve(&mut self, req: &Request, buf: &mut [u8]) -> Option<usize> {
        let Ok(mut scheduler) = self.scheduler.try_lock() else {
            warn!("Scheduler busy, rejecting request {}", req.request);
            return None;
        };
        scheduler.service_request(req.request, req.value, buf)
    }
}

impl Handler for VendorHandler {
    fn control_out(&mut self, req: Request, _data: &[u8]) -> Option<OutResponse> {
        if !Self::accepts(&req) {
            return None;
        }
        let mut scratch = [0u8; MAX_RESPONSE_LEN];
        match self.serve(&req, &mut scratch) {
            Some(_) => Some(OutResponse::Accepted),
            None => Some(OutResponse::Rejected),
        }
    }

    fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
        if !Self::accepts(&req) {
            return None;
        }
        match self.serve(&req, buf) {
            Some(len) => Some(InResponse::Accepted(&buf[..len.min(req.length as usize)])),
            None => Some(InResponse::Rejected),
        }
    }
}

/// ベンダーハンドラ付きのUSBデバイスを構築
///
/// # 引数
/// * `driver` - USBペリフェラルドライバ
/// * `scheduler` - ハンドラが処理を委譲する共有スケジューラ
pub fn build_usb(
    driver: UsbDriver,
    scheduler: &'static SharedScheduler,
) -> UsbDevice<'static, UsbDriver> {
    let mut config = embassy_usb::Config::new(usb::VENDOR_ID, usb::PRODUCT_ID);
    config.manufacturer = Some(usb::MANUFACTURER);
    config.product = Some(usb::PRODUCT);
    config.max_packet_size_0 = usb::MAX_PACKET_SIZE_0;
    config.max_power = 100;

    let mut builder = Builder::new(
        driver,
        config,
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        &mut [],
        CONTROL_BUF.init([0; 64]),
    );
    builder.handler(HANDLER.init(VendorHandler { scheduler }));

    info!(
        "USB device configured: VID=0x{:04X}, PID=0x{:04X}",
        usb::VENDOR_ID,
        usb::PRODUCT_ID
    );
    builder.build()
}

/// USBデバイスタスク
#[embassy_executor::task]
pub async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) {
    info!("USB task started");
    usb.run().await;
}

use core::convert::TryInto;
use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::Ets,
        gpio::{AnyIOPin, AnyInputPin, Gpio18, Gpio23, Input, Output, PinDriver},
        i2c::{I2cConfig, I2cDriver},
        modem::Modem,
        prelude::Peripherals,
        spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig},
        units::FromValueType,
    },
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use mipidsi::{
    interface::SpiInterface,
    models::ST7789,
    options::{ColorInversion, Orientation, Rotation},
    Builder as DisplayBuilder,
};

use opener_common::{
    config::NetworkConfig,
    dispatch::{CommandTransport, LinkStatus, TransportError, TransportResponse},
    wait_for_time_sync, ButtonState, Dispatcher, OpenerConfig, OpenerEngine, StatusFrame,
    SystemClock, TickOutcome, TlsMode, Uplink, WallClock,
};

use crate::{axp192::Axp192, screen};

const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_RETRY_DELAY_MS: u64 = 300;
const MAX_HTTP_BODY: usize = 4096;
const LCD_BUFFER_BYTES: usize = 512;

type Lcd = mipidsi::Display<
    SpiInterface<
        'static,
        SpiDeviceDriver<'static, SpiDriver<'static>>,
        PinDriver<'static, Gpio23, Output>,
    >,
    ST7789,
    PinDriver<'static, Gpio18, Output>,
>;

type ButtonPin = PinDriver<'static, AnyInputPin, Input>;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = OpenerConfig::default();
    apply_build_env(&mut config);
    config.sanitize();

    info!(
        "config: ssid=`{}`, api=`{}`, tls={:?}, credentials={}",
        config.network.wifi_ssid,
        config.api.host,
        config.api.tls,
        config.api.has_credentials()
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let mut power = match I2cDriver::new(
        peripherals.i2c0,
        pins.gpio21,
        pins.gpio22,
        &I2cConfig::new().baudrate(400.kHz().into()),
    ) {
        Ok(i2c) => {
            let mut axp = Axp192::new(i2c);
            match axp
                .init()
                .and_then(|()| axp.set_backlight(config.display.brightness_pct))
            {
                Ok(()) => {
                    info!(
                        "AXP192 ready, backlight {}%",
                        config.display.brightness_pct
                    );
                    Some(axp)
                }
                Err(err) => {
                    warn!("AXP192 init failed, battery readout disabled: {err:?}");
                    None
                }
            }
        }
        Err(err) => {
            warn!("I2C0 unavailable, battery readout disabled: {err:?}");
            None
        }
    };

    let spi = SpiDeviceDriver::new_single(
        peripherals.spi2,
        pins.gpio13,
        pins.gpio15,
        Option::<AnyIOPin>::None,
        Some(pins.gpio5),
        &SpiDriverConfig::new(),
        &SpiConfig::new().baudrate(26.MHz().into()),
    )
    .context("failed to set up LCD SPI bus")?;
    let dc = PinDriver::output(pins.gpio23)?;
    let rst = PinDriver::output(pins.gpio18)?;

    let mut lcd = match init_lcd(spi, dc, rst) {
        Ok(lcd) => Some(lcd),
        Err(err) => {
            warn!("LCD init failed, running headless: {err:#}");
            None
        }
    };
    if let Some(lcd) = lcd.as_mut() {
        if let Err(err) = screen::draw_boot(lcd) {
            warn!("boot screen draw failed: {err:?}");
        }
    }

    let _wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &config.network)
        .context("wifi startup failed")?;

    let mut engine = OpenerEngine::new(&config);
    let clock = SystemClock;
    engine.force_redraw();
    render_if_due(&mut engine, &clock, &mut power, &mut lcd);

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized, waiting for time sync");
    if wait_for_time_sync(
        &clock,
        config.time_sync.attempts,
        config.time_sync.retry_delay_ms,
        |ms| thread::sleep(Duration::from_millis(ms)),
    ) {
        info!("time synced: {}", clock.now_utc());
    } else {
        warn!("time not synced yet; commands will be refused until it is");
    }
    // time line changes once synced
    engine.force_redraw();

    let unlock_pin = init_button(config.buttons.unlock_pin)?;
    let lock_pin = init_button(config.buttons.lock_pin)?;

    let mut dispatcher = Dispatcher::new(
        config.api.clone(),
        EspHttpsTransport::new(config.api.tls, config.api.timeout_ms),
    );
    let link = EspWifiLink;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    if let Err(err) = add_current_task_to_watchdog() {
        warn!("failed to register main loop with watchdog: {err:#}");
    }

    info!("entering main loop");
    loop {
        feed_watchdog();
        let now_ms = monotonic_ms();

        let unlock_pressed = read_button(&unlock_pin, engine.unlock_button());
        let lock_pressed = read_button(&lock_pin, engine.lock_button());

        if let Some(outcome) = engine.tick(
            unlock_pressed,
            lock_pressed,
            now_ms,
            Uplink {
                dispatcher: &mut dispatcher,
                link: &link,
                clock: &clock,
            },
            monotonic_ms,
        ) {
            log_outcome(&outcome);
        }

        render_if_due(&mut engine, &clock, &mut power, &mut lcd);

        thread::sleep(Duration::from_millis(config.timing.tick_ms));
    }
}

fn apply_build_env(config: &mut OpenerConfig) {
    if let Some(ssid) = option_env!("WIFI_SSID") {
        config.network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("WIFI_PASS") {
        config.network.wifi_pass = pass.to_string();
    }
    if let Some(token) = option_env!("SWITCHBOT_TOKEN") {
        config.api.token = token.to_string();
    }
    if let Some(secret) = option_env!("SWITCHBOT_SECRET") {
        config.api.secret = secret.to_string();
    }
    if let Some(device_id) = option_env!("SWITCHBOT_DEVICE_ID") {
        config.api.device_id = device_id.to_string();
    }
    if let Some(host) = option_env!("SWITCHBOT_API_HOST") {
        config.api.host = host.to_string();
    }
    if matches!(option_env!("OPENER_TLS_VERIFY"), Some("1" | "true")) {
        config.api.tls = TlsMode::Verified;
    }
}

fn init_lcd(
    spi: SpiDeviceDriver<'static, SpiDriver<'static>>,
    dc: PinDriver<'static, Gpio23, Output>,
    rst: PinDriver<'static, Gpio18, Output>,
) -> anyhow::Result<Lcd> {
    let buffer: &'static mut [u8] = Box::leak(Box::new([0_u8; LCD_BUFFER_BYTES]));
    let interface = SpiInterface::new(spi, dc, buffer);

    // 135x240 panel mounted landscape; RAM window is offset on the ST7789
    DisplayBuilder::new(ST7789, interface)
        .display_size(135, 240)
        .display_offset(52, 40)
        .invert_colors(ColorInversion::Inverted)
        .orientation(Orientation::new().rotate(Rotation::Deg90))
        .reset_pin(rst)
        .init(&mut Ets)
        .map_err(|err| anyhow!("ST7789 init failed: {err:?}"))
}

fn init_button(pin: i32) -> anyhow::Result<ButtonPin> {
    let driver = unsafe { PinDriver::input(AnyInputPin::new(pin)) }
        .with_context(|| format!("failed to configure button GPIO{pin}"))?;
    info!("button on GPIO{pin} ready");
    Ok(driver)
}

fn read_button(pin: &ButtonPin, state: &ButtonState) -> bool {
    state.is_pressed_level(pin.is_high())
}

fn render_if_due(
    engine: &mut OpenerEngine,
    clock: &SystemClock,
    power: &mut Option<Axp192<I2cDriver<'static>>>,
    lcd: &mut Option<Lcd>,
) {
    let frame = engine.frame_if_due(monotonic_ms(), clock.epoch_secs(), || {
        read_battery(power)
    });
    if let Some(frame) = frame {
        draw(lcd, &frame);
    }
}

fn read_battery(power: &mut Option<Axp192<I2cDriver<'static>>>) -> Option<f32> {
    let axp = power.as_mut()?;
    match axp.battery_volts() {
        Ok(volts) => Some(volts),
        Err(err) => {
            warn!("battery read failed: {err:?}");
            None
        }
    }
}

fn draw(lcd: &mut Option<Lcd>, frame: &StatusFrame) {
    let Some(lcd) = lcd.as_mut() else {
        info!(
            "screen: {} | {} | {}{}",
            frame.label,
            frame.battery_text,
            frame.time_text,
            if frame.error_overlay { " | API ERROR" } else { "" }
        );
        return;
    };
    if let Err(err) = screen::draw_frame(lcd, frame) {
        warn!("screen redraw failed: {err:?}");
    }
}

fn log_outcome(outcome: &TickOutcome) {
    let command = outcome.command.as_str();
    match &outcome.result {
        Ok(response) => info!("{command} sent: HTTP {}", response.status),
        Err(err) if err.is_connectivity() => warn!("{command} not sent: {err}"),
        Err(err) => warn!("{command} failed: {err}"),
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
    let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt = 0_u32;
    loop {
        attempt = attempt.saturating_add(1);
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up after {attempt} attempt(s)");
                return Ok(wifi);
            }
            Err(err) => {
                warn!("wifi connect attempt {attempt} failed: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }
}

/// Station link state as reported by the Wi-Fi driver.
struct EspWifiLink;

impl LinkStatus for EspWifiLink {
    fn is_connected(&self) -> bool {
        is_wifi_station_connected()
    }
}

/// One `EspHttpConnection` per POST; the connection is dropped afterwards.
struct EspHttpsTransport {
    tls: TlsMode,
    timeout: Duration,
}

impl EspHttpsTransport {
    fn new(tls: TlsMode, timeout_ms: u64) -> Self {
        Self {
            tls,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn post_inner(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> anyhow::Result<TransportResponse> {
        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            crt_bundle_attach: match self.tls {
                TlsMode::Verified => Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                TlsMode::Insecure => None,
            },
            ..Default::default()
        };
        let mut client = HttpClient::wrap(EspHttpConnection::new(&http_conf)?);

        let content_length = body.len().to_string();
        let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
        all_headers.push(("Content-Length", content_length.as_str()));

        let mut request = client
            .request(Method::Post, url, &all_headers)
            .map_err(|e| anyhow!("{e:?}"))?;
        request.write_all(body).map_err(|e| anyhow!("{e:?}"))?;
        request.flush().map_err(|e| anyhow!("{e:?}"))?;
        let mut response = request.submit().map_err(|e| anyhow!("{e:?}"))?;

        let status = response.status();
        let mut body = Vec::new();
        let mut chunk = [0_u8; 256];
        while body.len() < MAX_HTTP_BODY {
            let read = response.read(&mut chunk).map_err(|e| anyhow!("{e:?}"))?;
            if read == 0 {
                break;
            }
            let take = read.min(MAX_HTTP_BODY - body.len());
            body.extend_from_slice(&chunk[..take]);
        }

        Ok(TransportResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

impl CommandTransport for EspHttpsTransport {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<TransportResponse, TransportError> {
        self.post_inner(url, headers, body)
            .map_err(|err| TransportError(format!("{err:#}")))
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

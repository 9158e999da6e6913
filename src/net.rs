//! Wi-Fi, SNTP, tariff fetching and the debug dump server

use alloc::string::String;
use core::fmt::Write as _;
use core::net::{IpAddr, SocketAddr};

use embassy_executor::Spawner;
use embassy_net::{
    Config as NetConfig, DhcpConfig, IpAddress, IpEndpoint, Stack, StackResources,
    dns::{DnsQueryType, DnsSocket},
    tcp::{
        TcpSocket,
        client::{TcpClient, TcpClientState},
    },
    udp::{PacketMetadata, UdpSocket},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::{Duration, Instant, Timer, with_timeout};
use embedded_io_async::Write as _;
use esp_hal::{peripherals::WIFI, rng::Rng};
use esp_radio::{
    Controller as RadioController,
    wifi::{self, ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent},
};
use log::{info, warn};
use reqwless::{
    client::{HttpClient, TlsConfig, TlsVerify},
    request::Method,
};
use sntpc::{NtpContext, NtpTimestampGenerator, NtpUdpSocket};
use static_cell::{ConstStaticCell, StaticCell};

use crate::clock::WallClock;
use crate::config::TARIFF_API_URL;
use crate::error::TransportError;
use crate::ingest::{commit, parse_fetch, request_url};
use crate::logic::RefreshPolicy;
use crate::model::Hour;
use crate::prices::PriceStore;

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

const NTP_HOST: &str = "pool.ntp.org";
const NTP_PORT: u16 = 123;
const NTP_TIMEOUT_SECS: u64 = 5;
const NTP_LOCAL_PORT: u16 = 50_123;
const NTP_RESYNC_SECS: u64 = 6 * 3_600;

const DEBUG_PORT: u16 = 23;

const FETCH_TIMEOUT_SECS: u64 = 30;
const FETCH_RETRY_SECS: u64 = 60;
const FETCH_POLL_SECS: u64 = 300;

const TLS_BUFFER_LEN: usize = 16_640;
const BODY_BUFFER_LEN: usize = 32 * 1024;

pub type PriceMutex = Mutex<CriticalSectionRawMutex, PriceStore>;
pub type ClockMutex = Mutex<CriticalSectionRawMutex, Option<WallClock>>;

/// The one price store. Only the fetch task writes to it.
pub static PRICES: PriceMutex = Mutex::new(PriceStore::new());

/// Unset until the first SNTP answer.
pub static CLOCK: ClockMutex = Mutex::new(None);

static RADIO_CONTROLLER: StaticCell<RadioController<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static TCP_CLIENT_STATE: StaticCell<TcpClientState<1, 4096, 4096>> = StaticCell::new();
static TLS_READ: ConstStaticCell<[u8; TLS_BUFFER_LEN]> = ConstStaticCell::new([0; TLS_BUFFER_LEN]);
static TLS_WRITE: ConstStaticCell<[u8; TLS_BUFFER_LEN]> =
    ConstStaticCell::new([0; TLS_BUFFER_LEN]);
static BODY: ConstStaticCell<[u8; BODY_BUFFER_LEN]> = ConstStaticCell::new([0; BODY_BUFFER_LEN]);

/// Current hour index, if the clock has been synced.
pub async fn current_hour() -> Option<Hour> {
    let clock = *CLOCK.lock().await;
    clock.map(|clock| clock.current_hour(Instant::now().as_secs()))
}

/// Bring up Wi-Fi and spawn every network task. Failing radio init is logged
/// and leaves the device running without prices.
pub fn spawn_network(spawner: &Spawner, wifi_peripheral: WIFI<'static>) {
    let radio = match esp_radio::init() {
        Ok(ctrl) => ctrl,
        Err(err) => {
            warn!("Wi-Fi radio init failed; running without prices: {:?}", err);
            return;
        }
    };
    let radio_ctrl = RADIO_CONTROLLER.init(radio);

    let (controller, interfaces) = match wifi::new(radio_ctrl, wifi_peripheral, Default::default())
    {
        Ok(v) => v,
        Err(err) => {
            warn!("Wi-Fi driver init failed; running without prices: {:?}", err);
            return;
        }
    };

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let tls_seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let resources = NET_RESOURCES.init(StackResources::<4>::new());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(DhcpConfig::default()),
        resources,
        seed,
    );

    let spawned = spawner
        .spawn(net_task(runner))
        .and_then(|_| spawner.spawn(wifi_task(controller, stack)))
        .and_then(|_| spawner.spawn(sntp_task(stack)))
        .and_then(|_| spawner.spawn(price_task(stack, tls_seed)))
        .and_then(|_| spawner.spawn(debug_task(stack)));
    if let Err(err) = spawned {
        esp_println::println!("[ERROR] Failed to spawn network task: {:?}", err);
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

#[embassy_executor::task]
async fn wifi_task(mut controller: WifiController<'static>, stack: Stack<'static>) {
    info!("Wi-Fi task starting (ssid=\"{}\")", WIFI_SSID);

    loop {
        if !matches!(controller.is_started(), Ok(true)) {
            let client_config = ModeConfig::Client(
                ClientConfig::default()
                    .with_ssid(String::from(WIFI_SSID))
                    .with_password(String::from(WIFI_PASSWORD)),
            );
            if let Err(err) = controller.set_config(&client_config) {
                warn!("Wi-Fi set_config error: {:?}", err);
                Timer::after(Duration::from_secs(10)).await;
                continue;
            }
            if let Err(err) = controller.start_async().await {
                warn!("Wi-Fi start error: {:?}", err);
                Timer::after(Duration::from_secs(10)).await;
                continue;
            }
        }

        match controller.connect_async().await {
            Ok(()) => {
                stack.wait_config_up().await;
                if let Some(cfg) = stack.config_v4() {
                    info!("Wi-Fi link up: ip={}", cfg.address.address());
                }
                controller.wait_for_event(WifiEvent::StaDisconnected).await;
                warn!("Wi-Fi disconnected; will retry");
                Timer::after(Duration::from_secs(5)).await;
            }
            Err(err) => {
                warn!("Wi-Fi connect error: {:?}", err);
                Timer::after(Duration::from_secs(10)).await;
            }
        }
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, &'static str> {
    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|_| "DNS lookup failed")?;
    addrs.first().copied().ok_or("DNS returned no address")
}

/// Local send/receive instants for the SNTP exchange, taken from uptime.
#[derive(Clone, Copy, Default)]
struct UptimeStamp {
    micros: u64,
}

impl NtpTimestampGenerator for UptimeStamp {
    fn init(&mut self) {
        self.micros = Instant::now().as_micros();
    }

    fn timestamp_sec(&self) -> u64 {
        self.micros / 1_000_000
    }

    fn timestamp_subsec_micros(&self) -> u32 {
        (self.micros % 1_000_000) as u32
    }
}

/// Lets `sntpc` run its exchange over an embassy-net UDP socket.
struct NtpSocket<'a, 'b>(&'a UdpSocket<'b>);

impl NtpUdpSocket for NtpSocket<'_, '_> {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> sntpc::Result<usize> {
        let IpAddr::V4(ip) = addr.ip() else {
            return Err(sntpc::Error::Network);
        };
        self.0
            .send_to(buf, IpEndpoint::new(IpAddress::Ipv4(ip), addr.port()))
            .await
            .map_err(|_| sntpc::Error::Network)?;
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> sntpc::Result<(usize, SocketAddr)> {
        let (len, meta) = self
            .0
            .recv_from(buf)
            .await
            .map_err(|_| sntpc::Error::Network)?;
        let from = SocketAddr::new(meta.endpoint.addr.into(), meta.endpoint.port);
        Ok((len, from))
    }
}

async fn sync_clock(stack: Stack<'static>) -> Result<WallClock, &'static str> {
    let server: IpAddr = resolve(stack, NTP_HOST).await?.into();

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buf = [0u8; 128];
    let mut tx_buf = [0u8; 128];
    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
    socket.bind(NTP_LOCAL_PORT).map_err(|_| "UDP bind failed")?;

    let context = NtpContext::new(UptimeStamp::default());
    let reply = with_timeout(
        Duration::from_secs(NTP_TIMEOUT_SECS),
        sntpc::get_time(SocketAddr::new(server, NTP_PORT), &NtpSocket(&socket), context),
    )
    .await
    .map_err(|_| "SNTP timeout")?
    .map_err(|err| {
        warn!("SNTP exchange error: {:?}", err);
        "SNTP request failed"
    })?;

    WallClock::synced(u64::from(reply.sec()), Instant::now().as_secs())
        .map_err(|_| "implausible SNTP time")
}

#[embassy_executor::task]
async fn sntp_task(stack: Stack<'static>) {
    loop {
        stack.wait_config_up().await;
        match sync_clock(stack).await {
            Ok(clock) => {
                *CLOCK.lock().await = Some(clock);
                info!("clock synced, hour {}", clock.current_hour(Instant::now().as_secs()));
                Timer::after(Duration::from_secs(NTP_RESYNC_SECS)).await;
            }
            Err(err) => {
                warn!("SNTP sync failed: {}", err);
                Timer::after(Duration::from_secs(30)).await;
            }
        }
    }
}

fn transport_error(err: reqwless::Error) -> TransportError {
    match err {
        reqwless::Error::Dns => TransportError::Dns,
        reqwless::Error::Network(_) | reqwless::Error::ConnectionAborted => {
            TransportError::Connect
        }
        reqwless::Error::Tls(_) => TransportError::Tls,
        reqwless::Error::BufferTooSmall => TransportError::BodyTooLarge,
        _ => TransportError::Request,
    }
}

async fn fetch_tariffs<'b>(
    client: &mut HttpClient<'_, TcpClient<'_, 1, 4096, 4096>, DnsSocket<'_>>,
    url: &str,
    body: &'b mut [u8],
) -> Result<&'b [u8], TransportError> {
    let mut request = client
        .request(Method::GET, url)
        .await
        .map_err(transport_error)?;
    let response = request.send(body).await.map_err(transport_error)?;
    if !response.status.is_successful() {
        return Err(TransportError::Status(response.status.0));
    }
    let body = response
        .body()
        .read_to_end()
        .await
        .map_err(transport_error)?;
    Ok(body)
}

#[embassy_executor::task]
async fn price_task(stack: Stack<'static>, tls_seed: u64) {
    let state = TCP_CLIENT_STATE.init(TcpClientState::new());
    let tcp = TcpClient::new(stack, state);
    let dns = DnsSocket::new(stack);
    let tls = TlsConfig::new(tls_seed, TLS_READ.take(), TLS_WRITE.take(), TlsVerify::None);
    let mut client = HttpClient::new_with_tls(&tcp, &dns, tls);
    let body = BODY.take();

    let policy = RefreshPolicy::default();
    let mut last_success: Option<Hour> = None;

    loop {
        stack.wait_config_up().await;
        let Some(hour) = current_hour().await else {
            Timer::after(Duration::from_secs(5)).await;
            continue;
        };

        let future_hours = PRICES.lock().await.count_future_hours(hour);
        if !policy.should_refresh(hour, last_success, future_hours) {
            Timer::after(Duration::from_secs(FETCH_POLL_SECS)).await;
            continue;
        }

        let url = match request_url(TARIFF_API_URL, hour) {
            Ok(url) => url,
            Err(err) => {
                warn!("cannot build tariff request: {}", err);
                Timer::after(Duration::from_secs(FETCH_RETRY_SECS)).await;
                continue;
            }
        };
        info!("GET {}", url);

        let fetched = match with_timeout(
            Duration::from_secs(FETCH_TIMEOUT_SECS),
            fetch_tariffs(&mut client, &url, body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        // parse outside the lock, swap under it
        match parse_fetch(fetched) {
            Ok(table) => {
                commit(&mut *PRICES.lock().await, table);
                last_success = Some(hour);
                Timer::after(Duration::from_secs(FETCH_POLL_SECS)).await;
            }
            Err(_) => Timer::after(Duration::from_secs(FETCH_RETRY_SECS)).await,
        }
    }
}

#[embassy_executor::task]
async fn debug_task(stack: Stack<'static>) {
    let mut rx_buf = [0u8; 256];
    let mut tx_buf = [0u8; 1024];
    let mut dump = heapless::String::<2048>::new();

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(err) = socket.accept(DEBUG_PORT).await {
            warn!("debug accept error: {:?}", err);
            Timer::after(Duration::from_millis(200)).await;
            continue;
        }

        dump.clear();
        let hour = current_hour().await;
        let written = {
            let prices = PRICES.lock().await;
            match hour {
                Some(hour) => writeln!(
                    dump,
                    "hour: {} ({} ahead)",
                    hour,
                    prices.count_future_hours(hour)
                ),
                None => writeln!(dump, "hour: unsynced"),
            }
            .and_then(|_| prices.write_debug(&mut dump))
        };
        if written.is_err() {
            warn!("debug dump truncated");
        }

        if let Err(err) = socket.write_all(dump.as_bytes()).await {
            warn!("debug write error: {:?}", err);
        }
        let _ = socket.flush().await;
        socket.close();
        Timer::after(Duration::from_millis(50)).await;
        socket.abort();
    }
}

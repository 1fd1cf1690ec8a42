//! WiFi bring-up, web server workers and the mDNS responder
//!
//! With build-time credentials the device joins that network as a station
//! and gets its address over DHCP. Without them, or when joining fails, it
//! opens the provisioning access point instead and serves the same pages on
//! 192.168.4.1. The access point runs no DHCP server: clients need a static
//! address in 192.168.4.0/24.

extern crate alloc;

use alloc::string::String;

use embassy_executor::Spawner;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{
    Config as NetConfig, DhcpConfig, IpAddress, IpEndpoint, Ipv4Address, Ipv4Cidr, Runner, Stack,
    StackResources, StaticConfigV4,
};
use embassy_time::{Duration, Timer, with_timeout};
use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;
use esp_radio::Controller as RadioController;
use esp_radio::wifi::{
    self, AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController, WifiDevice,
    WifiEvent,
};
use health_core::MonitorContext;
use health_core::config::{
    DEVICE_NAME, HTTP_PORT, NetworkMode, PROVISIONING_AP_ADDRESS, PROVISIONING_AP_PASSWORD,
    PROVISIONING_AP_SSID, StationCredentials,
};
use health_core::http::{MAX_REQUEST_SIZE, handle_request, request_complete};
use health_core::mdns::{self, MDNS_GROUP, MDNS_PORT};
use log::{debug, info, warn};
use static_cell::StaticCell;
use thiserror_no_std::Error;

/// Simultaneous HTTP connections; the landing page fetches two resources
pub const HTTP_WORKERS: usize = 2;

const STATION_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

static RADIO: StaticCell<RadioController<'static>> = StaticCell::new();
// HTTP workers, the mDNS socket and the DHCP client
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    #[error("radio initialization failed")]
    RadioInit,
    #[error("WiFi driver initialization failed")]
    WifiInit,
    #[error("WiFi {operation} failed")]
    Controller { operation: &'static str },
    #[error("failed to spawn {task}")]
    Spawn { task: &'static str },
}

/// How the device ended up on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    Station,
    AccessPoint,
}

/// Bring up WiFi and spawn the network, web server and mDNS tasks.
pub async fn start(
    spawner: Spawner,
    wifi_peripheral: WIFI<'static>,
    context: &'static MonitorContext,
    mode: NetworkMode<'static>,
) -> Result<ActiveMode, NetworkError> {
    let radio = esp_radio::init().map_err(|e| {
        warn!("Radio init failed: {:?}", e);
        NetworkError::RadioInit
    })?;
    let radio = RADIO.init(radio);

    let (mut controller, interfaces) =
        wifi::new(radio, wifi_peripheral, Default::default()).map_err(|e| {
            warn!("WiFi driver init failed: {:?}", e);
            NetworkError::WifiInit
        })?;

    let joined = match mode {
        NetworkMode::Station(credentials) => {
            match join_station(&mut controller, credentials).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Could not join \"{}\" ({}), opening access point", credentials.ssid, e);
                    let _ = controller.stop_async().await;
                    false
                }
            }
        }
        NetworkMode::Provisioning => {
            info!("No WiFi credentials configured");
            false
        }
    };

    let (device, net_config, active) = if joined {
        (
            interfaces.sta,
            NetConfig::dhcpv4(DhcpConfig::default()),
            ActiveMode::Station,
        )
    } else {
        open_access_point(&mut controller).await?;
        let [a, b, c, d] = PROVISIONING_AP_ADDRESS;
        let address = Ipv4Address::new(a, b, c, d);
        (
            interfaces.ap,
            NetConfig::ipv4_static(StaticConfigV4 {
                address: Ipv4Cidr::new(address, 24),
                gateway: Some(address),
                dns_servers: Default::default(),
            }),
            ActiveMode::AccessPoint,
        )
    };

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let resources = NET_RESOURCES.init(StackResources::new());
    let (stack, runner) = embassy_net::new(device, net_config, resources, seed);

    spawner
        .spawn(net_task(runner))
        .map_err(|_| NetworkError::Spawn { task: "net_task" })?;
    spawner
        .spawn(wifi_supervisor(controller, mode, active))
        .map_err(|_| NetworkError::Spawn {
            task: "wifi_supervisor",
        })?;

    info!("Spawning {} HTTP workers on port {}", HTTP_WORKERS, HTTP_PORT);
    for worker_id in 0..HTTP_WORKERS {
        spawner
            .spawn(http_worker(stack, context, worker_id))
            .map_err(|_| NetworkError::Spawn { task: "http_worker" })?;
    }

    spawner
        .spawn(mdns_task(stack))
        .map_err(|_| NetworkError::Spawn { task: "mdns_task" })?;

    Ok(active)
}

fn client_config(credentials: StationCredentials<'_>) -> ModeConfig {
    ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(String::from(credentials.ssid))
            .with_password(String::from(credentials.password)),
    )
}

async fn join_station(
    controller: &mut WifiController<'static>,
    credentials: StationCredentials<'_>,
) -> Result<(), NetworkError> {
    controller
        .set_config(&client_config(credentials))
        .map_err(|_| NetworkError::Controller {
            operation: "station configuration",
        })?;
    controller
        .start_async()
        .await
        .map_err(|_| NetworkError::Controller {
            operation: "station start",
        })?;

    for attempt in 1..=STATION_CONNECT_ATTEMPTS {
        info!(
            "Connecting to \"{}\" (attempt {}/{})",
            credentials.ssid, attempt, STATION_CONNECT_ATTEMPTS
        );
        match with_timeout(CONNECT_TIMEOUT, controller.connect_async()).await {
            Ok(Ok(())) => {
                info!("WiFi connected");
                return Ok(());
            }
            Ok(Err(e)) => warn!("WiFi connect failed: {:?}", e),
            Err(_) => warn!("WiFi connect timed out"),
        }
        Timer::after(RECONNECT_DELAY).await;
    }

    Err(NetworkError::Controller {
        operation: "station connect",
    })
}

async fn open_access_point(controller: &mut WifiController<'static>) -> Result<(), NetworkError> {
    let config = ModeConfig::AccessPoint(
        AccessPointConfig::default()
            .with_ssid(String::from(PROVISIONING_AP_SSID))
            .with_password(String::from(PROVISIONING_AP_PASSWORD))
            .with_auth_method(AuthMethod::Wpa2Personal),
    );
    controller
        .set_config(&config)
        .map_err(|_| NetworkError::Controller {
            operation: "access point configuration",
        })?;
    controller
        .start_async()
        .await
        .map_err(|_| NetworkError::Controller {
            operation: "access point start",
        })?;

    info!(
        "Access point \"{}\" up, serving on {:?}",
        PROVISIONING_AP_SSID, PROVISIONING_AP_ADDRESS
    );
    Ok(())
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await;
}

/// Keeps the link up: rejoins the station network after a drop, or logs
/// clients coming and going on the access point.
#[embassy_executor::task]
async fn wifi_supervisor(
    mut controller: WifiController<'static>,
    mode: NetworkMode<'static>,
    active: ActiveMode,
) {
    match (active, mode) {
        (ActiveMode::Station, NetworkMode::Station(credentials)) => loop {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("WiFi disconnected from \"{}\", reconnecting", credentials.ssid);
            loop {
                Timer::after(RECONNECT_DELAY).await;
                match with_timeout(CONNECT_TIMEOUT, controller.connect_async()).await {
                    Ok(Ok(())) => {
                        info!("WiFi reconnected");
                        break;
                    }
                    Ok(Err(e)) => warn!("WiFi reconnect failed: {:?}", e),
                    Err(_) => warn!("WiFi reconnect timed out"),
                }
            }
        },
        _ => loop {
            controller.wait_for_event(WifiEvent::ApStaConnected).await;
            info!("Client joined the access point");
        },
    }
}

/// Write all of `data`, looping over partial writes.
async fn write_all(socket: &mut TcpSocket<'_>, mut data: &[u8]) -> Result<(), embassy_net::tcp::Error> {
    while !data.is_empty() {
        let written = socket.write(data).await?;
        if written == 0 {
            return Err(embassy_net::tcp::Error::ConnectionReset);
        }
        data = &data[written..];
    }
    Ok(())
}

async fn handle_connection(
    socket: &mut TcpSocket<'_>,
    context: &MonitorContext,
) -> Result<(), embassy_net::tcp::Error> {
    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let mut total = 0usize;

    // Read until the end of the request head or the buffer is full.
    loop {
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            if total == 0 {
                return Ok(());
            }
            break;
        }
        total += n;
        if total >= MAX_REQUEST_SIZE || request_complete(&buf[..total]) {
            break;
        }
    }

    let response = handle_request(&buf[..total], &context.latest);
    write_all(socket, response.head().as_bytes()).await?;
    write_all(socket, response.body()).await?;
    socket.flush().await
}

#[embassy_executor::task(pool_size = HTTP_WORKERS)]
async fn http_worker(stack: Stack<'static>, context: &'static MonitorContext, worker_id: usize) {
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 2048];

    info!("HTTP worker {} starting", worker_id);

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                if let Err(e) = handle_connection(&mut socket, context).await {
                    warn!("HTTP worker {} connection error: {:?}", worker_id, e);
                }
            }
            Err(e) => {
                warn!("HTTP worker {} accept error: {:?}", worker_id, e);
                Timer::after(Duration::from_millis(200)).await;
            }
        }

        socket.close();
        socket.abort();
    }
}

#[embassy_executor::task]
async fn mdns_task(stack: Stack<'static>) {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buf = [0u8; 512];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buf = [0u8; 512];
    let mut packet = [0u8; 512];
    let mut reply = [0u8; 128];

    stack.wait_config_up().await;

    let [a, b, c, d] = MDNS_GROUP;
    let group = Ipv4Address::new(a, b, c, d);
    if let Err(e) = stack.join_multicast_group(group) {
        warn!("mDNS: failed to join multicast group: {:?}", e);
        return;
    }

    let mut socket = UdpSocket::new(stack, &mut rx_meta, &mut rx_buf, &mut tx_meta, &mut tx_buf);
    if let Err(e) = socket.bind(MDNS_PORT) {
        warn!("mDNS: bind failed: {:?}", e);
        return;
    }
    info!("mDNS responder up as {}.local", DEVICE_NAME);

    loop {
        let (len, meta) = match socket.recv_from(&mut packet).await {
            Ok(received) => received,
            Err(e) => {
                debug!("mDNS: receive error: {:?}", e);
                continue;
            }
        };

        let Some(config) = stack.config_v4() else {
            continue;
        };
        let address = config.address.address().octets();
        let Some(reply_len) = mdns::answer(&packet[..len], DEVICE_NAME, address, &mut reply) else {
            continue;
        };

        // One-shot queries from ordinary resolvers get a unicast reply.
        let destination = if meta.endpoint.port == MDNS_PORT {
            IpEndpoint::new(IpAddress::Ipv4(group), MDNS_PORT)
        } else {
            meta.endpoint
        };
        debug!("mDNS: answering {:?}", meta.endpoint);
        if let Err(e) = socket.send_to(&reply[..reply_len], destination).await {
            warn!("mDNS: send failed: {:?}", e);
        }
    }
}

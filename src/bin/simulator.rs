use clap::{App, Arg};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, error, info, warn, Level};
use turretcore::hardware::{AnalogInput, OutputPins, PinRole, SerialLink, SystemClock};
use turretcore::{SentryAgent, SentryConfig};

const DEFAULT_PORT: &str = "8080";
const OUTPUT_BROADCAST_BUFFER_SIZE: usize = 256;
const POLL_INTERVAL_MS: u64 = 2;
const STATUS_INTERVAL_MS: u64 = 5000;

/// Serial link bridged to TCP clients: inbound chunks arrive over an mpsc
/// channel, outbound lines are broadcast to every connected client.
struct ChannelSerial {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
    outbound: broadcast::Sender<String>,
}

impl SerialLink for ChannelSerial {
    type Error = Infallible;

    fn read_byte(&mut self) -> nb::Result<u8, Self::Error> {
        if self.pending.is_empty() {
            if let Ok(chunk) = self.inbound.try_recv() {
                self.pending.extend(chunk);
            }
        }
        self.pending.pop_front().ok_or(nb::Error::WouldBlock)
    }

    fn write_str(&mut self, text: &str) -> Result<(), Self::Error> {
        // No connected clients is not a link fault.
        let _ = self.outbound.send(text.to_string());
        Ok(())
    }
}

/// Proximity sensor that sees an intruder for `dwell` out of every `period`.
struct ScriptedIntruder {
    start: Instant,
    period: Duration,
    dwell: Duration,
}

impl ScriptedIntruder {
    const BACKGROUND: u16 = 150;
    const INTRUDER: u16 = 600;
}

impl AnalogInput for ScriptedIntruder {
    type Error = Infallible;

    fn read_analog(&mut self, _pin: PinRole) -> nb::Result<u16, Self::Error> {
        let phase = self.start.elapsed().as_millis() % self.period.as_millis().max(1);
        if phase < self.dwell.as_millis() {
            Ok(Self::INTRUDER)
        } else {
            Ok(Self::BACKGROUND)
        }
    }
}

/// Output pins that log every change.
#[derive(Default)]
struct TracingPins;

impl OutputPins for TracingPins {
    fn set_digital_output(&mut self, pin: PinRole, high: bool) {
        debug!(?pin, high, "digital output");
    }

    fn play_tone(&mut self, pin: PinRole, frequency_hz: u16, duration_ms: u32) {
        debug!(?pin, frequency_hz, duration_ms, "tone");
    }

    fn stop_tone(&mut self, pin: PinRole) {
        debug!(?pin, "tone stopped");
    }

    fn set_servo_position(&mut self, pulse_us: u16) {
        debug!(pulse_us, "servo");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("turret-simulator")
        .version("0.1.0")
        .about("Sentry turret simulator: control core on simulated hardware behind a TCP serial bridge")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port clients connect to")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("intruder-period")
                .long("intruder-period")
                .value_name("SECONDS")
                .help("Seconds between scripted intruder passes")
                .takes_value(true)
                .default_value("10"),
        )
        .arg(
            Arg::with_name("intruder-dwell")
                .long("intruder-dwell")
                .value_name("MS")
                .help("How long each intruder pass stays in view")
                .takes_value(true)
                .default_value("1500"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every actuator change"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let config = match matches.value_of("config") {
        Some(path) => SentryConfig::load(path)?,
        None => SentryConfig::default(),
    };
    let period_secs = matches.value_of("intruder-period").unwrap_or("10").parse::<u64>()?;
    let dwell_ms = matches.value_of("intruder-dwell").unwrap_or("1500").parse::<u64>()?;

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, _) = broadcast::channel(OUTPUT_BROADCAST_BUFFER_SIZE);

    let serial = ChannelSerial {
        inbound: inbound_rx,
        pending: VecDeque::new(),
        outbound: outbound_tx.clone(),
    };
    let sensor = ScriptedIntruder {
        start: Instant::now(),
        period: Duration::from_secs(period_secs),
        dwell: Duration::from_millis(dwell_ms),
    };

    let mut agent = SentryAgent::new(config, serial, sensor, TracingPins, SystemClock::new())?;
    agent.start();

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "serial bridge listening");
    let bridge = tokio::spawn(accept_clients(listener, inbound_tx, outbound_tx));

    let mut poll_interval = time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    poll_interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let mut status_interval = time::interval(Duration::from_millis(STATUS_INTERVAL_MS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                if let Err(e) = agent.poll() {
                    error!(error = %e, "agent poll failed");
                }
            }
            _ = status_interval.tick() => {
                match serde_json::to_string(&agent.snapshot()) {
                    Ok(json) => debug!(status = %json, "agent status"),
                    Err(e) => warn!(error = %e, "failed to serialise agent status"),
                }
                let state = agent.get_state();
                info!(mode = ?state.mode, ticks = state.tick_count, commands = state.command_count, "status");
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                break;
            }
        }
    }

    agent.stop();
    bridge.abort();
    info!("turret simulator stopped");
    Ok(())
}

async fn accept_clients(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound: broadcast::Sender<String>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "client connected");
                let inbound = inbound.clone();
                let outbound_rx = outbound.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, inbound, outbound_rx).await {
                        warn!(%addr, error = %e, "client error");
                    }
                    info!(%addr, "client disconnected");
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    mut outbound: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut reader, mut writer) = stream.into_split();

    let forward = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(line) => {
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        warn!(error = %e, "failed to forward device output");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagging, device output dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut buffer = [0u8; 256];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        if inbound.send(buffer[..n].to_vec()).is_err() {
            break;
        }
    }

    forward.abort();
    Ok(())
}

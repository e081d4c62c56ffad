use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use turretcore::monitor::{ChannelHistory, DeviceMessage, StreamSplitter};
use turretcore::protocol::{CMD_PIEZO_TEST, CMD_SET_LIGHT, CMD_SET_SERVO};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const ACK_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("turret")
        .version("0.1.0")
        .about("Operator client for the sentry turret line protocol")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Device or simulator host")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Device or simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Print the raw protocol lines")
                .global(true),
        )
        .subcommand(SubCommand::with_name("alarm").about("Sound the piezo test tone"))
        .subcommand(
            SubCommand::with_name("servo")
                .about("Move the pan servo")
                .arg(
                    Arg::with_name("position")
                        .help("Servo pulse width in microseconds (clamped by the device)")
                        .required(true)
                        .allow_hyphen_values(true)
                        .validator(|v| match v.parse::<i32>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Position must be an integer".into()),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("light")
                .about("Switch the warning light")
                .arg(
                    Arg::with_name("state")
                        .help("Light state")
                        .required(true)
                        .possible_values(&["on", "off"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("send")
                .about("Send a raw protocol line")
                .arg(
                    Arg::with_name("line")
                        .help("Line without terminator, e.g. \"20,1500\"")
                        .required(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("monitor")
                .about("Watch the device's telemetry stream")
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds (default: until Ctrl+C)")
                        .takes_value(true),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let verbose = matches.is_present("verbose");

    match matches.subcommand() {
        ("alarm", _) => {
            let line = CMD_PIEZO_TEST.to_string();
            send_and_report(host, port, &line, "Piezo test", verbose).await?;
        }
        ("servo", Some(sub_matches)) => {
            let position = sub_matches.value_of("position").unwrap_or_default();
            let line = format!("{},{}", CMD_SET_SERVO, position);
            send_and_report(host, port, &line, "Servo", verbose).await?;
        }
        ("light", Some(sub_matches)) => {
            let on = sub_matches.value_of("state") == Some("on");
            let line = format!("{},{}", CMD_SET_LIGHT, u8::from(on));
            send_and_report(host, port, &line, "Warning light", verbose).await?;
        }
        ("send", Some(sub_matches)) => {
            let line = sub_matches.value_of("line").unwrap_or_default();
            send_and_report(host, port, line, "Raw line", verbose).await?;
        }
        ("monitor", Some(sub_matches)) => {
            handle_monitor(sub_matches, host, port, verbose).await?;
        }
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

async fn send_and_report(
    host: &str,
    port: u16,
    line: &str,
    action: &str,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if verbose {
        println!("{} {};", "→".dimmed(), line.bright_white());
    }

    if send_command(host, port, line, verbose).await? == DeviceMessage::Ack {
        println!("{} {}", "✅".green(), format!("{} acknowledged", action).bright_green());
    } else {
        println!("{} {}", "❌".red(), format!("{} rejected by device", action).bright_red());
    }
    Ok(())
}

/// Sends one line and waits for its acknowledgement, skipping telemetry.
async fn send_command(
    host: &str,
    port: u16,
    line: &str,
    verbose: bool,
) -> Result<DeviceMessage, Box<dyn std::error::Error>> {
    let mut stream = connect(host, port).await?;

    match tokio::time::timeout(ACK_TIMEOUT, exchange(&mut stream, line, verbose)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            eprintln!("{} No acknowledgement within {} s", "⏰".yellow(), ACK_TIMEOUT.as_secs());
            Err("acknowledgement timeout".into())
        }
    }
}

async fn exchange(stream: &mut TcpStream, line: &str, verbose: bool) -> std::io::Result<DeviceMessage> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b";").await?;

    let mut splitter = StreamSplitter::new();
    let mut buffer = [0u8; 256];
    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "device closed connection",
            ));
        }
        for text in splitter.push(&buffer[..n]) {
            if verbose {
                println!("{} {}", "←".dimmed(), text.dimmed());
            }
            if let Ok(message) = DeviceMessage::parse(&text) {
                if message.is_ack() {
                    return Ok(message);
                }
            }
        }
    }
}

async fn handle_monitor(
    matches: &ArgMatches<'_>,
    host: &str,
    port: u16,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let duration = match matches.value_of("duration") {
        Some(secs) => Some(Duration::from_secs(secs.parse::<u64>()?)),
        None => None,
    };

    println!("{}", "📡 Monitoring turret output (Press Ctrl+C to stop)...".bright_blue().bold());
    let stream = connect(host, port).await?;

    match duration {
        Some(limit) => match tokio::time::timeout(limit, monitor_stream(stream, verbose)).await {
            Ok(result) => result?,
            Err(_) => println!("{}", "Monitor duration elapsed".dimmed()),
        },
        None => monitor_stream(stream, verbose).await?,
    }
    Ok(())
}

async fn monitor_stream(mut stream: TcpStream, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut splitter = StreamSplitter::new();
    let mut history = ChannelHistory::new();
    let mut buffer = [0u8; 1024];

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            println!("{}", "Device closed the connection".yellow());
            return Ok(());
        }

        for text in splitter.push(&buffer[..n]) {
            match DeviceMessage::parse(&text) {
                Ok(DeviceMessage::Channel { id, value }) => {
                    history.record(id, value);
                    let recent = history.values(id);
                    let average = recent.iter().map(|v| i64::from(*v)).sum::<i64>() / recent.len().max(1) as i64;
                    let value_str = if value < 0 {
                        "out of range".bright_red()
                    } else {
                        format!("{:>5}", value).bright_white()
                    };
                    println!("{} {} {} {}", format!("[{}]", id).bright_cyan(), value_str, "avg".dimmed(), average);
                }
                Ok(DeviceMessage::Ack) => println!("{}", "A".green()),
                Ok(DeviceMessage::Error) => println!("{}", "E".red()),
                Err(e) => {
                    if verbose {
                        eprintln!("{} {}", "⚠️".yellow(), e);
                    }
                }
            }
        }
    }
}

async fn connect(host: &str, port: u16) -> Result<TcpStream, Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to turret at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Nothing is listening. Start the simulator with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin turret-simulator".bright_cyan());
            } else {
                eprintln!("{} Network error: {}", "🔌".yellow(), e.to_string().bright_red());
            }
            Err(e.into())
        }
    }
}

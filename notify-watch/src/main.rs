use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use afya_notify::{
    names, InboundEvent, NotificationClient, TransportConfig, TransportKind,
};

/// Afya notification watcher
///
/// Connects to the event server, joins a hospital room or the admin room
/// and prints appointment notifications and updates until interrupted.
#[derive(Parser, Debug)]
#[command(name = "notify-watch")]
#[command(about = "Watch Afya appointment notifications in real time")]
#[command(version)]
pub struct Args {
    /// Event server address (overrides AFYA_API_URL)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Hospital id whose room to join
    #[arg(long)]
    pub hospital: Option<String>,

    /// Join the admin room
    #[arg(long)]
    pub admin: bool,

    /// Transports to try, in order (comma separated: websocket, polling)
    #[arg(long, default_value = "websocket,polling", value_delimiter = ',')]
    pub transports: Vec<String>,

    /// Stay on polling instead of upgrading to websocket
    #[arg(long)]
    pub no_upgrade: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if self.hospital.is_none() && !self.admin {
            return Err(anyhow::anyhow!(
                "Nothing to watch: pass --hospital <id> and/or --admin"
            ));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }

    /// Build the transport configuration from the environment and flags.
    pub fn transport_config(&self) -> Result<TransportConfig> {
        let transports = self
            .transports
            .iter()
            .map(|t| t.parse::<TransportKind>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()
            .context("Invalid --transports value")?;

        let mut config = TransportConfig::from_env()
            .with_transports(transports)
            .with_upgrade(!self.no_upgrade);
        if let Some(url) = &self.url {
            config = config.with_server_url(url.clone());
        }

        config.validate().context("Invalid transport configuration")?;
        Ok(config)
    }

    /// Hospital id as sent on the wire: numeric when it parses as one.
    pub fn hospital_id(&self) -> Option<afya_notify::HospitalId> {
        self.hospital.as_ref().map(|id| match id.parse::<u64>() {
            Ok(numeric) => afya_notify::HospitalId::from(numeric),
            Err(_) => afya_notify::HospitalId::from(id.as_str()),
        })
    }
}

/// Initialize tracing/logging with the specified log level
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase())),
        )
        .init();
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn print_event(event: &InboundEvent) {
    match event {
        InboundEvent::Notification(n) => println!("[{}] notification: {}", timestamp(), n.message),
        InboundEvent::Update(u) => {
            let id = u
                .appointment_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            println!(
                "[{}] update: appointment {} status {}",
                timestamp(),
                id,
                u.status.as_deref().unwrap_or("-")
            );
        }
        InboundEvent::Other { name, args } => println!(
            "[{}] {}: {}",
            timestamp(),
            name,
            serde_json::Value::Array(args.clone())
        ),
        InboundEvent::Connected => println!("[{}] connected", timestamp()),
        InboundEvent::Disconnected { reason } => println!("[{}] disconnected: {}", timestamp(), reason),
        InboundEvent::ConnectError { detail } => println!("[{}] connect error: {}", timestamp(), detail),
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.transport_config()?;
    info!("Connecting to {} via {:?}", config.server_url, config.transports);

    let client = NotificationClient::with_config(config).context("Failed to start notification client")?;
    client.connect();

    if let Some(hospital) = args.hospital_id() {
        client.join_hospital_room(hospital);
    }
    if args.admin {
        client.join_admin_room();
    }

    for event in [names::CONNECT, names::DISCONNECT, names::CONNECT_ERROR, names::RENDEZ_VOUS_UPDATE] {
        client.on(event, print_event);
    }

    let notifications = client
        .events(names::RENDEZ_VOUS_NOTIFICATION)
        .context("No session to listen on")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let rooms: Vec<String> = client.rooms().iter().map(ToString::to_string).collect();
    println!("Watching {} (Ctrl+C to quit)...", rooms.join(", "));

    while running.load(Ordering::SeqCst) {
        if let Some(event) = notifications.recv_timeout(Duration::from_millis(500)) {
            print_event(&event);
        }
    }

    info!("Shutting down");
    if !client.is_connected() {
        warn!("Connection was not up at shutdown ({})", client.state());
    }
    client.disconnect();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;
    init_tracing(&args.log_level);
    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("notify-watch").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_requires_a_room() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--admin"]).validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(parse(&["--admin", "--log-level", "loud"]).validate().is_err());
    }

    #[rstest]
    #[case(&["--admin"], vec![TransportKind::WebSocket, TransportKind::Polling])]
    #[case(&["--admin", "--transports", "polling"], vec![TransportKind::Polling])]
    #[case(&["--admin", "--transports", "polling,websocket"], vec![TransportKind::Polling, TransportKind::WebSocket])]
    fn test_transport_order(#[case] argv: &[&str], #[case] expected: Vec<TransportKind>) {
        let config = parse(argv).transport_config().unwrap();
        assert_eq!(config.transports, expected);
    }

    #[test]
    fn test_bad_transport_is_rejected() {
        assert!(parse(&["--admin", "--transports", "carrier-pigeon"])
            .transport_config()
            .is_err());
    }

    #[test]
    fn test_url_flag_overrides_environment() {
        let config = parse(&["--admin", "--url", "https://api.afya.example"])
            .transport_config()
            .unwrap();
        assert_eq!(config.server_url, "https://api.afya.example");
    }

    #[rstest]
    #[case("7", afya_notify::HospitalId::Numeric(7))]
    #[case("clinique-12", afya_notify::HospitalId::Text("clinique-12".to_string()))]
    fn test_hospital_id(#[case] raw: &str, #[case] expected: afya_notify::HospitalId) {
        assert_eq!(parse(&["--hospital", raw]).hospital_id(), Some(expected));
    }
}

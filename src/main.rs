//! tickwire load driver
//!
//! Two modes, both polling the transport once per tick:
//! - `server`: echoes every received payload back to its sender
//! - `client`: opens many clients and floods the server with fixed-size payloads
//!
//! Throughput is reported every 10 seconds.

mod cli;

use cli::{ClientSettings, Config, Mode, ServerSettings};
use std::thread;
use std::time::{Duration, Instant};
use tickwire::{Client, Event, Server, TransportConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();

    match config.mode {
        Mode::Server(settings) => run_server(settings, config.transport),
        Mode::Client(settings) => run_client(settings, config.transport),
    }
}

/// Counts messages and bytes over one reporting window.
struct Throughput {
    messages: u64,
    bytes: u64,
    since: Instant,
}

impl Throughput {
    fn new() -> Self {
        Self {
            messages: 0,
            bytes: 0,
            since: Instant::now(),
        }
    }

    fn record(&mut self, len: usize) {
        self.messages += 1;
        self.bytes += len as u64;
    }

    /// Returns `(messages/s, KB/s)` and restarts the window once it is over.
    fn take_report(&mut self) -> Option<(u64, u64)> {
        let elapsed = self.since.elapsed();
        if elapsed < REPORT_INTERVAL {
            return None;
        }
        let millis = elapsed.as_millis().max(1) as u64;
        let report = (
            self.messages * 1000 / millis,
            self.bytes * 1000 / (millis * 1024),
        );
        *self = Self::new();
        Some(report)
    }
}

fn tick_duration(frequency: u32) -> Duration {
    Duration::from_secs(1) / frequency.max(1)
}

fn run_server(
    settings: ServerSettings,
    transport: TransportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::new(transport);
    server.start(settings.port)?;
    info!(
        port = settings.port,
        frequency = settings.frequency,
        "Started echo server"
    );

    let tick = tick_duration(settings.frequency);
    let mut received = Throughput::new();

    loop {
        while let Some(event) = server.next_event() {
            match event {
                Event::Data(id, payload) => {
                    received.record(payload.len());
                    if let Err(e) = server.send(id, payload) {
                        warn!(conn_id = id, error = %e, "Echo failed");
                    }
                }
                Event::Error(id, e) => warn!(conn_id = id, error = %e, "Server error"),
                Event::Connected(_) | Event::Disconnected(_) => {}
            }
        }

        thread::sleep(tick);

        if let Some((messages, kbps)) = received.take_report() {
            info!(
                connections = server.connection_count(),
                msgs_per_sec = messages,
                kb_per_sec = kbps,
                "Server in/out"
            );
        }
    }
}

fn run_client(
    settings: ClientSettings,
    transport: TransportConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let clients: Vec<Client> = (0..settings.clients)
        .map(|_| Client::new(transport.clone()))
        .collect();
    for client in &clients {
        client.connect(&settings.host, settings.port)?;
    }
    info!(
        host = %settings.host,
        port = settings.port,
        clients = settings.clients,
        message_size = settings.message_size,
        messages_per_tick = settings.messages_per_tick,
        frequency = settings.frequency,
        "Started clients"
    );

    let payload = bytes::Bytes::from(vec![0xAB; settings.message_size]);
    let tick = tick_duration(settings.frequency);
    let mut sent = Throughput::new();
    let mut received = Throughput::new();

    loop {
        for client in &clients {
            if client.is_connected() {
                for _ in 0..settings.messages_per_tick {
                    // Cloning `Bytes` only bumps a reference count.
                    if client.send(payload.clone()).is_ok() {
                        sent.record(payload.len());
                    }
                }
            }

            while let Some(event) = client.next_event() {
                match event {
                    Event::Data(_, data) => received.record(data.len()),
                    Event::Error(_, e) => warn!(error = %e, "Client failed to connect"),
                    Event::Disconnected(_) => warn!("Client was disconnected"),
                    Event::Connected(_) => {}
                }
            }
        }

        thread::sleep(tick);

        if let Some((out_msgs, out_kbps)) = sent.take_report() {
            let (in_msgs, in_kbps) = received.take_report().unwrap_or_default();
            let connected = clients.iter().filter(|c| c.is_connected()).count();
            info!(
                connected,
                out_msgs_per_sec = out_msgs,
                out_kb_per_sec = out_kbps,
                in_msgs_per_sec = in_msgs,
                in_kb_per_sec = in_kbps,
                "Client out/in"
            );
        }
    }
}

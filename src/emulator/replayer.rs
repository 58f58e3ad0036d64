//! Data unit emulator.
//!
//! Replays a recorded flight file onto the network, one row per datagram at a fixed pace, so
//! the receiver can be exercised without an aircraft.

use std::borrow::Cow;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use rust_embed::RustEmbed;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::configuration::types::EmulatorConfig;
use crate::error_handling::types::EmulatorError;

/// Flight files shipped with the crate.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/data/"]
struct SampleData;

pub const EXAMPLE_DATA: &str = "example_data.csv";

/// Where the rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaySource {
    /// The example flight bundled into the binary
    Bundled,
    File(PathBuf),
}

impl ReplaySource {
    pub fn load(&self) -> Result<Cow<'static, str>, EmulatorError> {
        match self {
            ReplaySource::Bundled => {
                let file = SampleData::get(EXAMPLE_DATA).ok_or_else(|| {
                    EmulatorError::SourceUnavailable(format!("{} is not bundled", EXAMPLE_DATA))
                })?;
                match file.data {
                    Cow::Borrowed(bytes) => std::str::from_utf8(bytes)
                        .map(Cow::Borrowed)
                        .map_err(|e| EmulatorError::SourceUnavailable(e.to_string())),
                    Cow::Owned(bytes) => String::from_utf8(bytes)
                        .map(Cow::Owned)
                        .map_err(|e| EmulatorError::SourceUnavailable(e.to_string())),
                }
            }
            ReplaySource::File(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|e| EmulatorError::SourceUnavailable(format!("{}: {}", path.display(), e))),
        }
    }
}

impl fmt::Display for ReplaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaySource::Bundled => write!(f, "bundled {}", EXAMPLE_DATA),
            ReplaySource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every row was sent.
    Completed { sent: usize },
    /// The interrupt arrived first.
    Interrupted { sent: usize },
}

/// Rows of a flight file as they go on the wire.
///
/// The file is read as comma separated values and each record is sent as its fields joined
/// with `,`. Quoting is resolved on the way, so `"a,b",c` goes out as `a,b,c` and a quoted
/// field may span lines. Blank records are skipped.
pub fn rows(content: &str) -> Result<Vec<String>, EmulatorError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            EmulatorError::SourceUnavailable(format!("record {}: {}", index + 1, e))
        })?;
        let row = record.iter().collect::<Vec<_>>().join(",");
        if !row.trim().is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Resolves once `interrupt` reads `true`; never resolves if its sender is gone.
async fn interrupted(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone)]
pub struct Replayer {
    source: ReplaySource,
    destination_host: String,
    port: u16,
    interval: Duration,
    broadcast: bool,
}

impl Replayer {
    pub fn new(config: &EmulatorConfig) -> Self {
        Self {
            source: config
                .source
                .clone()
                .map(ReplaySource::File)
                .unwrap_or(ReplaySource::Bundled),
            destination_host: config.destination_host.clone(),
            port: config.port,
            interval: config.interval(),
            broadcast: config.broadcast,
        }
    }

    pub fn source(&self) -> &ReplaySource {
        &self.source
    }

    pub async fn resolve_destination(&self) -> Result<SocketAddr, EmulatorError> {
        let mut candidates = tokio::net::lookup_host((self.destination_host.as_str(), self.port))
            .await
            .map_err(|e| {
                EmulatorError::AddressResolution(format!("{}: {}", self.destination_host, e))
            })?
            .collect::<Vec<_>>();
        candidates.sort_by_key(|addr| !addr.is_ipv4());
        candidates.into_iter().next().ok_or_else(|| {
            EmulatorError::AddressResolution(format!("no address for {}", self.destination_host))
        })
    }

    /// Sends every row of the source, pausing `interval` after each one.
    ///
    /// Setting `interrupt` to `true` ends the replay before the next row, also in the middle
    /// of a pause.
    pub async fn run(
        &self,
        mut interrupt: watch::Receiver<bool>,
    ) -> Result<ReplayOutcome, EmulatorError> {
        let rows = rows(&self.source.load()?)?;
        let destination = self.resolve_destination().await?;

        let bind_addr = if destination.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(EmulatorError::SockError)?;
        socket
            .set_broadcast(self.broadcast)
            .map_err(EmulatorError::SockError)?;

        info!("stream {} to {}", self.source, destination);

        let mut sent = 0usize;
        for row in &rows {
            if *interrupt.borrow() {
                info!("transmission stopped after {} row(s)", sent);
                return Ok(ReplayOutcome::Interrupted { sent });
            }

            socket
                .send_to(row.as_bytes(), destination)
                .await
                .map_err(EmulatorError::SockError)?;
            sent += 1;
            debug!("Sent: {}", row);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = interrupted(&mut interrupt) => {
                    info!("transmission stopped after {} row(s)", sent);
                    return Ok(ReplayOutcome::Interrupted { sent });
                }
            }
        }

        info!("full file sent ({} row(s))", sent);
        Ok(ReplayOutcome::Completed { sent })
    }
}

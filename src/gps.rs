/// Location providers for tagging wardrive detections.
///
/// A provider is asked once per iteration. Failures are tolerated by the
/// caller: the iteration simply runs without a position.
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::LocationError;
use crate::scanner::Location;

/// Position used when no receiver is available.
pub const SIMULATED_LOCATION: Location = Location::new(47.6062, -122.3321);

/// Default gpsd endpoint.
pub const GPSD_DEFAULT_ADDR: &str = "127.0.0.1:2947";

/// Lines read from gpsd before giving up on a fix.
const GPSD_MAX_LINES: usize = 32;

#[async_trait]
pub trait LocationProvider: Send {
    async fn locate(&mut self) -> Result<Location, LocationError>;
}

#[async_trait]
impl<F> LocationProvider for F
where
    F: FnMut() -> Result<Location, LocationError> + Send,
{
    async fn locate(&mut self) -> Result<Location, LocationError> {
        (*self)()
    }
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Location);

impl Default for FixedLocation {
    fn default() -> Self {
        Self(SIMULATED_LOCATION)
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn locate(&mut self) -> Result<Location, LocationError> {
        Ok(self.0)
    }
}

// ── gpsd ───────────────────────────────────────────────────────────────

/// Queries a gpsd daemon over its JSON socket protocol.
///
/// Each call opens a fresh connection, enables watching, polls, and takes
/// the first report that carries both latitude and longitude.
#[derive(Debug, Clone)]
pub struct GpsdClient {
    addr: String,
    timeout: Duration,
}

impl GpsdClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn query(&self) -> Result<Location, LocationError> {
        let stream = TcpStream::connect(self.addr.as_str()).await?;
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"?WATCH={\"enable\":true,\"json\":true};\n?POLL;\n")
            .await?;

        let mut lines = BufReader::new(read_half).lines();
        for _ in 0..GPSD_MAX_LINES {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if let Some(fix) = parse_gpsd_line(&line) {
                return Ok(fix);
            }
        }
        Err(LocationError::NoFix)
    }
}

impl Default for GpsdClient {
    fn default() -> Self {
        Self::new(GPSD_DEFAULT_ADDR, Duration::from_secs(2))
    }
}

#[async_trait]
impl LocationProvider for GpsdClient {
    async fn locate(&mut self) -> Result<Location, LocationError> {
        match tokio::time::timeout(self.timeout, self.query()).await {
            Ok(result) => result,
            Err(_) => {
                log::debug!("gpsd at {} did not answer within {:?}", self.addr, self.timeout);
                Err(LocationError::NoFix)
            }
        }
    }
}

#[derive(Deserialize)]
struct Tpv {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl Tpv {
    fn fix(&self) -> Option<Location> {
        Some(Location::new(self.lat?, self.lon?))
    }
}

#[derive(Deserialize)]
#[serde(tag = "class")]
enum GpsdReport {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(rename = "POLL")]
    Poll {
        #[serde(default)]
        tpv: Vec<Tpv>,
    },
    #[serde(other)]
    Other,
}

/// Extract a position from one gpsd JSON report line.
///
/// `TPV` reports and the `tpv` array of `POLL` responses are used; every
/// other class, and reports without a 2D fix, yield `None`.
pub fn parse_gpsd_line(line: &str) -> Option<Location> {
    match serde_json::from_str::<GpsdReport>(line.trim()).ok()? {
        GpsdReport::Tpv(tpv) => tpv.fix(),
        GpsdReport::Poll { tpv } => tpv.iter().find_map(Tpv::fix),
        GpsdReport::Other => None,
    }
}

//! Fallback backend: classic inquiry through `hcitool scan`.
//!
//! The inquiry is bounded with coreutils `timeout`, which keeps whatever
//! `hcitool` printed before the deadline. Output looks like:
//!
//! ```text
//! Scanning ...
//! 	98:D3:31:F5:1A:2B	HC-05
//! 	00:1A:7D:DA:71:13	n/a
//! ```
//!
//! Inquiry results carry no signal strength and no service list, so every
//! device gets [`INQUIRY_RSSI`] and an empty service set.
use std::time::Duration;

use async_trait::async_trait;

use super::{DeviceObservation, ScanBackend};
use crate::error::ScanError;
use crate::host::{CommandRunner, Privilege};

/// Placeholder RSSI for inquiry results (signal strength unavailable).
pub const INQUIRY_RSSI: i16 = -70;

/// Time-boxed `hcitool scan` on one HCI interface.
pub struct HcitoolBackend<R> {
    runner: R,
    interface: String,
    privilege: Privilege,
}

impl<R: CommandRunner> HcitoolBackend<R> {
    pub fn new(runner: R, interface: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            runner,
            interface: interface.into(),
            privilege: Privilege { use_sudo },
        }
    }
}

#[async_trait]
impl<R: CommandRunner> ScanBackend for HcitoolBackend<R> {
    fn name(&self) -> &'static str {
        "hcitool"
    }

    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceObservation>, ScanError> {
        // Inquiry needs the interface discoverable; failure here is not fatal.
        let (program, args) = self
            .privilege
            .command("hciconfig", &[&self.interface, "piscan"]);
        if let Err(e) = self.runner.run(program, &args).await {
            log::debug!("hciconfig piscan before inquiry failed: {e}");
        }

        let secs = duration.as_secs().max(1).to_string();
        let output = self
            .runner
            .run(
                "timeout",
                &[&secs, "hcitool", "-i", &self.interface, "scan"],
            )
            .await?;

        if !output.success && output.stdout.trim().is_empty() {
            log::debug!("hcitool scan produced no output: {}", output.stderr.trim());
        }

        let devices = parse_inquiry_output(&output.stdout);
        log::debug!("hcitool inquiry: {} device(s)", devices.len());
        Ok(devices)
    }
}

/// Parse `hcitool scan` output into observations.
///
/// Each device line is `<address>\t<name>` after trimming; the header and
/// any line without both columns is skipped.
pub fn parse_inquiry_output(output: &str) -> Vec<DeviceObservation> {
    output.lines().filter_map(parse_inquiry_line).collect()
}

fn parse_inquiry_line(line: &str) -> Option<DeviceObservation> {
    let mut columns = line.trim().split('\t');
    let address = columns.next()?.trim();
    let name = columns.next()?.trim();
    if address.is_empty() {
        return None;
    }
    Some(DeviceObservation::new(
        address,
        Some(name),
        Some(INQUIRY_RSSI),
        Vec::<String>::new(),
    ))
}

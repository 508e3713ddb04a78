// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! OpenMetrics exposition of the telemetry store
//!
//! Series are built from a store snapshot into a fresh registry on every
//! scrape, so a device's series always mirrors its latest record. The
//! Prometheus text encoder output is then lifted to OpenMetrics by adding
//! `# UNIT` lines and the `# EOF` terminator.

use nepserver::Snapshot;
use prometheus::{Encoder, GaugeVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{GatewayError, Result};

/// Content type of [`encode_metrics`] output
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Current AC output power per inverter
pub const WATT_METRIC: &str = "nepserver_watt";

/// Unix time of the last accepted frame per inverter
pub const LAST_SEEN_METRIC: &str = "nepserver_last_seen_timestamp_seconds";

const SERIAL_LABEL: &str = "serial_number";

/// Metric families and their OpenMetrics unit
const UNITS: [(&str, &str); 2] = [(WATT_METRIC, "watt"), (LAST_SEEN_METRIC, "seconds")];

/// Encode a snapshot as OpenMetrics text
pub fn encode_metrics(snapshot: &Snapshot) -> Result<String> {
    let registry = Registry::new();

    let watt = IntGaugeVec::new(
        Opts::new(WATT_METRIC, "Current AC output power reported by the inverter"),
        &[SERIAL_LABEL],
    )?;
    let last_seen = GaugeVec::new(
        Opts::new(LAST_SEEN_METRIC, "Time the last frame from the inverter was received"),
        &[SERIAL_LABEL],
    )?;
    registry.register(Box::new(watt.clone()))?;
    registry.register(Box::new(last_seen.clone()))?;

    for (serial_number, record) in snapshot.iter() {
        let label = serial_number.to_string();
        watt.with_label_values(&[label.as_str()])
            .set(i64::from(record.reading.power_watts));
        last_seen
            .with_label_values(&[label.as_str()])
            .set(record.received_at.timestamp() as f64);
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    let text = String::from_utf8(buffer).map_err(|e| GatewayError::Metrics(e.to_string()))?;

    Ok(to_openmetrics(&text))
}

/// Insert `# UNIT` after each known `# TYPE` line and terminate with `# EOF`
fn to_openmetrics(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        out.push_str(line);
        out.push('\n');

        let family = line
            .strip_prefix("# TYPE ")
            .and_then(|rest| rest.split_whitespace().next());
        if let Some(family) = family {
            if let Some((_, unit)) = UNITS.iter().find(|(name, _)| *name == family) {
                out.push_str(&format!("# UNIT {} {}\n", family, unit));
            }
        }
    }
    out.push_str("# EOF\n");
    out
}

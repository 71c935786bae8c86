//! Periodic gauge sampler.
//!
//! Queries every configured gauge once per cycle and writes one JSON line
//! per reading. A failed query is recorded in its reading and never stops
//! the cycle.

use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mechanic_obd::{ObdInterface, Transport, format_reading};
use serde::Serialize;
use tokio::time;

use crate::config::GaugeConfig;

/// One sampled gauge value.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub gauge: String,
    pub pid: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Query each gauge once, in order.
pub async fn sample_gauges<T: Transport>(
    iface: &mut ObdInterface<T>,
    gauges: &[GaugeConfig],
) -> Vec<Reading> {
    let mut readings = Vec::with_capacity(gauges.len());

    for gauge in gauges {
        let result = iface.query_float(gauge.pid, gauge.min, gauge.max).await;
        let mut reading = Reading {
            gauge: gauge.name.clone(),
            pid: gauge.pid,
            value: None,
            text: None,
            error: None,
            timestamp: Utc::now(),
        };

        match result {
            Ok(value) => {
                reading.value = Some(value);
                match format_reading(&gauge.format, value) {
                    Ok(text) => reading.text = Some(text),
                    Err(e) => reading.error = Some(e.to_string()),
                }
            }
            Err(e) => {
                tracing::warn!(gauge = %gauge.name, pid = gauge.pid, error = %e, "gauge query failed");
                reading.error = Some(e.to_string());
            }
        }
        readings.push(reading);
    }

    readings
}

/// Write readings as newline-delimited JSON.
pub fn emit(readings: &[Reading], out: &mut impl Write) -> anyhow::Result<()> {
    for reading in readings {
        serde_json::to_writer(&mut *out, reading)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Run the sampling loop, one cycle every `interval`.
///
/// This function runs forever until the task is cancelled.
pub async fn run<T: Transport>(
    iface: &mut ObdInterface<T>,
    gauges: &[GaugeConfig],
    interval: Duration,
    out: &mut impl Write,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let readings = sample_gauges(iface, gauges).await;
        let failed = readings.iter().filter(|r| !r.is_ok()).count();
        if let Err(e) = emit(&readings, out) {
            tracing::warn!(error = %e, "failed to write readings");
        } else {
            tracing::debug!(count = readings.len(), failed, "sampling cycle done");
        }
    }
}

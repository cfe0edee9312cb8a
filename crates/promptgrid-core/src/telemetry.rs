use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub const DISABLE_TELEMETRY_ENV: &str = "PROMPTGRID_DISABLE_TELEMETRY";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: Value,
}

#[async_trait]
pub trait Telemetry: Send + Sync {
    fn record(&self, name: &str, properties: Value);

    /// Shown at most once per process.
    fn maybe_show_notice(&self);

    /// Flush recorded events. Failures are the caller's to log.
    async fn send(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

#[async_trait]
impl Telemetry for NoopTelemetry {
    fn record(&self, _name: &str, _properties: Value) {}

    fn maybe_show_notice(&self) {}

    async fn send(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps events in memory and flushes them to the `tracing` pipeline.
#[derive(Debug)]
pub struct TracingTelemetry {
    disabled: bool,
    notice_shown: AtomicBool,
    events: Mutex<Vec<TelemetryEvent>>,
}

impl TracingTelemetry {
    pub fn new() -> Self {
        Self::with_disabled(std::env::var_os(DISABLE_TELEMETRY_ENV).is_some())
    }

    pub fn with_disabled(disabled: bool) -> Self {
        Self {
            disabled,
            notice_shown: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn pending(&self) -> Vec<TelemetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for TracingTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Telemetry for TracingTelemetry {
    fn record(&self, name: &str, properties: Value) {
        if self.disabled {
            return;
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(TelemetryEvent { name: name.to_string(), properties });
        }
    }

    fn maybe_show_notice(&self) {
        if self.disabled || self.notice_shown.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            "anonymous usage events are recorded; set {}=1 to turn this off",
            DISABLE_TELEMETRY_ENV
        );
    }

    async fn send(&self) -> anyhow::Result<()> {
        let events = {
            let mut events = self
                .events
                .lock()
                .map_err(|_| anyhow::anyhow!("telemetry buffer poisoned"))?;
            std::mem::take(&mut *events)
        };
        for event in events {
            tracing::debug!(event = %event.name, properties = %event.properties, "telemetry");
        }
        Ok(())
    }
}

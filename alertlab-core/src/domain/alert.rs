//! Alert — an external signal naming an instrument and a trigger time.

use serde::{Deserialize, Serialize};

/// A single alert. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub instrument: String,
    /// Trigger time in milliseconds since the Unix epoch (UTC).
    pub trigger_ms: i64,
    /// Caller / channel label that produced the alert.
    pub source: String,
    /// Price quoted by the alert source, when it carried one.
    #[serde(default)]
    pub alert_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

impl Alert {
    pub fn new(instrument: impl Into<String>, trigger_ms: i64, source: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            trigger_ms,
            source: source.into(),
            alert_price: None,
            market_cap: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.alert_price = Some(price);
        self
    }
}

/// True when alerts are in non-decreasing trigger order.
pub fn is_time_ordered(alerts: &[Alert]) -> bool {
    alerts.windows(2).all(|w| w[0].trigger_ms <= w[1].trigger_ms)
}

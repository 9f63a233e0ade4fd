//! Domain types: candles, alerts, positions, trade records.

pub mod alert;
pub mod candle;
pub mod position;
pub mod trade;

pub use alert::{is_time_ordered, Alert};
pub use candle::{first_at_or_after, is_strictly_ordered, Candle, CandleSource};
pub use position::{ExitReason, PartialFill, Phase, Position, PositionError};
pub use trade::{giveback_pct, TradeMetrics, TradeRecord, HIT_THRESHOLDS};

//! Risk-based position sizing.

/// Capital to commit to one trade.
///
/// # Formula
/// ```text
/// risk_size = max_risk_per_trade / (1 - sl_mult)
/// size      = min(risk_size, max_allocation_pct * free_cash, free_cash)
/// ```
///
/// A stop at `sl_mult` loses `1 - sl_mult` of the position, so `risk_size`
/// is the largest position whose stop-out costs exactly `max_risk_per_trade`.
///
/// # Example
/// - Stop at 0.5× entry, max risk 200: risk size 400
/// - 4% of 10 000 free cash: 400
/// - Size: 400
pub fn position_size(max_risk_per_trade: f64, sl_mult: f64, max_allocation_pct: f64, free_cash: f64) -> f64 {
    let free_cash = free_cash.max(0.0);
    let stop_distance = 1.0 - sl_mult;
    let risk_size = if stop_distance > 0.0 {
        max_risk_per_trade / stop_distance
    } else {
        free_cash
    };
    risk_size.min(max_allocation_pct * free_cash).min(free_cash).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worked_example() {
        assert!((position_size(200.0, 0.5, 0.04, 10_000.0) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn allocation_cap_binds() {
        // Risk size 1000, allocation 2% of 10 000 = 200.
        assert!((position_size(200.0, 0.8, 0.02, 10_000.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn never_exceeds_free_cash() {
        assert!((position_size(200.0, 0.5, 1.0, 150.0) - 150.0).abs() < 1e-9);
        assert_eq!(position_size(200.0, 0.5, 1.0, -5.0), 0.0);
    }
}

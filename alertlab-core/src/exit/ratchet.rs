/// Stop ratchet for long positions.
///
/// **Core rule:** a ratcheting stop may tighten (rise), never loosen. A
/// non-ratcheting stop accepts every proposed level, which is how static
/// stops are re-anchored on a phase change.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRatchet {
    level: f64,
    ratcheting: bool,
}

impl StopRatchet {
    /// A stop that only ever rises.
    pub fn ratcheting(initial_level: f64) -> Self {
        Self {
            level: initial_level,
            ratcheting: true,
        }
    }

    /// A stop that follows whatever level it is given.
    pub fn fixed(initial_level: f64) -> Self {
        Self {
            level: initial_level,
            ratcheting: false,
        }
    }

    /// Apply a proposed level and return the level now in force.
    ///
    /// # Example
    /// ```
    /// use alertlab_core::exit::StopRatchet;
    ///
    /// let mut stop = StopRatchet::ratcheting(0.5);
    /// assert_eq!(stop.apply(0.8), 0.8);
    /// // Loosening is blocked.
    /// assert_eq!(stop.apply(0.6), 0.8);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if !proposed.is_finite() {
            return self.level;
        }
        self.level = if self.ratcheting {
            self.level.max(proposed)
        } else {
            proposed
        };
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn is_ratcheting(&self) -> bool {
        self.ratcheting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tightening_allowed() {
        let mut stop = StopRatchet::ratcheting(0.5);
        assert_eq!(stop.apply(0.7), 0.7);
        assert_eq!(stop.level(), 0.7);
    }

    #[test]
    fn loosening_blocked() {
        let mut stop = StopRatchet::ratcheting(0.7);
        assert_eq!(stop.apply(0.4), 0.7);
    }

    #[test]
    fn fixed_stop_follows_proposal() {
        let mut stop = StopRatchet::fixed(0.7);
        assert!(!stop.is_ratcheting());
        assert_eq!(stop.apply(0.4), 0.4);
    }

    #[test]
    fn nan_proposal_ignored() {
        let mut stop = StopRatchet::fixed(0.7);
        assert_eq!(stop.apply(f64::NAN), 0.7);
    }
}

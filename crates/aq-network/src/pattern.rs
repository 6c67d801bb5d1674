//! Time patterns: cyclic multiplier sequences.

/// A cyclic sequence of multipliers, one per pattern period.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub name: String,
    factors: Vec<f64>,
}

impl Pattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factors: Vec::new(),
        }
    }

    pub fn add_factor(&mut self, f: f64) {
        self.factors.push(f);
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    /// Multiplier for the given pattern period (wraps cyclically).
    /// An empty pattern acts as the identity.
    pub fn factor_at(&self, period: usize) -> f64 {
        if self.factors.is_empty() {
            1.0
        } else {
            self.factors[period % self.factors.len()]
        }
    }

    /// Multiplier in effect at simulation time `t`, given the pattern
    /// period length in seconds.
    pub fn current_factor(&self, t: u64, pattern_step: u64) -> f64 {
        let period = (t / pattern_step.max(1)) as usize;
        self.factor_at(period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_is_identity() {
        let p = Pattern::new("p");
        assert_eq!(p.factor_at(0), 1.0);
        assert_eq!(p.current_factor(7200, 3600), 1.0);
    }

    #[test]
    fn factors_cycle() {
        let mut p = Pattern::new("p");
        p.add_factor(0.5);
        p.add_factor(1.5);
        assert_eq!(p.factor_at(0), 0.5);
        assert_eq!(p.factor_at(1), 1.5);
        assert_eq!(p.factor_at(2), 0.5);
    }

    #[test]
    fn current_factor_uses_period_length() {
        let mut p = Pattern::new("p");
        p.add_factor(1.0);
        p.add_factor(2.0);
        assert_eq!(p.current_factor(0, 3600), 1.0);
        assert_eq!(p.current_factor(3599, 3600), 1.0);
        assert_eq!(p.current_factor(3600, 3600), 2.0);
    }
}

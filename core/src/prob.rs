//! Probability arithmetic shared by every stochastic decision.
//!
//! Risk effects compose additively in log-odds space, so any number of
//! deltas keeps the resulting probability inside [0, 1]. Hazards compose
//! additively in rate space.

/// A probability expressed as log-odds, `ln(p / (1 - p))`.
///
/// `p = 0` and `p = 1` map to negative and positive infinity and survive
/// any finite shift unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogOdds(f64);

impl LogOdds {
    pub fn from_prob(p: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&p), "probability {p} outside [0, 1]");
        Self((p / (1.0 - p)).ln())
    }

    /// Add a logit delta.
    pub fn shift(self, delta: f64) -> Self {
        Self(self.0 + delta)
    }

    /// Add every delta yielded by `deltas`.
    pub fn shift_all<I: IntoIterator<Item = f64>>(self, deltas: I) -> Self {
        deltas.into_iter().fold(self, LogOdds::shift)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn prob(self) -> f64 {
        1.0 / (1.0 + (-self.0).exp())
    }
}

/// Scale a treatment multiplier by a regimen's response factor.
///
/// A response factor of 1 gives the full table multiplier, 0 gives no
/// treatment effect at all.
pub fn effective_multiplier(response_factor: f64, table_multiplier: f64) -> f64 {
    1.0 - response_factor * (1.0 - table_multiplier)
}

/// Apply a multiplier to a probability, clamped back into [0, 1].
pub fn scale_prob(p: f64, multiplier: f64) -> f64 {
    (p * multiplier).clamp(0.0, 1.0)
}

/// Convert a per-period probability into a constant hazard rate.
pub fn prob_to_rate(p: f64) -> f64 {
    -(1.0 - p).ln()
}

/// Convert a hazard rate over one period into an event probability.
pub fn rate_to_prob(rate: f64) -> f64 {
    1.0 - (-rate).exp()
}

use crate::error::{EngineError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;

/// One control point of the isotonic/PCHIP fit plus its Beta-posterior inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationBucket {
    pub price: f64,
    pub point_estimate: f64,
    pub observed_wins: u64,
    pub observed_n: u64,
    pub band_label: String,
}

/// Pre-fit calibration artifact: monotone point estimator control points plus
/// per-bucket win/loss counts for the Bayesian lower bound. Loaded once per
/// process and memoized; a pure function after load.
#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationArtifact {
    pub buckets: Vec<CalibrationBucket>,
    pub domain_min: f64,
    pub domain_max: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct WinRateEstimate {
    pub point_estimate: Decimal,
    pub lower_bound: Decimal,
}

impl CalibrationArtifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let artifact: Self = serde_json::from_str(&raw)?;
        Ok(artifact)
    }

    /// Returns `(point_estimate, lower_bound, band_label)` for `price`.
    /// Outside the fitted domain, both estimates are zero (no edge).
    pub fn estimate(&self, price: Decimal, confidence: Decimal) -> (WinRateEstimate, String) {
        let price_f = price.to_f64().unwrap_or(0.0);
        if price_f <= self.domain_min || price_f >= self.domain_max || self.buckets.is_empty() {
            return (
                WinRateEstimate {
                    point_estimate: Decimal::ZERO,
                    lower_bound: Decimal::ZERO,
                },
                "out_of_domain".to_string(),
            );
        }

        let nearest = self
            .buckets
            .iter()
            .min_by(|a, b| {
                (a.price - price_f)
                    .abs()
                    .partial_cmp(&(b.price - price_f).abs())
                    .unwrap()
            })
            .expect("buckets checked non-empty above");

        let point_estimate = interpolate_point_estimate(&self.buckets, price_f);
        let lower_bound = beta_lower_bound(
            nearest.observed_wins,
            nearest.observed_n,
            confidence.to_f64().unwrap_or(0.90),
        );

        (
            WinRateEstimate {
                point_estimate: Decimal::from_f64_retain(point_estimate).unwrap_or(Decimal::ZERO),
                lower_bound: Decimal::from_f64_retain(lower_bound.min(point_estimate))
                    .unwrap_or(Decimal::ZERO),
            },
            nearest.band_label.clone(),
        )
    }
}

/// Shape-preserving piecewise-linear interpolation between adjacent control
/// points. Stands in for the artifact's richer PCHIP fit at evaluation time;
/// the artifact itself is pre-fit offline and carries only (price, point_estimate).
fn interpolate_point_estimate(buckets: &[CalibrationBucket], price: f64) -> f64 {
    let mut sorted: Vec<&CalibrationBucket> = buckets.iter().collect();
    sorted.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

    if price <= sorted[0].price {
        return sorted[0].point_estimate;
    }
    if price >= sorted[sorted.len() - 1].price {
        return sorted[sorted.len() - 1].point_estimate;
    }

    for pair in sorted.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if price >= lo.price && price <= hi.price {
            let span = hi.price - lo.price;
            if span.abs() < f64::EPSILON {
                return lo.point_estimate;
            }
            let t = (price - lo.price) / span;
            return lo.point_estimate + t * (hi.point_estimate - lo.point_estimate);
        }
    }
    sorted[sorted.len() - 1].point_estimate
}

/// One-sided Beta(alpha, beta) posterior lower bound at `confidence`, via the
/// normal approximation to the Beta distribution. Adequate for the bucket
/// sample sizes this artifact is fit on; avoids pulling in a numerics crate
/// for a single inverse-incomplete-beta lookup.
fn beta_lower_bound(wins: u64, n: u64, confidence: f64) -> f64 {
    let alpha = wins as f64 + 1.0;
    let beta = (n - wins.min(n)) as f64 + 1.0;
    let mean = alpha / (alpha + beta);
    let var = (alpha * beta) / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
    let sd = var.sqrt();
    let z = z_score_for_confidence(confidence);
    (mean - z * sd).max(0.0).min(1.0)
}

fn z_score_for_confidence(confidence: f64) -> f64 {
    // One-sided z for common confidence levels; falls back to the 90% value.
    if confidence >= 0.99 {
        2.326
    } else if confidence >= 0.95 {
        1.645
    } else if confidence >= 0.90 {
        1.282
    } else {
        0.84
    }
}

static ARTIFACT: OnceLock<CalibrationArtifact> = OnceLock::new();

/// Load the calibration artifact once per process and memoize it.
pub fn load_once(path: impl AsRef<Path>) -> Result<&'static CalibrationArtifact> {
    if let Some(a) = ARTIFACT.get() {
        return Ok(a);
    }
    let artifact = CalibrationArtifact::load(path)?;
    Ok(ARTIFACT.get_or_init(|| artifact))
}

/// Contract entry point: `estimate(price) -> {point_estimate, lower_bound, band_label}`.
pub fn estimate(
    artifact: &CalibrationArtifact,
    price: Decimal,
    confidence: Decimal,
) -> Result<(WinRateEstimate, String)> {
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Err(EngineError::Validation(format!(
            "calibration price out of (0,1): {price}"
        )));
    }
    Ok(artifact.estimate(price, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixture() -> CalibrationArtifact {
        CalibrationArtifact {
            domain_min: 0.15,
            domain_max: 0.99,
            buckets: vec![
                CalibrationBucket {
                    price: 0.20,
                    point_estimate: 0.25,
                    observed_wins: 40,
                    observed_n: 100,
                    band_label: "long_shot".into(),
                },
                CalibrationBucket {
                    price: 0.50,
                    point_estimate: 0.55,
                    observed_wins: 220,
                    observed_n: 400,
                    band_label: "sweet_spot".into(),
                },
                CalibrationBucket {
                    price: 0.80,
                    point_estimate: 0.82,
                    observed_wins: 410,
                    observed_n: 500,
                    band_label: "favorite".into(),
                },
            ],
        }
    }

    #[test]
    fn price_outside_domain_has_no_edge() {
        let a = fixture();
        let (est, label) = a.estimate(dec!(0.05), dec!(0.90));
        assert_eq!(est.point_estimate, Decimal::ZERO);
        assert_eq!(est.lower_bound, Decimal::ZERO);
        assert_eq!(label, "out_of_domain");
    }

    #[test]
    fn price_exactly_at_domain_boundary_has_no_edge() {
        let a = fixture();
        let (lo, lo_label) = a.estimate(dec!(0.15), dec!(0.90));
        assert_eq!(lo.point_estimate, Decimal::ZERO);
        assert_eq!(lo_label, "out_of_domain");

        let (hi, hi_label) = a.estimate(dec!(0.99), dec!(0.90));
        assert_eq!(hi.point_estimate, Decimal::ZERO);
        assert_eq!(hi_label, "out_of_domain");
    }

    #[test]
    fn lower_bound_never_exceeds_point_estimate() {
        let a = fixture();
        let (est, _) = a.estimate(dec!(0.50), dec!(0.90));
        assert!(est.lower_bound <= est.point_estimate);
        assert!(est.point_estimate > Decimal::ZERO);
    }

    #[test]
    fn higher_confidence_yields_tighter_lower_bound() {
        let a = fixture();
        let (lo_conf, _) = a.estimate(dec!(0.50), dec!(0.80));
        let (hi_conf, _) = a.estimate(dec!(0.50), dec!(0.99));
        assert!(hi_conf.lower_bound <= lo_conf.lower_bound);
    }
}

use super::MetricSet;

/// Regression metrics for a numerical variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
    pub pearson_corr: f64,
}

impl MetricSet for RegressionMetrics {
    fn named_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("mse", self.mse),
            ("rmse", self.rmse),
            ("r2", self.r2),
            ("pearson_corr", self.pearson_corr),
        ]
    }
}

/// Compute regression metrics.
///
/// R² and Pearson correlation are NaN when the truth (or prediction) has zero
/// variance; MSE/RMSE are NaN for empty input.
pub fn evaluate_regressor(truth: &[f64], predicted: &[f64]) -> RegressionMetrics {
    assert_eq!(truth.len(), predicted.len(), "length mismatch for regression");

    if truth.is_empty() {
        return RegressionMetrics {
            mse: f64::NAN,
            rmse: f64::NAN,
            r2: f64::NAN,
            pearson_corr: f64::NAN,
        };
    }

    let n = truth.len() as f64;
    let mse = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n;

    let mean_truth = truth.iter().sum::<f64>() / n;
    let mean_pred = predicted.iter().sum::<f64>() / n;

    let ss_tot: f64 = truth.iter().map(|t| (t - mean_truth).powi(2)).sum();
    let ss_res = mse * n;
    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        f64::NAN
    };

    let mut cov = 0.0;
    let mut var_pred = 0.0;
    for (t, p) in truth.iter().zip(predicted) {
        cov += (t - mean_truth) * (p - mean_pred);
        var_pred += (p - mean_pred).powi(2);
    }
    let denom = (ss_tot * var_pred).sqrt();
    let pearson_corr = if denom > 0.0 { cov / denom } else { f64::NAN };

    RegressionMetrics {
        mse,
        rmse: mse.sqrt(),
        r2,
        pearson_corr,
    }
}

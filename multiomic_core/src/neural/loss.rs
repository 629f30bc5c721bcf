//! Loss functions with gradients for the supervisory heads.
//!
//! Every loss masks out missing labels. When nothing valid remains the loss
//! is exactly zero with an all-zero gradient, so a multi-task sum stays
//! well-formed for batches that happen to miss a variable entirely.

use ndarray::{Array2, ArrayView1};

/// Encoded label value for a missing categorical observation.
pub const MISSING_CLASS: f32 = -1.0;

/// Loss value and gradient w.r.t. the raw head output.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f32,
    pub gradient: Array2<f32>,
    /// Number of samples that contributed
    pub valid: usize,
}

impl LossOutput {
    fn zero(shape: (usize, usize)) -> Self {
        Self {
            value: 0.0,
            gradient: Array2::zeros(shape),
            valid: 0,
        }
    }
}

/// Mean squared error over samples with a non-NaN label.
///
/// `predicted` is [batch, 1].
pub fn masked_mse(labels: ArrayView1<f32>, predicted: &Array2<f32>) -> LossOutput {
    let valid: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i].is_nan()).collect();
    if valid.is_empty() {
        return LossOutput::zero(predicted.dim());
    }

    let n = valid.len() as f32;
    let mut gradient = Array2::zeros(predicted.dim());
    let mut value = 0.0;
    for &i in &valid {
        let diff = predicted[[i, 0]] - labels[i];
        value += diff * diff;
        gradient[[i, 0]] = 2.0 * diff / n;
    }

    LossOutput {
        value: value / n,
        gradient,
        valid: valid.len(),
    }
}

/// Row-wise softmax with max subtraction.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

/// Cross-entropy over samples whose label is a valid class index.
///
/// Labels equal to [`MISSING_CLASS`], NaN, or outside `0..num_classes` are
/// skipped.
pub fn masked_cross_entropy(labels: ArrayView1<f32>, logits: &Array2<f32>) -> LossOutput {
    let num_classes = logits.ncols();
    let class_of = |v: f32| -> Option<usize> {
        if v.is_nan() || v == MISSING_CLASS || v < 0.0 {
            return None;
        }
        let class = v.round() as usize;
        (class < num_classes).then_some(class)
    };

    let valid: Vec<(usize, usize)> = (0..labels.len())
        .filter_map(|i| class_of(labels[i]).map(|c| (i, c)))
        .collect();
    if valid.is_empty() {
        return LossOutput::zero(logits.dim());
    }

    let probs = softmax_rows(logits);
    let n = valid.len() as f32;
    let mut gradient = Array2::zeros(logits.dim());
    let mut value = 0.0;

    for &(i, class) in &valid {
        value -= probs[[i, class]].max(f32::MIN_POSITIVE).ln();
        for c in 0..num_classes {
            let target = if c == class { 1.0 } else { 0.0 };
            gradient[[i, c]] = (probs[[i, c]] - target) / n;
        }
    }

    LossOutput {
        value: value / n,
        gradient,
        valid: valid.len(),
    }
}

/// Negative Cox partial log-likelihood over one batch.
///
/// For every sample `i` with an event, the risk set is every batch sample
/// with `time ≥ time[i]` (tied times included), and the loss adds
/// `log Σ_{j∈R_i} exp(r_j) − r_i`. Contributions are summed over events.
/// Samples with a missing duration or event indicator take part in neither
/// events nor risk sets. No events → zero.
pub fn cox_ph_loss(
    risk: &Array2<f32>,
    durations: ArrayView1<f32>,
    events: ArrayView1<f32>,
) -> LossOutput {
    let usable: Vec<usize> = (0..durations.len())
        .filter(|&i| !durations[i].is_nan() && !events[i].is_nan())
        .collect();
    let event_samples: Vec<usize> = usable
        .iter()
        .copied()
        .filter(|&i| events[i] > 0.5)
        .collect();

    if event_samples.is_empty() {
        return LossOutput::zero(risk.dim());
    }

    let mut gradient = Array2::zeros(risk.dim());
    let mut value = 0.0;

    for &i in &event_samples {
        let risk_set: Vec<usize> = usable
            .iter()
            .copied()
            .filter(|&j| durations[j] >= durations[i])
            .collect();

        let max = risk_set
            .iter()
            .map(|&j| risk[[j, 0]])
            .fold(f32::NEG_INFINITY, f32::max);
        let sum_exp: f32 = risk_set.iter().map(|&j| (risk[[j, 0]] - max).exp()).sum();
        let log_sum_exp = max + sum_exp.ln();

        value += log_sum_exp - risk[[i, 0]];
        for &j in &risk_set {
            gradient[[j, 0]] += (risk[[j, 0]] - log_sum_exp).exp();
        }
        gradient[[i, 0]] -= 1.0;
    }

    LossOutput {
        value,
        gradient,
        valid: event_samples.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_mse_ignores_nan_labels() {
        let labels = array![1.0f32, f32::NAN, 3.0];
        let predicted = array![[2.0f32], [100.0], [3.0]];
        let loss = masked_mse(labels.view(), &predicted);

        assert!((loss.value - 0.5).abs() < 1e-6);
        assert_eq!(loss.valid, 2);
        assert_eq!(loss.gradient[[1, 0]], 0.0);
    }

    #[test]
    fn test_mse_all_missing_is_zero() {
        let labels = array![f32::NAN, f32::NAN];
        let predicted = array![[2.0f32], [1.0]];
        let loss = masked_mse(labels.view(), &predicted);

        assert_eq!(loss.value, 0.0);
        assert!(loss.gradient.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let labels = array![0.0f32, 1.0, MISSING_CLASS];
        let logits = Array2::zeros((3, 2));
        let loss = masked_cross_entropy(labels.view(), &logits);

        assert!((loss.value - 2.0f32.ln()).abs() < 1e-6);
        assert_eq!(loss.valid, 2);
        assert!(loss.gradient.row(2).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_cross_entropy_all_missing_is_zero() {
        let labels = array![MISSING_CLASS, MISSING_CLASS];
        let logits = array![[1.0f32, -1.0], [0.5, 0.2]];
        let loss = masked_cross_entropy(labels.view(), &logits);

        assert_eq!(loss.value, 0.0);
        assert!(loss.gradient.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_cox_no_events_is_zero() {
        let risk = array![[0.3f32], [1.2], [-0.4]];
        let durations = array![5.0f32, 3.0, 8.0];
        let events = Array1::zeros(3);
        let loss = cox_ph_loss(&risk, durations.view(), events.view());

        assert_eq!(loss.value, 0.0);
        assert!(loss.gradient.iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_cox_hand_computed() {
        // Event at t=1 for sample 0, risk set {0, 1}; sample 1 censored.
        let risk = array![[0.0f32], [0.0]];
        let durations = array![1.0f32, 2.0];
        let events = array![1.0f32, 0.0];
        let loss = cox_ph_loss(&risk, durations.view(), events.view());

        assert!((loss.value - 2.0f32.ln()).abs() < 1e-6);
        assert!((loss.gradient[[0, 0]] + 0.5).abs() < 1e-6);
        assert!((loss.gradient[[1, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cox_tied_times_share_risk_set() {
        let risk = array![[1.0f32], [2.0]];
        let durations = array![4.0f32, 4.0];
        let events = array![1.0f32, 1.0];
        let loss = cox_ph_loss(&risk, durations.view(), events.view());

        let lse = (1.0f32.exp() + 2.0f32.exp()).ln();
        let expected = (lse - 1.0) + (lse - 2.0);
        assert!((loss.value - expected).abs() < 1e-5);
    }

    #[test]
    fn test_cox_gradient_matches_finite_difference() {
        let risk = array![[0.2f32], [-0.5], [0.9], [0.1]];
        let durations = array![2.0f32, 5.0, 1.0, 3.0];
        let events = array![1.0f32, 0.0, 1.0, 1.0];
        let loss = cox_ph_loss(&risk, durations.view(), events.view());

        let eps = 1e-3;
        for k in 0..4 {
            let mut plus = risk.clone();
            plus[[k, 0]] += eps;
            let mut minus = risk.clone();
            minus[[k, 0]] -= eps;
            let numeric = (cox_ph_loss(&plus, durations.view(), events.view()).value
                - cox_ph_loss(&minus, durations.view(), events.view()).value)
                / (2.0 * eps);
            assert!((numeric - loss.gradient[[k, 0]]).abs() < 1e-2);
        }
    }
}

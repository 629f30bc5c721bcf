use std::collections::BTreeSet;

use super::MetricSet;

/// Classification metrics for a categorical variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub f1_macro: f64,
    pub kappa: f64,
}

impl MetricSet for ClassificationMetrics {
    fn named_values(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("accuracy", self.accuracy),
            ("balanced_acc", self.balanced_accuracy),
            ("f1_score", self.f1_macro),
            ("kappa", self.kappa),
        ]
    }
}

/// Compute classification metrics from class indices.
///
/// Classes are the union of observed truth and predicted labels. Balanced
/// accuracy averages recall over classes present in the truth.
pub fn evaluate_classifier(truth: &[usize], predicted: &[usize]) -> ClassificationMetrics {
    assert_eq!(truth.len(), predicted.len(), "length mismatch for classifier");

    if truth.is_empty() {
        return ClassificationMetrics {
            accuracy: f64::NAN,
            balanced_accuracy: f64::NAN,
            f1_macro: f64::NAN,
            kappa: f64::NAN,
        };
    }

    let classes: Vec<usize> = truth
        .iter()
        .chain(predicted.iter())
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let k = classes.len();
    let index_of = |label: usize| classes.binary_search(&label).unwrap_or(0);

    // confusion[t][p]
    let mut confusion = vec![vec![0usize; k]; k];
    for (&t, &p) in truth.iter().zip(predicted) {
        confusion[index_of(t)][index_of(p)] += 1;
    }

    let n = truth.len() as f64;
    let correct: usize = (0..k).map(|i| confusion[i][i]).sum();
    let accuracy = correct as f64 / n;

    let mut recall_sum = 0.0;
    let mut recall_classes = 0usize;
    let mut f1_sum = 0.0;
    for c in 0..k {
        let tp = confusion[c][c] as f64;
        let actual: usize = confusion[c].iter().sum();
        let predicted_c: usize = (0..k).map(|r| confusion[r][c]).sum();

        if actual > 0 {
            recall_sum += tp / actual as f64;
            recall_classes += 1;
        }

        let precision = if predicted_c > 0 {
            tp / predicted_c as f64
        } else {
            0.0
        };
        let recall = if actual > 0 { tp / actual as f64 } else { 0.0 };
        f1_sum += if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
    }

    let balanced_accuracy = if recall_classes > 0 {
        recall_sum / recall_classes as f64
    } else {
        f64::NAN
    };
    let f1_macro = f1_sum / k as f64;

    let expected: f64 = (0..k)
        .map(|c| {
            let row: usize = confusion[c].iter().sum();
            let col: usize = (0..k).map(|r| confusion[r][c]).sum();
            (row as f64 / n) * (col as f64 / n)
        })
        .sum();
    let kappa = if (1.0 - expected).abs() > f64::EPSILON {
        (accuracy - expected) / (1.0 - expected)
    } else {
        // Both raters constant and identical.
        1.0
    };

    ClassificationMetrics {
        accuracy,
        balanced_accuracy,
        f1_macro,
        kappa,
    }
}

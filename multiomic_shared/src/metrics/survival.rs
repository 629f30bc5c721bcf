/// Harrell's concordance index.
///
/// A pair `(i, j)` is comparable when sample `i` had an event and
/// `time[i] < time[j]`. It is concordant when `risk[i] > risk[j]`; tied risks
/// count one half. Returns NaN when no pair is comparable.
pub fn concordance_index(times: &[f64], events: &[bool], risks: &[f64]) -> f64 {
    assert_eq!(times.len(), events.len(), "length mismatch for survival");
    assert_eq!(times.len(), risks.len(), "length mismatch for survival");

    let mut comparable = 0.0;
    let mut concordant = 0.0;

    for i in 0..times.len() {
        if !events[i] {
            continue;
        }
        for j in 0..times.len() {
            if times[i] < times[j] {
                comparable += 1.0;
                if risks[i] > risks[j] {
                    concordant += 1.0;
                } else if (risks[i] - risks[j]).abs() <= f64::EPSILON {
                    concordant += 0.5;
                }
            }
        }
    }

    if comparable == 0.0 {
        f64::NAN
    } else {
        concordant / comparable
    }
}

/// Survival metrics as `(name, value)` pairs.
pub fn evaluate_survival(times: &[f64], events: &[bool], risks: &[f64]) -> Vec<(&'static str, f64)> {
    vec![("cindex", concordance_index(times, events, risks))]
}

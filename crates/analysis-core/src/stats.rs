/// Null-propagating arithmetic and population statistics shared by the
/// calculator, the sector aggregator and the forecast estimator.
///
/// Every helper here returns `None` instead of NaN or infinity: a missing
/// or zero denominator, an empty sample, or a non-finite intermediate all
/// collapse to "no value".

/// Divide two optional figures. `None` when either side is missing, the
/// denominator is zero, or the quotient is not finite.
pub fn safe_div(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    finite(n / d)
}

/// `safe_div` scaled to a percentage.
pub fn pct(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    safe_div(numerator, denominator).and_then(|r| finite(r * 100.0))
}

/// Percentage change `(current - previous) / |previous| * 100`.
pub fn pct_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let (c, p) = (current?, previous?);
    if p == 0.0 {
        return None;
    }
    finite((c - p) / p.abs() * 100.0)
}

/// Multiply two optional figures.
pub fn product(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    finite(a? * b?)
}

/// Filter out non-finite values so they never leak into an indicator.
pub fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    finite(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation (divisor N). `None` for an empty slice.
pub fn population_std_dev(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    finite(variance.sqrt())
}

/// Mean of the present members of a slice of optional values.
pub fn mean_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    mean(&present)
}

/// Standard deviation over mean. `None` when the mean is zero or the series
/// is empty.
pub fn coefficient_of_variation(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let sd = population_std_dev(data)?;
    if m == 0.0 {
        return None;
    }
    finite(sd / m.abs())
}

/// Distance of `value` from a sample mean in standard deviations.
/// `None` if the deviation is missing or degenerate.
pub fn z_score(value: Option<f64>, mean: Option<f64>, std_dev: Option<f64>) -> Option<f64> {
    let sd = std_dev?;
    if sd < f64::EPSILON {
        return None;
    }
    finite((value? - mean?) / sd)
}

/// Weighted mean over the present values. Weights of missing values are
/// dropped from the divisor.
pub fn weighted_mean(values: &[Option<f64>], weights: &[f64]) -> Option<f64> {
    let (sum, weight_sum) = values
        .iter()
        .zip(weights)
        .filter_map(|(v, w)| v.map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(s, ws), (v, w)| (s + v, ws + w));
    if weight_sum == 0.0 {
        return None;
    }
    finite(sum / weight_sum)
}

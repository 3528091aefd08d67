//! Small statistics helpers used by the estimator.

/// Arithmetic mean; `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation (divides by `n`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Quantile of already sorted values with linear interpolation between
/// the two nearest ranks.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Ordinary least squares slope of `y` against `x`.
///
/// Returns `0.0` when `x` has no spread.
#[must_use]
pub fn ols_slope(points: &[(f64, f64)]) -> f64 {
    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
    let (Some(mx), Some(my)) = (mean(&xs), mean(&ys)) else {
        return 0.0;
    };

    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx == 0.0 {
        return 0.0;
    }
    let sxy: f64 = points.iter().map(|(x, y)| (x - mx) * (y - my)).sum();
    sxy / sxx
}

/// Two-sided Mann-Kendall p-value using the normal approximation with
/// tie-corrected variance.
///
/// `None` for fewer than three values or zero variance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mann_kendall_p(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }

    let mut s = 0_i64;
    for i in 0..n {
        for j in (i + 1)..n {
            s += match values[j].partial_cmp(&values[i]) {
                Some(std::cmp::Ordering::Greater) => 1,
                Some(std::cmp::Ordering::Less) => -1,
                _ => 0,
            };
        }
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut tie_term = 0.0;
    let mut run = 1_usize;
    for i in 1..=sorted.len() {
        if i < sorted.len() && (sorted[i] - sorted[i - 1]).abs() < f64::EPSILON {
            run += 1;
        } else {
            let t = run as f64;
            tie_term += t * (t - 1.0) * 2.0f64.mul_add(t, 5.0);
            run = 1;
        }
    }

    let nf = n as f64;
    let var = (nf * (nf - 1.0) * 2.0f64.mul_add(nf, 5.0) - tie_term) / 18.0;
    if var <= 0.0 {
        return None;
    }

    let s = s as f64;
    let z = if s > 0.0 {
        (s - 1.0) / var.sqrt()
    } else if s < 0.0 {
        (s + 1.0) / var.sqrt()
    } else {
        0.0
    };

    Some((2.0 * (1.0 - standard_normal_cdf(z.abs()))).clamp(0.0, 1.0))
}

fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun 7.1.26 (absolute error below 1.5e-7).
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / P.mul_add(x, 1.0);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

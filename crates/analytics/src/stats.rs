//! Small numeric toolkit shared by the analyzers. Every function tolerates
//! empty input and never returns NaN for it.

use serde::{Deserialize, Serialize};

/// `num / den`, or 0 when the denominator is zero or the result is not finite.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let value = num / den;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut s: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    s.sort_by(f64::total_cmp);
    s
}

/// Percentile `p` (0-100) with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let s = sorted(values);
    percentile_sorted(&s, p)
}

fn percentile_sorted(s: &[f64], p: f64) -> f64 {
    match s.len() {
        0 => 0.0,
        1 => s[0],
        n => {
            let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            s[lo] + (s[hi] - s[lo]) * frac
        }
    }
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let squares: f64 = values.iter().map(|x| (x - m).powi(2)).sum();
    let var = squares / (values.len() as f64 - 1.0);
    var.sqrt()
}

/// Standard deviation over mean; 0 when the mean is 0.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    safe_div(std_dev(values), mean(values))
}

/// Weighted mean and weighted (population) standard deviation.
pub fn weighted_mean_std(values: &[f64], weights: &[f64]) -> (f64, f64) {
    let total_weight: f64 = weights.iter().take(values.len()).sum();
    if values.is_empty() || total_weight <= 0.0 {
        return (0.0, 0.0);
    }
    let m = values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / total_weight;
    let var = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - m).powi(2))
        .sum::<f64>()
        / total_weight;
    (m, var.sqrt())
}

/// Tukey fences `[q1 - k*iqr, q3 + k*iqr]`.
pub fn iqr_fences(values: &[f64], k: f64) -> Option<(f64, f64)> {
    let s = sorted(values);
    if s.is_empty() {
        return None;
    }
    let q1 = percentile_sorted(&s, 25.0);
    let q3 = percentile_sorted(&s, 75.0);
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}

/// Values inside the IQR fences, in their original order.
pub fn iqr_filter(values: &[f64], k: f64) -> Vec<f64> {
    match iqr_fences(values, k) {
        Some((lo, hi)) => values
            .iter()
            .copied()
            .filter(|v| *v >= lo && *v <= hi)
            .collect(),
        None => Vec::new(),
    }
}

/// Clamp every value into `[P(low), P(high)]`.
pub fn winsorize(values: &[f64], low: f64, high: f64) -> Vec<f64> {
    let s = sorted(values);
    if s.is_empty() {
        return Vec::new();
    }
    let lo = percentile_sorted(&s, low);
    let hi = percentile_sorted(&s, high);
    values.iter().map(|v| v.clamp(lo, hi)).collect()
}

/// Pearson correlation; `None` with fewer than two points or zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys).take(n) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Ordinary least-squares fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
}

pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<RegressionFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let sxx: f64 = xs[..n].iter().map(|x| (x - mx).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| (x - mx) * (y - my))
        .sum();
    let slope = sxy / sxx;
    let intercept = my - slope * mx;

    let ss_tot: f64 = ys[..n].iter().map(|y| (y - my).powi(2)).sum();
    let ss_res: f64 = xs[..n]
        .iter()
        .zip(&ys[..n])
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Some(RegressionFit {
        intercept,
        slope,
        r_squared,
    })
}

/// Fit `y = a + b * ln(x)`; points with `x <= 0` are ignored.
pub fn log_regression(xs: &[f64], ys: &[f64]) -> Option<RegressionFit> {
    let (lx, ly): (Vec<f64>, Vec<f64>) = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| **x > 0.0 && y.is_finite())
        .map(|(x, y)| (x.ln(), *y))
        .unzip();
    linear_regression(&lx, &ly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(std_dev(&[1.0]), 0.0);
        assert_eq!(safe_div(5.0, 0.0), 0.0);
        assert!(pearson(&[1.0], &[2.0]).is_none());
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 100.0), 40.0);
        assert!((percentile(&values, 50.0) - 25.0).abs() < 1e-9);
        assert!((percentile(&values, 75.0) - 32.5).abs() < 1e-9);
    }

    #[test]
    fn test_iqr_filter_drops_spike() {
        let values = [100.0, 110.0, 95.0, 105.0, 102.0, 5000.0];
        let kept = iqr_filter(&values, 1.5);
        assert_eq!(kept.len(), 5);
        assert!(!kept.contains(&5000.0));
    }

    #[test]
    fn test_winsorize_clamps_extremes() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        let w = winsorize(&values, 10.0, 90.0);
        assert!(w[4] < 100.0);
        assert!(w[0] > 1.0);
    }

    #[test]
    fn test_weighted_mean_favours_heavy_points() {
        let (m, _) = weighted_mean_std(&[10.0, 20.0], &[1.0, 3.0]);
        assert!((m - 17.5).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&xs, &ys).unwrap() - 1.0).abs() < 1e-9);
        let inv = [8.0, 6.0, 4.0, 2.0];
        assert!((pearson(&xs, &inv).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_log_regression_recovers_slope() {
        let xs: Vec<f64> = (1..=10).map(|i| (i * 1000) as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 50.0 + 200.0 * x.ln()).collect();
        let fit = log_regression(&xs, &ys).unwrap();
        assert!((fit.slope - 200.0).abs() < 1e-6);
        assert!(fit.r_squared > 0.999);
    }
}

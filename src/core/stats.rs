use num_traits::Float;
use std::collections::BTreeMap;

/// Finite values in ascending order
pub fn sorted_finite<T: Float>(values: &[T]) -> Vec<T> {
    let mut sorted: Vec<T> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Percentile `q` (0..=100) of an ascending slice, linear interpolation between closest ranks
pub fn percentile<T: Float>(sorted: &[T], q: f64) -> Option<T> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = T::from(rank - lower as f64)?;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn mean<T: Float>(values: &[T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().fold(T::zero(), |acc, &v| acc + v);
    Some(sum / T::from(values.len())?)
}

/// Most frequent value; ties resolve to the smallest
pub fn mode(values: &[i64]) -> Option<i64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    // BTreeMap iterates ascending, so the first maximum is the smallest value
    let mut best: Option<(i64, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// max - min of the finite values
pub fn range(values: &[f64]) -> Option<f64> {
    let sorted = sorted_finite(values);
    Some(sorted.last()? - sorted.first()?)
}

/// Interquartile range (P75 - P25)
pub fn iqr(values: &[f64]) -> Option<f64> {
    let sorted = sorted_finite(values);
    Some(percentile(&sorted, 75.0)? - percentile(&sorted, 25.0)?)
}

/// Tukey outlier fences around the interquartile range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyFence {
    pub p25: f64,
    pub p75: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl TukeyFence {
    pub fn from_values(values: &[f64], multiplier: f64) -> Option<Self> {
        let sorted = sorted_finite(values);
        let p25 = percentile(&sorted, 25.0)?;
        let p75 = percentile(&sorted, 75.0)?;
        let iqr = p75 - p25;
        Some(Self {
            p25,
            p75,
            iqr,
            lower: p25 - multiplier * iqr,
            upper: p75 + multiplier * iqr,
        })
    }

    /// Open interval: values exactly on a fence are outliers
    pub fn contains(&self, value: f64) -> bool {
        value > self.lower && value < self.upper
    }
}

/// Ordinary least squares `y = slope·x + offset`
///
/// `None` with fewer than two pairs or no spread in `x`.
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let (mean_x, mean_y, sxx, _, sxy) = moments(x, y)?;
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Pearson correlation coefficient
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let (_, _, sxx, syy, sxy) = moments(x, y)?;
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Returns (mean_x, mean_y, Sxx, Syy, Sxy)
fn moments(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64, f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x)?;
    let mean_y = mean(y)?;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    Some((mean_x, mean_y, sxx, syy, sxy))
}

/// Two-sided p-value of a Pearson correlation `r` over `n` samples (Student t, n-2 dof)
pub fn correlation_p_value(r: f64, n: usize) -> Option<f64> {
    if n < 3 || !r.is_finite() {
        return None;
    }
    let df = (n - 2) as f64;
    let r2 = r * r;
    if r2 >= 1.0 {
        return Some(0.0);
    }
    // x = df / (df + t²) with t² = df·r² / (1 - r²) reduces to 1 - r²
    Some(regularized_incomplete_beta(df / 2.0, 0.5, 1.0 - r2))
}

/// Two-sided p-value of a Student t statistic
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t * t))
}

/// Regularized incomplete beta function I_x(a, b)
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const EPSILON: f64 = 3e-14;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// ln Γ(x), Lanczos approximation (g = 7)
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

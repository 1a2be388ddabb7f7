//! Small statistics kernels shared by the analytics.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Keeps only the positions where both sides are present.
pub fn complete_pairs(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

struct Moments {
    n: usize,
    mean_x: f64,
    mean_y: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

fn moments(xs: &[f64], ys: &[f64]) -> Option<Moments> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = mean(xs)?;
    let mean_y = mean(ys)?;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    Some(Moments {
        n,
        mean_x,
        mean_y,
        sxx,
        syy,
        sxy,
    })
}

/// Pearson correlation. `None` with fewer than two points or a constant side.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let m = moments(xs, ys)?;
    if m.sxx == 0.0 || m.syy == 0.0 {
        return None;
    }
    let r = m.sxy / (m.sxx * m.syy).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Pearson correlation over the pairwise complete observations of two columns.
pub fn pearson_pairwise(a: &[Option<f64>], b: &[Option<f64>]) -> Option<(f64, usize)> {
    let (xs, ys) = complete_pairs(a, b);
    pearson(&xs, &ys).map(|r| (r, xs.len()))
}

/// Ordinary least squares fit of `y = intercept + beta * x`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Regression {
    pub beta: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub n: usize,
}

impl Regression {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.beta * x
    }

    /// Endpoints of the fitted line across `xs`.
    pub fn trendline(&self, xs: &[f64]) -> Option<[(f64, f64); 2]> {
        let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !lo.is_finite() || !hi.is_finite() {
            return None;
        }
        Some([(lo, self.predict(lo)), (hi, self.predict(hi))])
    }
}

pub fn regression(xs: &[f64], ys: &[f64]) -> Option<Regression> {
    let m = moments(xs, ys)?;
    if m.sxx == 0.0 || m.syy == 0.0 {
        return None;
    }
    let beta = m.sxy / m.sxx;
    Some(Regression {
        beta,
        intercept: m.mean_y - beta * m.mean_x,
        r_squared: (m.sxy * m.sxy / (m.sxx * m.syy)).clamp(0.0, 1.0),
        n: m.n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_sample_std() {
        assert_eq!(mean(&[]), None);
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(sample_std(&[4.0]), None);
        assert_relative_eq!(sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap(), 2.138089935, epsilon = 1e-9);
    }

    #[test]
    fn test_pearson() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(pearson(&xs, &xs).unwrap(), 1.0);
        assert_relative_eq!(pearson(&xs, &[8.0, 6.0, 4.0, 2.0]).unwrap(), -1.0);
        assert_eq!(pearson(&xs, &[5.0; 4]), None);
        assert_eq!(pearson(&[1.0], &[2.0]), None);
    }

    #[test]
    fn test_pairwise_skips_missing() {
        let a = [Some(1.0), None, Some(2.0), Some(3.0)];
        let b = [Some(2.0), Some(9.0), None, Some(6.0)];
        let (r, n) = pearson_pairwise(&a, &b).unwrap();
        assert_eq!(n, 2);
        assert_relative_eq!(r, 1.0);
        assert_eq!(pearson_pairwise(&a, &[None, Some(1.0), None, None]), None);
    }

    #[test]
    fn test_regression_and_trendline() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = regression(&xs, &ys).unwrap();
        assert_relative_eq!(fit.beta, 2.0);
        assert_relative_eq!(fit.intercept, 1.0);
        assert_relative_eq!(fit.r_squared, 1.0);
        assert_eq!(fit.n, 4);
        assert_eq!(fit.trendline(&xs), Some([(0.0, 1.0), (3.0, 7.0)]));
        assert_eq!(fit.trendline(&[]), None);
    }
}

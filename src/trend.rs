//! Linear trend estimation
//!
//! Least-squares slope of an ordered sequence against its index positions.

use crate::error::AnalyticsError;

/// Fit `y = a + b*x` with `x = 0..n-1` and return the slope `b`.
///
/// Fails with [`AnalyticsError::InsufficientData`] for fewer than two values.
pub fn slope(values: &[f64]) -> Result<f64, AnalyticsError> {
    let n = values.len();
    if n < 2 {
        return Err(AnalyticsError::InsufficientData(format!(
            "trend needs at least 2 points, got {}",
            n
        )));
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut x_variance = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        x_variance += dx * dx;
    }

    Ok(covariance / x_variance)
}

/// Slope with an evidence floor: fewer than `min_points` values yields a
/// neutral 0 without fitting.
pub fn guarded_slope(values: &[f64], min_points: usize) -> f64 {
    if values.len() < min_points.max(2) {
        return 0.0;
    }
    slope(values).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increasing_and_decreasing() {
        assert!((slope(&[10.0, 20.0, 30.0]).unwrap() - 10.0).abs() < 1e-9);
        assert!((slope(&[30.0, 20.0, 10.0]).unwrap() + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_and_noisy() {
        assert_eq!(slope(&[5.0, 5.0, 5.0, 5.0]).unwrap(), 0.0);
        // Least squares through (0,1) (1,3) (2,2) (3,4) -> 0.8
        assert!((slope(&[1.0, 3.0, 2.0, 4.0]).unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_two_points_is_difference() {
        assert!((slope(&[0.9, 0.6]).unwrap() + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_points() {
        assert!(matches!(slope(&[]), Err(AnalyticsError::InsufficientData(_))));
        assert!(matches!(slope(&[1.0]), Err(AnalyticsError::InsufficientData(_))));
    }

    #[test]
    fn test_guarded_slope_is_neutral_below_floor() {
        assert_eq!(guarded_slope(&[10.0, 20.0], 3), 0.0);
        assert!((guarded_slope(&[10.0, 20.0, 30.0], 3) - 10.0).abs() < 1e-9);
        assert_eq!(guarded_slope(&[4.0], 0), 0.0);
    }
}

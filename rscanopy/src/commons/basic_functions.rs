/// Arithmetic mean of the defined (non-NaN) values; `None` when there are none.
pub fn mean_of_defined<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Two-decimal height, `NoData` for an undefined value.
pub fn format_height(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "NoData".to_string(),
    }
}

/// NaN becomes `None`.
pub fn defined(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_skips_nan() {
        assert_eq!(mean_of_defined(vec![1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(mean_of_defined(vec![f64::NAN]), None);
        assert_eq!(mean_of_defined(Vec::new()), None);
    }

    #[test]
    fn test_format_height() {
        assert_eq!(format_height(Some(1.1)), "1.10");
        assert_eq!(format_height(Some(4.4)), "4.40");
        assert_eq!(format_height(None), "NoData");
    }
}

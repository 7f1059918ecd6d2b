use super::glucose::{to_mmol, GlucoseUnit};

/// Rounds to one decimal place, halves rounding up.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}

/// Estimated HbA1c percentage from an average glucose in mmol/L.
///
/// The formula does not clamp; callers must not apply it when there are
/// no readings to average.
pub fn estimate_hba1c(average_glucose_mmol: f64) -> f64 {
    round_one_decimal((average_glucose_mmol + 2.59) / 1.59)
}

/// Mean of the readings in mmol/L, rounded to one decimal. `None` when empty.
pub fn average_mmol<I>(readings: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, GlucoseUnit)>,
{
    let (sum, count) = readings
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), (value, unit)| (sum + to_mmol(value, unit), count + 1));

    if count == 0 {
        None
    } else {
        Some(round_one_decimal(sum / count as f64))
    }
}

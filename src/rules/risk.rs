use serde::Serialize;
use utoipa::ToSchema;

use super::glucose::GlucoseStatus;

/// Qualitative risk derived from the share of elevated readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

/// Scores a set of classified readings. Depends only on counts, so the
/// result is independent of input order.
pub fn score<I>(statuses: I) -> RiskLevel
where
    I: IntoIterator<Item = GlucoseStatus>,
{
    let (elevated, total) = statuses
        .into_iter()
        .fold((0usize, 0usize), |(elevated, total), status| {
            (elevated + usize::from(status.is_elevated()), total + 1)
        });

    if total == 0 {
        return RiskLevel::Unknown;
    }

    // p > 0.5 and p > 0.2, compared without floating point
    if elevated * 2 > total {
        RiskLevel::High
    } else if elevated * 5 > total {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GlucoseStatus::*;

    #[test]
    fn test_empty_is_unknown() {
        assert_eq!(score(Vec::new()), RiskLevel::Unknown);
    }

    #[test]
    fn test_thresholds() {
        // 6 of 10 elevated
        let readings = [High, VeryHigh, High, High, VeryHigh, High, Normal, Normal, Low, Normal];
        assert_eq!(score(readings), RiskLevel::High);

        // exactly half is not High
        assert_eq!(score([High, Normal]), RiskLevel::Medium);

        // exactly 20% is Low
        assert_eq!(score([High, Normal, Normal, Normal, Normal]), RiskLevel::Low);

        // just over 20%
        assert_eq!(score([High, Normal, Normal, Normal]), RiskLevel::Medium);
    }

    #[test]
    fn test_low_readings_do_not_count_as_elevated() {
        assert_eq!(score([Low, VeryLow, Low]), RiskLevel::Low);
    }

    #[test]
    fn test_permutation_invariant() {
        let a = [High, Normal, VeryHigh, Low, Normal, Normal, High];
        let mut b = a;
        b.reverse();
        let mut c = a;
        c.rotate_left(3);
        assert_eq!(score(a), score(b));
        assert_eq!(score(a), score(c));
    }
}

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Adherence {
    Excellent,
    Good,
    Moderate,
    Poor,
    Unknown,
}

/// Whole-number percentage of doses taken; `None` without any logged dose.
pub fn adherence_percentage(taken: usize, total: usize) -> Option<u32> {
    if total == 0 {
        return None;
    }
    Some((taken * 100 / total) as u32)
}

pub fn classify_adherence(taken: usize, total: usize) -> Adherence {
    if total == 0 {
        return Adherence::Unknown;
    }
    // compare taken/total against 90%, 75% and 50% without rounding
    let scaled = taken * 100;
    if scaled >= total * 90 {
        Adherence::Excellent
    } else if scaled >= total * 75 {
        Adherence::Good
    } else if scaled >= total * 50 {
        Adherence::Moderate
    } else {
        Adherence::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands() {
        assert_eq!(classify_adherence(0, 0), Adherence::Unknown);
        assert_eq!(classify_adherence(9, 10), Adherence::Excellent);
        assert_eq!(classify_adherence(3, 4), Adherence::Good);
        assert_eq!(classify_adherence(1, 2), Adherence::Moderate);
        assert_eq!(classify_adherence(2, 5), Adherence::Poor);
        assert_eq!(classify_adherence(5, 5), Adherence::Excellent);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(adherence_percentage(0, 0), None);
        assert_eq!(adherence_percentage(13, 14), Some(92));
    }
}

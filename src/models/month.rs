use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A calendar month, the canonical key every date representation reduces to.
///
/// Rendered and persisted as `YYYY-MM` (four-digit year, zero-padded month).
/// The derived ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalMonth {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month key '{0}', expected YYYY-MM")]
pub struct MonthParseError(pub String);

impl CanonicalMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (0..=9999).contains(&year) && (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date<D: Datelike>(date: &D) -> Option<Self> {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn january(year: i32) -> Option<Self> {
        Self::new(year, 1)
    }

    pub fn december(year: i32) -> Option<Self> {
        Self::new(year, 12)
    }

    /// The following month, or `None` past December 9999.
    pub fn succ(&self) -> Option<Self> {
        self.shift(1)
    }

    pub fn shift(&self, months: i32) -> Option<Self> {
        let total = self.year * 12 + self.month as i32 - 1 + months;
        Self::new(total.div_euclid(12), (total.rem_euclid(12) + 1) as u32)
    }

    /// Every month from `start` through `end`, inclusive. Empty when `start > end`.
    pub fn range_inclusive(start: Self, end: Self) -> Vec<Self> {
        let mut months = Vec::new();
        let mut current = Some(start);
        while let Some(month) = current {
            if month > end {
                break;
            }
            months.push(month);
            current = month.succ();
        }
        months
    }
}

impl fmt::Display for CanonicalMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for CanonicalMonth {
    type Err = MonthParseError;

    /// Strict `YYYY-MM` parsing. Use the month normalizer for anything looser.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(MonthParseError(s.to_string()));
        }

        let year: i32 = s[..4].parse().map_err(|_| MonthParseError(s.to_string()))?;
        let month: u32 = s[5..].parse().map_err(|_| MonthParseError(s.to_string()))?;
        Self::new(year, month).ok_or_else(|| MonthParseError(s.to_string()))
    }
}

impl Serialize for CanonicalMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CanonicalMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(s: &str) -> CanonicalMonth {
        s.parse().unwrap()
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(CanonicalMonth::new(2025, 8).unwrap().to_string(), "2025-08");
        assert_eq!(CanonicalMonth::new(987, 1).unwrap().to_string(), "0987-01");
    }

    #[test]
    fn test_strict_parse_rejects_loose_forms() {
        assert!("2025-8".parse::<CanonicalMonth>().is_err());
        assert!("2025/08".parse::<CanonicalMonth>().is_err());
        assert!("2025-13".parse::<CanonicalMonth>().is_err());
        assert!("2025-00".parse::<CanonicalMonth>().is_err());
        assert!(" 2025-08".parse::<CanonicalMonth>().is_err());
        assert_eq!(month("2025-12"), CanonicalMonth::new(2025, 12).unwrap());
    }

    #[test]
    fn test_ordering_is_chronological() {
        assert!(month("2024-12") < month("2025-01"));
        assert!(month("2025-02") < month("2025-10"));
    }

    #[test]
    fn test_shift_crosses_year_boundaries() {
        assert_eq!(month("2024-12").succ(), Some(month("2025-01")));
        assert_eq!(month("2025-01").shift(-1), Some(month("2024-12")));
        assert_eq!(month("2025-03").shift(-15), Some(month("2023-12")));
        assert_eq!(month("9999-12").succ(), None);
    }

    #[test]
    fn test_range_inclusive() {
        let range = CanonicalMonth::range_inclusive(month("2024-11"), month("2025-02"));
        let rendered: Vec<String> = range.iter().map(|m| m.to_string()).collect();
        assert_eq!(rendered, vec!["2024-11", "2024-12", "2025-01", "2025-02"]);

        assert_eq!(
            CanonicalMonth::range_inclusive(month("2025-03"), month("2025-03")).len(),
            1
        );
        assert!(CanonicalMonth::range_inclusive(month("2025-03"), month("2025-01")).is_empty());
    }

    #[test]
    fn test_serde_uses_key_string() {
        let json = serde_json::to_string(&month("2025-08")).unwrap();
        assert_eq!(json, "\"2025-08\"");
        let back: CanonicalMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month("2025-08"));
        assert!(serde_json::from_str::<CanonicalMonth>("\"Aug 2025\"").is_err());
    }
}

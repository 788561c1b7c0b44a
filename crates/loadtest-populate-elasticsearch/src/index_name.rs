//! Time-stamped index names.

use chrono::{DateTime, Utc};
use std::fmt;

/// Prefix shared by every index this tool creates.
pub const INDEX_ALIAS: &str = "example_index";

/// `example_index_<yyyyMMddHHmmss>` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexName(String);

impl IndexName {
    /// Name for the current instant.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}",
            INDEX_ALIAS,
            timestamp.format("%Y%m%d%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IndexName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_index_name_format() {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            IndexName::at(timestamp).as_str(),
            "example_index_20240307090501"
        );
    }

    #[test]
    fn test_uses_calendar_year_at_year_end() {
        // Week-based years would render this as 2025.
        let timestamp = Utc.with_ymd_and_hms(2024, 12, 30, 23, 59, 59).unwrap();
        assert_eq!(IndexName::at(timestamp).to_string(), "example_index_20241230235959");
    }

    #[test]
    fn test_same_second_same_name() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = timestamp + chrono::Duration::milliseconds(999);
        assert_eq!(IndexName::at(timestamp), IndexName::at(later));
    }

    #[test]
    fn test_now_has_fixed_length() {
        let name = IndexName::now();
        assert!(name.as_str().starts_with("example_index_"));
        assert_eq!(name.as_str().len(), "example_index_".len() + 14);
    }
}

//! Query parameter parsing and validation

use std::collections::HashMap;

use crate::reports::DateRange;
use crate::types::{Result, StatsError};

/// Parsed query string
#[derive(Debug, Clone, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string. Repeated
    /// keys keep the last value.
    pub fn parse(query: Option<&str>) -> Result<Self> {
        let query = query.unwrap_or("");
        if query.is_empty() {
            return Ok(Self::default());
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| StatsError::BadRequest(format!("Invalid query parameters: {}", e)))?;
        Ok(Self(pairs.into_iter().filter(|(key, _)| !key.is_empty()).collect()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// `start_date` / `end_date` bounds
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(self.get("start_date"), self.get("end_date"))
    }

    /// Absolute value of an integer parameter, or the default when absent
    /// or empty. Non-integers are rejected.
    pub fn absint(&self, name: &str, default: u64) -> Result<u64> {
        match self.get(name).map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse::<i64>().map(i64::unsigned_abs).map_err(|_| {
                StatsError::BadRequest(format!("Invalid parameter(s): {} ({:?})", name, raw))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_decode() {
        let params =
            QueryParams::parse(Some("start_date=2024-01-01&end_date=&name=a%20b+c&flag&limit=1&limit=2"))
                .unwrap();
        assert_eq!(params.get("start_date"), Some("2024-01-01"));
        assert_eq!(params.get("end_date"), Some(""));
        assert_eq!(params.get("name"), Some("a b c"));
        assert_eq!(params.get("flag"), Some(""));
        assert_eq!(params.get("limit"), Some("2"));
        assert_eq!(params.get("missing"), None);

        let params = QueryParams::parse(Some("start_date=2024%2D01%2D31&note=100%25")).unwrap();
        assert_eq!(params.get("start_date"), Some("2024-01-31"));
        assert_eq!(params.get("note"), Some("100%"));
    }

    #[test]
    fn test_absint() {
        let params = QueryParams::parse(Some("limit=-25&days=abc&months=&x=3.5")).unwrap();
        assert_eq!(params.absint("limit", 20).unwrap(), 25);
        assert_eq!(params.absint("months", 6).unwrap(), 6);
        assert_eq!(params.absint("absent", 30).unwrap(), 30);
        assert!(matches!(params.absint("days", 30), Err(StatsError::BadRequest(_))));
        assert!(params.absint("x", 1).is_err());
    }

    #[test]
    fn test_date_range_validation() {
        let range = |q: &str| QueryParams::parse(Some(q)).unwrap().date_range();
        assert!(range("start_date=2024-02-29").is_ok());
        assert!(range("start_date=2024-02-30").is_err());
        assert!(range("end_date=not-a-date").is_err());
        assert_eq!(
            QueryParams::parse(None).unwrap().date_range().unwrap(),
            DateRange::all_time()
        );
    }
}

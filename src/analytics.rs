//! Sample dashboard aggregates
//!
//! The dashboard is not wired to the activity log yet: these values are
//! constants served regardless of the requested range.

use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub visitors: VisitorCounts,
    /// Country name to visitor count, in display order
    #[serde(serialize_with = "as_ordered_map")]
    pub countries: Vec<(String, u64)>,
    pub searches: Vec<SearchTerm>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorCounts {
    pub total: u64,
    pub unique: u64,
    pub registered: u64,
    pub pageviews: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchTerm {
    pub term: String,
    pub count: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Requested range. Accepted for API compatibility, not used for filtering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

fn as_ordered_map<S: Serializer>(
    entries: &[(String, u64)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
}

fn term(term: &str, count: u64, kind: &str) -> SearchTerm {
    SearchTerm {
        term: term.to_string(),
        count,
        kind: kind.to_string(),
    }
}

impl AnalyticsSummary {
    pub fn sample() -> Self {
        let countries = [
            ("United States", 120),
            ("Canada", 45),
            ("United Kingdom", 32),
            ("Australia", 18),
            ("Germany", 15),
            ("Other", 26),
        ];

        Self {
            visitors: VisitorCounts {
                total: 256,
                unique: 187,
                registered: 42,
                pageviews: 1243,
            },
            countries: countries
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect(),
            searches: vec![
                term("restaurants near me", 45, "Business"),
                term("coffee shops", 32, "Business"),
                term("New York", 28, "Location"),
                term("hotels", 24, "Business"),
                term("California", 19, "State"),
            ],
        }
    }
}

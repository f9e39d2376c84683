//! Keyword search over records
//!
//! A query is split into keywords on whitespace, commas and periods. A record
//! matches when any keyword occurs anywhere in its flattened, lower-cased
//! field values, so `"Telangana,Cotton"` keeps every Telangana row and every
//! Cotton row.

use crate::data::Record;

/// Splits a query into lower-cased keywords; separators are whitespace, `,` and `.`
pub fn keywords(query: &str) -> Vec<String> {
    query
        .replace([',', '.'], " ")
        .split_whitespace()
        .map(|word| word.trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Keeps records matching any keyword of `query`, preserving order
///
/// A query without keywords returns `records` unchanged.
pub fn filter(records: Vec<Record>, query: &str) -> Vec<Record> {
    let keywords = keywords(query);
    if keywords.is_empty() {
        return records;
    }

    records
        .into_iter()
        .filter(|record| {
            let combined = combined_text(record);
            keywords.iter().any(|keyword| combined.contains(keyword.as_str()))
        })
        .collect()
}

fn combined_text(record: &Record) -> String {
    record
        .fields()
        .map(|(_, value)| value.to_string())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Field;

    fn record(commodity: &str, state: &str, market: &str) -> Record {
        Record::builder()
            .set(Field::Commodity, commodity)
            .set(Field::State, state)
            .set(Field::Market, market)
            .set(Field::ModalPrice, 2350.0)
            .build()
    }

    fn rows() -> Vec<Record> {
        vec![
            record("Paddy", "Telangana", "Karimnagar"),
            record("Cotton", "Maharashtra", "Nashik"),
            record("Onion", "Maharashtra", "Pune"),
        ]
    }

    #[test]
    fn test_keywords_split_on_separators() {
        assert_eq!(
            keywords(" Karimnagar, Paddy.Rice  "),
            vec!["karimnagar", "paddy", "rice"]
        );
        assert!(keywords(" , . ").is_empty());
    }

    #[test]
    fn test_keywords_are_ored() {
        let kept = filter(rows(), "Telangana,Cotton");
        let names: Vec<String> = kept.iter().map(|r| r.text(Field::Commodity)).collect();
        assert_eq!(names, vec!["Paddy", "Cotton"]);
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let kept = filter(rows(), "mahara");
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_numbers_are_searchable() {
        let kept = filter(rows(), "2350");
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_empty_query_returns_records_unchanged() {
        assert_eq!(filter(rows(), ""), rows());
        assert_eq!(filter(rows(), "   "), rows());
        assert_eq!(filter(rows(), ",."), rows());
    }

    #[test]
    fn test_no_match_returns_empty() {
        assert!(filter(rows(), "saffron").is_empty());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let once = filter(rows(), "Pune Nashik");
        let twice = filter(once.clone(), "Pune Nashik");
        assert_eq!(once, twice);
    }
}

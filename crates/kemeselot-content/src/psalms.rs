use anyhow::{Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calendar::reading_range;

/// Raw record as stored in the psalter data file
#[derive(Debug, Deserialize)]
struct RawPsalm {
    id: u32,
    chapter: String,
    text: String,
}

/// A psalm with its verses split for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psalm {
    pub id: u32,
    /// Chapter heading as written in the source
    pub chapter: String,
    pub title: String,
    pub verses: Vec<String>,
}

impl From<RawPsalm> for Psalm {
    fn from(raw: RawPsalm) -> Self {
        let verses = raw
            .text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();
        Self {
            id: raw.id,
            title: format!("Psalm {}", raw.id),
            chapter: raw.chapter,
            verses,
        }
    }
}

/// Today's portion of the weekly reading
#[derive(Debug, Clone, Serialize)]
pub struct DailyReading {
    pub weekday: Weekday,
    pub range_label: String,
    pub psalms: Vec<Psalm>,
}

/// The full psalter
#[derive(Debug, Clone, Default)]
pub struct PsalmBook {
    psalms: Vec<Psalm>,
}

impl PsalmBook {
    /// Parse a psalter from a JSON array of `{id, chapter, text}`
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawPsalm> = serde_json::from_str(json).context("Invalid psalter JSON")?;
        let psalms: Vec<Psalm> = raw.into_iter().map(Psalm::from).collect();
        log::debug!("Loaded {} psalms", psalms.len());
        Ok(Self { psalms })
    }

    /// Load a psalter data file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read psalter at {}", path.display()))?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.psalms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.psalms.is_empty()
    }

    #[must_use]
    pub fn by_id(&self, id: u32) -> Option<&Psalm> {
        self.psalms.iter().find(|p| p.id == id)
    }

    /// Reading for the given weekday
    #[must_use]
    pub fn todays_reading(&self, weekday: Weekday) -> DailyReading {
        let range = reading_range(weekday);
        DailyReading {
            weekday,
            range_label: format!("Psalms {}-{}", range.start(), range.end()),
            psalms: self
                .psalms
                .iter()
                .filter(|p| range.contains(&p.id))
                .cloned()
                .collect(),
        }
    }

    /// Case-insensitive search over text, chapter heading and title
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Psalm> {
        let q = query.to_lowercase();
        self.psalms
            .iter()
            .filter(|p| {
                p.chapter.to_lowercase().contains(&q)
                    || p.title.to_lowercase().contains(&q)
                    || p.verses.iter().any(|v| v.to_lowercase().contains(&q))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"id": 1, "chapter": "Chapter 1", "text": "Blessed is the man\n\nwho walks not in counsel\n"},
        {"id": 22, "chapter": "Chapter 22", "text": "My God, my God"},
        {"id": 23, "chapter": "Chapter 23", "text": "The Lord is my shepherd\nI shall not want"}
    ]"#;

    #[test]
    fn test_verses_split_and_blank_lines_dropped() {
        let book = PsalmBook::from_json(SAMPLE).unwrap();
        let first = book.by_id(1).unwrap();
        assert_eq!(first.verses, vec!["Blessed is the man", "who walks not in counsel"]);
        assert_eq!(first.title, "Psalm 1");
    }

    #[test]
    fn test_todays_reading_filters_by_weekday() {
        let book = PsalmBook::from_json(SAMPLE).unwrap();

        let monday = book.todays_reading(Weekday::Mon);
        assert_eq!(monday.range_label, "Psalms 22-41");
        let ids: Vec<u32> = monday.psalms.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![22, 23]);

        let sunday = book.todays_reading(Weekday::Sun);
        assert_eq!(sunday.psalms.len(), 1);
    }

    #[test]
    fn test_search() {
        let book = PsalmBook::from_json(SAMPLE).unwrap();
        let hits = book.search("SHEPHERD");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 23);
        assert!(book.search("psalm 22").iter().any(|p| p.id == 22));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let book = PsalmBook::load(file.path()).unwrap();
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(PsalmBook::from_json("{not json").is_err());
    }
}

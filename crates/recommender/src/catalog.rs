//! Item catalog for resolving recommended ids to book titles
//!
//! Read from a JSON-lines file, one book per line:
//!
//! ```text
//! {"id": 95084, "title": "The Master and Margarita"}
//! ```
//!
//! Extra fields are ignored.

use crate::error::{RecError, Result};
use crate::feed::{open_feed, read_records};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    titles: HashMap<usize, String>,
}

impl ItemCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Result<Self> {
        let mut titles = HashMap::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let id = usize::try_from(item.id).map_err(|_| {
                RecError::Feed(format!("catalog entry {}: negative id {}", index, item.id))
            })?;
            // first occurrence wins
            titles.entry(id).or_insert(item.title);
        }
        Ok(Self { titles })
    }

    pub fn read(reader: impl Read) -> Result<Self> {
        Self::new(read_records(reader)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let catalog = Self::read(open_feed(path)?)?;

        tracing::info!(
            path = %path.display(),
            count = catalog.len(),
            "Loaded item catalog"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn get(&self, item_id: usize) -> Option<&str> {
        self.titles.get(&item_id).map(String::as_str)
    }

    /// Title for `item_id`, or a placeholder naming the id
    pub fn title(&self, item_id: usize) -> String {
        match self.get(item_id) {
            Some(title) => title.to_string(),
            None => format!("Unknown book (ID: {})", item_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_catalog() {
        let input = r#"
{"id": 0, "title": "Solaris", "author": "Stanislaw Lem"}
{"id": 7, "title": "Roadside Picnic"}
{"id": 7, "title": "Duplicate"}
"#;
        let catalog = ItemCatalog::read(input.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(0), Some("Solaris"));
        assert_eq!(catalog.title(7), "Roadside Picnic");
    }

    #[test]
    fn test_unknown_title_fallback() {
        let catalog = ItemCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.title(42), "Unknown book (ID: 42)");
    }

    #[test]
    fn test_negative_id_rejected() {
        let result = ItemCatalog::read(r#"{"id": -5, "title": "x"}"#.as_bytes());
        assert!(matches!(result, Err(RecError::Feed(_))));
    }

    #[test]
    fn test_load_missing_catalog() {
        assert!(matches!(
            ItemCatalog::load("/nonexistent/items.jsonl"),
            Err(RecError::Feed(_))
        ));
    }
}

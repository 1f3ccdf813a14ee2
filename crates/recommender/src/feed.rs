//! JSON-lines feed readers
//!
//! Interactions come one per line:
//!
//! ```text
//! {"user_id": 159614, "item_id": 95084, "rating": 5, "timestamp": "2019-12-31T00:00:00Z"}
//! ```
//!
//! Blank lines are skipped; `rating` and `timestamp` may be omitted or null.
//! The item catalog uses the same layout (see [`crate::catalog`]).

use crate::error::{RecError, Result};
use crate::interactions::Interaction;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Decode one record per non-blank line
pub fn read_records<T: DeserializeOwned>(reader: impl Read) -> Result<Vec<T>> {
    let mut records = Vec::new();

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: T = serde_json::from_str(trimmed)
            .map_err(|e| RecError::Feed(format!("line {}: {}", line_no + 1, e)))?;
        records.push(record);
    }

    Ok(records)
}

pub(crate) fn open_feed(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| RecError::Feed(format!("cannot open {}: {}", path.display(), e)))
}

pub fn read_interactions(reader: impl Read) -> Result<Vec<Interaction>> {
    read_records(reader)
}

pub fn load_interactions(path: impl AsRef<Path>) -> Result<Vec<Interaction>> {
    let path = path.as_ref();
    let interactions = read_interactions(open_feed(path)?)?;

    tracing::info!(
        path = %path.display(),
        count = interactions.len(),
        "Loaded interaction feed"
    );
    Ok(interactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_interactions() {
        let input = r#"
{"user_id": 1, "item_id": 2, "rating": 5, "timestamp": "2019-12-31T00:00:00Z"}

{"user_id": 1, "item_id": 3, "rating": null}
{"user_id": 4, "item_id": 2}
"#;
        let interactions = read_interactions(input.as_bytes()).unwrap();

        assert_eq!(interactions.len(), 3);
        assert_eq!(interactions[0].rating, Some(5.0));
        assert!(interactions[0].timestamp.is_some());
        assert_eq!(interactions[1].rating, None);
        assert_eq!(interactions[2], Interaction::unrated(4, 2));
    }

    #[test]
    fn test_read_interactions_reports_line() {
        let input = "{\"user_id\": 1, \"item_id\": 2}\nnot json\n";
        let err = read_interactions(input.as_bytes()).unwrap_err();
        assert!(matches!(err, RecError::Feed(ref msg) if msg.starts_with("line 2")));
    }

    #[test]
    fn test_load_interactions_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"user_id": 0, "item_id": 1, "rating": 4.5}}"#).unwrap();

        let interactions = load_interactions(file.path()).unwrap();
        assert_eq!(interactions, vec![Interaction::new(0, 1, 4.5)]);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_interactions("/nonexistent/interactions.jsonl"),
            Err(RecError::Feed(_))
        ));
    }
}

use expiring_store::Identifiable;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

/// A short text note addressed by a caller-chosen id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
}

impl Note {
    pub fn new(id: &str, body: &str) -> Result<Self> {
        Ok(Self {
            id: validate_id(id)?,
            body: body.to_string(),
        })
    }
}

impl Identifiable for Note {
    type Id = String;

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Ids end up in file names, so path separators and empty ids are refused
pub fn validate_id(id: &str) -> Result<String> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(CliError::InvalidId(id.to_string()));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_is_identity() {
        let note = Note::new("groceries", "eggs").unwrap();
        assert_eq!(note.id(), "groceries");
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(Note::new("", "x").is_err());
        assert!(Note::new("a/b", "x").is_err());
        assert!(Note::new("..", "x").is_err());
        assert!(validate_id("ok-id.1").is_ok());
    }
}

//! User-to-embed directory
//!
//! Static mapping from a user's email to the embed ids they may view,
//! loaded once from a JSON array of `{email, embed_id}` records.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identity::AuthenticatedUser;
use crate::{Error, Result};

/// One `{email, embed_id}` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// User email, matched exactly against `preferred_username`
    pub email: String,
    /// Card or page embed id
    pub embed_id: String,
}

/// Read-only directory, in file order
#[derive(Debug, Clone, Default)]
pub struct EmbedDirectory {
    entries: Vec<DirectoryEntry>,
}

impl EmbedDirectory {
    /// Build a directory from in-memory entries
    #[must_use]
    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    /// Load the directory file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read directory {}: {e}", path.display()))
        })?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Invalid directory {}: {e}", path.display()))
        })?;

        let directory = Self::from_entries(entries);
        info!(
            path = %path.display(),
            entries = directory.len(),
            users = directory.user_count(),
            "Loaded embed directory"
        );
        Ok(directory)
    }

    /// Embed ids for the user, in file order; empty when the user is absent
    /// or carries no `preferred_username`
    #[must_use]
    pub fn embed_ids_for_user(&self, user: Option<&AuthenticatedUser>) -> Vec<String> {
        let Some(email) = user.and_then(AuthenticatedUser::preferred_username) else {
            return Vec::new();
        };
        self.embed_ids_for_email(email)
    }

    /// Embed ids whose entry email equals `email` exactly
    #[must_use]
    pub fn embed_ids_for_email(&self, email: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.email == email)
            .map(|entry| entry.embed_id.clone())
            .collect()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct emails
    #[must_use]
    pub fn user_count(&self) -> usize {
        let mut emails: Vec<&str> = self.entries.iter().map(|e| e.email.as_str()).collect();
        emails.sort_unstable();
        emails.dedup();
        emails.len()
    }
}

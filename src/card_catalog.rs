use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use serde::de::DeserializeOwned;

use crate::domain::CardMetadata;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("No valid, unposted cards remaining!")]
    Exhausted,
    #[error("Failed to save the posted cards to {}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize the posted cards")]
    Serialize(#[from] serde_json::Error),
}

/// The cards we know about and the ones already sent out.
#[derive(Debug)]
pub struct CardCatalog {
    cards: Vec<CardMetadata>,
    posted: Vec<String>,
    posted_path: PathBuf,
}

impl CardCatalog {
    /// Missing or undecodable files are logged and treated as empty.
    #[tracing::instrument(name = "Loading the card catalog")]
    pub fn load(metadata_path: &Path, posted_path: &Path) -> Self {
        let metadata: serde_json::Value = load_json(metadata_path).unwrap_or_default();
        let posted: Vec<String> = load_json(posted_path).unwrap_or_default();

        let captures = metadata
            .pointer("/nyplAPI/response/capture")
            .and_then(|c| c.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        if captures.is_empty() {
            tracing::warn!("The metadata lists no captures");
        }

        let cards = captures
            .iter()
            .filter_map(|capture| match CardMetadata::try_from(capture) {
                Ok(card) => Some(card),
                Err(reason) => {
                    tracing::debug!(%reason, "Skipping capture");
                    None
                }
            })
            .collect();

        Self::new(cards, posted, posted_path.to_path_buf())
    }

    pub fn new(cards: Vec<CardMetadata>, posted: Vec<String>, posted_path: PathBuf) -> Self {
        Self {
            cards,
            posted,
            posted_path,
        }
    }

    pub fn posted(&self) -> &[String] {
        &self.posted
    }

    pub fn is_posted(&self, uuid: &str) -> bool {
        self.posted.iter().any(|p| p == uuid)
    }

    pub fn random_unposted_card(&self) -> Result<CardMetadata, CatalogError> {
        let posted: HashSet<&str> = self.posted.iter().map(String::as_str).collect();
        let available: Vec<&CardMetadata> = self
            .cards
            .iter()
            .filter(|card| !posted.contains(card.uuid.as_str()))
            .collect();

        available
            .choose(&mut rand::rng())
            .map(|card| (*card).clone())
            .ok_or(CatalogError::Exhausted)
    }

    pub fn mark_posted(&mut self, uuid: &str) {
        if !self.is_posted(uuid) {
            self.posted.push(uuid.to_owned());
        }
    }

    #[tracing::instrument(
        name = "Saving posted cards",
        skip(self),
        fields(path = %self.posted_path.display())
    )]
    pub fn save(&self) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(&self.posted)?;
        std::fs::write(&self.posted_path, json).map_err(|source| CatalogError::Save {
            path: self.posted_path.clone(),
            source,
        })
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error.message = %e, path = %path.display(), "Could not read file");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error.message = %e, path = %path.display(), "Could not decode file");
            None
        }
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::archive::BackupDocument;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    New,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreCandidate {
    pub identifier: String,
    pub name: String,
    pub author: String,
    pub sticker_count: usize,
    pub status: RestoreStatus,
}

/// Which archived packages can be imported, and which of those are selected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestorePlan {
    candidates: Vec<RestoreCandidate>,
    selected: BTreeSet<String>,
}

impl RestorePlan {
    /// Classify every archived package against the local identifiers. Nothing is selected.
    #[must_use]
    pub fn new(document: &BackupDocument, local_identifiers: &BTreeSet<String>) -> Self {
        let candidates = document
            .packages
            .iter()
            .map(|package| RestoreCandidate {
                identifier: package.identifier.clone(),
                name: package.name.clone(),
                author: package.author.clone(),
                sticker_count: package.stickers.len(),
                status: if local_identifiers.contains(&package.identifier) {
                    RestoreStatus::Exists
                } else {
                    RestoreStatus::New
                },
            })
            .collect();
        Self { candidates, selected: BTreeSet::new() }
    }

    #[must_use]
    pub fn candidates(&self) -> &[RestoreCandidate] {
        &self.candidates
    }

    #[must_use]
    pub fn status(&self, identifier: &str) -> Option<RestoreStatus> {
        self.candidates
            .iter()
            .find(|candidate| candidate.identifier == identifier)
            .map(|candidate| candidate.status)
    }

    /// Flip selection of a `New` candidate and return whether it is now selected.
    /// `Exists` and unknown identifiers are left alone.
    pub fn toggle(&mut self, identifier: &str) -> bool {
        if self.status(identifier) != Some(RestoreStatus::New) {
            return false;
        }
        if !self.selected.remove(identifier) {
            self.selected.insert(identifier.to_string());
        }
        self.selected.contains(identifier)
    }

    pub fn select_all_new(&mut self) {
        self.selected = self
            .candidates
            .iter()
            .filter(|candidate| candidate.status == RestoreStatus::New)
            .map(|candidate| candidate.identifier.clone())
            .collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    #[must_use]
    pub fn is_selected(&self, identifier: &str) -> bool {
        self.selected.contains(identifier)
    }

    /// Identifiers to hand to restore; always a subset of the `New` candidates.
    #[must_use]
    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    #[must_use]
    pub fn new_count(&self) -> usize {
        self.candidates.iter().filter(|candidate| candidate.status == RestoreStatus::New).count()
    }
}

use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use failsense_core::{apply_feedback, FeedbackTransition, HistoryId, HistoryItem};
use serde::{Deserialize, Serialize};

use crate::{BlobStore, HISTORY_KEY};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Ids dropped from the tail to stay within capacity, oldest last.
    pub evicted: Vec<HistoryId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Updated { transition: FeedbackTransition },
    NotFound,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped_existing: usize,
    pub evicted: usize,
}

/// Bounded, newest-first collection of analyses persisted as one blob.
pub struct HistoryStore<S: BlobStore> {
    port: S,
    capacity: usize,
    items: Vec<HistoryItem>,
}

impl<S: BlobStore> HistoryStore<S> {
    /// Open the store and load the persisted snapshot.
    ///
    /// A missing blob is an empty history. A blob that cannot be decoded is
    /// logged and treated as empty; it is left untouched until the next write.
    ///
    /// # Errors
    /// Returns an error when `capacity` is zero or the backend cannot be read.
    pub fn open(port: S, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("history capacity MUST be at least 1"));
        }

        let mut store = Self { port, capacity, items: Vec::new() };
        store.items = store.load_persisted()?;
        Ok(store)
    }

    #[must_use]
    pub fn all(&self) -> &[HistoryItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &HistoryId) -> Option<&HistoryItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refresh the in-memory snapshot from the persisted blob.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be read.
    pub fn reload(&mut self) -> Result<()> {
        self.items = self.load_persisted()?;
        Ok(())
    }

    /// Insert `item` as the newest entry, evicting the oldest entries beyond
    /// capacity. A stored item with the same id is replaced.
    ///
    /// # Errors
    /// Returns an error when the item is invalid or persistence fails.
    pub fn append(&mut self, item: HistoryItem) -> Result<AppendOutcome> {
        item.validate()?;

        let mut items = self.load_persisted()?;
        items.retain(|existing| existing.id != item.id);
        items.insert(0, item);
        let evicted = self.evict_overflow(&mut items);

        self.persist(items)?;
        Ok(AppendOutcome { evicted })
    }

    /// Remove the item with `id`. Returns `false` when no such item exists.
    ///
    /// # Errors
    /// Returns an error when persistence fails.
    pub fn delete_by_id(&mut self, id: &HistoryId) -> Result<bool> {
        let mut items = self.load_persisted()?;
        let before = items.len();
        items.retain(|item| &item.id != id);

        if items.len() == before {
            tracing::debug!(%id, "delete ignored for unknown history item");
            self.items = items;
            return Ok(false);
        }

        self.persist(items)?;
        Ok(true)
    }

    /// # Errors
    /// Returns an error when the blob cannot be removed.
    pub fn clear(&mut self) -> Result<()> {
        self.port.remove(HISTORY_KEY).context("failed to clear history blob")?;
        tracing::info!(removed = self.items.len(), "history cleared");
        self.items.clear();
        Ok(())
    }

    /// Record whether fix `fix_index` resolved the analysis `id`.
    ///
    /// # Errors
    /// Returns an error when `worked` is set for a fix the item does not have,
    /// or when persistence fails. An unknown id is not an error.
    pub fn record_feedback(
        &mut self,
        id: &HistoryId,
        fix_index: usize,
        worked: bool,
    ) -> Result<FeedbackOutcome> {
        let mut items = self.load_persisted()?;
        let Some(position) = items.iter().position(|item| &item.id == id) else {
            tracing::debug!(%id, fix_index, "feedback ignored for unknown history item");
            self.items = items;
            return Ok(FeedbackOutcome::NotFound);
        };

        let transition = apply_feedback(&mut items[position], fix_index, worked)?;
        self.persist(items)?;
        Ok(FeedbackOutcome::Updated { transition })
    }

    /// Apply a new bound immediately, evicting the oldest entries beyond it.
    ///
    /// # Errors
    /// Returns an error when `capacity` is zero or persistence fails.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<Vec<HistoryId>> {
        if capacity == 0 {
            return Err(anyhow!("history capacity MUST be at least 1"));
        }

        self.capacity = capacity;
        let mut items = self.load_persisted_untruncated()?;
        let evicted = self.evict_overflow(&mut items);
        if evicted.is_empty() {
            self.items = items;
        } else {
            self.persist(items)?;
        }
        Ok(evicted)
    }

    /// Merge `incoming` (newest-first) into the store. Items are appended
    /// oldest first so the merged history stays newest-first.
    ///
    /// # Errors
    /// Returns an error when an incoming item is invalid, an id already exists
    /// and `skip_existing` is unset, or persistence fails. Nothing is written
    /// in the error case.
    pub fn import(&mut self, incoming: &[HistoryItem], skip_existing: bool) -> Result<ImportSummary> {
        let mut items = self.load_persisted()?;
        let mut summary = ImportSummary::default();

        for item in incoming.iter().rev() {
            item.validate().with_context(|| format!("invalid history item {}", item.id))?;
            if items.iter().any(|existing| existing.id == item.id) {
                if skip_existing {
                    summary.skipped_existing += 1;
                    continue;
                }
                return Err(anyhow!("history item already exists: {}", item.id));
            }
            items.insert(0, item.clone());
            summary.imported += 1;
        }

        summary.evicted = self.evict_overflow(&mut items).len();
        self.persist(items)?;
        Ok(summary)
    }

    fn evict_overflow(&self, items: &mut Vec<HistoryItem>) -> Vec<HistoryId> {
        if items.len() <= self.capacity {
            return Vec::new();
        }

        let evicted =
            items.split_off(self.capacity).into_iter().map(|item| item.id).collect::<Vec<_>>();
        tracing::info!(
            count = evicted.len(),
            capacity = self.capacity,
            "evicted oldest history items"
        );
        evicted
    }

    fn persist(&mut self, items: Vec<HistoryItem>) -> Result<()> {
        let encoded = serde_json::to_string(&items).context("failed to serialize history")?;
        self.port.write(HISTORY_KEY, &encoded).context("failed to persist history blob")?;
        self.items = items;
        Ok(())
    }

    fn load_persisted(&self) -> Result<Vec<HistoryItem>> {
        let mut items = self.load_persisted_untruncated()?;
        items.truncate(self.capacity);
        Ok(items)
    }

    fn load_persisted_untruncated(&self) -> Result<Vec<HistoryItem>> {
        let Some(raw) = self.port.read(HISTORY_KEY).context("failed to read history blob")? else {
            return Ok(Vec::new());
        };

        let decoded = match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(error = %err, "persisted history is corrupt; starting empty");
                return Ok(Vec::new());
            }
        };

        let mut seen = BTreeSet::new();
        let mut items = Vec::with_capacity(decoded.len());
        for mut item in decoded {
            if item.id.as_str().trim().is_empty() || !seen.insert(item.id.clone()) {
                tracing::warn!(id = %item.id, "dropping history item with blank or duplicate id");
                continue;
            }
            if item.repair() {
                tracing::debug!(id = %item.id, "repaired persisted history item");
            }
            items.push(item);
        }
        Ok(items)
    }
}

use anyhow::{Context, Result};
use failsense_core::Preferences;

use crate::{BlobStore, PREFERENCES_KEY};

pub struct PreferencesStore<S: BlobStore> {
    port: S,
}

impl<S: BlobStore> PreferencesStore<S> {
    #[must_use]
    pub fn new(port: S) -> Self {
        Self { port }
    }

    /// Load stored preferences merged over the defaults.
    ///
    /// # Errors
    /// Returns an error only when the backend cannot be read; an undecodable
    /// blob yields the defaults.
    pub fn load(&self) -> Result<Preferences> {
        let Some(raw) =
            self.port.read(PREFERENCES_KEY).context("failed to read preferences blob")?
        else {
            return Ok(Preferences::default());
        };

        match serde_json::from_str::<Preferences>(&raw) {
            Ok(prefs) => Ok(prefs.sanitized()),
            Err(err) => {
                tracing::warn!(error = %err, "persisted preferences are corrupt; using defaults");
                Ok(Preferences::default())
            }
        }
    }

    /// # Errors
    /// Returns an error when `prefs` is invalid or cannot be persisted.
    pub fn save(&self, prefs: &Preferences) -> Result<()> {
        prefs.validate()?;
        let encoded = serde_json::to_string(prefs).context("failed to serialize preferences")?;
        self.port.write(PREFERENCES_KEY, &encoded).context("failed to persist preferences blob")
    }

    /// Forget stored preferences and return the defaults.
    ///
    /// # Errors
    /// Returns an error when the blob cannot be removed.
    pub fn reset(&self) -> Result<Preferences> {
        self.port.remove(PREFERENCES_KEY).context("failed to remove preferences blob")?;
        Ok(Preferences::default())
    }
}

#[cfg(test)]
mod tests {
    use failsense_core::ExportFormat;

    use super::*;
    use crate::MemoryBlobStore;

    #[test]
    fn missing_blob_yields_defaults() -> Result<()> {
        let store = PreferencesStore::new(MemoryBlobStore::new());
        assert_eq!(store.load()?, Preferences::default());
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips() -> Result<()> {
        let store = PreferencesStore::new(MemoryBlobStore::new());
        let prefs = Preferences {
            default_language: "rust".to_string(),
            export_format: ExportFormat::Text,
            history_limit: 42,
            ..Preferences::default()
        };
        store.save(&prefs)?;
        assert_eq!(store.load()?, prefs);
        Ok(())
    }

    #[test]
    fn save_rejects_invalid_limit() -> Result<()> {
        let port = MemoryBlobStore::new();
        let store = PreferencesStore::new(&port);
        let prefs = Preferences { history_limit: 0, ..Preferences::default() };
        assert!(store.save(&prefs).is_err());
        assert_eq!(port.read(PREFERENCES_KEY)?, None);
        Ok(())
    }

    #[test]
    fn partial_and_out_of_range_blobs_are_normalized() -> Result<()> {
        let port = MemoryBlobStore::new();
        port.write(PREFERENCES_KEY, r#"{"historyLimit": 400, "autoAnalyze": true}"#)?;
        let prefs = PreferencesStore::new(&port).load()?;
        assert_eq!(prefs.history_limit, 50);
        assert!(prefs.auto_analyze);
        assert_eq!(prefs.default_language, "javascript");
        Ok(())
    }

    #[test]
    fn corrupt_blob_yields_defaults_and_reset_removes_blob() -> Result<()> {
        let port = MemoryBlobStore::new();
        port.write(PREFERENCES_KEY, "nope")?;
        let store = PreferencesStore::new(&port);
        assert_eq!(store.load()?, Preferences::default());

        assert_eq!(store.reset()?, Preferences::default());
        assert_eq!(port.read(PREFERENCES_KEY)?, None);
        Ok(())
    }
}

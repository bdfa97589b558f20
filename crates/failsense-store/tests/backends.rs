use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use failsense_core::{AnalysisResult, Fix, HistoryId, HistoryItem, Preferences};
use failsense_store::{
    export_history, read_history_snapshot, BlobStore, HistoryStore, JsonDirBlobStore,
    PreferencesStore, SqliteBlobStore,
};

fn mk_item(index: i64) -> HistoryItem {
    HistoryItem {
        id: HistoryId(format!("analysis-{index}")),
        timestamp: 1_760_000_000_000 + index,
        code: format!("KeyError: 'user_{index}'"),
        result: AnalysisResult {
            root_cause: "dictionary lookup for a missing key".to_string(),
            error_type: "KeyError".to_string(),
            fixes: vec![
                Fix {
                    fix: "Use dict.get with a default".to_string(),
                    confidence: 0.9,
                    explanation: "Avoids raising on absent keys".to_string(),
                    feedback: None,
                },
                Fix {
                    fix: "Check membership first".to_string(),
                    confidence: 0.7,
                    explanation: "Guards the lookup".to_string(),
                    feedback: None,
                },
            ],
            explanation: "The key was never inserted.".to_string(),
        },
        language: "python".to_string(),
        worked_fix_index: None,
        tags: (index % 2 == 0).then(|| vec!["even".to_string()]),
    }
}

fn exercise_backend(port: Arc<dyn BlobStore>) -> Result<()> {
    let mut history = HistoryStore::open(Arc::clone(&port), 20)?;
    for index in 0..25 {
        history.append(mk_item(index))?;
    }
    history.record_feedback(&HistoryId::from("analysis-24"), 1, true)?;

    let prefs = PreferencesStore::new(Arc::clone(&port));
    prefs.save(&Preferences { history_limit: 20, ..Preferences::default() })?;

    let reopened = HistoryStore::open(Arc::clone(&port), prefs.load()?.history_limit)?;
    assert_eq!(reopened.len(), 20);
    assert_eq!(reopened.all()[0].id.as_str(), "analysis-24");
    assert_eq!(reopened.all()[0].worked_fix_index, Some(1));
    assert_eq!(reopened.all()[19].id.as_str(), "analysis-5");
    assert_eq!(reopened.all(), history.all());
    Ok(())
}

#[test]
fn sqlite_backend_round_trips_history_and_preferences() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SqliteBlobStore::open_migrated(&dir.path().join("failsense.sqlite3"))?;
    exercise_backend(Arc::new(store))
}

#[test]
fn json_dir_backend_round_trips_history_and_preferences() -> Result<()> {
    let dir = tempfile::tempdir()?;
    exercise_backend(Arc::new(JsonDirBlobStore::open(dir.path())?))?;
    assert!(dir.path().join("failsense-history.json").exists());
    assert!(dir.path().join("failsense-preferences.json").exists());
    Ok(())
}

#[test]
fn snapshot_moves_history_between_databases() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = SqliteBlobStore::open_migrated(&dir.path().join("source.sqlite3"))?;
    let mut history = HistoryStore::open(&source, 20)?;
    for index in 0..5 {
        history.append(mk_item(index))?;
    }

    let snapshot_dir = dir.path().join("snapshot");
    let manifest = export_history(history.all(), &snapshot_dir)?;
    assert_eq!(manifest.files[0].records, 5);

    let target = SqliteBlobStore::open_migrated(Path::new(":memory:"))?;
    let mut imported = HistoryStore::open(&target, 3)?;
    imported.append(mk_item(4))?;

    let summary = imported.import(&read_history_snapshot(&snapshot_dir)?, true)?;
    assert_eq!(summary.imported, 4);
    assert_eq!(summary.skipped_existing, 1);
    assert_eq!(summary.evicted, 2);

    let ids = imported.all().iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["analysis-3", "analysis-2", "analysis-1"]);
    Ok(())
}

// Store persistence and flag-invariant tests
// Run with: cargo test --package papercast --lib store::tests

#[cfg(test)]
mod item_tests {
    use crate::store::{ItemMetadata, Store};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn metadata(id: &str) -> ItemMetadata {
        ItemMetadata {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            title: format!("Paper {}", id),
            source_url: format!("https://example.org/papers/{}", id),
            document_url: format!("https://example.org/pdf/{}", id),
            synopsis: Some("We study things.".to_string()),
        }
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let (store, _temp) = setup_test_store();
        assert!(!store.path().exists());
        assert!(store.item_ids().unwrap().is_empty());
        assert!(store.get_item("p1").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get_item() {
        let (store, temp) = setup_test_store();
        store.put_item(&metadata("p1")).unwrap();

        let item = store.get_item("p1").unwrap().unwrap();
        assert_eq!(item.metadata(), &metadata("p1"));
        assert_eq!(item.location_on_disk(), temp.path().join("p1"));
        assert!(store.path().exists());
    }

    #[test]
    fn test_item_ids_sorted() {
        let (store, _temp) = setup_test_store();
        for id in ["p3", "p1", "p2"] {
            store.put_item(&metadata(id)).unwrap();
        }
        assert_eq!(store.item_ids().unwrap(), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_reopen_sees_saved_state() {
        let temp = TempDir::new().unwrap();
        {
            let store = Store::open(temp.path()).unwrap();
            store.put_item(&metadata("p1")).unwrap();
        }
        let store = Store::open(temp.path()).unwrap();
        assert!(store.get_item("p1").unwrap().is_some());
        assert!(!temp.path().join("state.json.tmp").exists());
    }
}

#[cfg(test)]
mod flag_tests {
    use crate::error::AppError;
    use crate::store::{ItemMetadata, Stage, StageFlags, Store};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup_with_items(ids: &[&str]) -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path()).unwrap();
        for id in ids {
            store
                .put_item(&ItemMetadata {
                    id: id.to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
                    title: id.to_string(),
                    source_url: String::new(),
                    document_url: format!("https://example.org/pdf/{}", id),
                    synopsis: None,
                })
                .unwrap();
        }
        (store, temp_dir)
    }

    fn ids(items: Vec<crate::item::Item>) -> Vec<String> {
        items.into_iter().map(|i| i.id().to_string()).collect()
    }

    #[test]
    fn test_flag_requires_prerequisite() {
        let (store, _temp) = setup_with_items(&["p1"]);

        let err = store.set_flag("p1", Stage::Synthesize, true).unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert_eq!(store.get_flag("p1", Stage::Synthesize).unwrap(), None);

        store.set_flag("p1", Stage::Acquire, true).unwrap();
        store.set_flag("p1", Stage::Synthesize, true).unwrap();
        assert_eq!(store.get_flag("p1", Stage::Synthesize).unwrap(), Some(true));
    }

    #[test]
    fn test_clearing_flag_clears_later_stages() {
        let (store, _temp) = setup_with_items(&["p1"]);
        for stage in Stage::ALL {
            store.set_flag("p1", stage, true).unwrap();
        }

        store.set_flag("p1", Stage::Synthesize, false).unwrap();

        let flags = store.get_flags("p1").unwrap();
        assert!(flags.is_done(Stage::Acquire));
        assert!(!flags.is_done(Stage::Synthesize));
        assert!(!flags.is_done(Stage::Publish));
    }

    #[test]
    fn test_backlog_per_stage() {
        let (store, _temp) = setup_with_items(&["p1", "p2", "p3"]);
        store.set_flag("p1", Stage::Acquire, true).unwrap();
        store.set_flag("p2", Stage::Acquire, true).unwrap();
        store.set_flag("p2", Stage::Synthesize, true).unwrap();

        assert_eq!(ids(store.backlog(Stage::Synthesize).unwrap()), vec!["p1"]);
        assert_eq!(ids(store.backlog(Stage::Publish).unwrap()), vec!["p2"]);
    }

    #[test]
    fn test_find_and_count_by_flags() {
        let (store, _temp) = setup_with_items(&["p1", "p2"]);
        store.set_flag("p2", Stage::Acquire, true).unwrap();
        store.set_flag("p1", Stage::Acquire, true).unwrap();

        let acquired = |f: &StageFlags| f.is_done(Stage::Acquire);
        assert_eq!(store.count_by_flags(acquired).unwrap(), 2);
        assert_eq!(
            store.find_first_by_flags(acquired).unwrap().unwrap().id(),
            "p1"
        );
        assert!(store
            .find_first_by_flags(|f| f.is_done(Stage::Publish))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_orphan_flags_are_skipped() {
        let (store, _temp) = setup_with_items(&["p1"]);
        store.set_flag("p1", Stage::Acquire, true).unwrap();
        store.set_flag("ghost", Stage::Acquire, true).unwrap();

        assert_eq!(ids(store.backlog(Stage::Synthesize).unwrap()), vec!["p1"]);
    }

    #[test]
    fn test_backlog_agrees_with_stage_counts() {
        let (store, _temp) = setup_with_items(&["p1", "p2", "p3"]);
        // p2 was recorded but its download failed, so it has no flags
        store.set_flag("p1", Stage::Acquire, true).unwrap();
        store.set_flag("p3", Stage::Acquire, true).unwrap();
        store.set_flag("p3", Stage::Synthesize, true).unwrap();

        assert_eq!(ids(store.backlog(Stage::Acquire).unwrap()), vec!["p2"]);
        for (stage, counts) in Stage::ALL.into_iter().zip(store.stage_counts().unwrap()) {
            assert_eq!(store.backlog(stage).unwrap().len(), counts.backlog, "{}", stage);
        }
    }

    #[test]
    fn test_stage_counts_include_unflagged_items() {
        let (store, _temp) = setup_with_items(&["p1", "p2", "p3"]);
        store.set_flag("p1", Stage::Acquire, true).unwrap();
        store.set_flag("p1", Stage::Synthesize, true).unwrap();
        store.set_flag("p2", Stage::Acquire, true).unwrap();

        let counts = store.stage_counts().unwrap();
        assert_eq!(counts.len(), 3);

        assert_eq!(counts[0].stage, "acquire");
        assert_eq!((counts[0].done, counts[0].backlog), (2, 1));
        assert_eq!(counts[1].stage, "synthesize");
        assert_eq!((counts[1].done, counts[1].backlog), (1, 1));
        assert_eq!(counts[2].stage, "publish");
        assert_eq!((counts[2].done, counts[2].backlog), (0, 1));
    }
}

#[cfg(test)]
mod schema_tests {
    use crate::error::AppError;
    use crate::store::{Stage, Store, SCHEMA_VERSION};
    use tempfile::TempDir;

    #[test]
    fn test_version_zero_document_is_migrated() {
        let temp = TempDir::new().unwrap();
        let legacy = r#"{
            "papers": {
                "2501.00001": {
                    "id": "2501.00001",
                    "date": "2025-01-02",
                    "title": "Legacy paper",
                    "url": "https://example.org/papers/2501.00001",
                    "pdfUrl": "https://example.org/pdf/2501.00001",
                    "abstract": "Old abstract"
                }
            },
            "paper_states": {
                "2501.00001": { "downloadedPDF": true, "processedPodcast": true }
            }
        }"#;
        std::fs::write(temp.path().join("state.json"), legacy).unwrap();

        let store = Store::open(temp.path()).unwrap();
        let item = store.get_item("2501.00001").unwrap().unwrap();
        assert_eq!(item.metadata().title, "Legacy paper");
        assert_eq!(
            item.metadata().document_url,
            "https://example.org/pdf/2501.00001"
        );
        assert_eq!(item.metadata().synopsis.as_deref(), Some("Old abstract"));
        assert_eq!(store.backlog(Stage::Publish).unwrap().len(), 1);

        // The next save writes the current layout
        store.set_flag("2501.00001", Stage::Publish, true).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(saved["schema_version"], SCHEMA_VERSION);
        assert_eq!(saved["flags"]["2501.00001"]["published"], true);
        assert_eq!(
            saved["items"]["2501.00001"]["document_url"],
            "https://example.org/pdf/2501.00001"
        );
    }

    #[test]
    fn test_future_schema_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("state.json"),
            r#"{"schema_version": 99, "items": {}, "flags": {}}"#,
        )
        .unwrap();

        let result = Store::open(temp.path());
        assert!(matches!(result, Err(AppError::Precondition(_))));
    }

    #[test]
    fn test_corrupt_document_is_store_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("state.json"), "{ not json").unwrap();

        let result = Store::open(temp.path());
        assert!(matches!(result, Err(AppError::Store(_))));
    }
}

mod fixtures;

use fixtures::{builder, entries, root, row};
use flex_storage::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;
use walkdir::WalkDir;

fn snapshot(dir: &std::path::Path) -> Vec<(PathBuf, SystemTime)> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            (entry.path().to_path_buf(), entry.metadata().unwrap().modified().unwrap())
        })
        .collect()
}

fn keys(storage: &FlexStorage) -> Vec<String> {
    storage.get_existing_keys().unwrap().into_keys().collect()
}

#[test]
fn test_folder_record_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).pattern("{FOLDER}/{KEY}/item.yaml").open().unwrap();

    let saved = storage.create_rows([("abc123", row(json!({ "title": "Hello" })))]).unwrap();
    let created = &saved["abc123"];
    assert_eq!(created["storage_key"], "abc123");
    assert_eq!(created[META_FIELD]["exists"], true);

    let file = root.join("abc123/item.yaml");
    assert_eq!(fs::read_to_string(&file).unwrap(), "title: Hello\n");
    assert_eq!(storage.get_storage_path(Some("abc123")).unwrap(), root.join("abc123"));
    assert_eq!(storage.get_media_path(Some("abc123")).unwrap(), root.join("abc123"));
    assert_eq!(storage.get_storage_path(None).unwrap(), root);

    let loaded = storage.read_row("abc123").unwrap().unwrap();
    assert_eq!(loaded["title"], "Hello");
    assert_eq!(loaded[storage.key_field()], "abc123");

    fs::write(root.join("abc123/photo.jpg"), b"jpeg").unwrap();
    let deleted = storage.delete_rows(["abc123"]).unwrap();
    let prior = deleted["abc123"].as_ref().and_then(RecordContent::as_row).unwrap();
    assert_eq!(prior["title"], "Hello");

    assert!(!root.join("abc123").exists(), "the record folder goes with its media");
    assert!(root.is_dir(), "the storage root is never deleted");
    assert!(!storage.has_key("abc123"));
}

#[test]
fn test_delete_folder_disabled_keeps_media() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).delete_folder(false).open().unwrap();

    storage.create_rows([("keep", row(json!({ "a": 1 })))]).unwrap();
    fs::write(root.join("keep/photo.jpg"), b"jpeg").unwrap();
    storage.delete_rows(["keep"]).unwrap();

    assert_eq!(entries(&root.join("keep")), ["photo.jpg"]);
    assert!(!storage.has_key("keep"));
}

#[test]
fn test_copy_and_rename_preconditions() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).open().unwrap();
    storage
        .create_rows([("a", row(json!({ "n": 1 }))), ("b", row(json!({ "n": 2 })))])
        .unwrap();

    let err = storage.copy_row("a", "b").unwrap_err();
    assert!(matches!(err, StorageError::KeyConflict { .. }), "got {err}");
    let err = storage.rename_row("a", "b").unwrap_err();
    assert!(matches!(err, StorageError::KeyConflict { .. }), "got {err}");
    assert_eq!(storage.read_row("b").unwrap().unwrap()["n"], 2, "conflicts never overwrite");

    assert!(!storage.copy_row("missing", "c").unwrap());
    assert!(!storage.rename_row("missing", "c").unwrap());
    assert!(storage.rename_row("a", "a").unwrap());

    fs::write(root.join("a/photo.jpg"), b"jpeg").unwrap();
    assert!(storage.copy_row("a", "c").unwrap());
    assert!(storage.has_key("a") && storage.has_key("c"));
    assert_eq!(entries(&root.join("c")), ["item.json", "photo.jpg"]);
    assert_eq!(storage.read_row("c").unwrap().unwrap()["n"], 1);

    storage.update_rows([("c", row(json!({ "n": 5 })))]).unwrap();
    assert_eq!(storage.read_row("c").unwrap().unwrap()["n"], 5);
    let source = storage.read_row("a").unwrap().unwrap();
    assert_eq!(source["n"], 1, "updating a copy leaves the source alone");

    assert!(storage.rename_row("c", "d").unwrap());
    assert!(!storage.has_key("c"));
    assert!(!root.join("c").exists());
    let moved = storage.read_row("d").unwrap().unwrap();
    assert_eq!(moved["n"], 5);
    assert_eq!(moved["storage_key"], "d");
    assert_eq!(keys(&storage), ["a", "b", "d"]);
}

#[test]
fn test_copy_and_rename_onto_leftover_media() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).delete_folder(false).open().unwrap();
    storage
        .create_rows([("a", row(json!({ "n": 1 }))), ("b", row(json!({ "n": 2 })))])
        .unwrap();
    fs::write(root.join("b/photo.jpg"), b"jpeg").unwrap();
    storage.delete_rows(["b"]).unwrap();
    assert!(!storage.has_key("b"));

    assert!(storage.copy_row("a", "b").unwrap());
    assert_eq!(entries(&root.join("b")), ["item.json", "photo.jpg"]);
    let copied = storage.read_row("b").unwrap().unwrap();
    assert_eq!(copied["n"], 1);
    assert_eq!(copied["storage_key"], "b");

    storage.delete_rows(["b"]).unwrap();
    assert!(storage.rename_row("a", "b").unwrap());
    assert!(!storage.has_key("a"));
    assert!(!root.join("a").exists());
    assert_eq!(entries(&root.join("b")), ["item.json", "photo.jpg"]);
    assert_eq!(storage.read_row("b").unwrap().unwrap()["n"], 1);
    assert_eq!(keys(&storage), ["b"]);
}

#[test]
fn test_absent_keys_are_silent_noops() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).open().unwrap();
    storage.create_rows([("a", row(json!({ "n": 1 })))]).unwrap();

    let before = snapshot(&root);
    let deleted = storage.delete_rows(["ghost"]).unwrap();
    assert_eq!(deleted.get("ghost"), Some(&None));
    let updated = storage.update_rows([("ghost", row(json!({ "n": 2 })))]).unwrap();
    assert_eq!(updated.get("ghost"), Some(&None));
    assert_eq!(snapshot(&root), before, "no filesystem mutation for absent keys");

    assert!(storage.delete_rows(["a"]).unwrap()["a"].is_some());
    assert!(storage.delete_rows(["a"]).unwrap()["a"].is_none());
}

#[test]
fn test_update_and_replace() {
    let tmp = TempDir::new().unwrap();
    let storage = builder(&tmp).open().unwrap();
    storage.create_rows([("a", row(json!({ "n": 1 })))]).unwrap();

    let mut changed = storage.read_row("a").unwrap().unwrap();
    changed.insert("n".into(), json!(5));
    let updated = storage.update_rows([("a", changed)]).unwrap();
    assert_eq!(updated["a"].as_ref().unwrap()["n"], 5);

    let raw = fs::read_to_string(root(&tmp).join("a/item.json")).unwrap();
    assert!(!raw.contains(META_FIELD) && !raw.contains("storage_key"), "transient fields leaked");

    let replaced = storage
        .replace_rows([("a", row(json!({ "n": 6 }))), ("fresh", row(json!({ "n": 7 })))])
        .unwrap();
    assert_eq!(replaced["a"]["n"], 6);
    assert_eq!(replaced["fresh"]["n"], 7);
    assert_eq!(keys(&storage), ["a", "fresh"]);

    let err = storage.create_rows([("a", row(json!({})))]).unwrap_err();
    assert!(matches!(err, StorageError::KeyConflict { .. }), "got {err}");
}

#[test]
fn test_generated_keys_are_unique() {
    let tmp = TempDir::new().unwrap();
    let storage = builder(&tmp).layout(LayoutKind::FilePerRecord).open().unwrap();

    let rows = (0..1000).map(|i| (NEW_KEY, row(json!({ "i": i }))));
    let saved = storage.create_rows(rows).unwrap();

    assert_eq!(saved.len(), 1000);
    assert!(saved.keys().all(|key| key.len() == 32 && validate_key(key)));
    assert_eq!(storage.get_existing_keys().unwrap().len(), 1000);
}

#[test]
fn test_existing_keys_match_disk() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).open().unwrap();
    storage
        .create_rows([
            ("b", row(json!({}))),
            ("a", row(json!({}))),
            ("c", row(json!({}))),
        ])
        .unwrap();

    fs::create_dir_all(root.join(".git")).unwrap();
    fs::create_dir_all(root.join("orphan")).unwrap();
    fs::write(root.join("notes.txt"), b"x").unwrap();

    let existing = storage.get_existing_keys().unwrap();
    assert_eq!(existing.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
    assert!(existing.values().all(Meta::exists));
    assert!(storage.has_keys(["a", "orphan"]).into_values().eq([true, false]));
}

#[test]
fn test_prefixed_folder_layout() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).pattern("{FOLDER}/{KEY:2}/{KEY}").open().unwrap();
    assert!(storage.is_prefixed());

    storage
        .create_rows([
            ("abcdef", row(json!({}))),
            ("abxyz", row(json!({}))),
            ("z", row(json!({}))),
        ])
        .unwrap();

    assert!(root.join("ab/abcdef/item.json").is_file());
    assert!(root.join("z/z/item.json").is_file());
    assert_eq!(storage.get_storage_path(Some("abxyz")).unwrap(), root.join("ab/abxyz"));
    assert_eq!(keys(&storage), ["abcdef", "abxyz", "z"]);

    storage.delete_rows(["abcdef"]).unwrap();
    assert_eq!(entries(&root.join("ab")), ["abxyz"]);
}

#[test]
fn test_file_layout() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp)
        .layout(LayoutKind::FilePerRecord)
        .formatter_kind(FormatterKind::Yaml)
        .open()
        .unwrap();

    storage.create_rows([("one", row(json!({ "n": 1 })))]).unwrap();
    assert_eq!(fs::read_to_string(root.join("one.yaml")).unwrap(), "n: 1\n");
    assert_eq!(storage.get_storage_path(Some("one")).unwrap(), root.join("one"));

    assert!(storage.copy_row("one", "two").unwrap());
    assert!(storage.rename_row("two", "three").unwrap());
    fs::write(root.join("readme.txt"), b"not a record").unwrap();
    assert_eq!(entries(&root), ["one.yaml", "readme.txt", "three.yaml"]);
    assert_eq!(keys(&storage), ["one", "three"]);

    storage.delete_rows(["one", "three"]).unwrap();
    assert_eq!(entries(&root), ["readme.txt"]);
}

#[test]
fn test_corrupt_records_do_not_abort_bulk_reads() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).pattern("{FOLDER}/{KEY}/item.yaml").open().unwrap();
    storage.create_rows([("good", row(json!({ "title": "Fine" })))]).unwrap();

    fs::create_dir_all(root.join("bad")).unwrap();
    fs::write(root.join("bad/item.yaml"), "title: [unclosed\n").unwrap();
    fs::create_dir_all(root.join("legacy")).unwrap();
    fs::write(root.join("legacy/item.yaml"), "'0': first\n'1': second\n").unwrap();

    let rows = storage
        .read_rows([("good", None), ("bad", None), ("legacy", None), ("missing", None)], None)
        .unwrap();

    assert_eq!(rows["good"].as_ref().unwrap()["title"], "Fine");
    let bad = rows["bad"].as_ref().unwrap();
    assert!(row_error(bad).is_some());
    assert_eq!(bad.keys().collect::<Vec<_>>(), [ERROR_FIELD, META_FIELD]);
    assert_eq!(row_error(rows["legacy"].as_ref().unwrap()), Some("Broken object file"));
    assert!(rows["missing"].is_none());

    let deleted = storage.delete_rows(["bad"]).unwrap();
    assert_eq!(deleted["bad"], Some(RecordContent::Raw(b"title: [unclosed\n".to_vec())));
}

#[test]
fn test_read_rows_reports_fetched_subset() {
    let tmp = TempDir::new().unwrap();
    let storage = builder(&tmp).open().unwrap();
    storage.create_rows([("a", row(json!({}))), ("b", row(json!({ "n": 2 })))]).unwrap();

    let cached = row(json!({ "cached": true }));
    let mut fetched = BTreeMap::new();
    let rows = storage
        .read_rows(
            [("a", Some(cached.clone())), ("b", None), ("zzz", None)],
            Some(&mut fetched),
        )
        .unwrap();

    assert_eq!(rows["a"], Some(cached));
    assert_eq!(rows["b"].as_ref().unwrap()["n"], 2);
    assert_eq!(fetched.keys().collect::<Vec<_>>(), ["b", "zzz"]);
    assert!(fetched["zzz"].is_none());
}

#[test]
fn test_invalid_keys_rejected_before_io() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).open().unwrap();

    let err = storage
        .create_rows([("ok", row(json!({}))), ("../escape", row(json!({})))])
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidKey { .. }), "got {err}");
    assert!(err.to_string().contains("create_rows(../escape)"));
    assert!(!root.join("ok").exists(), "no row of a rejected batch is written");

    assert!(!storage.has_key("../escape"));
    assert!(storage.read_row(".hidden").unwrap().is_none());
    assert!(storage.copy_row("a/b", "c").is_err());
    assert!(storage.get_storage_path(Some("x:y")).is_err());
}

#[test]
fn test_case_insensitive_keys() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).case_sensitive(false).open().unwrap();

    let saved = storage.create_rows([("Hello", row(json!({})))]).unwrap();
    assert_eq!(saved.keys().collect::<Vec<_>>(), ["hello"]);
    assert!(root.join("hello/item.json").is_file());
    assert!(storage.has_key("HELLO"));
    assert!(storage.read_row("HeLLo").unwrap().is_some());

    fs::create_dir_all(root.join("Other")).unwrap();
    fs::write(root.join("Other/item.json"), b"{}").unwrap();
    assert_eq!(keys(&storage), ["hello"], "mixed-case entries are not addressable keys");

    let cached = row(json!({ "cached": true }));
    let rows =
        storage.read_rows([("Cached", Some(cached.clone())), ("HELLO", None)], None).unwrap();
    assert_eq!(rows.keys().collect::<Vec<_>>(), ["cached", "hello"]);
    assert_eq!(rows["cached"], Some(cached));
}

#[test]
fn test_shared_layout_keeps_file_order() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("users.yaml");
    let storage = FlexStorage::builder()
        .folder(file.display().to_string())
        .layout(LayoutKind::Shared)
        .open()
        .unwrap();

    storage
        .create_rows([
            ("ann", row(json!({ "name": "Ann" }))),
            ("bob", row(json!({ "name": "Bob" }))),
            ("cid", row(json!({ "name": "Cid" }))),
        ])
        .unwrap();
    assert!(storage.rename_row("bob", "zed").unwrap());

    let file_keys = || {
        let content = YamlFormatter::new().decode(&fs::read(&file).unwrap()).unwrap();
        content.keys().cloned().collect::<Vec<_>>()
    };
    assert_eq!(file_keys(), ["ann", "zed", "cid"]);
    assert_eq!(storage.read_row("zed").unwrap().unwrap()["name"], "Bob");

    let err = storage.copy_row("ann", "zed").unwrap_err();
    assert!(matches!(err, StorageError::KeyConflict { .. }), "got {err}");
    assert!(storage.copy_row("ann", "amy").unwrap());
    storage.delete_rows(["cid"]).unwrap();
    assert_eq!(file_keys(), ["ann", "zed", "amy"]);

    assert_eq!(storage.get_storage_path(Some("ann")).unwrap(), file);
    assert_eq!(storage.get_media_path(Some("ann")).unwrap(), tmp.path().join("users/ann"));
    assert_eq!(storage.get_media_path(None).unwrap(), tmp.path().join("users"));
}

#[test]
fn test_shared_prefix_leaves_siblings_alone() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("site.yaml");
    fs::write(&file, "other:\n  x:\n    a: 1\naccounts: {}\n").unwrap();

    let storage = FlexStorage::builder()
        .folder(file.display().to_string())
        .layout(LayoutKind::Shared)
        .prefix("accounts")
        .open()
        .unwrap();
    storage.create_rows([("k1", row(json!({ "name": "K" })))]).unwrap();

    let content = YamlFormatter::new().decode(&fs::read(&file).unwrap()).unwrap();
    assert_eq!(content["other"]["x"]["a"], 1);
    assert_eq!(content["accounts"]["k1"]["name"], "K");
    assert_eq!(keys(&storage), ["k1"]);
}

#[test]
fn test_shared_corrupt_file_refuses_writes() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("index.yaml");
    fs::write(&file, "title: [unclosed\n").unwrap();

    let storage = FlexStorage::builder()
        .folder(tmp.path().display().to_string())
        .layout(LayoutKind::Shared)
        .formatter_kind(FormatterKind::Yaml)
        .open()
        .unwrap();

    assert!(keys(&storage).is_empty());
    let err = storage.create_rows([("a", row(json!({})))]).unwrap_err();
    assert!(matches!(err, StorageError::CorruptStore { .. }), "got {err}");
    assert_eq!(fs::read_to_string(&file).unwrap(), "title: [unclosed\n");
}

#[test]
fn test_shared_failed_batch_leaves_no_rows_behind() {
    let tmp = TempDir::new().unwrap();
    let storage = builder(&tmp).layout(LayoutKind::Shared).key_length(1).open().unwrap();
    let file = storage.get_storage_path(Some("0")).unwrap();

    // One hex digit leaves room for 16 generated keys.
    let rows: Vec<_> = (0..17).map(|n| (NEW_KEY, row(json!({ "n": n })))).collect();
    let err = storage.create_rows(rows).unwrap_err();
    assert!(matches!(err, StorageError::Internal { .. }), "got {err}");

    assert!(!file.exists());
    assert!(keys(&storage).is_empty());
    for key in ["0", "7", "f"] {
        assert!(!storage.has_key(key), "{key} was never written");
        assert!(storage.read_row(key).unwrap().is_none());
    }

    storage.create_rows([("k", row(json!({ "n": 1 })))]).unwrap();
    assert_eq!(keys(&storage), ["k"]);
}

#[test]
fn test_shared_copy_is_independent() {
    let tmp = TempDir::new().unwrap();
    let storage = builder(&tmp).layout(LayoutKind::Shared).open().unwrap();
    storage.create_rows([("a", row(json!({ "n": 1, "tags": ["x"] })))]).unwrap();

    assert!(storage.copy_row("a", "b").unwrap());
    storage.update_rows([("b", row(json!({ "n": 2, "tags": ["y"] })))]).unwrap();

    let source = storage.read_row("a").unwrap().unwrap();
    assert_eq!(source["n"], 1);
    assert_eq!(source["tags"], json!(["x"]));
    assert_eq!(storage.read_row("b").unwrap().unwrap()["n"], 2);

    storage.clear_cache();
    assert_eq!(storage.read_row("a").unwrap().unwrap()["n"], 1, "the file agrees");
}

#[test]
fn test_indexed_storage_persists_keys() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let index = root.join(".flexindex.json");
    let storage = builder(&tmp).indexed(true).open().unwrap();
    assert!(storage.is_indexed());

    storage.create_rows([("a", row(json!({})))]).unwrap();
    assert!(!index.exists(), "the index is only built on first listing");
    assert_eq!(keys(&storage), ["a"]);
    assert!(index.is_file());

    storage.create_rows([("b", row(json!({})))]).unwrap();
    let persisted: BTreeMap<String, i64> =
        serde_json::from_slice(&fs::read(&index).unwrap()).unwrap();
    assert_eq!(persisted.keys().collect::<Vec<_>>(), ["a", "b"]);

    fs::create_dir_all(root.join("c")).unwrap();
    fs::write(root.join("c/item.json"), b"{}").unwrap();
    assert_eq!(keys(&storage), ["a", "b"], "listings come from the index");
    assert_eq!(storage.build_index().unwrap().len(), 3);

    storage.delete_rows(["a"]).unwrap();
    assert_eq!(keys(&storage), ["b", "c"]);
}

#[test]
fn test_clear_cache_sees_external_changes() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).open().unwrap();

    assert!(!storage.has_key("late"));
    fs::create_dir_all(root.join("late")).unwrap();
    fs::write(root.join("late/item.json"), b"{}").unwrap();
    assert!(!storage.has_key("late"), "cached absence is served until cleared");

    storage.clear_cache();
    assert!(storage.has_key("late"));
}

#[test]
fn test_markdown_records() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let storage = builder(&tmp).pattern("{FOLDER}/{KEY}/page.md").open().unwrap();

    let page = row(json!({ "header": { "title": "Home" }, "markdown": "# Welcome\n" }));
    storage.create_rows([("home", page)]).unwrap();

    let text = fs::read_to_string(root.join("home/page.md")).unwrap();
    assert_eq!(text, "---\ntitle: Home\n---\n\n# Welcome\n");
    let loaded = storage.read_row("home").unwrap().unwrap();
    assert_eq!(loaded["header"]["title"], "Home");
    assert_eq!(loaded["markdown"], "# Welcome\n");
}

#[test]
fn test_stream_root() {
    let tmp = TempDir::new().unwrap();
    let resolver = StreamResolver::new().mount("user", tmp.path());
    let storage = FlexStorage::builder()
        .folder("user://pages")
        .resolver(Arc::new(resolver))
        .open()
        .unwrap();

    storage.create_rows([("home", row(json!({})))]).unwrap();
    assert!(tmp.path().join("pages/home/item.json").is_file());
    assert_eq!(storage.get_storage_path(Some("home")).unwrap(), tmp.path().join("pages/home"));
    assert_eq!(keys(&storage), ["home"]);
    assert_eq!(storage.get_path_from_key("home"), "user://pages/home/item.json");
}

#[test]
fn test_bad_configuration() {
    let tmp = TempDir::new().unwrap();
    let is_bad = |result: Result<FlexStorage>| {
        matches!(result, Err(StorageError::BadConfiguration { .. }))
    };

    assert!(is_bad(builder(&tmp).create(false).open()));
    assert!(is_bad(builder(&tmp).pattern("{FOLDER}/{NOPE}").open()));
    assert!(is_bad(builder(&tmp).pattern("{FOLDER}/{KEY}/item.txt").open()));
    assert!(is_bad(builder(&tmp).key_length(0).open()));
    assert!(is_bad(builder(&tmp).key_length(65).open()));
    assert!(is_bad(FlexStorage::builder().folder("  ").open()));
    let unmounted = Arc::new(StreamResolver::new());
    assert!(is_bad(FlexStorage::builder().folder("nope://x").resolver(unmounted).open()));
}

#[test]
fn test_options_from_file() {
    let tmp = TempDir::new().unwrap();
    let root = root(&tmp);
    let config = tmp.path().join("storage.toml");
    fs::write(
        &config,
        format!(
            "folder = \"{}\"\nlayout = \"file\"\nformatter = \"yaml\"\nkey_length = 12\n",
            root.display()
        ),
    )
    .unwrap();

    let options = load_options(&config).unwrap();
    assert_eq!(options.layout, LayoutKind::FilePerRecord);
    assert_eq!(options.formatter, Some(FormatterKind::Yaml));
    assert_eq!(options.key_length, 12);
    assert!(options.case_sensitive, "unset options keep their defaults");

    let storage = FlexStorage::from_options(&options).unwrap();
    let saved = storage.create_rows([(NEW_KEY, row(json!({ "n": 1 })))]).unwrap();
    let key = saved.keys().next().unwrap();
    assert_eq!(key.len(), 12);
    assert!(root.join(format!("{key}.yaml")).is_file());

    let missing = load_options(tmp.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, StorageError::BadConfiguration { .. }), "got {missing}");
}

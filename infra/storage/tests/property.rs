use flex_storage::*;
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const HOSTILE: &[&str] = &["/", "\\", "?", "*", ":", ";", "{", "}", "\n", ".."];

fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![any::<i64>().prop_map(Value::from), "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from)]
}

proptest! {
    #[test]
    fn hostile_keys_are_rejected(
        prefix in "[a-z0-9]{0,8}",
        bad in prop::sample::select(HOSTILE),
        suffix in "[a-z0-9]{0,8}",
    ) {
        let key = format!("{prefix}{bad}{suffix}");
        prop_assert!(!validate_key(&key));
        prop_assert!(KeyCodec::assert_valid(&key).is_err());
    }

    #[test]
    fn generated_keys_have_requested_length(
        entropy in vec(any::<u8>(), 0..64),
        length in 1usize..=MAX_KEY_LENGTH,
    ) {
        let key = generate_key(&entropy, length);
        prop_assert_eq!(key.len(), length);
        prop_assert!(validate_key(&key));
        prop_assert!(key.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn record_paths_stay_inside_their_container(key in "[a-z0-9][a-z0-9_-]{0,20}") {
        let codec = KeyCodec::new(true, 32, "item");
        let pattern =
            PathPattern::new("{FOLDER}/{KEY:2}/{KEY}", LayoutKind::FolderPerRecord).unwrap();
        let parts = codec.parse(&key, true);
        let vars = PatternVars::for_key("/data", &parts, ".json");

        let path = pattern.expand(&vars);
        let container = pattern.storage_path_for(&vars, true);
        prop_assert!(path.starts_with("/data/"));
        let expected_suffix = format!("/{key}/item.json");
        prop_assert!(path.ends_with(&expected_suffix));
        prop_assert_eq!(format!("{container}/item.json"), path);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn rows_survive_a_save_and_load(fields in btree_map("[a-z]{1,8}", field_value(), 0..8)) {
        let tmp = TempDir::new().unwrap();
        let storage = FlexStorage::builder()
            .folder(tmp.path().display().to_string())
            .open()
            .unwrap();
        let row: Row = fields.into_iter().collect();

        let saved = storage.create_rows([("k", row.clone())]).unwrap();
        prop_assert_eq!(strip_transient(&saved["k"], storage.key_field()), row.clone());

        let loaded = storage.read_row("k").unwrap().unwrap();
        prop_assert_eq!(strip_transient(&loaded, storage.key_field()), row);
    }
}

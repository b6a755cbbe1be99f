// Op lifecycle logging: every call emits one start and one end/end_error event

use snapstore::logging_facility::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_AFFINITY_ID, FIELD_COMPONENT,
    FIELD_DURATION_MS, FIELD_ERR_CODE, FIELD_ERR_KIND, FIELD_SNAPSHOT_ID, FIELD_VERSION_ID,
};
use snapstore::logging_facility::test_capture::init_test_capture;
use snapstore::{Client, ClientConfig, Options, Strategy};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Client) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = ClientConfig::with_path(temp_dir.path().join("test.db"));
    config.collections = vec!["widgets".to_string()];
    let client = Client::open(&config).unwrap();
    (temp_dir, client)
}

#[test]
fn test_successful_ops_emit_start_and_end() {
    let capture = init_test_capture();
    let (_temp_dir, client) = setup_test_env();
    let widgets = client.store("widgets").unwrap();
    let opts = Options::new();

    widgets
        .add_version("a1", "LOG-OK", &serde_json::json!({"name": "a"}), &opts)
        .unwrap();
    widgets
        .add_snapshot("a1", "LOG-OK", Strategy::Mine, &opts)
        .unwrap()
        .into_result()
        .unwrap();

    for op in ["add_version", "add_snapshot"] {
        let events = capture.events_for(op, "LOG-OK");
        let kinds: Vec<_> = events.iter().filter_map(|e| e.event.as_deref()).collect();
        assert_eq!(kinds, vec![EVENT_START, EVENT_END], "op {}", op);

        let start = &events[0];
        assert_eq!(
            start.fields.get(FIELD_AFFINITY_ID).map(String::as_str),
            Some("a1")
        );
        let end = &events[1];
        assert_eq!(end.collection.as_deref(), Some("widgets"));
        assert!(end.fields.contains_key(FIELD_DURATION_MS));
        assert!(end.fields[FIELD_COMPONENT].starts_with("snapstore::store"));
    }

    let promoted = capture.count_events(|e| {
        e.op.is_none()
            && e.entity_id.as_deref() == Some("LOG-OK")
            && e.fields.contains_key(FIELD_SNAPSHOT_ID)
            && e.fields.contains_key(FIELD_VERSION_ID)
    });
    assert_eq!(promoted, 1);
}

#[test]
fn test_failed_op_emits_end_error_with_code() {
    let capture = init_test_capture();
    let (_temp_dir, client) = setup_test_env();
    let widgets = client.store("widgets").unwrap();

    let err = widgets
        .get::<serde_json::Value>("LOG-MISSING", &Options::new())
        .unwrap_err();
    assert!(err.is_not_found());

    let events = capture.events_for("get", "LOG-MISSING");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_START));
    assert_eq!(events[1].event.as_deref(), Some(EVENT_END_ERROR));
    assert_eq!(
        events[1].fields.get(FIELD_ERR_CODE).map(String::as_str),
        Some("ERR_NOT_FOUND")
    );
    assert!(events[1].fields.contains_key(FIELD_ERR_KIND));
}

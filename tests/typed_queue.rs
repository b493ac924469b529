use std::collections::BTreeMap;

use dirq::{Error, Queue, Record, TypedQueue, Value};
use tempfile::TempDir;

fn record(entries: Vec<(&str, Value)>) -> Record {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn table(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn add_lock_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut queue =
        TypedQueue::open(dir.path(), "body:string header:table? blob:binary?").unwrap();
    let original = record(vec![
        ("body", Value::String("a=b\n%c with control \u{1} bytes".to_string())),
        ("header", Value::Table(table(&[("from", "worker-1"), ("retries", "3")]))),
        ("blob", Value::Binary(vec![0, 1, 2, 255, 254])),
    ]);
    let id = queue.add(&original).unwrap();

    assert!(queue.lock(&id, true).unwrap());
    assert_eq!(queue.get(&id).unwrap(), original);
}

#[test]
fn non_ascii_text_survives_the_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string header:table?").unwrap();
    let original = record(vec![
        ("body", Value::String("café ☕ naïve Grüße".to_string())),
        ("header", Value::Table(table(&[("clé", "värde")]))),
    ]);
    let id = queue.add(&original).unwrap();

    // Multi-byte UTF-8 passes through the escape layer byte for byte.
    let stored = std::fs::read(queue.root().join(&id).join("body")).unwrap();
    assert_eq!(stored, "café ☕ naïve Grüße".as_bytes());

    assert!(queue.lock(&id, true).unwrap());
    assert_eq!(queue.get(&id).unwrap(), original);
}

#[test]
fn field_files_follow_the_layout() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string blob:binary").unwrap();
    let id = queue
        .add(&record(vec![
            ("body", Value::String("text".to_string())),
            ("blob", Value::Binary(b"raw".to_vec())),
        ]))
        .unwrap();
    let element = queue.root().join(&id);
    assert!(element.join("body").is_file());
    assert!(element.join("blob.bin").is_file());
    assert_eq!(std::fs::read(element.join("blob.bin")).unwrap(), b"raw");
}

#[test]
fn unknown_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string header:string?").unwrap();
    let result = queue.add(&record(vec![
        ("body", Value::String("x".to_string())),
        ("extra", Value::String("y".to_string())),
    ]));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    // Validation happens before anything is staged.
    assert_eq!(
        std::fs::read_dir(queue.root().join("temporary")).unwrap().count(),
        0
    );
}

#[test]
fn missing_mandatory_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string header:string?").unwrap();
    let result = queue.add(&record(vec![(
        "header",
        Value::String("only optional".to_string()),
    )]));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn kind_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let result = queue.add(&record(vec![("body", Value::Binary(b"bytes".to_vec()))]));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn invalid_schema_is_rejected_at_open() {
    let dir = TempDir::new().unwrap();
    for schema in ["", "body", "body:float", "a-b:string", "x:string?  x:string"] {
        assert!(matches!(
            TypedQueue::open(dir.path(), schema),
            Err(Error::InvalidConfig(_))
        ));
    }
}

#[test]
fn optional_fields_may_be_absent() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string header:table?").unwrap();
    let original = record(vec![("body", Value::String("x".to_string()))]);
    let id = queue.add(&original).unwrap();
    assert!(queue.lock(&id, true).unwrap());
    let read = queue.get(&id).unwrap();
    assert_eq!(read, original);
    assert!(!read.contains_key("header"));
}

#[test]
fn reference_marker_is_accepted_and_stored_by_value() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string link:string?*").unwrap();
    let original = record(vec![
        ("body", Value::String("x".to_string())),
        ("link", Value::String("value, not a reference".to_string())),
    ]);
    let id = queue.add(&original).unwrap();
    assert!(queue.lock(&id, true).unwrap());
    assert_eq!(queue.get(&id).unwrap(), original);
}

#[test]
fn lock_marker_is_a_sibling_directory() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let id = queue
        .add(&record(vec![("body", Value::String("x".to_string()))]))
        .unwrap();
    assert!(queue.lock(&id, true).unwrap());
    assert!(queue.root().join(format!("{id}.lck")).is_dir());
    assert!(!queue.lock(&id, true).unwrap());
    assert!(queue.unlock(&id, false).unwrap());
    assert!(queue.lock(&id, true).unwrap());
}

#[test]
fn remove_deletes_payload_and_marker() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let id = queue
        .add(&record(vec![("body", Value::String("x".to_string()))]))
        .unwrap();
    assert!(matches!(queue.remove(&id), Err(Error::NotLocked(_))));
    assert!(queue.lock(&id, true).unwrap());
    queue.remove(&id).unwrap();
    assert!(!queue.root().join(&id).exists());
    assert!(!queue.root().join(format!("{id}.lck")).exists());
    assert_eq!(queue.count().unwrap(), 0);
}

#[test]
fn get_after_remove_is_missing() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let id = queue
        .add(&record(vec![("body", Value::String("x".to_string()))]))
        .unwrap();
    assert!(queue.lock(&id, true).unwrap());
    queue.remove(&id).unwrap();
    assert!(matches!(queue.get(&id), Err(Error::MissingElement(_))));
}

#[test]
fn dequeue_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let original = record(vec![("body", Value::String("job".to_string()))]);
    let id = queue.add(&original).unwrap();
    assert_eq!(queue.dequeue(&id).unwrap(), original);
    assert!(matches!(queue.dequeue(&id), Err(Error::LockHeld(_))));
}

#[test]
fn iteration_approximates_fifo() {
    let dir = TempDir::new().unwrap();
    let mut queue = TypedQueue::open(dir.path(), "body:string").unwrap();
    let mut expected = Vec::new();
    for i in 0..5 {
        let body = format!("element {i}");
        expected.push(body.clone());
        queue.add(&record(vec![("body", Value::String(body))])).unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = queue.first().unwrap();
    while let Some(id) = cursor {
        if queue.lock(&id, true).unwrap() {
            match queue.get(&id).unwrap().remove("body") {
                Some(Value::String(body)) => seen.push(body),
                other => panic!("unexpected body: {other:?}"),
            }
            queue.remove(&id).unwrap();
        }
        cursor = queue.next().unwrap();
    }
    assert_eq!(seen, expected);
}

#[test]
fn two_handles_contend_on_the_same_element() {
    let dir = TempDir::new().unwrap();
    let mut producer = TypedQueue::open(dir.path(), "body:string").unwrap();
    let id = producer
        .add(&record(vec![("body", Value::String("shared".to_string()))]))
        .unwrap();

    let worker_a = TypedQueue::open(dir.path(), "body:string").unwrap();
    let worker_b = TypedQueue::open(dir.path(), "body:string").unwrap();
    let got_a = worker_a.lock(&id, true).unwrap();
    let got_b = worker_b.lock(&id, true).unwrap();
    assert!(got_a);
    assert!(!got_b);
}

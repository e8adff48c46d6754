//! End-to-end scenarios through the public API.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use docmap_orm::fixtures::{self, Zoo, NAMESPACE};

use crate::*;

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn open() -> (Zoo, Database) {
    let zoo = fixtures::zoo();
    let db = DocmapConfig::default()
        .open(Arc::clone(&zoo.mapper))
        .unwrap();
    (zoo, db)
}

// ---------------------------------------------------------------
// Round trip and concurrency
// ---------------------------------------------------------------

#[test]
fn saved_documents_read_back_equal() {
    let (zoo, db) = open();
    let dog = db.create(&zoo.dog, props(json!({"name": "woofer"}))).unwrap();
    let got = db.get(&dog.key()).unwrap().unwrap();
    assert_eq!(got, dog);
    assert_eq!(got.rev(), dog.rev());
    assert_eq!(got.get_str("name").unwrap().as_deref(), Some("woofer"));
}

#[test]
fn stale_revisions_never_overwrite() {
    let (zoo, db) = open();
    let first = db.create(&zoo.dog, props(json!({"name": "woofer"}))).unwrap();
    let second = db.get(&first.key()).unwrap().unwrap();
    assert_eq!(first.rev(), second.rev());

    first.set("name", json!("fly")).unwrap();
    db.save(&first).unwrap();
    assert_ne!(first.rev(), second.rev());

    second.set("name", json!("shep")).unwrap();
    assert!(db.save(&second).unwrap_err().is_conflict());
}

// ---------------------------------------------------------------
// Field constraints
// ---------------------------------------------------------------

#[test]
fn immutable_fields_accept_a_first_value_only() {
    let (zoo, db) = open();
    let owner = fixtures::person(&db, "paul");
    let cat = Document::new(&zoo.cat);
    cat.set("legs", json!(4)).unwrap();
    cat.set_reference("owner", Some(&owner)).unwrap();
    cat.set("colour", json!("tabby")).unwrap();
    db.save(&cat).unwrap();

    assert!(matches!(
        cat.set("colour", json!("black")),
        Err(OrmError::Immutable { .. })
    ));

    let copy = db.get(&cat.key()).unwrap().unwrap();
    assert_eq!(copy.get_str("colour").unwrap().as_deref(), Some("tabby"));
}

#[test]
fn unique_values_free_up_after_delete() {
    let (zoo, db) = open();
    let first = db
        .create(&zoo.dog, props(json!({"kennel_club_membership": "kc-1"})))
        .unwrap();
    let dup = db.create(&zoo.dog, props(json!({"kennel_club_membership": "kc-1"})));
    assert!(matches!(dup, Err(OrmError::Unique { .. })));

    db.delete(&first).unwrap();
    db.create(&zoo.dog, props(json!({"kennel_club_membership": "kc-1"})))
        .unwrap();
}

// ---------------------------------------------------------------
// References
// ---------------------------------------------------------------

#[test]
fn references_resolve_in_both_directions() {
    let (zoo, db) = open();
    let person = fixtures::person(&db, "paul");
    let dog = Document::new(&zoo.dog);
    dog.set("owner_id", json!(person.key())).unwrap();
    db.save(&dog).unwrap();

    assert_eq!(person.get_references("dogs").unwrap(), vec![dog.clone()]);
    assert_eq!(dog.get_reference("owner").unwrap(), Some(person));
}

#[test]
fn deleting_an_owner_cascades_or_orphans() {
    let (zoo, db) = open();
    let person = fixtures::person(&db, "paul");
    let cats: Vec<Document> = (0..3)
        .map(|i| fixtures::owned_cat(&db, &format!("cat{i}"), &person))
        .collect();
    let dog = Document::new(&zoo.dog);
    dog.set_reference("owner", Some(&person)).unwrap();
    db.save(&dog).unwrap();

    db.delete(&person).unwrap();

    for cat in &cats {
        assert!(db.get(&cat.key()).unwrap().is_none());
    }
    let dog = db.get(&dog.key()).unwrap().unwrap();
    assert_eq!(dog.get_value("owner_id").unwrap(), None);
    assert_eq!(db.all(&zoo.cat).unwrap().len(), 0);
    assert_eq!(db.all(&zoo.dog).unwrap().len(), 1);
}

// ---------------------------------------------------------------
// Write buffer
// ---------------------------------------------------------------

#[test]
fn buffer_keeps_one_instance_per_key() {
    let (zoo, db) = open();
    let dog = db.create(&zoo.dog, props(json!({"name": "woofer"}))).unwrap();

    buffered(&db, |buf| {
        let cached = buf.get(&dog.key())?.unwrap();

        dog.set("name", json!("fly"))?;
        db.save(&dog)?;

        let refreshed = buf.get(&dog.key())?.unwrap();
        assert!(refreshed.same_instance(&cached));
        assert_eq!(cached.get_str("name")?.as_deref(), Some("fly"));

        let fresh = Document::new(&zoo.dog);
        buf.put(&fresh)?;
        assert!(buf.get(&fresh.key())?.unwrap().same_instance(&fresh));
        Ok(())
    })
    .unwrap();
}

#[test]
fn buffered_owner_changes_move_between_buckets() {
    let (zoo, db) = open();
    let a = fixtures::person(&db, "a");
    let b = fixtures::person(&db, "b");

    let buffer = WriteBuffer::new(Arc::new(db.clone()));
    let dog = Document::new(&zoo.dog);
    dog.set_reference("owner", Some(&a)).unwrap();
    buffer.put(&dog).unwrap();

    let a_view = buffer.get(&a.key()).unwrap().unwrap();
    let b_view = buffer.get(&b.key()).unwrap().unwrap();
    assert_eq!(a_view.get_references("dogs").unwrap().len(), 1);

    dog.set_reference("owner", Some(&b)).unwrap();
    buffer.put(&dog).unwrap();
    assert!(a_view.get_references("dogs").unwrap().is_empty());
    assert_eq!(b_view.get_references("dogs").unwrap().len(), 1);

    buffer.flush().unwrap();
    assert_eq!(b.get_references("dogs").unwrap(), vec![dog]);
}

// ---------------------------------------------------------------
// Custom models
// ---------------------------------------------------------------

#[test]
fn typed_fields_round_trip() {
    let event = ModelSchema::builder("Event")
        .namespace("example.com/calendar")
        .field("title", Field::string().required())
        .field("starts", Field::datetime())
        .field("payload", Field::bytes())
        .field("tags", Field::list().default_with(|| json!([])))
        .field("organiser", Field::email())
        .field("venue", Field::lat_long())
        .field("budget", Field::decimal())
        .field("quorum", Field::fraction())
        .build()
        .unwrap();
    let class = ModelClass::new(event);
    let mapper = Arc::new(ClassMapper::new([class.clone()]).unwrap());
    let db = DocmapConfig::default().open(mapper).unwrap();

    let when = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let doc = Document::new(&class);
    doc.set("title", json!("standup")).unwrap();
    doc.set("starts", json!(docmap_schema::format::format_datetime(&when)))
        .unwrap();
    doc.set("payload", json!(docmap_schema::format::encode_bytes(b"\x00\x01hi")))
        .unwrap();
    doc.set("organiser", json!("ops@example.com")).unwrap();
    doc.set("venue", json!([51.2345, -1.4533])).unwrap();
    doc.set("budget", json!("1250.50")).unwrap();
    doc.set("quorum", json!("4/6")).unwrap();
    db.save(&doc).unwrap();

    let got = db.get(&doc.key()).unwrap().unwrap();
    assert_eq!(got.get_datetime("starts").unwrap(), Some(when));
    assert_eq!(got.get_bytes("payload").unwrap(), Some(b"\x00\x01hi".to_vec()));
    assert_eq!(got.get_value("tags").unwrap(), Some(json!([])));
    let venue = got.get_lat_long("venue").unwrap().unwrap();
    assert_eq!((venue.latitude, venue.longitude), (51.2345, -1.4533));
    assert_eq!(got.get_decimal("budget").unwrap().unwrap().to_string(), "1250.50");
    assert_eq!(got.get_fraction("quorum").unwrap().unwrap().to_string(), "2/3");
    assert!(doc.set("venue", json!([123.0, 0.0])).is_err());
    assert!(doc.set("quorum", json!("1/0")).is_err());
    assert!(doc.set("starts", json!("yesterday")).is_err());
    assert!(doc.set("organiser", json!("nobody")).is_err());
}

#[test]
fn declared_but_unset_differs_from_unknown() {
    let (zoo, _db) = open();
    let monkey = Document::new(&zoo.monkey);
    assert!(matches!(monkey.get("name"), Ok(Property::Unset)));
    assert!(matches!(
        monkey.get("tail"),
        Err(OrmError::UnknownAttribute { .. })
    ));
}

#[test]
fn changes_feed_resumes_from_cursor() {
    let (zoo, db) = open();
    db.create(&zoo.dog, Properties::new()).unwrap();
    let (cursor, first) = db.changes(None, None).unwrap();
    assert_eq!(first.len(), 1);

    let later = db.create(&zoo.monkey, Properties::new()).unwrap();
    let (next, docs) = db.changes(Some(cursor), Some(10)).unwrap();
    assert!(next > cursor);
    assert_eq!(docs, vec![later]);
    assert_eq!(docs[0].namespace(), NAMESPACE);
}

//! A small zoo of models exercising every field kind and relationship.
//!
//! Compiled for this crate's tests and, behind the `fixtures` feature, for
//! downstream test suites.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use docmap_schema::{Field, ModelSchema, SerdeCodec};

use crate::database::Database;
use crate::document::Document;
use crate::mapper::{ClassMapper, ModelClass};
use crate::OrmResult;

pub const NAMESPACE: &str = "glowinthedark.co.uk/test";

/// Nested object held by `Monster.weapons`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weapons {
    pub wings: bool,
    pub fire: bool,
    pub claws: u32,
}

pub struct Zoo {
    pub mapper: Arc<ClassMapper>,
    pub dog: ModelClass,
    pub jack_russell: ModelClass,
    pub cat: ModelClass,
    pub person: ModelClass,
    pub monarch: ModelClass,
    pub monkey: ModelClass,
    pub monster: ModelClass,
}

/// Build the zoo models.
pub fn try_zoo() -> OrmResult<Zoo> {
    let dog = ModelSchema::builder("Dog")
        .namespace(NAMESPACE)
        .additional_properties(true)
        .field("name", Field::string())
        .field(
            "owner_id",
            Field::reference_to(NAMESPACE, "person").cascade_delete(),
        )
        .field("kennel_club_membership", Field::string().unique())
        .field("channels", Field::list().default(json!(["callbacks"])))
        .build()?;

    let jack_russell = ModelSchema::builder("JackRussell")
        .extends(&dog)
        .field("age", Field::number())
        .build()?;

    let cat = ModelSchema::builder("Cat")
        .namespace(NAMESPACE)
        .field("name", Field::string())
        .field("colour", Field::string().immutable())
        .field("tail", Field::bool().immutable().default(json!(true)))
        .field("legs", Field::number().required())
        .field("owner_id", Field::reference_to(NAMESPACE, "person").required())
        .field("email", Field::email())
        .build()?;

    let person = ModelSchema::builder("Person")
        .namespace(NAMESPACE)
        .grants_access(true)
        .field("name", Field::string())
        .field(
            "cats",
            Field::reference_from(NAMESPACE, "cat", "owner_id").cascade_delete(),
        )
        .field("dogs", Field::reference_from(NAMESPACE, "dog", "owner_id"))
        .field(
            "animals",
            Field::reference_from_any(NAMESPACE, ["dog", "cat"], "owner_id"),
        )
        .field("callbacks", Field::list())
        .build()?;

    let monarch = ModelSchema::builder("Monarch")
        .extends(&person)
        .field("country", Field::string())
        .build()?;

    let monkey = ModelSchema::builder("Monkey")
        .namespace(NAMESPACE)
        .use_rev(false)
        .field("name", Field::string())
        .field("colour", Field::string().immutable())
        .build()?;

    let monster = ModelSchema::builder("Monster")
        .namespace(NAMESPACE)
        .field("name", Field::string())
        .field("weapons", Field::object(SerdeCodec::<Weapons>::shared()))
        .build()?;

    let zoo = Zoo {
        dog: ModelClass::new(dog),
        jack_russell: ModelClass::new(jack_russell),
        cat: ModelClass::new(cat),
        person: ModelClass::new(person),
        monarch: ModelClass::new(monarch),
        monkey: ModelClass::new(monkey),
        monster: ModelClass::new(monster),
        mapper: Arc::default(),
    };
    let mapper = ClassMapper::new([
        zoo.dog.clone(),
        zoo.jack_russell.clone(),
        zoo.cat.clone(),
        zoo.person.clone(),
        zoo.monarch.clone(),
        zoo.monkey.clone(),
        zoo.monster.clone(),
    ])?;
    Ok(Zoo {
        mapper: Arc::new(mapper),
        ..zoo
    })
}

/// [`try_zoo`], panicking on a malformed model.
pub fn zoo() -> Zoo {
    try_zoo().expect("zoo models are valid")
}

/// The zoo over a fresh in-memory database with its views installed.
pub fn zoo_database() -> (Zoo, Database) {
    let zoo = zoo();
    let db = Database::in_memory(Arc::clone(&zoo.mapper)).expect("in-memory database opens");
    (zoo, db)
}

/// Save a person named `name`.
pub fn person(db: &Database, name: &str) -> Document {
    let class = registered(db, "person");
    let person = Document::new(&class);
    person.set("name", json!(name)).expect("valid name");
    db.save(&person).expect("person saves");
    person
}

/// Save a four-legged cat owned by `owner`.
pub fn owned_cat(db: &Database, name: &str, owner: &Document) -> Document {
    let class = registered(db, "cat");
    let cat = Document::new(&class);
    cat.set("name", json!(name)).expect("valid name");
    cat.set("legs", json!(4)).expect("valid legs");
    cat.set_reference("owner", Some(owner)).expect("valid owner");
    db.save(&cat).expect("cat saves");
    cat
}

/// Save a cat with a freshly saved owner.
pub fn cat(db: &Database, name: &str) -> Document {
    let owner = person(db, "owner");
    owned_cat(db, name, &owner)
}

fn registered(db: &Database, type_name: &str) -> ModelClass {
    db.mapper()
        .get_class(type_name, NAMESPACE)
        .cloned()
        .unwrap_or_else(|| panic!("{type_name} is registered"))
}

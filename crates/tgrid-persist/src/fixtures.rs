//! A small school domain shared by the persister tests.

use std::sync::Arc;

use tgrid_mapping::{MappingDocument, Mappings};
use tgrid_store::{InMemoryTupleStore, TupleStore};
use tgrid_types::{EntityKey, FieldValue, Record, Value};

use crate::registry::PersisterRegistry;
use crate::state::EntityState;

pub const SCHOOL: &str = r#"
[[entities]]
name = "Teacher"
table = "teacher"
id_columns = ["id"]

[[entities.properties]]
name = "name"
columns = ["name"]

[[entities]]
name = "Student"
table = "student"
id_columns = ["id"]
version = "version"

[[entities.properties]]
name = "name"
columns = ["name"]
nullable = false

[[entities.properties]]
name = "email"
columns = ["email"]
unique = true

[[entities.properties]]
name = "version"
columns = ["version"]

[[entities.properties]]
name = "mentor"
columns = ["mentor_id"]
references = "Teacher"

[[entities]]
name = "Course"
table = "course"
id_columns = ["id"]

[[entities.properties]]
name = "title"
columns = ["title"]

[[entities]]
name = "Room"
table = "room"
id_columns = ["id"]
optimistic_lock = "all"

[[entities.properties]]
name = "label"
columns = ["label"]

[[entities.properties]]
name = "capacity"
columns = ["capacity"]

[[entities.properties]]
name = "notes"
columns = ["notes"]
versionable = false

[[entities.properties]]
name = "floor_plan"
columns = ["floor_plan"]
lazy = true

[[entities.properties]]
name = "occupancy"
columns = ["occupancy"]
selectable = false
insertable = false
updatable = false

[[entities]]
name = "Pupil"
table = "pupil"
id_columns = ["id"]

[[entities.properties]]
name = "mentor"
columns = ["mentor_id"]
references = "Teacher"

[[entities.properties]]
name = "name"
columns = ["name"]
nullable = false

[[entities]]
name = "Locker"
table = "locker"
id_columns = ["id"]
optimistic_lock = "dirty"

[[entities.properties]]
name = "code"
columns = ["code"]

[[entities.properties]]
name = "holder"
columns = ["holder"]

[[entities]]
name = "Lecture"
table = "session"
id_columns = ["id"]
strategy = { kind = "single_table", discriminator = { column = "dtype", value = "LECTURE" } }

[[entities.properties]]
name = "topic"
columns = ["topic"]

[[entities]]
name = "Seminar"
table = "session"
id_columns = ["id"]
strategy = { kind = "single_table", discriminator = { column = "dtype", value = "SEMINAR" } }

[[entities.properties]]
name = "topic"
columns = ["topic"]

[[collections]]
role = "Teacher.students"
owner = "Teacher"
table = "student"
key_columns = ["mentor_id"]
one_to_many = true
element = { columns = ["id"], entity = "Student" }

[[collections]]
role = "Teacher.aides"
owner = "Teacher"
table = "student"
key_columns = ["aide_of"]
identifier_column = "aide_row"
one_to_many = true
element = { columns = ["id"], entity = "Student" }

[[collections]]
role = "Teacher.notes"
owner = "Teacher"
table = "teacher_notes"
key_columns = ["teacher_id"]
identifier_column = "note_id"
element = { columns = ["note"] }

[[collections]]
role = "Student.courses"
owner = "Student"
table = "enrolment"
key_columns = ["student_id"]
element = { columns = ["course_id"], entity = "Course" }

[[collections]]
role = "Student.schedule"
owner = "Student"
table = "schedule"
key_columns = ["student_id"]
index = { columns = ["slot"] }
element = { columns = ["course_id"], entity = "Course" }

[[collections]]
role = "Student.nicknames"
owner = "Student"
table = "student_nicknames"
key_columns = ["student_id"]
element = { columns = ["nickname"] }

[[collections]]
role = "Course.students"
owner = "Course"
table = "enrolment"
key_columns = ["course_id"]
inverse = true
element = { columns = ["student_id"], entity = "Student" }

[[collections]]
role = "Course.readings"
owner = "Course"
table = "course_readings"
key_columns = ["course_id"]
index = { columns = ["position"], base = 1 }
element = { columns = ["reading"] }

[[collections]]
role = "Course.archive"
owner = "Course"
table = "course_archive"
key_columns = ["course_id"]
row_insert_enabled = false
row_delete_enabled = false
element = { columns = ["entry"], updatable = false }
"#;

pub fn mappings() -> Arc<Mappings> {
    Arc::new(
        MappingDocument::from_toml_str(SCHOOL)
            .expect("fixture parses")
            .build()
            .expect("fixture builds"),
    )
}

pub fn store() -> Arc<InMemoryTupleStore> {
    Arc::new(InMemoryTupleStore::new())
}

pub fn registry(store: &Arc<InMemoryTupleStore>) -> PersisterRegistry {
    let shared: Arc<dyn TupleStore> = store.clone();
    PersisterRegistry::new(mappings(), shared)
}

pub fn key(table: &str, id: i64) -> EntityKey {
    EntityKey::new(table, vec!["id".into()], vec![Value::Int(id)]).expect("valid key")
}

pub fn id(id: i64) -> FieldValue {
    FieldValue::from(id)
}

pub fn record(store: &InMemoryTupleStore, table: &str, id: i64) -> Option<Record> {
    store.get_record(&key(table, id)).expect("store read")
}

pub fn teacher(name: &str) -> EntityState {
    EntityState::new().with("name", name)
}

pub fn student(name: &str, mentor: Option<i64>) -> EntityState {
    EntityState::new()
        .with("name", name)
        .with("version", 1)
        .with("mentor", mentor.map_or(FieldValue::null(), FieldValue::from))
}

pub fn course(title: &str) -> EntityState {
    EntityState::new().with("title", title)
}

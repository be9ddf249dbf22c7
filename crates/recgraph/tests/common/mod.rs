//! Record types and helpers shared by the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use recgraph::{Engine, EngineConfig, Field, Point, Polygon, Record, RecordMeta};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Engine over a fresh directory; keep the `TempDir` alive for the test
pub fn open_engine() -> (Engine, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(EngineConfig::new(dir.path())).unwrap();
    (engine, dir)
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub gid: u64,
    pub name: String,
    pub age: i64,
    pub clerk_id: String,
}

impl User {
    pub fn new(name: &str, age: i64, clerk_id: &str) -> Self {
        Self {
            gid: 0,
            name: name.to_string(),
            age,
            clerk_id: clerk_id.to_string(),
        }
    }
}

impl Record for User {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "User",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("name", r#"json:"name,omitempty" db:"constraint=term""#),
                Field::of::<i64>("age", r#"json:"age,omitempty""#),
                Field::of::<String>(
                    "clerk_id",
                    r#"json:"clerk_id,omitempty" db:"constraint=unique""#,
                ),
            ],
        )
    }
}

// =============================================================================
// Project / Branch
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub gid: u64,
    pub name: String,
    pub clerk_id: String,
    pub branches: Vec<Branch>,
}

impl Record for Project {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "Project",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("name", r#"json:"name,omitempty""#),
                Field::of::<String>(
                    "clerk_id",
                    r#"json:"clerk_id,omitempty" db:"constraint=unique""#,
                ),
                Field::records::<Branch>(
                    "branches",
                    r#"json:"branches,omitempty" readFrom:"type=Branch,field=proj""#,
                ),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub gid: u64,
    pub name: String,
    pub clerk_id: String,
    pub proj: Option<Project>,
}

impl Record for Branch {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "Branch",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("name", r#"json:"name,omitempty""#),
                Field::of::<String>(
                    "clerk_id",
                    r#"json:"clerk_id,omitempty" db:"constraint=unique""#,
                ),
                Field::record::<Project>("proj", r#"json:"proj,omitempty""#),
            ],
        )
    }
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub gid: u64,
    pub text: String,
    #[serde(rename = "textVec")]
    pub text_vec: Vec<f32>,
}

impl Document {
    pub fn new(text: &str, text_vec: [f32; 3]) -> Self {
        Self {
            gid: 0,
            text: text.to_string(),
            text_vec: text_vec.to_vec(),
        }
    }
}

impl Record for Document {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "Document",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("text", r#"json:"text,omitempty""#),
                Field::of::<Vec<f32>>("text_vec", r#"json:"textVec" db:"constraint=vector""#),
            ],
        )
    }
}

// =============================================================================
// Geometry
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeomStruct {
    pub gid: u64,
    pub name: String,
    pub point: Point,
    pub area: Polygon,
}

impl Record for GeomStruct {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "GeomStruct",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("name", r#"json:"name,omitempty""#),
                Field::of::<Point>("point", r#"json:"point,omitempty""#),
                Field::of::<Polygon>("area", r#"json:"area,omitempty""#),
            ],
        )
    }
}

// =============================================================================
// Every scalar shape
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Kitchen {
    pub gid: u64,
    pub label: String,
    pub flag: bool,
    pub small: i32,
    pub count: usize,
    pub owner: u64,
    pub ratio: f64,
    pub weights: Vec<f64>,
    pub blob: Vec<u8>,
    pub at: DateTime<Utc>,
    pub bio: String,
}

impl Record for Kitchen {
    fn meta() -> RecordMeta {
        RecordMeta::new(
            "Kitchen",
            vec![
                Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
                Field::of::<String>("label", r#"json:"label" db:"constraint=unique""#),
                Field::of::<bool>("flag", r#"json:"flag""#),
                Field::of::<i32>("small", r#"json:"small""#),
                Field::of::<usize>("count", r#"json:"count""#),
                Field::of::<u64>("owner", r#"json:"owner""#),
                Field::of::<f64>("ratio", r#"json:"ratio""#),
                Field::of::<Vec<f64>>("weights", r#"json:"weights""#),
                Field::of::<Vec<u8>>("blob", r#"json:"blob""#),
                Field::of::<DateTime<Utc>>("at", r#"json:"at""#),
                Field::of::<String>("bio", r#"json:"bio" db:"constraint=fulltext""#),
            ],
        )
    }
}

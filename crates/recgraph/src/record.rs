//! Record declarations
//!
//! Rust has no runtime reflection, so a record type describes itself: its
//! type name plus one [`Field`] per struct field, each carrying the field's
//! declared [`Shape`] and a Go-style struct tag string such as
//! `json:"clerk_id,omitempty" db:"constraint=unique"`.
//!
//! ```ignore
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct User {
//!     gid: u64,
//!     name: String,
//!     clerk_id: String,
//! }
//!
//! impl Record for User {
//!     fn meta() -> RecordMeta {
//!         RecordMeta::new("User", vec![
//!             Field::of::<u64>("gid", r#"json:"gid,omitempty""#),
//!             Field::of::<String>("name", r#"json:"name,omitempty" db:"constraint=term""#),
//!             Field::of::<String>("clerk_id", r#"json:"clerk_id,omitempty" db:"constraint=unique""#),
//!         ])
//!     }
//! }
//! ```

use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use recgraph_core::{Point, Polygon};

/// A type stored as a graph node
///
/// The serde representation must be a JSON object whose keys are the
/// fields' `json` tag names, and must tolerate missing keys
/// (`#[serde(default)]`).
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name and field list
    fn meta() -> RecordMeta;
}

/// Self-description of a record type
#[derive(Debug, Clone)]
pub struct RecordMeta {
    /// Node type name, also the predicate prefix
    pub type_name: &'static str,
    pub fields: Vec<Field>,
}

impl RecordMeta {
    pub fn new(type_name: &'static str, fields: Vec<Field>) -> Self {
        Self { type_name, fields }
    }
}

/// One struct field
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Rust identifier
    pub ident: &'static str,
    /// Raw struct tag
    pub tag: &'static str,
    pub shape: Shape,
}

impl Field {
    /// Field with an explicit shape
    pub const fn new(ident: &'static str, tag: &'static str, shape: Shape) -> Self {
        Self { ident, tag, shape }
    }

    /// Field whose shape follows from its Rust type
    pub fn of<T: Shaped>(ident: &'static str, tag: &'static str) -> Self {
        Self::new(ident, tag, T::SHAPE)
    }

    /// Edge to a single record
    pub fn record<T: Record>(ident: &'static str, tag: &'static str) -> Self {
        Self::new(ident, tag, Shape::Record(T::meta))
    }

    /// Edges to a list of records
    pub fn records<T: Record>(ident: &'static str, tag: &'static str) -> Self {
        Self::new(ident, tag, Shape::RecordList(T::meta))
    }
}

/// Declared static type of a field
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    String,
    Bool,
    /// Signed integers of any width, `u8`, `u16`, `u32`
    Int,
    /// `u64`
    Uid,
    /// `usize`, written as a stringified default value
    Uint,
    /// `f32` or `f64`
    Float,
    F32Vec,
    F64Vec,
    Bytes,
    Time,
    Point,
    Polygon,
    Record(fn() -> RecordMeta),
    RecordList(fn() -> RecordMeta),
    /// A type the codec cannot store, by name
    Unsupported(&'static str),
}

impl Shape {
    /// Whether values of this shape are edges to other records
    pub fn is_record(&self) -> bool {
        matches!(self, Shape::Record(_) | Shape::RecordList(_))
    }

    /// Nested record description, if any
    pub fn nested(&self) -> Option<fn() -> RecordMeta> {
        match self {
            Shape::Record(meta) | Shape::RecordList(meta) => Some(*meta),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Bool => "bool",
            Shape::Int => "int",
            Shape::Uid => "uint64",
            Shape::Uint => "uint",
            Shape::Float => "float",
            Shape::F32Vec => "[]float32",
            Shape::F64Vec => "[]float64",
            Shape::Bytes => "[]byte",
            Shape::Time => "time",
            Shape::Point => "point",
            Shape::Polygon => "polygon",
            Shape::Record(_) => "record",
            Shape::RecordList(_) => "[]record",
            Shape::Unsupported(name) => *name,
        }
    }
}

/// Rust types with a known field shape
pub trait Shaped {
    const SHAPE: Shape;
}

macro_rules! shaped {
    ($shape:ident => $($ty:ty),+ $(,)?) => {
        $(impl Shaped for $ty {
            const SHAPE: Shape = Shape::$shape;
        })+
    };
}

shaped!(String => String);
shaped!(Bool => bool);
shaped!(Int => i8, i16, i32, i64, isize, u8, u16, u32);
shaped!(Uid => u64);
shaped!(Uint => usize);
shaped!(Float => f32, f64);
shaped!(F32Vec => Vec<f32>);
shaped!(F64Vec => Vec<f64>);
shaped!(Bytes => Vec<u8>);
shaped!(Time => DateTime<Utc>, DateTime<FixedOffset>);
shaped!(Point => Point);
shaped!(Polygon => Polygon);

impl<T: Shaped> Shaped for Option<T> {
    const SHAPE: Shape = T::SHAPE;
}

//! Entity descriptor runtime
//!
//! - [`field`] - Field specs with role tags and source mapping
//! - [`normalize`] - Value normalization rules
//! - [`entity`] - The [`Entity`] trait and role-derived helpers
//! - [`decode`] - Decoding raw source rows into records
//! - [`registry`] - Validated static registry of entities

pub mod decode;
pub mod entity;
pub mod field;
pub mod normalize;
pub mod registry;

pub use decode::decode_row;
pub use entity::{
    Entity, EntityExt, EntityRole, PartitionColumns, QueryContext, TimestampIndirection,
    UpdatedMarker,
};
pub use field::{FieldSpec, FieldType};
pub use normalize::Normalization;
pub use registry::EntityRegistry;

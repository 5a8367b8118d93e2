//! Field descriptors
//!
//! Fields are declared as `const` values with builder-style modifiers:
//!
//! ```rust
//! use idr_pipeline::model::{FieldSpec, Normalization};
//!
//! const BENE_SK: FieldSpec = FieldSpec::int("bene_sk").primary_key().batch_id().alias("hstry");
//! const UPDT: FieldSpec = FieldSpec::timestamp("idr_updt_ts")
//!     .update_timestamp()
//!     .normalize(Normalization::NullDateToMin);
//!
//! assert_eq!(BENE_SK.source_expr(), "hstry.bene_sk");
//! assert!(UPDT.update_timestamp);
//! ```

use super::normalize::Normalization;
use serde::Serialize;
use std::fmt;

/// Declared destination type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    Int,
    Float,
    Text,
    Date,
    Timestamp,
    Bool,
}

impl FieldType {
    /// PostgreSQL type used when staging rows
    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldType::Int => "BIGINT",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::Text => "TEXT",
            FieldType::Date => "DATE",
            FieldType::Timestamp => "TIMESTAMPTZ",
            FieldType::Bool => "BOOLEAN",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Timestamp => "timestamp",
            FieldType::Bool => "bool",
        };
        write!(f, "{name}")
    }
}

/// One column of an entity, with its roles and source mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub primary_key: bool,
    pub batch_id: bool,
    pub batch_timestamp: bool,
    pub historical_batch_timestamp: bool,
    pub update_timestamp: bool,
    pub insert_exclude: bool,
    pub derived: bool,
    pub alias: Option<&'static str>,
    pub column_map: Option<&'static str>,
    pub expr: Option<&'static str>,
    pub normalization: Option<Normalization>,
}

impl FieldSpec {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
            primary_key: false,
            batch_id: false,
            batch_timestamp: false,
            historical_batch_timestamp: false,
            update_timestamp: false,
            insert_exclude: false,
            derived: false,
            alias: None,
            column_map: None,
            expr: None,
            normalization: None,
        }
    }

    pub const fn int(name: &'static str) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn batch_id(mut self) -> Self {
        self.batch_id = true;
        self
    }

    pub const fn batch_timestamp(mut self) -> Self {
        self.batch_timestamp = true;
        self
    }

    pub const fn historical_batch_timestamp(mut self) -> Self {
        self.historical_batch_timestamp = true;
        self
    }

    pub const fn update_timestamp(mut self) -> Self {
        self.update_timestamp = true;
        self
    }

    /// Written on first insert, never overwritten by a merge
    pub const fn insert_exclude(mut self) -> Self {
        self.insert_exclude = true;
        self
    }

    /// Supplied by the query template itself rather than `{COLUMNS}`
    pub const fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    /// Table alias the column is selected from
    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Source column name when it differs from the field name
    pub const fn column_map(mut self, column: &'static str) -> Self {
        self.column_map = Some(column);
        self
    }

    /// Full source expression; takes precedence over alias and column map
    pub const fn expr(mut self, expr: &'static str) -> Self {
        self.expr = Some(expr);
        self
    }

    pub const fn normalize(mut self, rule: Normalization) -> Self {
        self.normalization = Some(rule);
        self
    }

    /// Column name in the source table
    pub fn source_column(&self) -> &'static str {
        self.column_map.unwrap_or(self.name)
    }

    /// Expression selecting this field from the source query
    pub fn source_expr(&self) -> String {
        if let Some(expr) = self.expr {
            return expr.to_string();
        }
        match self.alias {
            Some(alias) => format!("{alias}.{}", self.source_column()),
            None => self.source_column().to_string(),
        }
    }

    /// Whether the field feeds the row cursor
    pub fn is_timestamp_role(&self) -> bool {
        self.batch_timestamp || self.historical_batch_timestamp || self.update_timestamp
    }
}

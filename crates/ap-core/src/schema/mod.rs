//! Translation of a Table Schema description into a catalog schema.
//!
//! [`compile`] is pure and deterministic: the same description always
//! yields the same tables, columns, keys and constraint names in the same
//! order, so a schema can be re-applied safely. [`CatalogSchema::to_ermrest`]
//! renders the result as the JSON document the catalog backend accepts.

pub mod compiler;
pub mod tableschema;

pub use compiler::{compile, compile_value};
pub use tableschema::TableSchemaDescription;

use serde_json::{json, Map, Value};

// ---------------------------------------------------------------------------
// Column types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Timestamptz,
    Int8,
    Float8,
    TextArray,
}

impl ColumnType {
    /// Fixed mapping from Table Schema type literals; `None` when unmapped.
    pub fn from_literal(literal: &str) -> Option<Self> {
        match literal {
            "string" => Some(ColumnType::Text),
            "datetime" => Some(ColumnType::Timestamptz),
            "integer" => Some(ColumnType::Int8),
            "number" => Some(ColumnType::Float8),
            "list" => Some(ColumnType::TextArray),
            _ => None,
        }
    }

    pub fn typename(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Timestamptz => "timestamptz",
            ColumnType::Int8 => "int8",
            ColumnType::Float8 => "float8",
            ColumnType::TextArray => "text[]",
        }
    }

    fn to_ermrest(self) -> Value {
        match self {
            ColumnType::TextArray => json!({
                "typename": self.typename(),
                "is_array": true,
                "base_type": { "typename": "text" },
            }),
            _ => json!({ "typename": self.typename() }),
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullok: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub columns: Vec<String>,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub constraint_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub comment: Option<String>,
    pub columns: Vec<ColumnSpec>,
    /// Primary key first when there is one.
    pub keys: Vec<KeySpec>,
    pub foreign_keys: Vec<ForeignKeySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSchema {
    pub schema_name: String,
    pub tables: Vec<TableSpec>,
}

impl CatalogSchema {
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// `{"schemas": {<schema_name>: {"schema_name": .., "tables": {..}}}}`
    pub fn to_ermrest(&self) -> Value {
        let s = self.schema_name.as_str();
        let mut tables = Map::new();
        for t in &self.tables {
            let columns: Vec<Value> = t
                .columns
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "type": c.column_type.to_ermrest(),
                        "nullok": c.nullok,
                        "comment": c.comment,
                    })
                })
                .collect();
            let keys: Vec<Value> = t
                .keys
                .iter()
                .map(|k| {
                    json!({
                        "unique_columns": k.columns,
                        "names": [[s, k.constraint_name]],
                    })
                })
                .collect();
            let column_ref = |table: &str, column: &String| {
                json!({ "schema_name": s, "table_name": table, "column_name": column })
            };
            let foreign_keys: Vec<Value> = t
                .foreign_keys
                .iter()
                .map(|fk| {
                    json!({
                        "foreign_key_columns": fk.columns.iter()
                            .map(|c| column_ref(&t.name, c)).collect::<Vec<_>>(),
                        "referenced_columns": fk.referenced_columns.iter()
                            .map(|c| column_ref(&fk.referenced_table, c)).collect::<Vec<_>>(),
                        "names": [[s, fk.constraint_name]],
                    })
                })
                .collect();
            tables.insert(
                t.name.clone(),
                json!({
                    "schema_name": s,
                    "table_name": t.name,
                    "comment": t.comment,
                    "column_definitions": columns,
                    "keys": keys,
                    "foreign_keys": foreign_keys,
                }),
            );
        }
        let mut schemas = Map::new();
        schemas.insert(
            s.to_string(),
            json!({ "schema_name": s, "tables": tables }),
        );
        json!({ "schemas": schemas })
    }
}

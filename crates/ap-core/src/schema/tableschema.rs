//! Input dialect: Frictionless-style Table Schema descriptions.
//!
//! Two layouts are accepted for each resource: the flat one, with
//! `fields`/`primaryKey`/`foreignKeys` next to `name`, and the data-package
//! one where they sit inside a `schema` object. Flat keys win when both are
//! present.

use serde::Deserialize;

/// A field name or list of field names; a bare name is shorthand for a
/// one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldList {
    One(String),
    Many(Vec<String>),
}

impl FieldList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            FieldList::One(name) => vec![name.clone()],
            FieldList::Many(names) => names.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchemaDescription {
    #[serde(default)]
    pub resources: Vec<TableDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub unique: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
}

fn default_field_type() -> String {
    "string".to_string()
}

impl FieldDef {
    pub fn is_required(&self) -> bool {
        self.required || self.constraints.required.unwrap_or(false)
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.constraints.unique.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    /// Empty means the table that declares the foreign key.
    #[serde(default)]
    pub resource: String,
    pub fields: FieldList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeyDef {
    pub fields: FieldList,
    pub reference: Reference,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableBody {
    #[serde(default)]
    fields: Option<Vec<FieldDef>>,
    #[serde(default)]
    primary_key: Option<FieldList>,
    #[serde(default)]
    foreign_keys: Option<Vec<ForeignKeyDef>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTableDef {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<TableBody>,
    #[serde(flatten)]
    flat: TableBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawTableDef")]
pub struct TableDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub primary_key: Option<FieldList>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl From<RawTableDef> for TableDef {
    fn from(raw: RawTableDef) -> Self {
        let nested = raw.schema.unwrap_or_default();
        let flat = raw.flat;
        TableDef {
            name: raw.name,
            description: raw.description,
            fields: flat.fields.or(nested.fields).unwrap_or_default(),
            primary_key: flat.primary_key.or(nested.primary_key),
            foreign_keys: flat.foreign_keys.or(nested.foreign_keys).unwrap_or_default(),
        }
    }
}

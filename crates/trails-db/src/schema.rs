//! Collection and field definitions.
//!
//! A [`CollectionDef`] is the full declared shape of a collection. Migrations
//! build or modify these values and hand them to a store, which persists the
//! definition and reshapes the underlying table to match.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use trails_common::{Error, Result};

/// Columns every record carries regardless of its collection's fields.
pub const SYSTEM_FIELDS: &[&str] = &["id", "created", "updated"];

const RESERVED_FIELDS: &[&str] = &["id", "created", "updated", "collectionName", "expand"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Base,
    Auth,
    View,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Base => "base",
            CollectionKind::Auth => "auth",
            CollectionKind::View => "view",
        }
    }
}

/// Per-operation access predicates.
///
/// `None` restricts the operation to administrators, `Some("")` opens it to
/// everyone, and any other string is a filter expression records must match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessRules {
    pub list_rule: Option<String>,
    pub view_rule: Option<String>,
    pub create_rule: Option<String>,
    pub update_rule: Option<String>,
    pub delete_rule: Option<String>,
}

impl AccessRules {
    /// Public list and view; writes stay admin only.
    pub fn public_read() -> Self {
        Self {
            list_rule: Some(String::new()),
            view_rule: Some(String::new()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(name: &str, columns: &[&str]) -> Self {
        Self {
            unique: true,
            ..Self::new(name, columns)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorOptions {
    pub convert_urls: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NumberOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub no_decimal: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailOptions {
    pub only_domains: Vec<String>,
    pub except_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptions {
    pub max_select: usize,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOptions {
    pub max_select: usize,
    /// Upper bound in bytes, enforced by the upload layer.
    pub max_size: u64,
    #[serde(default)]
    pub mime_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationOptions {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_select: Option<usize>,
    #[serde(default)]
    pub cascade_delete: bool,
}

/// Field type together with its type-specific constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum FieldKind {
    Text(TextOptions),
    Editor(EditorOptions),
    Number(NumberOptions),
    Bool,
    Email(EmailOptions),
    Url,
    Date(DateOptions),
    Select(SelectOptions),
    File(FileOptions),
    Relation(RelationOptions),
    Json,
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text(_) => "text",
            FieldKind::Editor(_) => "editor",
            FieldKind::Number(_) => "number",
            FieldKind::Bool => "bool",
            FieldKind::Email(_) => "email",
            FieldKind::Url => "url",
            FieldKind::Date(_) => "date",
            FieldKind::Select(_) => "select",
            FieldKind::File(_) => "file",
            FieldKind::Relation(_) => "relation",
            FieldKind::Json => "json",
        }
    }

    /// Whether values are stored as a JSON array rather than a scalar.
    pub fn is_multi(&self) -> bool {
        match self {
            FieldKind::Select(o) => o.max_select > 1,
            FieldKind::File(o) => o.max_select > 1,
            FieldKind::Relation(o) => o.max_select.is_some_and(|m| m > 1),
            _ => false,
        }
    }

    /// SQLite column affinity used for this field.
    pub fn column_type(&self) -> &'static str {
        match self {
            FieldKind::Number(_) => "NUMERIC",
            FieldKind::Bool => "BOOLEAN",
            _ => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            required: false,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn text(name: &str, min: Option<usize>, max: Option<usize>) -> Self {
        Self::new(
            name,
            FieldKind::Text(TextOptions {
                min,
                max,
                pattern: None,
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CollectionKind,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    #[serde(default)]
    pub rules: AccessRules,
}

impl CollectionDef {
    pub fn base(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CollectionKind::Base,
            fields: Vec::new(),
            indexes: Vec::new(),
            rules: AccessRules::default(),
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_rules(mut self, rules: AccessRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Like [`field_mut`](Self::field_mut) but a missing field is a lookup failure.
    pub fn require_field_mut(&mut self, name: &str) -> Result<&mut FieldDef> {
        let collection = self.name.clone();
        self.field_mut(name)
            .ok_or_else(|| Error::NotFound(format!("field `{name}` in collection `{collection}`")))
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldDef> {
        let pos = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(pos))
    }

    pub fn remove_index(&mut self, name: &str) -> Option<IndexDef> {
        let pos = self.indexes.iter().position(|i| i.name == name)?;
        Some(self.indexes.remove(pos))
    }

    /// Whether `name` is a field or system column of this collection.
    pub fn has_column(&self, name: &str) -> bool {
        SYSTEM_FIELDS.contains(&name) || self.field(name).is_some()
    }

    /// Check the definition itself: identifiers, field name uniqueness,
    /// option sanity and index columns.
    pub fn validate(&self) -> Result<()> {
        check_identifier("collection", &self.name)?;
        if self.name.starts_with('_') {
            return Err(Error::Constraint(format!(
                "collection name `{}` is reserved for system tables",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            check_identifier("field", &field.name)?;
            if RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(Error::Constraint(format!(
                    "field name `{}` is reserved",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Constraint(format!(
                    "duplicate field `{}` in collection `{}`",
                    field.name, self.name
                )));
            }
            validate_options(field)?;
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            check_identifier("index", &index.name)?;
            if !index_names.insert(index.name.as_str()) {
                return Err(Error::Constraint(format!(
                    "duplicate index `{}` in collection `{}`",
                    index.name, self.name
                )));
            }
            if index.columns.is_empty() {
                return Err(Error::Constraint(format!(
                    "index `{}` has no columns",
                    index.name
                )));
            }
            for column in &index.columns {
                if !self.has_column(column) {
                    return Err(Error::Constraint(format!(
                        "index `{}` references unknown field `{column}`",
                        index.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_options(field: &FieldDef) -> Result<()> {
    let bad = |msg: String| Err(Error::Constraint(format!("field `{}`: {msg}", field.name)));
    match &field.kind {
        FieldKind::Text(o) => {
            if let (Some(min), Some(max)) = (o.min, o.max)
                && min > max
            {
                return bad(format!("min length {min} exceeds max length {max}"));
            }
            if let Some(pattern) = &o.pattern
                && let Err(e) = Regex::new(pattern)
            {
                return bad(format!("invalid pattern: {e}"));
            }
        }
        FieldKind::Number(o) => {
            if let (Some(min), Some(max)) = (o.min, o.max)
                && min > max
            {
                return bad(format!("min {min} exceeds max {max}"));
            }
        }
        FieldKind::Select(o) => {
            if o.max_select == 0 {
                return bad("max_select must be at least 1".into());
            }
            if o.values.is_empty() {
                return bad("select needs at least one value".into());
            }
        }
        FieldKind::File(o) => {
            if o.max_select == 0 {
                return bad("max_select must be at least 1".into());
            }
        }
        FieldKind::Relation(o) => {
            if o.collection.is_empty() {
                return bad("relation needs a target collection".into());
            }
        }
        FieldKind::Editor(_)
        | FieldKind::Bool
        | FieldKind::Email(_)
        | FieldKind::Url
        | FieldKind::Date(_)
        | FieldKind::Json => {}
    }
    Ok(())
}

fn check_identifier(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::Constraint(format!("invalid {what} name `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CollectionDef {
        CollectionDef::base("posts")
            .with_field(FieldDef::text("title", Some(1), Some(200)).required())
            .with_field(FieldDef::new("featured", FieldKind::Bool))
            .with_index(IndexDef::unique("idx_posts_title", &["title"]))
    }

    #[test]
    fn valid_definition_passes() {
        sample().validate().unwrap();
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let def = sample().with_field(FieldDef::new("featured", FieldKind::Bool));
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate field `featured`"));
    }

    #[test]
    fn system_field_names_are_reserved() {
        let def = sample().with_field(FieldDef::new("created", FieldKind::Json));
        assert!(def.validate().unwrap_err().is_constraint());
    }

    #[test]
    fn index_on_unknown_column_is_rejected() {
        let def = sample().with_index(IndexDef::new("idx_missing", &["nope"]));
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("unknown field `nope`"));
    }

    #[test]
    fn index_may_use_system_columns() {
        let def = sample().with_index(IndexDef::new("idx_posts_created", &["created"]));
        def.validate().unwrap();
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        assert!(CollectionDef::base("bad name").validate().is_err());
        assert!(CollectionDef::base("_migrations").validate().is_err());
        assert!(CollectionDef::base("1st").validate().is_err());
    }

    #[test]
    fn broken_pattern_is_rejected() {
        let def = CollectionDef::base("posts").with_field(FieldDef::new(
            "slug",
            FieldKind::Text(TextOptions {
                pattern: Some("(".into()),
                ..Default::default()
            }),
        ));
        assert!(def.validate().unwrap_err().to_string().contains("invalid pattern"));
    }

    #[test]
    fn field_json_uses_type_and_options_keys() {
        let field = FieldDef::text("title", Some(1), Some(200)).required();
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["name"], "title");
        assert_eq!(json["type"], "text");
        assert_eq!(json["required"], true);
        assert_eq!(json["options"]["max"], 200);
        assert!(json["options"].get("pattern").is_none());

        let back: FieldDef = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn unit_kinds_deserialize_without_options() {
        let field: FieldDef =
            serde_json::from_str(r#"{"name":"featured","type":"bool"}"#).unwrap();
        assert_eq!(field.kind, FieldKind::Bool);
        assert!(!field.required);
    }

    #[test]
    fn multi_select_is_detected() {
        let single = FieldKind::Select(SelectOptions {
            max_select: 1,
            values: vec!["a".into()],
        });
        let multi = FieldKind::Select(SelectOptions {
            max_select: 3,
            values: vec!["a".into()],
        });
        assert!(!single.is_multi());
        assert!(multi.is_multi());
    }
}

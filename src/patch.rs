//! Partial updates driven by a JSON request body.
//!
//! Each patchable table declares an allow-list of typed [`Field`]s. A [`Patch`]
//! keeps only the listed keys that are present in the body, checks and
//! normalizes their values, and renders either a parameterized SQL `UPDATE`
//! (placeholders `?1..?n`, record id bound last) or a document `$set`.
//! A `Patch` is never empty: a body without any listed key is rejected when the
//! patch is built, so no caller can reach an `UPDATE ... SET` with nothing to set.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{normalize_timestamp, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Non-empty string, trimmed
    Text,
    /// String kept as sent, may be empty
    LongText,
    /// String or null; blank strings become null
    OptText,
    Int,
    OptInt,
    Bool,
    /// Lowercase words joined by hyphens
    Slug,
    Email,
    /// JSON array/object stored as text; never null
    Json,
    /// Optional date-time, stored as `YYYY-MM-DD HH:MM:SS`
    Timestamp,
    /// Optional absolute http(s) URL
    Url,
    /// One of a fixed set of values, matched case-insensitively
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Field { name, kind }
    }
}

/// A patchable table: its name and the columns a request may change.
#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub fields: &'static [Field],
    /// Table has an `updated_at` column that every update refreshes
    pub timestamped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("no updatable fields provided")]
    Empty,
    #[error("'{0}' is not an updatable field")]
    UnknownField(String),
    #[error("invalid value for '{field}': expected {expected}")]
    InvalidValue {
        field: &'static str,
        expected: &'static str,
    },
    #[error("'{field}' must be one of: {allowed}")]
    NotAllowed { field: &'static str, allowed: String },
}

/// A rendered SQL update. `params[i]` binds placeholder `?{i + 1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub sql: String,
    pub params: Vec<PatchValue>,
}

#[derive(Debug, Clone)]
pub struct Patch {
    table: &'static Table,
    entries: Vec<(&'static str, PatchValue)>,
}

impl Table {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check and normalize a single value against this table's allow-list.
    pub fn coerce(&self, name: &str, value: &Value) -> Result<PatchValue, PatchError> {
        let field = self
            .field(name)
            .ok_or_else(|| PatchError::UnknownField(name.to_string()))?;
        coerce(field, value)
    }

    /// Coerce a string and hand back the normalized text (`None` for null-ish kinds).
    pub fn text(&self, name: &str, value: &str) -> Result<Option<String>, PatchError> {
        Ok(self
            .coerce(name, &Value::String(value.to_string()))?
            .into_string())
    }
}

impl PatchValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PatchValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PatchValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PatchValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            PatchValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            PatchValue::Null => Value::Null,
            PatchValue::Text(s) => Value::String(s.clone()),
            PatchValue::Int(i) => Value::from(*i),
            PatchValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl Patch {
    /// Build a patch from a request body. Keys outside the allow-list are ignored;
    /// listed keys with a bad value fail the whole patch.
    pub fn from_json(table: &'static Table, body: &Value) -> Result<Patch, PatchError> {
        let object = body.as_object().ok_or(PatchError::NotAnObject)?;
        Patch::from_map(table, object)
    }

    pub fn from_map(table: &'static Table, object: &Map<String, Value>) -> Result<Patch, PatchError> {
        let mut entries = Vec::new();
        for field in table.fields {
            if let Some(value) = object.get(field.name) {
                entries.push((field.name, coerce(field, value)?));
            }
        }
        if entries.is_empty() {
            return Err(PatchError::Empty);
        }
        Ok(Patch { table, entries })
    }

    pub fn table(&self) -> &'static Table {
        self.table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&PatchValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PatchValue::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(PatchValue::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(PatchValue::as_bool)
    }

    /// Set a value computed by the handler. Only allow-listed columns can be set.
    pub fn set(&mut self, name: &str, value: PatchValue) -> Result<(), PatchError> {
        let field = self
            .table
            .field(name)
            .ok_or_else(|| PatchError::UnknownField(name.to_string()))?;
        match self.entries.iter_mut().find(|(n, _)| *n == field.name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field.name, value)),
        }
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &PatchValue)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// JSON object of the changed columns, for the activity log.
    pub fn snapshot(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.entries {
            map.insert((*name).to_string(), value.to_json());
        }
        Value::Object(map)
    }

    /// `UPDATE <table> SET a = ?1, b = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?3`
    /// (the `updated_at` term only for timestamped tables)
    pub fn to_update(&self, id: i64) -> UpdateStatement {
        let mut sets = Vec::with_capacity(self.entries.len() + 1);
        let mut params = Vec::with_capacity(self.entries.len() + 1);
        for (name, value) in &self.entries {
            params.push(value.clone());
            sets.push(format!("{} = ?{}", name, params.len()));
        }
        if self.table.timestamped {
            sets.push("updated_at = CURRENT_TIMESTAMP".to_string());
        }
        params.push(PatchValue::Int(id));
        UpdateStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                self.table.name,
                sets.join(", "),
                params.len()
            ),
            params,
        }
    }
}

fn coerce(field: &Field, value: &Value) -> Result<PatchValue, PatchError> {
    let invalid = |expected: &'static str| PatchError::InvalidValue {
        field: field.name,
        expected,
    };

    match field.kind {
        FieldKind::Text => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(PatchValue::Text(s.trim().to_string())),
            _ => Err(invalid("a non-empty string")),
        },
        FieldKind::LongText => match value {
            Value::String(s) => Ok(PatchValue::Text(s.clone())),
            _ => Err(invalid("a string")),
        },
        FieldKind::OptText => match value {
            Value::Null => Ok(PatchValue::Null),
            Value::String(s) if s.trim().is_empty() => Ok(PatchValue::Null),
            Value::String(s) => Ok(PatchValue::Text(s.trim().to_string())),
            _ => Err(invalid("a string or null")),
        },
        FieldKind::Int => value
            .as_i64()
            .map(PatchValue::Int)
            .ok_or_else(|| invalid("an integer")),
        FieldKind::OptInt => match value {
            Value::Null => Ok(PatchValue::Null),
            v => v
                .as_i64()
                .map(PatchValue::Int)
                .ok_or_else(|| invalid("an integer or null")),
        },
        FieldKind::Bool => value
            .as_bool()
            .map(PatchValue::Bool)
            .ok_or_else(|| invalid("a boolean")),
        FieldKind::Slug => {
            let raw = value.as_str().ok_or_else(|| invalid("a slug"))?;
            let slug = slug::slugify(raw);
            if slug.is_empty() {
                return Err(invalid("a slug"));
            }
            Ok(PatchValue::Text(slug))
        }
        FieldKind::Email => {
            let raw = value.as_str().ok_or_else(|| invalid("an email address"))?;
            let email = raw.trim().to_lowercase();
            if !is_plausible_email(&email) {
                return Err(invalid("an email address"));
            }
            Ok(PatchValue::Text(email))
        }
        FieldKind::Json => match value {
            Value::Array(_) | Value::Object(_) => Ok(PatchValue::Text(value.to_string())),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(parsed @ (Value::Array(_) | Value::Object(_))) => {
                    Ok(PatchValue::Text(parsed.to_string()))
                }
                _ => Err(invalid("a JSON array or object")),
            },
            _ => Err(invalid("a JSON array or object")),
        },
        FieldKind::Timestamp => match value {
            Value::Null => Ok(PatchValue::Null),
            Value::String(s) if s.trim().is_empty() => Ok(PatchValue::Null),
            Value::String(s) => normalize_timestamp(s)
                .map(|dt| PatchValue::Text(dt.format(TIMESTAMP_FORMAT).to_string()))
                .ok_or_else(|| invalid("a date-time")),
            _ => Err(invalid("a date-time")),
        },
        FieldKind::Url => match value {
            Value::Null => Ok(PatchValue::Null),
            Value::String(s) if s.trim().is_empty() => Ok(PatchValue::Null),
            Value::String(s) => match url::Url::parse(s.trim()) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {
                    Ok(PatchValue::Text(s.trim().to_string()))
                }
                _ => Err(invalid("an http(s) URL")),
            },
            _ => Err(invalid("an http(s) URL")),
        },
        FieldKind::OneOf(allowed) => {
            let raw = value.as_str().unwrap_or_default().trim();
            allowed
                .iter()
                .find(|a| a.eq_ignore_ascii_case(raw))
                .map(|a| PatchValue::Text((*a).to_string()))
                .ok_or_else(|| PatchError::NotAllowed {
                    field: field.name,
                    allowed: allowed.join(", "),
                })
        }
    }
}

pub fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static WIDGETS: Table = Table {
        name: "widgets",
        fields: &[
            Field::new("title", FieldKind::Text),
            Field::new("slug", FieldKind::Slug),
            Field::new("notes", FieldKind::OptText),
            Field::new("position", FieldKind::Int),
            Field::new("visible", FieldKind::Bool),
            Field::new("status", FieldKind::OneOf(&["draft", "published"])),
            Field::new("tags", FieldKind::Json),
            Field::new("link", FieldKind::Url),
            Field::new("owner_email", FieldKind::Email),
            Field::new("published_at", FieldKind::Timestamp),
        ],
        timestamped: true,
    };

    static NOTES: Table = Table {
        name: "notes",
        fields: &[Field::new("body", FieldKind::Text)],
        timestamped: false,
    };

    #[test]
    fn body_without_listed_fields_is_rejected() {
        assert_eq!(
            Patch::from_json(&WIDGETS, &json!({})).unwrap_err(),
            PatchError::Empty
        );
        assert_eq!(
            Patch::from_json(&WIDGETS, &json!({"id": 9, "password": "x", "created_at": "now"}))
                .unwrap_err(),
            PatchError::Empty
        );
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert_eq!(
            Patch::from_json(&WIDGETS, &json!(["title"])).unwrap_err(),
            PatchError::NotAnObject
        );
    }

    #[test]
    fn placeholders_are_contiguous_and_id_is_last() {
        let patch = Patch::from_json(
            &WIDGETS,
            &json!({"visible": true, "title": " Hello ", "ignored": 1, "position": 3}),
        )
        .unwrap();
        let stmt = patch.to_update(42);
        // allow-list order, not body order
        assert_eq!(
            stmt.sql,
            "UPDATE widgets SET title = ?1, position = ?2, visible = ?3, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?4"
        );
        assert_eq!(
            stmt.params,
            vec![
                PatchValue::Text("Hello".to_string()),
                PatchValue::Int(3),
                PatchValue::Bool(true),
                PatchValue::Int(42),
            ]
        );
    }

    #[test]
    fn single_field_update() {
        let patch = Patch::from_json(&WIDGETS, &json!({"notes": null})).unwrap();
        let stmt = patch.to_update(7);
        assert_eq!(
            stmt.sql,
            "UPDATE widgets SET notes = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2"
        );
        assert_eq!(stmt.params, vec![PatchValue::Null, PatchValue::Int(7)]);
    }

    #[test]
    fn untimestamped_tables_skip_updated_at() {
        let patch = Patch::from_json(&NOTES, &json!({"body": "hi"})).unwrap();
        assert_eq!(
            patch.to_update(3).sql,
            "UPDATE notes SET body = ?1 WHERE id = ?2"
        );
    }

    #[test]
    fn wrong_types_name_the_field() {
        let err = Patch::from_json(&WIDGETS, &json!({"position": "three"})).unwrap_err();
        assert_eq!(
            err,
            PatchError::InvalidValue {
                field: "position",
                expected: "an integer"
            }
        );
        assert!(Patch::from_json(&WIDGETS, &json!({"title": "   "})).is_err());
        assert!(Patch::from_json(&WIDGETS, &json!({"visible": "yes"})).is_err());
    }

    #[test]
    fn one_of_is_case_insensitive_and_canonical() {
        let patch = Patch::from_json(&WIDGETS, &json!({"status": "PUBLISHED"})).unwrap();
        assert_eq!(patch.get_str("status"), Some("published"));
        assert!(matches!(
            Patch::from_json(&WIDGETS, &json!({"status": "live"})),
            Err(PatchError::NotAllowed { field: "status", .. })
        ));
    }

    #[test]
    fn values_are_normalized() {
        let patch = Patch::from_json(
            &WIDGETS,
            &json!({
                "slug": "Hello World!",
                "tags": ["a", "b"],
                "owner_email": " Me@Example.COM ",
                "published_at": "2024-05-01T10:30",
                "link": "",
            }),
        )
        .unwrap();
        assert_eq!(patch.get_str("slug"), Some("hello-world"));
        assert_eq!(patch.get_str("tags"), Some(r#"["a","b"]"#));
        assert_eq!(patch.get_str("owner_email"), Some("me@example.com"));
        assert_eq!(patch.get_str("published_at"), Some("2024-05-01 10:30:00"));
        assert_eq!(patch.get("link"), Some(&PatchValue::Null));
    }

    #[test]
    fn bad_urls_and_emails_are_rejected() {
        assert!(Patch::from_json(&WIDGETS, &json!({"link": "javascript:alert(1)"})).is_err());
        assert!(Patch::from_json(&WIDGETS, &json!({"owner_email": "nobody"})).is_err());
        assert!(Patch::from_json(&WIDGETS, &json!({"tags": "not json"})).is_err());
        assert_eq!(
            Patch::from_json(&WIDGETS, &json!({"tags": null})).unwrap_err(),
            PatchError::InvalidValue {
                field: "tags",
                expected: "a JSON array or object"
            }
        );
    }

    #[test]
    fn snapshot_holds_only_listed_columns() {
        let patch =
            Patch::from_json(&WIDGETS, &json!({"title": "T", "password": "secret"})).unwrap();
        assert_eq!(patch.snapshot(), json!({"title": "T"}));
    }

    #[test]
    fn set_replaces_or_appends_listed_columns() {
        let mut patch = Patch::from_json(&WIDGETS, &json!({"title": "T"})).unwrap();
        patch
            .set("published_at", PatchValue::Text("2024-01-01 00:00:00".into()))
            .unwrap();
        patch.set("title", PatchValue::Text("U".into())).unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get_str("title"), Some("U"));
        assert_eq!(
            patch.set("id", PatchValue::Int(1)),
            Err(PatchError::UnknownField("id".to_string()))
        );
    }

    #[test]
    fn table_text_coerces_single_values() {
        assert_eq!(
            WIDGETS.text("status", "Draft").unwrap(),
            Some("draft".to_string())
        );
        assert_eq!(WIDGETS.text("notes", "  ").unwrap(), None);
        assert!(WIDGETS.text("missing", "x").is_err());
    }

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a b@c.co"));
    }
}

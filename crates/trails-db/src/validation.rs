//! Write-time validation of record values against field definitions.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;
use trails_common::{Error, Result};

use crate::record::{RecordData, format_datetime, parse_datetime};
use crate::schema::{
    CollectionDef, DateOptions, EmailOptions, FieldDef, FieldKind, FileOptions, NumberOptions,
    TextOptions,
};

impl CollectionDef {
    /// Validate `data` against this collection's fields and return the
    /// normalized values for every field, blanks stored as null.
    pub fn prepare_record(&self, data: &RecordData) -> Result<RecordData> {
        if let Some(unknown) = data.keys().find(|k| self.field(k).is_none()) {
            return Err(Error::Constraint(format!(
                "unknown field `{unknown}` for collection `{}`",
                self.name
            )));
        }

        let mut prepared = RecordData::new();
        for field in &self.fields {
            let value = data.get(&field.name).unwrap_or(&Value::Null);
            prepared.insert(field.name.clone(), field.prepare(value)?);
        }
        Ok(prepared)
    }
}

impl FieldDef {
    /// Validate a single value, returning its stored form.
    pub fn prepare(&self, value: &Value) -> Result<Value> {
        if is_blank(value) {
            if self.required {
                return Err(self.violation("is required"));
            }
            // `false` and `0` are real values for optional fields.
            let stored = match value {
                Value::Bool(_) | Value::Number(_) => value.clone(),
                _ => Value::Null,
            };
            self.check_type(&stored)?;
            return Ok(stored);
        }

        match &self.kind {
            FieldKind::Text(o) => self.prepare_text(o, value),
            FieldKind::Editor(_) => self.expect_str(value).map(|s| Value::String(s.into())),
            FieldKind::Number(o) => self.prepare_number(o, value),
            FieldKind::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(self.violation("must be a boolean")),
            },
            FieldKind::Email(o) => self.prepare_email(o, value),
            FieldKind::Url => self.prepare_url(value),
            FieldKind::Date(o) => self.prepare_date(o, value),
            FieldKind::Select(o) => {
                let picked = self.expect_choices(value, o.max_select)?;
                if let Some(bad) = picked.iter().find(|v| !o.values.contains(*v)) {
                    return Err(self.violation(&format!("`{bad}` is not an allowed value")));
                }
                Ok(value.clone())
            }
            FieldKind::File(o) => self.prepare_file(o, value),
            FieldKind::Relation(o) => {
                self.expect_choices(value, o.max_select.unwrap_or(1))?;
                Ok(value.clone())
            }
            FieldKind::Json => Ok(value.clone()),
        }
    }

    fn violation(&self, msg: &str) -> Error {
        Error::Constraint(format!("field `{}` {msg}", self.name))
    }

    /// Optional blanks still have to be of a plausible type.
    fn check_type(&self, value: &Value) -> Result<()> {
        match (&self.kind, value) {
            (_, Value::Null) => Ok(()),
            (FieldKind::Bool, Value::Bool(_)) | (FieldKind::Number(_), Value::Number(_)) => Ok(()),
            (FieldKind::Json, _) => Ok(()),
            _ => Err(self.violation(&format!("must be a {}", self.kind.type_name()))),
        }
    }

    fn expect_str<'v>(&self, value: &'v Value) -> Result<&'v str> {
        value
            .as_str()
            .ok_or_else(|| self.violation("must be a string"))
    }

    fn prepare_text(&self, o: &TextOptions, value: &Value) -> Result<Value> {
        let s = self.expect_str(value)?;
        let len = s.chars().count();
        if let Some(min) = o.min
            && len < min
        {
            return Err(self.violation(&format!("must be at least {min} characters")));
        }
        if let Some(max) = o.max
            && len > max
        {
            return Err(self.violation(&format!("must be at most {max} characters")));
        }
        if let Some(pattern) = &o.pattern {
            let re = Regex::new(pattern)
                .map_err(|e| self.violation(&format!("has an invalid pattern: {e}")))?;
            if !re.is_match(s) {
                return Err(self.violation(&format!("must match {pattern}")));
            }
        }
        Ok(Value::String(s.to_string()))
    }

    fn prepare_number(&self, o: &NumberOptions, value: &Value) -> Result<Value> {
        let n = value
            .as_f64()
            .ok_or_else(|| self.violation("must be a number"))?;
        if let Some(min) = o.min
            && n < min
        {
            return Err(self.violation(&format!("must be at least {min}")));
        }
        if let Some(max) = o.max
            && n > max
        {
            return Err(self.violation(&format!("must be at most {max}")));
        }
        if o.no_decimal && n.fract() != 0.0 {
            return Err(self.violation("must be an integer"));
        }
        Ok(value.clone())
    }

    fn prepare_email(&self, o: &EmailOptions, value: &Value) -> Result<Value> {
        let s = self.expect_str(value)?;
        let Some((local, domain)) = s.rsplit_once('@') else {
            return Err(self.violation("must be an email address"));
        };
        let domain_ok = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains(char::is_whitespace);
        if local.is_empty() || local.contains(char::is_whitespace) || !domain_ok {
            return Err(self.violation("must be an email address"));
        }
        let domain = domain.to_ascii_lowercase();
        if !o.only_domains.is_empty() && !o.only_domains.iter().any(|d| d == &domain) {
            return Err(self.violation(&format!("domain `{domain}` is not allowed")));
        }
        if o.except_domains.iter().any(|d| d == &domain) {
            return Err(self.violation(&format!("domain `{domain}` is not allowed")));
        }
        Ok(Value::String(s.to_string()))
    }

    fn prepare_url(&self, value: &Value) -> Result<Value> {
        let s = self.expect_str(value)?;
        let parsed = url::Url::parse(s).map_err(|_| self.violation("must be a URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(self.violation("must be an http(s) URL"));
        }
        Ok(Value::String(s.to_string()))
    }

    fn prepare_date(&self, o: &DateOptions, value: &Value) -> Result<Value> {
        let s = self.expect_str(value)?;
        let dt = parse_datetime(s).ok_or_else(|| self.violation("must be a date"))?;
        if let Some(min) = o.min
            && dt < min
        {
            return Err(self.violation(&format!("must not be before {}", format_datetime(&min))));
        }
        if let Some(max) = o.max
            && dt > max
        {
            return Err(self.violation(&format!("must not be after {}", format_datetime(&max))));
        }
        Ok(Value::String(format_datetime(&dt)))
    }

    fn prepare_file(&self, o: &FileOptions, value: &Value) -> Result<Value> {
        let names = self.expect_choices(value, o.max_select)?;
        if !o.mime_types.is_empty() {
            for name in &names {
                let mime = mime_from_name(name);
                if !mime.is_some_and(|m| o.mime_types.iter().any(|allowed| allowed == m)) {
                    return Err(self.violation(&format!(
                        "file `{name}` is not one of {}",
                        o.mime_types.join(", ")
                    )));
                }
            }
        }
        Ok(value.clone())
    }

    /// A single string when `max_select` is 1, otherwise an array of distinct
    /// strings no longer than `max_select`.
    fn expect_choices(&self, value: &Value, max_select: usize) -> Result<Vec<String>> {
        if max_select <= 1 {
            return self.expect_str(value).map(|s| vec![s.to_string()]);
        }
        let Value::Array(items) = value else {
            return Err(self.violation("must be a list"));
        };
        if items.len() > max_select {
            return Err(self.violation(&format!("accepts at most {max_select} values")));
        }
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let s = self.expect_str(item)?;
            if s.is_empty() {
                return Err(self.violation("contains an empty value"));
            }
            if !seen.insert(s) {
                return Err(self.violation(&format!("contains `{s}` twice")));
            }
            out.push(s.to_string());
        }
        Ok(out)
    }
}

/// Blank values: null, empty string, empty array, zero and false.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
        Value::Object(_) => false,
    }
}

fn mime_from_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::record_data;
    use crate::schema::SelectOptions;

    fn slug_field() -> FieldDef {
        FieldDef::new(
            "slug",
            FieldKind::Text(TextOptions {
                min: Some(1),
                max: Some(200),
                pattern: Some("^[a-z0-9]+(?:-[a-z0-9]+)*$".into()),
            }),
        )
        .required()
    }

    #[test]
    fn text_pattern_and_length_are_enforced() {
        let field = slug_field();
        assert!(field.prepare(&json!("welcome-home")).is_ok());
        assert!(field.prepare(&json!("Welcome Home")).unwrap_err().is_constraint());
        assert!(field.prepare(&json!("a".repeat(201))).is_err());
        assert!(field.prepare(&json!("")).unwrap_err().to_string().contains("required"));
    }

    #[test]
    fn optional_blank_values_become_null() {
        let field = FieldDef::text("bio", None, Some(1000));
        assert_eq!(field.prepare(&Value::Null).unwrap(), Value::Null);
        assert_eq!(field.prepare(&json!("")).unwrap(), Value::Null);
    }

    #[test]
    fn optional_false_and_zero_are_kept() {
        let flag = FieldDef::new("featured", FieldKind::Bool);
        assert_eq!(flag.prepare(&json!(false)).unwrap(), json!(false));

        let order = FieldDef::new(
            "order",
            FieldKind::Number(NumberOptions {
                min: Some(0.0),
                ..Default::default()
            }),
        );
        assert_eq!(order.prepare(&json!(0)).unwrap(), json!(0));
        assert!(order.prepare(&json!(-1)).is_err());
    }

    #[test]
    fn optional_blank_of_wrong_type_is_rejected() {
        let bio = FieldDef::text("bio", None, None);
        assert!(bio.prepare(&json!(false)).is_err());
        assert!(bio.prepare(&json!(0)).is_err());
    }

    #[test]
    fn required_number_rejects_zero() {
        let year = FieldDef::new(
            "year",
            FieldKind::Number(NumberOptions {
                min: Some(2000.0),
                max: Some(2100.0),
                no_decimal: false,
            }),
        )
        .required();
        assert!(year.prepare(&json!(0)).is_err());
        assert!(year.prepare(&json!(1999)).is_err());
        assert!(year.prepare(&json!(2023)).is_ok());
        assert!(year.prepare(&json!("2023")).is_err());
    }

    #[test]
    fn select_checks_allowed_values_and_cardinality() {
        let single = FieldDef::new(
            "category",
            FieldKind::Select(SelectOptions {
                max_select: 1,
                values: vec!["Bylaws".into(), "Financial Reports".into()],
            }),
        );
        assert!(single.prepare(&json!("Bylaws")).is_ok());
        assert!(single.prepare(&json!("Gossip")).is_err());
        assert!(single.prepare(&json!(["Bylaws"])).is_err());

        let multi = FieldDef::new(
            "tags",
            FieldKind::Select(SelectOptions {
                max_select: 2,
                values: vec!["a".into(), "b".into(), "c".into()],
            }),
        );
        assert!(multi.prepare(&json!(["a", "b"])).is_ok());
        assert!(multi.prepare(&json!(["a", "b", "c"])).is_err());
        assert!(multi.prepare(&json!(["a", "a"])).is_err());
    }

    #[test]
    fn email_shape_and_domains() {
        let field = FieldDef::new(
            "email",
            FieldKind::Email(EmailOptions {
                only_domains: vec![],
                except_domains: vec!["spam.test".into()],
            }),
        );
        assert!(field.prepare(&json!("board@jacksontrails.org")).is_ok());
        assert!(field.prepare(&json!("not-an-email")).is_err());
        assert!(field.prepare(&json!("a@localhost")).is_err());
        assert!(field.prepare(&json!("x@spam.test")).is_err());
    }

    #[test]
    fn dates_are_normalized() {
        let field = FieldDef::new("published_date", FieldKind::Date(DateOptions::default()));
        assert_eq!(
            field.prepare(&json!("2024-01-15T10:00:00Z")).unwrap(),
            json!("2024-01-15 10:00:00.000Z")
        );
        assert!(field.prepare(&json!("yesterday")).is_err());
    }

    #[test]
    fn file_mime_types_follow_extension() {
        let field = FieldDef::new(
            "file",
            FieldKind::File(FileOptions {
                max_select: 1,
                max_size: 10 * 1024 * 1024,
                mime_types: vec!["application/pdf".into()],
            }),
        );
        assert!(field.prepare(&json!("bylaws.PDF")).is_ok());
        assert!(field.prepare(&json!("bylaws.docx")).is_err());
        assert!(field.prepare(&json!("bylaws")).is_err());
    }

    #[test]
    fn urls_must_be_http() {
        let field = FieldDef::new("site", FieldKind::Url);
        assert!(field.prepare(&json!("https://jacksontrails.org")).is_ok());
        assert!(field.prepare(&json!("ftp://jacksontrails.org")).is_err());
        assert!(field.prepare(&json!("jacksontrails")).is_err());
    }

    #[test]
    fn prepare_record_rejects_unknown_fields_and_fills_nulls() {
        let def = CollectionDef::base("posts")
            .with_field(slug_field())
            .with_field(FieldDef::text("bio", None, None));

        let data = record_data(json!({"slug": "ok", "bogus": 1}));
        assert!(def.prepare_record(&data).unwrap_err().to_string().contains("bogus"));

        let prepared = def.prepare_record(&record_data(json!({"slug": "ok"}))).unwrap();
        assert_eq!(prepared["slug"], "ok");
        assert_eq!(prepared["bio"], Value::Null);
    }
}

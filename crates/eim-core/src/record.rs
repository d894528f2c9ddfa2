//! Record model: record sets, records and typed fields.
//!
//! A `RecordSet` describes every change to one item and its stamps. Each
//! `Record` belongs to exactly one schema, identified by its prefix and
//! namespace, and carries an ordered list of `RecordField`s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identifies one schema by its short prefix and namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId {
    pub prefix: String,
    pub namespace: String,
}

impl SchemaId {
    pub fn new(prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            namespace: namespace.into(),
        }
    }
}

impl Display for SchemaId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.prefix, self.namespace)
    }
}

/// The declared type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    TimeStamp,
    Clob,
    Blob,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::TimeStamp => "timestamp",
            FieldKind::Clob => "clob",
            FieldKind::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// A typed raw field value. `None` is an explicit null, which is not the
/// same thing as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i64>),
    /// Decimal kept in its textual form, e.g. `"1178053319.25"`.
    Decimal(Option<String>),
    /// RFC 3339 instant.
    TimeStamp(Option<String>),
    /// Large text, carried as UTF-8 bytes.
    Clob(Option<Vec<u8>>),
    Blob(Option<Vec<u8>>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Decimal(_) => FieldKind::Decimal,
            FieldValue::TimeStamp(_) => FieldKind::TimeStamp,
            FieldValue::Clob(_) => FieldKind::Clob,
            FieldValue::Blob(_) => FieldKind::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Text(v) | FieldValue::Decimal(v) | FieldValue::TimeStamp(v) => v.is_none(),
            FieldValue::Integer(v) => v.is_none(),
            FieldValue::Clob(v) | FieldValue::Blob(v) => v.is_none(),
        }
    }

    /// The null value of the given kind.
    pub fn null(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(None),
            FieldKind::Integer => FieldValue::Integer(None),
            FieldKind::Decimal => FieldValue::Decimal(None),
            FieldKind::TimeStamp => FieldValue::TimeStamp(None),
            FieldKind::Clob => FieldValue::Clob(None),
            FieldKind::Blob => FieldValue::Blob(None),
        }
    }
}

/// One named value inside a record.
///
/// `missing` means the field was not part of the update at all. Applicators
/// skip missing fields; they never treat them as a clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: FieldValue,
    #[serde(default)]
    pub missing: bool,
}

impl RecordField {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
            missing: false,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldValue::Text(Some(value.into())))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, FieldValue::Integer(Some(value)))
    }

    pub fn decimal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldValue::Decimal(Some(value.into())))
    }

    pub fn timestamp(name: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::new(
            name,
            FieldValue::TimeStamp(Some(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        )
    }

    pub fn clob(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FieldValue::Clob(Some(value.into().into_bytes())))
    }

    /// An explicit null of the given kind.
    pub fn null(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::new(name, FieldValue::null(kind))
    }

    /// A field that was left out of the update.
    pub fn missing(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::null(kind),
            missing: true,
        }
    }
}

/// One schema-typed unit of change data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub prefix: String,
    pub namespace: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub fields: Vec<RecordField>,
}

impl Record {
    pub fn new(prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            namespace: namespace.into(),
            deleted: false,
            fields: Vec::new(),
        }
    }

    pub fn for_schema(schema: &SchemaId) -> Self {
        Self::new(schema.prefix.clone(), schema.namespace.clone())
    }

    /// Builder-style field append.
    pub fn with_field(mut self, field: RecordField) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark this record as a tombstone for its schema.
    pub fn into_deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn schema_id(&self) -> SchemaId {
        SchemaId::new(self.prefix.clone(), self.namespace.clone())
    }

    pub fn is_for(&self, schema: &SchemaId) -> bool {
        self.prefix == schema.prefix && self.namespace == schema.namespace
    }

    /// First field with the given name, missing or not.
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Ordered records describing all changes to one item.
///
/// A deleted record set is a tombstone for the whole item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub uuid: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            deleted: false,
            records: Vec::new(),
        }
    }

    pub fn tombstone(uuid: impl Into<String>) -> Self {
        Self {
            deleted: true,
            ..Self::new(uuid)
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

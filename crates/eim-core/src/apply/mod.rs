//! Schema applicators.
//!
//! Each EIM schema implements `RecordSchema`: it stages the fields of one
//! record, decides what to do in `finalize` without touching the item, and
//! only then mutates the item in `commit`. A record therefore either applies
//! completely or not at all.
//!
//! The shared driver lives in the blanket `Applicator` impl, which is the
//! object-safe face the dispatcher stores in its registry.

pub mod display_alarm;
pub mod event;
pub mod item;
pub mod modified_by;
pub mod note;
pub mod task;

use crate::error::{Result, SchemaError, StructuralViolation};
use crate::item::{Item, ItemKind, Stamp, StampKind};
use crate::record::{Record, RecordField, SchemaId};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace, warn};

pub use display_alarm::DisplayAlarmSchema;
pub use event::EventSchema;
pub use item::ItemSchema;
pub use modified_by::ModifiedBySchema;
pub use note::NoteSchema;
pub use task::TaskSchema;

/// What a schema does with a field name it does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    /// Keep the raw value as an item attribute under the schema namespace.
    Retain,
    /// Log and drop the field.
    Ignore,
    /// Fail the record with `SchemaError::UnknownField`.
    Reject,
}

/// Result of staging one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
    Accepted,
    Unknown,
}

/// A direct child of the target item's parent collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildEntry {
    pub uid: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub modifies: Option<String>,
}

impl From<&Item> for ChildEntry {
    fn from(item: &Item) -> Self {
        Self {
            uid: item.uid.clone(),
            kind: item.kind,
            modifies: item.modifies.clone(),
        }
    }
}

/// Read-only snapshot of a parent collection's children, used to resolve
/// modification links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentIndex {
    pub uid: String,
    #[serde(default)]
    pub children: Vec<ChildEntry>,
}

impl ParentIndex {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            children: Vec::new(),
        }
    }

    pub fn from_items<'a>(uid: impl Into<String>, items: impl IntoIterator<Item = &'a Item>) -> Self {
        Self {
            uid: uid.into(),
            children: items.into_iter().map(ChildEntry::from).collect(),
        }
    }

    pub fn with_child(mut self, child: ChildEntry) -> Self {
        self.children.push(child);
        self
    }

    /// Children whose uid equals `uid`, in index order.
    pub fn matching<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a ChildEntry> + 'a {
        self.children.iter().filter(move |c| c.uid == uid)
    }
}

/// Caller-supplied context for one apply call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyContext<'a> {
    /// Children of the item's parent collection, if it has one.
    pub parent: Option<&'a ParentIndex>,
    /// Already-authenticated user on whose behalf the records are applied.
    pub acting_user: Option<&'a str>,
}

impl<'a> ApplyContext<'a> {
    pub fn with_parent(parent: &'a ParentIndex) -> Self {
        Self {
            parent: Some(parent),
            acting_user: None,
        }
    }
}

/// One EIM schema's rules for applying its records.
pub trait RecordSchema: Send + Sync {
    /// Fields collected from one record before anything is decided.
    type Staged: Default;
    /// Mutation computed by `finalize`, applied by `commit`.
    type Plan;

    fn id(&self) -> &SchemaId;

    fn unknown_field_policy(&self) -> UnknownFieldPolicy;

    /// Stamp this schema's records live on, if any.
    fn stamp(&self) -> Option<StampKind> {
        None
    }

    /// Fresh stamp for `item`, created by the dispatcher on first use.
    fn new_stamp(&self, _item: &Item) -> Option<Stamp> {
        None
    }

    /// Reject targets of the wrong kind.
    fn check_target(&self, item: &Item) -> Result<()>;

    fn stage_field(&self, staged: &mut Self::Staged, field: &RecordField) -> Result<FieldOutcome>;

    /// Cross-field decisions. Must not mutate anything.
    fn finalize(&self, staged: Self::Staged, item: &Item, ctx: &ApplyContext<'_>) -> Result<Self::Plan>;

    fn commit(&self, plan: Self::Plan, item: &mut Item);

    /// Handle a tombstone record. Schemas without a meaningful deletion
    /// refuse it.
    fn apply_deletion(&self, _item: &mut Item) -> Result<()> {
        Err(SchemaError::DeletionUnsupported {
            namespace: self.id().namespace.clone(),
        })
    }
}

/// Object-safe applicator stored in the dispatch registry.
pub trait Applicator: Send + Sync {
    fn schema(&self) -> &SchemaId;

    fn stamp_kind(&self) -> Option<StampKind>;

    fn create_stamp(&self, item: &Item) -> Option<Stamp>;

    fn apply_record(&self, record: &Record, item: &mut Item, ctx: &ApplyContext<'_>) -> Result<()>;
}

impl<S: RecordSchema> Applicator for S {
    fn schema(&self) -> &SchemaId {
        RecordSchema::id(self)
    }

    fn stamp_kind(&self) -> Option<StampKind> {
        RecordSchema::stamp(self)
    }

    fn create_stamp(&self, item: &Item) -> Option<Stamp> {
        self.new_stamp(item)
    }

    fn apply_record(&self, record: &Record, item: &mut Item, ctx: &ApplyContext<'_>) -> Result<()> {
        let schema = RecordSchema::id(self);
        if !record.is_for(schema) {
            return Err(StructuralViolation::SchemaMismatch {
                expected: schema.to_string(),
                found: record.schema_id().to_string(),
            }
            .into());
        }

        let span = debug_span!(
            "apply_record",
            schema = %schema.prefix,
            item = %item.uid,
            user = ctx.acting_user.unwrap_or("-")
        );
        let _guard = span.enter();

        self.check_target(item)?;

        if record.deleted {
            debug!("Applying deletion");
            return self.apply_deletion(item);
        }

        let mut staged = S::Staged::default();
        let mut retained: Vec<&RecordField> = Vec::new();
        for field in &record.fields {
            if field.missing {
                trace!("Skipping missing field {}", field.name);
                continue;
            }
            if self.stage_field(&mut staged, field)? == FieldOutcome::Accepted {
                continue;
            }
            match self.unknown_field_policy() {
                UnknownFieldPolicy::Retain => retained.push(field),
                UnknownFieldPolicy::Ignore => {
                    warn!("Ignoring unknown field {} for {}", field.name, schema.namespace)
                }
                UnknownFieldPolicy::Reject => {
                    return Err(SchemaError::UnknownField {
                        namespace: schema.namespace.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        let plan = self.finalize(staged, item, ctx)?;
        self.commit(plan, item);
        for field in retained {
            item.set_attribute(&schema.namespace, &field.name, field.value.clone());
        }
        debug!("Applied {} field(s)", record.fields.len());
        Ok(())
    }
}

/// Shared target check: anything except a collection.
pub(crate) fn require_content(item: &Item) -> Result<()> {
    if item.kind == ItemKind::Collection {
        return Err(StructuralViolation::WrongItemKind {
            uid: item.uid.clone(),
            expected: "content item".into(),
        }
        .into());
    }
    Ok(())
}

/// Shared target check: notes only.
pub(crate) fn require_note(item: &Item) -> Result<()> {
    if item.kind != ItemKind::Note {
        return Err(StructuralViolation::WrongItemKind {
            uid: item.uid.clone(),
            expected: ItemKind::Note.to_string(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn missing_stamp(item: &Item, kind: StampKind) -> SchemaError {
    StructuralViolation::MissingStamp {
        uid: item.uid.clone(),
        stamp: kind.to_string(),
    }
    .into()
}

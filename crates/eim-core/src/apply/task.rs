//! task schema: marks a note as a task.
//!
//! The task stamp has no typed fields. Every field in a task record is kept
//! verbatim as an item attribute.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, missing_stamp, require_note};
use crate::error::Result;
use crate::item::{Item, Stamp, StampKind, TaskStamp};
use crate::record::{RecordField, SchemaId};
use tracing::debug;

pub const PREFIX: &str = "task";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/task/0";

#[derive(Debug, Clone)]
pub struct TaskSchema {
    id: SchemaId,
}

impl TaskSchema {
    pub fn new() -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
        }
    }
}

impl Default for TaskSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSchema for TaskSchema {
    type Staged = ();
    type Plan = ();

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Retain
    }

    fn stamp(&self) -> Option<StampKind> {
        Some(StampKind::Task)
    }

    fn new_stamp(&self, _item: &Item) -> Option<Stamp> {
        Some(Stamp::Task(TaskStamp::default()))
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_note(item)
    }

    fn stage_field(&self, _staged: &mut (), _field: &RecordField) -> Result<FieldOutcome> {
        Ok(FieldOutcome::Unknown)
    }

    fn finalize(&self, _staged: (), item: &Item, _ctx: &ApplyContext<'_>) -> Result<()> {
        if !item.has_stamp(StampKind::Task) {
            return Err(missing_stamp(item, StampKind::Task));
        }
        Ok(())
    }

    fn commit(&self, _plan: (), _item: &mut Item) {}

    /// Drops the stamp along with the fields retained for it.
    fn apply_deletion(&self, item: &mut Item) -> Result<()> {
        if item.remove_stamp(StampKind::Task).is_some() {
            debug!("Removed task stamp from {}", item.uid);
        }
        item.attributes.remove(NAMESPACE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::Applicator;
    use crate::record::{FieldValue, Record};

    fn tasked_note() -> Item {
        let mut item = Item::note("t1");
        item.attach_stamp(Stamp::Task(TaskStamp::default()));
        item
    }

    #[test]
    fn test_fields_are_retained() {
        let mut item = tasked_note();
        let record = Record::new(PREFIX, NAMESPACE).with_field(RecordField::text("priority", "high"));
        TaskSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::default())
            .unwrap();

        assert_eq!(
            item.attribute(NAMESPACE, "priority"),
            Some(&FieldValue::Text(Some("high".into())))
        );
    }

    #[test]
    fn test_marker_record_needs_stamp() {
        let mut item = Item::note("t1");
        let record = Record::new(PREFIX, NAMESPACE);
        let err = TaskSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::default())
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_deletion_removes_stamp_and_attributes() {
        let mut item = tasked_note();
        item.set_attribute(NAMESPACE, "priority", FieldValue::Text(Some("high".into())));

        TaskSchema::new()
            .apply_record(&Record::new(PREFIX, NAMESPACE).into_deleted(), &mut item, &ApplyContext::default())
            .unwrap();

        assert!(!item.has_stamp(StampKind::Task));
        assert!(item.attribute(NAMESPACE, "priority").is_none());
    }
}

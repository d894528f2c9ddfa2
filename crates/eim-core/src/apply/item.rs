//! item schema: title, triage, lastModifiedBy and createdOn.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, require_content};
use crate::error::{Result, ValidationError};
use crate::item::{Item, TriageStatus};
use crate::record::{RecordField, SchemaId};
use crate::validate::{validate_text, validate_timestamp};
use chrono::{DateTime, Utc};

pub const PREFIX: &str = "item";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/item/0";

const MAX_TITLE_LEN: usize = 1024;
const MAX_TRIAGE_LEN: usize = 256;
const MAX_USER_LEN: usize = 256;

/// Staged values. The outer `Option` is "seen in this record", the inner
/// one is the (nullable) value.
#[derive(Debug, Default)]
pub struct ItemFields {
    title: Option<Option<String>>,
    triage: Option<Option<TriageStatus>>,
    last_modified_by: Option<Option<String>>,
    created_on: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone)]
pub struct ItemSchema {
    id: SchemaId,
}

impl ItemSchema {
    pub fn new() -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
        }
    }
}

impl Default for ItemSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSchema for ItemSchema {
    type Staged = ItemFields;
    type Plan = ItemFields;

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Retain
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_content(item)
    }

    fn stage_field(&self, staged: &mut ItemFields, field: &RecordField) -> Result<FieldOutcome> {
        match field.name.as_str() {
            "title" => staged.title = Some(validate_text(field, MAX_TITLE_LEN)?),
            "triage" => {
                let triage = validate_text(field, MAX_TRIAGE_LEN)?
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| text.parse::<TriageStatus>())
                    .transpose()
                    .map_err(|reason| ValidationError::invalid(&field.name, reason))?;
                staged.triage = Some(triage);
            }
            "lastModifiedBy" => staged.last_modified_by = Some(validate_text(field, MAX_USER_LEN)?),
            "createdOn" => staged.created_on = Some(validate_timestamp(field)?),
            _ => return Ok(FieldOutcome::Unknown),
        }
        Ok(FieldOutcome::Accepted)
    }

    fn finalize(&self, staged: ItemFields, _item: &Item, _ctx: &ApplyContext<'_>) -> Result<ItemFields> {
        Ok(staged)
    }

    fn commit(&self, plan: ItemFields, item: &mut Item) {
        if let Some(title) = plan.title {
            if let Some(event) = item.event_stamp_mut() {
                event.summary = title.clone();
            }
            item.display_name = title;
        }
        if let Some(triage) = plan.triage {
            item.triage_status = triage;
        }
        if let Some(user) = plan.last_modified_by {
            item.last_modified_by = user;
        }
        if let Some(created) = plan.created_on {
            item.client_creation_date = created;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::Applicator;
    use crate::error::{SchemaError, StructuralViolation};
    use crate::item::{EventStamp, ItemKind, Stamp, TriageCode};
    use crate::record::{FieldKind, Record};
    use chrono::TimeZone;

    fn apply(item: &mut Item, record: Record) -> Result<()> {
        ItemSchema::new().apply_record(&record, item, &ApplyContext::default())
    }

    fn record() -> Record {
        Record::new(PREFIX, NAMESPACE)
    }

    #[test]
    fn test_apply_all_fields() {
        let mut item = Item::note("n1");
        apply(
            &mut item,
            record()
                .with_field(RecordField::text("title", "Dinner"))
                .with_field(RecordField::text("triage", "200 -1178053319.00 0"))
                .with_field(RecordField::text("lastModifiedBy", "bob@example.com"))
                .with_field(RecordField::decimal("createdOn", "1178053319")),
        )
        .unwrap();

        assert_eq!(item.display_name.as_deref(), Some("Dinner"));
        let triage = item.triage_status.clone().unwrap();
        assert_eq!(triage.code, TriageCode::Later);
        assert!(!triage.auto_triage);
        assert_eq!(item.last_modified_by.as_deref(), Some("bob@example.com"));
        assert_eq!(
            item.client_creation_date,
            Some(Utc.timestamp_opt(1178053319, 0).unwrap())
        );
    }

    #[test]
    fn test_later_field_wins_within_record() {
        let mut item = Item::note("n1");
        apply(
            &mut item,
            record()
                .with_field(RecordField::text("title", "First"))
                .with_field(RecordField::text("title", "Second")),
        )
        .unwrap();
        assert_eq!(item.display_name.as_deref(), Some("Second"));
    }

    #[test]
    fn test_null_title_clears() {
        let mut item = Item::note("n1");
        item.display_name = Some("Old".into());
        apply(&mut item, record().with_field(RecordField::null("title", FieldKind::Text))).unwrap();
        assert_eq!(item.display_name, None);
    }

    #[test]
    fn test_title_too_long() {
        let mut item = Item::note("n1");
        let err = apply(
            &mut item,
            record().with_field(RecordField::text("title", "x".repeat(1025))),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Validation(ValidationError::TooLong { max: 1024, .. })
        ));
    }

    #[test]
    fn test_title_mirrors_into_event_summary() {
        let mut item = Item::note("n1");
        item.attach_stamp(Stamp::Event(EventStamp::default()));
        apply(&mut item, record().with_field(RecordField::text("title", "Standup"))).unwrap();
        assert_eq!(
            item.event_stamp().and_then(|e| e.summary.as_deref()),
            Some("Standup")
        );
    }

    #[test]
    fn test_empty_triage_clears() {
        let mut item = Item::note("n1");
        item.triage_status = Some("100 -1.00 1".parse().unwrap());
        apply(&mut item, record().with_field(RecordField::text("triage", ""))).unwrap();
        assert_eq!(item.triage_status, None);
    }

    #[test]
    fn test_collection_is_rejected() {
        let mut collection = Item::with_uid("c1", ItemKind::Collection);
        let err = apply(&mut collection, record().with_field(RecordField::text("title", "x"))).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Structural(StructuralViolation::WrongItemKind { .. })
        ));
    }

    #[test]
    fn test_deletion_is_unsupported() {
        let mut item = Item::note("n1");
        let err = apply(&mut item, record().into_deleted()).unwrap_err();
        assert!(matches!(err, SchemaError::DeletionUnsupported { .. }));
    }

    #[test]
    fn test_content_item_accepts_item_records() {
        let mut item = Item::with_uid("d1", ItemKind::Content);
        apply(&mut item, record().with_field(RecordField::text("title", "Doc"))).unwrap();
        assert_eq!(item.display_name.as_deref(), Some("Doc"));
    }
}

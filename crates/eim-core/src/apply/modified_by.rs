//! modifiedBy schema: last-writer-wins attribution.
//!
//! A modifiedBy record states that `userid` changed the item at `timestamp`.
//! It is only applied when that timestamp is strictly later than anything
//! already known about the item, so replays and out-of-order deliveries
//! never regress `last_modified_by`.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, require_content};
use crate::error::{Result, StructuralViolation};
use crate::item::Item;
use crate::record::{RecordField, SchemaId};
use crate::validate::{require_text, require_timestamp, validate_integer};
use chrono::{DateTime, Utc};
use tracing::debug;

pub const PREFIX: &str = "modby";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/modifiedBy/0";

const MAX_USER_LEN: usize = 256;

#[derive(Debug, Default)]
pub struct ModifiedByFields {
    timestamp: Option<DateTime<Utc>>,
    userid: Option<String>,
    action: Option<i64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ModifiedByPlan {
    Apply { userid: String, at: DateTime<Utc> },
    Stale,
}

#[derive(Debug, Clone)]
pub struct ModifiedBySchema {
    id: SchemaId,
}

impl ModifiedBySchema {
    pub fn new() -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
        }
    }

    fn required(&self, field: &str) -> StructuralViolation {
        StructuralViolation::MissingRequiredField {
            namespace: self.id.namespace.clone(),
            field: field.to_string(),
        }
    }
}

impl Default for ModifiedBySchema {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSchema for ModifiedBySchema {
    type Staged = ModifiedByFields;
    type Plan = ModifiedByPlan;

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Reject
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_content(item)
    }

    fn stage_field(&self, staged: &mut ModifiedByFields, field: &RecordField) -> Result<FieldOutcome> {
        match field.name.as_str() {
            "timestamp" => staged.timestamp = Some(require_timestamp(field)?),
            "userid" => staged.userid = Some(require_text(field, MAX_USER_LEN)?),
            "action" => staged.action = validate_integer(field)?,
            _ => return Ok(FieldOutcome::Unknown),
        }
        Ok(FieldOutcome::Accepted)
    }

    fn finalize(&self, staged: ModifiedByFields, item: &Item, _ctx: &ApplyContext<'_>) -> Result<ModifiedByPlan> {
        let at = staged.timestamp.ok_or_else(|| self.required("timestamp"))?;
        let userid = staged.userid.ok_or_else(|| self.required("userid"))?;
        if let Some(action) = staged.action {
            debug!("modifiedBy action {} for {}", action, item.uid);
        }

        match item.effective_modified_date() {
            Some(current) if at <= current => {
                debug!("Discarding stale modifiedBy for {} ({} <= {})", item.uid, at, current);
                Ok(ModifiedByPlan::Stale)
            }
            _ => Ok(ModifiedByPlan::Apply { userid, at }),
        }
    }

    fn commit(&self, plan: ModifiedByPlan, item: &mut Item) {
        if let ModifiedByPlan::Apply { userid, at } = plan {
            item.last_modified_by = Some(userid);
            item.last_modified_by_date = Some(at);
        }
    }

    /// modifiedBy records describe history; a tombstone for one is inert.
    fn apply_deletion(&self, item: &mut Item) -> Result<()> {
        debug!("Ignoring deleted modifiedBy record for {}", item.uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::Applicator;
    use crate::error::SchemaError;
    use crate::record::{FieldKind, Record};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn modby(secs: i64, user: &str) -> Record {
        Record::new(PREFIX, NAMESPACE)
            .with_field(RecordField::decimal("timestamp", secs.to_string()))
            .with_field(RecordField::text("userid", user))
    }

    fn apply(item: &mut Item, record: &Record) -> Result<()> {
        ModifiedBySchema::new().apply_record(record, item, &ApplyContext::default())
    }

    #[test]
    fn test_newer_record_applies() {
        let mut item = Item::note("n1").modified_at(at(100));
        apply(&mut item, &modby(200, "alice")).unwrap();

        assert_eq!(item.last_modified_by.as_deref(), Some("alice"));
        assert_eq!(item.last_modified_by_date, Some(at(200)));
        assert_eq!(item.modified_date, Some(at(100)), "modifiedDate is not touched");
    }

    #[test]
    fn test_stale_record_is_discarded() {
        let mut item = Item::note("n1").modified_at(at(300));
        item.last_modified_by = Some("carol".into());
        apply(&mut item, &modby(200, "alice")).unwrap();
        assert_eq!(item.last_modified_by.as_deref(), Some("carol"));
    }

    #[test]
    fn test_equal_timestamp_is_stale() {
        let mut item = Item::note("n1").modified_at(at(200));
        apply(&mut item, &modby(200, "alice")).unwrap();
        assert_eq!(item.last_modified_by, None, "Only strictly newer records apply");
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut once = Item::note("n1").modified_at(at(100));
        apply(&mut once, &modby(200, "alice")).unwrap();

        let mut twice = once.clone();
        apply(&mut twice, &modby(200, "alice")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_order_does_not_matter() {
        let r1 = modby(200, "alice");
        let r2 = modby(300, "bob");

        let mut forward = Item::note("n1").modified_at(at(100));
        apply(&mut forward, &r1).unwrap();
        apply(&mut forward, &r2).unwrap();

        let mut backward = Item::note("n1").modified_at(at(100));
        apply(&mut backward, &r2).unwrap();
        apply(&mut backward, &r1).unwrap();

        assert_eq!(forward.last_modified_by.as_deref(), Some("bob"));
        assert_eq!(backward.last_modified_by.as_deref(), Some("bob"));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_missing_userid_is_rejected() {
        let mut item = Item::note("n1");
        let record = Record::new(PREFIX, NAMESPACE)
            .with_field(RecordField::decimal("timestamp", "200"))
            .with_field(RecordField::missing("userid", FieldKind::Text));

        let err = apply(&mut item, &record).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Structural(StructuralViolation::MissingRequiredField { ref field, .. }) if field == "userid"
        ));
        assert_eq!(item.last_modified_by, None);
    }

    #[test]
    fn test_null_timestamp_is_rejected() {
        let mut item = Item::note("n1");
        let record = Record::new(PREFIX, NAMESPACE)
            .with_field(RecordField::null("timestamp", FieldKind::Decimal))
            .with_field(RecordField::text("userid", "alice"));
        assert!(matches!(apply(&mut item, &record), Err(SchemaError::Validation(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut item = Item::note("n1");
        let record = modby(200, "alice").with_field(RecordField::text("reason", "typo"));
        assert!(matches!(
            apply(&mut item, &record),
            Err(SchemaError::UnknownField { .. })
        ));
        assert_eq!(item.last_modified_by, None);
    }

    #[test]
    fn test_action_is_accepted() {
        let mut item = Item::note("n1");
        let record = modby(200, "alice").with_field(RecordField::integer("action", 100));
        apply(&mut item, &record).unwrap();
        assert_eq!(item.last_modified_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_deletion_is_inert() {
        let mut item = Item::note("n1");
        item.last_modified_by = Some("alice".into());
        let before = item.clone();
        apply(&mut item, &modby(200, "bob").into_deleted()).unwrap();
        assert_eq!(item, before);
    }
}

//! note schema: body, icalUid, reminderTime and the modification link.
//!
//! `parentUid` names a sibling note, under the same parent collection, that
//! this note modifies. The link is set at most once. After that, any
//! `parentUid` is ignored, whatever its value.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, require_note};
use crate::error::{LinkageError, Result};
use crate::item::{Item, ItemKind};
use crate::record::{RecordField, SchemaId};
use crate::validate::{validate_clob, validate_text, validate_timestamp};
use chrono::{DateTime, Utc};
use tracing::debug;

pub const PREFIX: &str = "note";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/note/0";

const MAX_ICAL_UID_LEN: usize = 256;
const MAX_PARENT_UID_LEN: usize = 256;

#[derive(Debug, Default)]
pub struct NoteFields {
    body: Option<Option<String>>,
    ical_uid: Option<Option<String>>,
    reminder_time: Option<Option<DateTime<Utc>>>,
    parent_uid: Option<String>,
}

#[derive(Debug)]
pub struct NotePlan {
    body: Option<Option<String>>,
    ical_uid: Option<Option<String>>,
    reminder_time: Option<Option<DateTime<Utc>>>,
    link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NoteSchema {
    id: SchemaId,
}

impl NoteSchema {
    pub fn new() -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
        }
    }
}

impl Default for NoteSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the master note named by `parent_uid` among the item's siblings.
///
/// The uid must match exactly one sibling, which must itself be a note that
/// is not a modification.
pub fn resolve_master(item: &Item, parent_uid: &str, ctx: &ApplyContext<'_>) -> std::result::Result<String, LinkageError> {
    if parent_uid == item.uid {
        return Err(LinkageError::SelfReference {
            uid: item.uid.clone(),
        });
    }
    let parent = ctx.parent.ok_or_else(|| LinkageError::NoParentCollection {
        uid: item.uid.clone(),
        parent_uid: parent_uid.to_string(),
    })?;

    let matches: Vec<_> = parent.matching(parent_uid).collect();
    let master = match matches.as_slice() {
        [] => {
            return Err(LinkageError::ParentNotFound {
                uid: item.uid.clone(),
                parent_uid: parent_uid.to_string(),
            });
        }
        [master] => *master,
        _ => {
            return Err(LinkageError::AmbiguousParent {
                uid: item.uid.clone(),
                parent_uid: parent_uid.to_string(),
                count: matches.len(),
            });
        }
    };

    if master.kind != ItemKind::Note || master.modifies.is_some() {
        return Err(LinkageError::IncompatibleKind {
            uid: item.uid.clone(),
            parent_uid: parent_uid.to_string(),
        });
    }
    Ok(master.uid.clone())
}

impl RecordSchema for NoteSchema {
    type Staged = NoteFields;
    type Plan = NotePlan;

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Retain
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_note(item)
    }

    fn stage_field(&self, staged: &mut NoteFields, field: &RecordField) -> Result<FieldOutcome> {
        match field.name.as_str() {
            "body" => staged.body = Some(validate_clob(field)?),
            "icalUid" => staged.ical_uid = Some(validate_text(field, MAX_ICAL_UID_LEN)?),
            "reminderTime" => staged.reminder_time = Some(validate_timestamp(field)?),
            "parentUid" => staged.parent_uid = validate_text(field, MAX_PARENT_UID_LEN)?,
            _ => return Ok(FieldOutcome::Unknown),
        }
        Ok(FieldOutcome::Accepted)
    }

    fn finalize(&self, staged: NoteFields, item: &Item, ctx: &ApplyContext<'_>) -> Result<NotePlan> {
        let link = match staged.parent_uid.filter(|uid| !uid.is_empty()) {
            None => None,
            Some(parent_uid) => match &item.modifies {
                Some(existing) => {
                    debug!("Item {} already modifies {}, ignoring parentUid {}", item.uid, existing, parent_uid);
                    None
                }
                None => Some(resolve_master(item, &parent_uid, ctx)?),
            },
        };
        Ok(NotePlan {
            body: staged.body,
            ical_uid: staged.ical_uid,
            reminder_time: staged.reminder_time,
            link,
        })
    }

    fn commit(&self, plan: NotePlan, item: &mut Item) {
        if let Some(body) = plan.body {
            if let Some(event) = item.event_stamp_mut() {
                event.description = body.clone();
            }
            item.body = body;
        }
        if let Some(ical_uid) = plan.ical_uid {
            item.ical_uid = ical_uid;
        }
        if let Some(reminder_time) = plan.reminder_time {
            item.reminder_time = reminder_time;
        }
        if let Some(master) = plan.link {
            debug!("Linking {} as a modification of {}", item.uid, master);
            item.modifies = Some(master);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{Applicator, ChildEntry, ParentIndex};
    use crate::error::SchemaError;
    use crate::record::{FieldKind, FieldValue, Record};

    fn body(text: &str) -> Record {
        Record::new(PREFIX, NAMESPACE).with_field(RecordField::clob("body", text))
    }

    fn parent_uid(uid: &str) -> Record {
        Record::new(PREFIX, NAMESPACE).with_field(RecordField::text("parentUid", uid))
    }

    fn siblings() -> ParentIndex {
        ParentIndex::new("calendar")
            .with_child(ChildEntry {
                uid: "master".into(),
                kind: ItemKind::Note,
                modifies: None,
            })
            .with_child(ChildEntry {
                uid: "other-master".into(),
                kind: ItemKind::Note,
                modifies: None,
            })
            .with_child(ChildEntry {
                uid: "master::20070201T100000Z".into(),
                kind: ItemKind::Note,
                modifies: Some("master".into()),
            })
            .with_child(ChildEntry {
                uid: "doc".into(),
                kind: ItemKind::Content,
                modifies: None,
            })
    }

    #[test]
    fn test_body_and_ical_uid() {
        let mut item = Item::note("n1");
        let record = body("Hello").with_field(RecordField::text("icalUid", "abc@example.com"));
        NoteSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::default())
            .unwrap();

        assert_eq!(item.body.as_deref(), Some("Hello"));
        assert_eq!(item.ical_uid.as_deref(), Some("abc@example.com"));
    }

    #[test]
    fn test_null_body_clears() {
        let mut item = Item::note("n1");
        item.body = Some("Old".into());
        let record = Record::new(PREFIX, NAMESPACE).with_field(RecordField::null("body", FieldKind::Clob));
        NoteSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::default())
            .unwrap();
        assert_eq!(item.body, None);
    }

    #[test]
    fn test_link_to_sibling() {
        let index = siblings();
        let mut item = Item::note("n1");
        NoteSchema::new()
            .apply_record(&parent_uid("master"), &mut item, &ApplyContext::with_parent(&index))
            .unwrap();
        assert_eq!(item.modifies.as_deref(), Some("master"));
    }

    #[test]
    fn test_link_is_immutable() {
        let index = siblings();
        let ctx = ApplyContext::with_parent(&index);
        let mut item = Item::note("n1");
        let schema = NoteSchema::new();

        schema.apply_record(&parent_uid("master"), &mut item, &ctx).unwrap();
        schema.apply_record(&parent_uid("other-master"), &mut item, &ctx).unwrap();
        assert_eq!(item.modifies.as_deref(), Some("master"), "Link must not move");

        schema
            .apply_record(&parent_uid("no-such-item"), &mut item, &ctx)
            .unwrap();
        assert_eq!(item.modifies.as_deref(), Some("master"));
    }

    #[test]
    fn test_empty_parent_uid_is_noop() {
        let mut item = Item::note("n1");
        NoteSchema::new()
            .apply_record(&parent_uid(""), &mut item, &ApplyContext::default())
            .unwrap();
        assert_eq!(item.modifies, None);

        let null = Record::new(PREFIX, NAMESPACE).with_field(RecordField::null("parentUid", FieldKind::Text));
        NoteSchema::new()
            .apply_record(&null, &mut item, &ApplyContext::default())
            .unwrap();
        assert_eq!(item.modifies, None);
    }

    #[test]
    fn test_parent_not_found_leaves_item_unlinked() {
        let index = siblings();
        let mut item = Item::note("n1");
        let record = body("Changed").with_field(RecordField::text("parentUid", "missing"));

        let err = NoteSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::with_parent(&index))
            .unwrap_err();

        assert!(matches!(err, SchemaError::Linkage(LinkageError::ParentNotFound { .. })));
        assert_eq!(item.modifies, None);
        assert_eq!(item.body, None, "The whole record is rejected");
    }

    #[test]
    fn test_linkage_failures() {
        let index = siblings();
        let ctx = ApplyContext::with_parent(&index);
        let item = Item::note("n1");

        assert!(matches!(
            resolve_master(&item, "doc", &ctx),
            Err(LinkageError::IncompatibleKind { .. })
        ));
        assert!(matches!(
            resolve_master(&item, "master::20070201T100000Z", &ctx),
            Err(LinkageError::IncompatibleKind { .. })
        ));
        assert!(matches!(
            resolve_master(&item, "n1", &ctx),
            Err(LinkageError::SelfReference { .. })
        ));
        assert!(matches!(
            resolve_master(&item, "master", &ApplyContext::default()),
            Err(LinkageError::NoParentCollection { .. })
        ));
    }

    #[test]
    fn test_duplicate_sibling_uid_is_ambiguous() {
        let index = siblings().with_child(ChildEntry {
            uid: "master".into(),
            kind: ItemKind::Note,
            modifies: None,
        });
        let item = Item::note("n1");
        assert!(matches!(
            resolve_master(&item, "master", &ApplyContext::with_parent(&index)),
            Err(LinkageError::AmbiguousParent { count: 2, .. })
        ));
    }

    #[test]
    fn test_content_item_is_rejected() {
        let mut item = Item::with_uid("d1", ItemKind::Content);
        let err = NoteSchema::new()
            .apply_record(&body("x"), &mut item, &ApplyContext::default())
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_field_retained() {
        let mut item = Item::note("n1");
        let record = body("x").with_field(RecordField::integer("color", 3));
        NoteSchema::new()
            .apply_record(&record, &mut item, &ApplyContext::default())
            .unwrap();
        assert_eq!(
            item.attribute(NAMESPACE, "color"),
            Some(&FieldValue::Integer(Some(3)))
        );
    }
}

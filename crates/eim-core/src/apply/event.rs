//! event schema: the calendar facet of a note.
//!
//! Fields are staged onto a copy of the existing event stamp. The copy is
//! rendered to iCalendar and passed through the calendar validator before it
//! replaces the stamp on the item.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, missing_stamp, require_note};
use crate::calendar::{CalendarValidator, render_event};
use crate::error::{Result, StructuralViolation, ValidationError};
use crate::ical::{CalendarTime, ICalDate, parse_duration};
use crate::item::{EventStamp, Item, Stamp, StampKind};
use crate::record::{RecordField, SchemaId};
use crate::validate::{require_text, validate_text};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const PREFIX: &str = "event";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/event/0";

/// Separates a modification's master uid from its recurrence id.
pub const RECURRENCE_ID_DELIMITER: &str = "::";

const MAX_DATE_LEN: usize = 1024;
const MAX_LOCATION_LEN: usize = 1024;
const MAX_STATUS_LEN: usize = 256;
const MAX_RULE_LEN: usize = 1024;

#[derive(Debug, Default)]
pub struct EventFields {
    start: Option<ICalDate>,
    duration: Option<Option<Duration>>,
    location: Option<Option<String>>,
    status: Option<Option<String>>,
    rrules: Option<Vec<String>>,
    exrules: Option<Vec<String>>,
    rdates: Option<Vec<CalendarTime>>,
    exdates: Option<Vec<CalendarTime>>,
}

pub struct EventSchema {
    id: SchemaId,
    validator: Arc<dyn CalendarValidator>,
}

impl EventSchema {
    pub fn new(validator: Arc<dyn CalendarValidator>) -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
            validator,
        }
    }
}

/// Recurrence id encoded in a modification uid, e.g.
/// `master-uid::20070201T100000Z`.
pub fn recurrence_id_from_uid(uid: &str) -> Option<CalendarTime> {
    let (_, suffix) = uid.split_once(RECURRENCE_ID_DELIMITER)?;
    match CalendarTime::parse_bare(suffix, None) {
        Ok(time) => Some(time),
        Err(e) => {
            warn!("Modification uid {} has no usable recurrence id: {}", uid, e);
            None
        }
    }
}

fn parse_date(field: &RecordField, text: &str) -> Result<ICalDate> {
    ICalDate::parse(text).map_err(|reason| ValidationError::invalid(&field.name, reason).into())
}

/// Nullable list of iCalendar dates.
fn stage_dates(field: &RecordField) -> Result<Vec<CalendarTime>> {
    match validate_text(field, MAX_RULE_LEN)? {
        None => Ok(Vec::new()),
        Some(text) if text.trim().is_empty() => Ok(Vec::new()),
        Some(text) => Ok(parse_date(field, &text)?.values),
    }
}

/// Nullable `:`-separated list of recurrence rules.
fn stage_rules(field: &RecordField) -> Result<Vec<String>> {
    let Some(text) = validate_text(field, MAX_RULE_LEN)? else {
        return Ok(Vec::new());
    };
    Ok(text
        .split(':')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(str::to_string)
        .collect())
}

impl RecordSchema for EventSchema {
    type Staged = EventFields;
    type Plan = EventStamp;

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Retain
    }

    fn stamp(&self) -> Option<StampKind> {
        Some(StampKind::Event)
    }

    /// New stamps pick up the note's title and body. On a modification the
    /// stamp is an exception to the master's series.
    fn new_stamp(&self, item: &Item) -> Option<Stamp> {
        let recurrence_id = if item.is_modification() {
            recurrence_id_from_uid(&item.uid)
        } else {
            None
        };
        Some(Stamp::Event(EventStamp {
            summary: item.display_name.clone(),
            description: item.body.clone(),
            recurrence_id,
            ..EventStamp::default()
        }))
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_note(item)
    }

    fn stage_field(&self, staged: &mut EventFields, field: &RecordField) -> Result<FieldOutcome> {
        match field.name.as_str() {
            "dtstart" => {
                let text = require_text(field, MAX_DATE_LEN)?;
                let start = parse_date(field, &text)?;
                trace!("Staged dtstart {}", start);
                staged.start = Some(start);
            }
            "duration" => {
                let duration = validate_text(field, MAX_DATE_LEN)?
                    .map(|text| parse_duration(&text))
                    .transpose()
                    .map_err(|reason| ValidationError::invalid(&field.name, reason))?;
                staged.duration = Some(duration);
            }
            "location" => staged.location = Some(validate_text(field, MAX_LOCATION_LEN)?),
            "status" => staged.status = Some(validate_text(field, MAX_STATUS_LEN)?),
            "rrule" => staged.rrules = Some(stage_rules(field)?),
            "exrule" => staged.exrules = Some(stage_rules(field)?),
            "rdate" => staged.rdates = Some(stage_dates(field)?),
            "exdate" => staged.exdates = Some(stage_dates(field)?),
            _ => return Ok(FieldOutcome::Unknown),
        }
        Ok(FieldOutcome::Accepted)
    }

    fn finalize(&self, staged: EventFields, item: &Item, _ctx: &ApplyContext<'_>) -> Result<EventStamp> {
        let mut stamp = item
            .event_stamp()
            .cloned()
            .ok_or_else(|| missing_stamp(item, StampKind::Event))?;

        if let Some(start) = staged.start {
            stamp.any_time = start.any_time;
            stamp.start = start.into_first();
        }
        if let Some(duration) = staged.duration {
            stamp.duration = duration;
        }
        if let Some(location) = staged.location {
            stamp.location = location;
        }
        if let Some(status) = staged.status {
            stamp.status = status;
        }
        if let Some(rrules) = staged.rrules {
            stamp.rrules = rrules;
        }
        if let Some(exrules) = staged.exrules {
            stamp.exrules = exrules;
        }
        if let Some(rdates) = staged.rdates {
            stamp.rdates = rdates;
        }
        if let Some(exdates) = staged.exdates {
            stamp.exdates = exdates;
        }

        // An exception without its own dtstart occurs at its original time.
        if stamp.start.is_none() && stamp.is_exception() {
            debug!("Exception {} inherits its start from the recurrence id", item.uid);
            stamp.start = stamp.recurrence_id.clone();
        }
        if stamp.start.is_none() {
            return Err(StructuralViolation::MissingRequiredField {
                namespace: self.id.namespace.clone(),
                field: "dtstart".into(),
            }
            .into());
        }

        let ics = render_event(&item.uid, &stamp);
        stamp.calendar = Some(self.validator.validate(&ics)?);
        Ok(stamp)
    }

    fn commit(&self, plan: EventStamp, item: &mut Item) {
        item.attach_stamp(Stamp::Event(plan));
    }

    /// Removing the event facet. Absent stamps are already removed.
    fn apply_deletion(&self, item: &mut Item) -> Result<()> {
        if item.remove_stamp(StampKind::Event).is_some() {
            debug!("Removed event stamp from {}", item.uid);
        }
        Ok(())
    }
}

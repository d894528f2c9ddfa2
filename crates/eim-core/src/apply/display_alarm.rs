//! displayAlarm schema: the reminder on an event.
//!
//! The alarm lives on the event stamp and this schema never creates one.
//! A note without an event stamp can still carry an absolute trigger, which
//! becomes the note's reminder time. Once the event has a start, an alarm
//! change re-renders the event and runs it through the calendar validator.

use super::{ApplyContext, FieldOutcome, RecordSchema, UnknownFieldPolicy, missing_stamp, require_note};
use crate::calendar::{CalendarValidator, render_event};
use crate::error::{Result, ValidationError};
use crate::ical::{Trigger, parse_duration};
use crate::item::{EventStamp, Item, Stamp, StampKind};
use crate::record::{RecordField, SchemaId};
use crate::validate::{validate_integer, validate_text};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PREFIX: &str = "displayAlarm";
pub const NAMESPACE: &str = "http://osafoundation.org/eim/displayAlarm/0";

const MAX_DESCRIPTION_LEN: usize = 1024;
const MAX_TRIGGER_LEN: usize = 1024;
const MAX_DURATION_LEN: usize = 1024;

#[derive(Debug, Default)]
pub struct AlarmFields {
    description: Option<Option<String>>,
    trigger: Option<Option<Trigger>>,
    duration: Option<Option<Duration>>,
    repeat: Option<Option<i64>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AlarmPlan {
    /// The event stamp with the merged alarm.
    Event(Box<EventStamp>),
    Reminder(Option<DateTime<Utc>>),
}

pub struct DisplayAlarmSchema {
    id: SchemaId,
    validator: Arc<dyn CalendarValidator>,
}

impl DisplayAlarmSchema {
    pub fn new(validator: Arc<dyn CalendarValidator>) -> Self {
        Self {
            id: SchemaId::new(PREFIX, NAMESPACE),
            validator,
        }
    }

    /// Refresh the stored calendar of an event that has a start.
    fn revalidate(&self, uid: &str, event: &mut EventStamp) -> Result<()> {
        if event.start.is_some() {
            let ics = render_event(uid, event);
            event.calendar = Some(self.validator.validate(&ics)?);
        }
        Ok(())
    }
}

fn invalid(field: &RecordField) -> impl FnOnce(String) -> ValidationError + '_ {
    move |reason| ValidationError::invalid(&field.name, reason)
}

impl RecordSchema for DisplayAlarmSchema {
    type Staged = AlarmFields;
    type Plan = AlarmPlan;

    fn id(&self) -> &SchemaId {
        &self.id
    }

    fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        UnknownFieldPolicy::Ignore
    }

    fn check_target(&self, item: &Item) -> Result<()> {
        require_note(item)
    }

    fn stage_field(&self, staged: &mut AlarmFields, field: &RecordField) -> Result<FieldOutcome> {
        match field.name.as_str() {
            "description" => staged.description = Some(validate_text(field, MAX_DESCRIPTION_LEN)?),
            "trigger" => {
                let trigger = validate_text(field, MAX_TRIGGER_LEN)?
                    .map(|text| Trigger::parse(&text))
                    .transpose()
                    .map_err(invalid(field))?;
                staged.trigger = Some(trigger);
            }
            "duration" => {
                let duration = validate_text(field, MAX_DURATION_LEN)?
                    .map(|text| parse_duration(&text))
                    .transpose()
                    .map_err(invalid(field))?;
                staged.duration = Some(duration);
            }
            "repeat" => {
                let repeat = validate_integer(field)?;
                if repeat.is_some_and(|n| n < 0) {
                    return Err(ValidationError::invalid(&field.name, "repeat count is negative").into());
                }
                staged.repeat = Some(repeat);
            }
            _ => return Ok(FieldOutcome::Unknown),
        }
        Ok(FieldOutcome::Accepted)
    }

    fn finalize(&self, staged: AlarmFields, item: &Item, _ctx: &ApplyContext<'_>) -> Result<AlarmPlan> {
        let Some(event) = item.event_stamp() else {
            return match staged.trigger {
                Some(Some(trigger)) => match trigger.absolute() {
                    Some(at) => {
                        debug!("No event on {}, using alarm trigger as reminder time", item.uid);
                        Ok(AlarmPlan::Reminder(Some(at)))
                    }
                    None => Err(missing_stamp(item, StampKind::Event)),
                },
                Some(None) => Ok(AlarmPlan::Reminder(None)),
                None => Err(missing_stamp(item, StampKind::Event)),
            };
        };

        let mut alarm = event.alarm.clone().unwrap_or_default();
        if let Some(description) = staged.description {
            alarm.description = description;
        }
        if let Some(trigger) = staged.trigger {
            alarm.trigger = trigger;
        }
        if let Some(duration) = staged.duration {
            alarm.duration = duration;
        }
        if let Some(repeat) = staged.repeat {
            alarm.repeat = repeat;
        }

        let mut event = event.clone();
        event.alarm = Some(alarm);
        self.revalidate(&item.uid, &mut event)?;
        Ok(AlarmPlan::Event(Box::new(event)))
    }

    fn commit(&self, plan: AlarmPlan, item: &mut Item) {
        match plan {
            AlarmPlan::Event(event) => item.attach_stamp(Stamp::Event(*event)),
            AlarmPlan::Reminder(at) => item.reminder_time = at,
        }
    }

    /// Removes the alarm from the event, or the reminder time from a note
    /// that has no event.
    fn apply_deletion(&self, item: &mut Item) -> Result<()> {
        let Some(event) = item.event_stamp() else {
            item.reminder_time = None;
            return Ok(());
        };
        let mut event = event.clone();
        event.alarm = None;
        self.revalidate(&item.uid, &mut event)?;
        item.attach_stamp(Stamp::Event(event));
        Ok(())
    }
}

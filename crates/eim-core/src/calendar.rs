//! Calendar validator collaborator.
//!
//! Event stamps are rendered to a VCALENDAR and handed to a
//! `CalendarValidator`. The engine treats the outcome as opaque: either a
//! `ParsedCalendar` to store on the stamp, or a `CalendarError`.

use crate::error::CalendarError;
use crate::ical::{CalendarTime, format_duration};
use crate::item::{DisplayAlarm, EventStamp};
use icalendar::parser::{read_calendar, unfold};
use icalendar::{
    Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike, Property, ValueType,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the validator extracted from a valid calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCalendar {
    pub uid: Option<String>,
    pub start: CalendarTime,
    pub recurring: bool,
    /// The validated iCalendar text.
    pub ics: String,
}

pub trait CalendarValidator: Send + Sync {
    fn validate(&self, ics: &str) -> Result<ParsedCalendar, CalendarError>;
}

/// Validator backed by the `icalendar` parser and the `rrule` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcalendarValidator;

impl CalendarValidator for IcalendarValidator {
    fn validate(&self, ics: &str) -> Result<ParsedCalendar, CalendarError> {
        let unfolded = unfold(ics);
        let calendar = read_calendar(&unfolded).map_err(|e| CalendarError::Parse(e.to_string()))?;
        let vevent = calendar
            .components
            .iter()
            .find(|c| c.name == "VEVENT")
            .ok_or(CalendarError::NoEvent)?;

        let dtstart = vevent
            .find_prop("DTSTART")
            .ok_or_else(|| CalendarError::Invalid("VEVENT has no DTSTART".into()))?;
        let start = DatePerhapsTime::try_from(dtstart)
            .map(to_calendar_time)
            .map_err(|_| CalendarError::Invalid("DTSTART is not a valid date".into()))?;

        let rrules: Vec<String> = vevent
            .properties
            .iter()
            .filter(|p| p.name == "RRULE")
            .map(|p| p.val.to_string())
            .collect();
        for rrule in &rrules {
            check_rrule(&start, rrule)?;
        }
        let recurring = !rrules.is_empty() || vevent.find_prop("RDATE").is_some();

        if vevent
            .components
            .iter()
            .filter(|c| c.name == "VALARM")
            .any(|c| c.find_prop("TRIGGER").is_none())
        {
            return Err(CalendarError::Invalid("VALARM has no TRIGGER".into()));
        }

        Ok(ParsedCalendar {
            uid: vevent.find_prop("UID").map(|p| p.val.to_string()),
            start,
            recurring,
            ics: ics.to_string(),
        })
    }
}

fn to_calendar_time(dpt: DatePerhapsTime) -> CalendarTime {
    match dpt {
        DatePerhapsTime::Date(date) => CalendarTime::Date { date },
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(at) => CalendarTime::Utc { at },
            CalendarDateTime::Floating(at) => CalendarTime::Floating { at },
            CalendarDateTime::WithTimezone { date_time, tzid } => CalendarTime::Zoned {
                at: date_time,
                tzid,
            },
        },
    }
}

/// The rrule crate needs a DTSTART line; dates become midnight UTC.
fn dtstart_line(start: &CalendarTime) -> String {
    match start {
        CalendarTime::Date { date } => format!("DTSTART:{}T000000Z", date.format("%Y%m%d")),
        CalendarTime::Utc { .. } => format!("DTSTART:{}", start.to_ics_value()),
        CalendarTime::Floating { .. } => format!("DTSTART:{}Z", start.to_ics_value()),
        CalendarTime::Zoned { tzid, .. } => {
            format!("DTSTART;TZID={}:{}", tzid, start.to_ics_value())
        }
    }
}

/// Rewrite a local `UNTIL` into the UTC form `dtstart_line` gives DATE and
/// floating starts. A date `UNTIL` keeps its whole final day.
fn normalize_until(start: &CalendarTime, rrule: &str) -> String {
    if !matches!(start, CalendarTime::Date { .. } | CalendarTime::Floating { .. }) {
        return rrule.to_string();
    }
    rrule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") && !value.ends_with('Z') => {
                if value.contains('T') {
                    format!("{key}={value}Z")
                } else {
                    format!("{key}={value}T235959Z")
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn check_rrule(start: &CalendarTime, rrule: &str) -> Result<(), CalendarError> {
    let text = format!("{}\nRRULE:{}", dtstart_line(start), normalize_until(start, rrule));
    text.parse::<rrule::RRuleSet>()
        .map(|_| ())
        .map_err(|e| CalendarError::Invalid(format!("bad RRULE '{rrule}': {e}")))
}

/// Render an event stamp as a single-event VCALENDAR.
pub fn render_event(uid: &str, stamp: &EventStamp) -> String {
    let mut cal = Calendar::new();
    let mut event = icalendar::Event::new();
    event.uid(uid);

    if let Some(summary) = &stamp.summary {
        event.summary(summary);
    }
    if let Some(description) = &stamp.description {
        event.description(description);
    }
    if let Some(location) = &stamp.location {
        event.location(location);
    }
    if let Some(start) = &stamp.start {
        add_time_property(&mut event, "DTSTART", start, stamp.any_time);
    }
    if let Some(duration) = stamp.duration {
        event.add_property("DURATION", format_duration(duration));
    }
    if let Some(status) = &stamp.status {
        event.add_property("STATUS", status);
    }
    if let Some(recurrence_id) = &stamp.recurrence_id {
        add_time_property(&mut event, "RECURRENCE-ID", recurrence_id, false);
    }
    for rrule in &stamp.rrules {
        event.append_multi_property(Property::new("RRULE", rrule));
    }
    for exrule in &stamp.exrules {
        event.append_multi_property(Property::new("EXRULE", exrule));
    }
    for rdate in &stamp.rdates {
        add_time_property(&mut event, "RDATE", rdate, false);
    }
    for exdate in &stamp.exdates {
        add_time_property(&mut event, "EXDATE", exdate, false);
    }
    cal.push(event.done());
    let alarm = stamp.alarm.as_ref().and_then(alarm_lines);
    let ics = finish_ics(&cal.done().to_string(), alarm.as_deref());
    debug!("Rendered event {} ({} bytes)", uid, ics.len());
    ics
}

/// Drop the DTSTAMP lines the builder fills from the wall clock, so the
/// rendering depends only on the stamp, and splice the VALARM into the
/// VEVENT.
fn finish_ics(ics: &str, alarm: Option<&[String]>) -> String {
    let mut result = String::with_capacity(ics.len());
    for line in ics.lines().filter(|l| !l.starts_with("DTSTAMP")) {
        if line == "END:VEVENT" {
            for alarm_line in alarm.unwrap_or_default() {
                result.push_str(alarm_line);
                result.push_str("\r\n");
            }
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}

/// VALARM lines for a display alarm. An alarm without a trigger cannot fire
/// and is left out.
fn alarm_lines(alarm: &DisplayAlarm) -> Option<Vec<String>> {
    let trigger = alarm.trigger.as_ref()?.to_string();
    let mut lines = vec!["BEGIN:VALARM".to_string(), "ACTION:DISPLAY".to_string()];
    // Params render as `;K=V:value`; a bare duration needs its own colon.
    if trigger.starts_with(';') {
        lines.push(format!("TRIGGER{trigger}"));
    } else {
        lines.push(format!("TRIGGER:{trigger}"));
    }
    lines.push(format!(
        "DESCRIPTION:{}",
        escape_text(alarm.description.as_deref().unwrap_or("Event reminder"))
    ));
    if let Some(duration) = alarm.duration {
        lines.push(format!("DURATION:{}", format_duration(duration)));
    }
    if let Some(repeat) = alarm.repeat {
        lines.push(format!("REPEAT:{repeat}"));
    }
    lines.push("END:VALARM".to_string());
    Some(lines)
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn add_time_property(event: &mut icalendar::Event, name: &str, time: &CalendarTime, any_time: bool) {
    let mut prop = Property::new(name, time.to_ics_value());
    if time.is_date() {
        prop.append_parameter(ValueType::Date);
    }
    if let Some(tzid) = time.tzid() {
        prop.add_parameter("TZID", tzid);
    }
    if any_time {
        prop.add_parameter("X-OSAF-ANYTIME", "TRUE");
    }
    event.append_multi_property(prop);
}

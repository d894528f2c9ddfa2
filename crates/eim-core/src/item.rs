//! Item: the in-memory mutation target for record application.
//!
//! An `Item` is a note or content item with display fields, lifecycle
//! timestamps, an optional modification link and at most one stamp per
//! `StampKind`. Fields a schema does not understand but chooses to retain
//! are kept verbatim in `attributes`, keyed by namespace and field name.

use crate::calendar::ParsedCalendar;
use crate::ical::{CalendarTime, Trigger};
use crate::record::FieldValue;
use crate::validate::is_decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Collection,
    Content,
    Note,
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Collection => "collection",
            ItemKind::Content => "content item",
            ItemKind::Note => "note",
        })
    }
}

/// Triage code: where an item sits in the user's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriageCode {
    Now,
    Later,
    Done,
}

impl TriageCode {
    pub fn code(self) -> u16 {
        match self {
            TriageCode::Now => 100,
            TriageCode::Later => 200,
            TriageCode::Done => 300,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            100 => Some(TriageCode::Now),
            200 => Some(TriageCode::Later),
            300 => Some(TriageCode::Done),
            _ => None,
        }
    }
}

/// Triage status as carried in EIM: `"<code> <rank> <autotriage>"`,
/// e.g. `"100 -1178053319.00 1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageStatus {
    pub code: TriageCode,
    /// Sort rank, conventionally the negated epoch seconds of the last triage.
    pub rank: String,
    pub auto_triage: bool,
}

impl FromStr for TriageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [code, rank, auto] = parts.as_slice() else {
            return Err(format!("expected 'code rank autotriage', got '{s}'"));
        };
        let code = code
            .parse::<u16>()
            .ok()
            .and_then(TriageCode::from_code)
            .ok_or_else(|| format!("unknown triage code '{code}'"))?;
        if !is_decimal(rank) {
            return Err(format!("invalid triage rank '{rank}'"));
        }
        let auto_triage = match *auto {
            "0" => false,
            "1" => true,
            other => return Err(format!("invalid autotriage flag '{other}'")),
        };
        Ok(Self {
            code,
            rank: rank.to_string(),
            auto_triage,
        })
    }
}

impl Display for TriageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.code.code(),
            self.rank,
            if self.auto_triage { 1 } else { 0 }
        )
    }
}

/// A display alarm attached to an event stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayAlarm {
    pub description: Option<String>,
    pub trigger: Option<Trigger>,
    pub duration: Option<Duration>,
    pub repeat: Option<i64>,
}

/// The event facet: a calendar component attached to a note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStamp {
    pub start: Option<CalendarTime>,
    pub any_time: bool,
    pub duration: Option<Duration>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub rrules: Vec<String>,
    pub exrules: Vec<String>,
    pub rdates: Vec<CalendarTime>,
    pub exdates: Vec<CalendarTime>,
    /// Mirrors the item's display name.
    pub summary: Option<String>,
    /// Mirrors the note body.
    pub description: Option<String>,
    /// Set on exception stamps of modification items.
    pub recurrence_id: Option<CalendarTime>,
    pub alarm: Option<DisplayAlarm>,
    /// Last successful result from the calendar validator.
    pub calendar: Option<ParsedCalendar>,
}

impl EventStamp {
    pub fn is_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        !self.rrules.is_empty() || !self.rdates.is_empty()
    }
}

/// The task facet. It has no typed fields; task records are retained as
/// item attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStamp {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StampKind {
    Event,
    Task,
}

impl Display for StampKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StampKind::Event => "event",
            StampKind::Task => "task",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Stamp {
    Event(EventStamp),
    Task(TaskStamp),
}

impl Stamp {
    pub fn kind(&self) -> StampKind {
        match self {
            Stamp::Event(_) => StampKind::Event,
            Stamp::Task(_) => StampKind::Task,
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub uid: String,
    pub kind: ItemKind,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub triage_status: Option<TriageStatus>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    /// Timestamp of the modifiedBy record that set `last_modified_by`.
    #[serde(default)]
    pub last_modified_by_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub ical_uid: Option<String>,
    #[serde(default)]
    pub reminder_time: Option<DateTime<Utc>>,
    /// Uid of the master note this item modifies. Immutable once set.
    #[serde(default)]
    pub modifies: Option<String>,
    #[serde(default)]
    pub stamps: BTreeMap<StampKind, Stamp>,
    #[serde(default)]
    pub attributes: BTreeMap<String, BTreeMap<String, FieldValue>>,
}

impl Item {
    pub fn with_uid(uid: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
            active: true,
            display_name: None,
            triage_status: None,
            last_modified_by: None,
            last_modified_by_date: None,
            client_creation_date: None,
            created_date: None,
            modified_date: None,
            body: None,
            ical_uid: None,
            reminder_time: None,
            modifies: None,
            stamps: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn note(uid: impl Into<String>) -> Self {
        Self::with_uid(uid, ItemKind::Note)
    }

    /// Builder-style setter for the stored modification date.
    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_date = Some(at);
        self
    }

    /// The latest point at which this item is known to have changed: the
    /// later of its modification date and the last accepted modifiedBy
    /// timestamp.
    pub fn effective_modified_date(&self) -> Option<DateTime<Utc>> {
        self.modified_date.max(self.last_modified_by_date)
    }

    pub fn is_modification(&self) -> bool {
        self.modifies.is_some()
    }

    pub fn has_stamp(&self, kind: StampKind) -> bool {
        self.stamps.contains_key(&kind)
    }

    pub fn stamp(&self, kind: StampKind) -> Option<&Stamp> {
        self.stamps.get(&kind)
    }

    /// Attach a stamp, replacing any stamp of the same kind.
    pub fn attach_stamp(&mut self, stamp: Stamp) {
        self.stamps.insert(stamp.kind(), stamp);
    }

    pub fn remove_stamp(&mut self, kind: StampKind) -> Option<Stamp> {
        self.stamps.remove(&kind)
    }

    pub fn event_stamp(&self) -> Option<&EventStamp> {
        match self.stamps.get(&StampKind::Event) {
            Some(Stamp::Event(event)) => Some(event),
            _ => None,
        }
    }

    pub fn event_stamp_mut(&mut self) -> Option<&mut EventStamp> {
        match self.stamps.get_mut(&StampKind::Event) {
            Some(Stamp::Event(event)) => Some(event),
            _ => None,
        }
    }

    /// Retained value of an unknown field.
    pub fn attribute(&self, namespace: &str, name: &str) -> Option<&FieldValue> {
        self.attributes.get(namespace).and_then(|fields| fields.get(name))
    }

    pub fn set_attribute(&mut self, namespace: &str, name: &str, value: FieldValue) {
        self.attributes
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_triage_status_parse() {
        let status: TriageStatus = "100 -1178053319.00 1".parse().unwrap();
        assert_eq!(status.code, TriageCode::Now);
        assert_eq!(status.rank, "-1178053319.00");
        assert!(status.auto_triage);
        assert_eq!(status.to_string(), "100 -1178053319.00 1");
    }

    #[test]
    fn test_triage_status_rejects_garbage() {
        assert!("".parse::<TriageStatus>().is_err());
        assert!("100 -1.0".parse::<TriageStatus>().is_err());
        assert!("150 -1.0 0".parse::<TriageStatus>().is_err(), "Unknown code");
        assert!("300 rank 0".parse::<TriageStatus>().is_err());
        assert!("300 -1.0 yes".parse::<TriageStatus>().is_err());
    }

    #[test]
    fn test_effective_modified_date() {
        let t1 = Utc.timestamp_opt(100, 0).unwrap();
        let t2 = Utc.timestamp_opt(200, 0).unwrap();

        let mut item = Item::note("n1");
        assert_eq!(item.effective_modified_date(), None);

        item.modified_date = Some(t1);
        assert_eq!(item.effective_modified_date(), Some(t1));

        item.last_modified_by_date = Some(t2);
        assert_eq!(item.effective_modified_date(), Some(t2));
    }

    #[test]
    fn test_one_stamp_per_kind() {
        let mut item = Item::note("n1");
        item.attach_stamp(Stamp::Event(EventStamp::default()));
        item.attach_stamp(Stamp::Event(EventStamp {
            location: Some("Office".into()),
            ..EventStamp::default()
        }));
        item.attach_stamp(Stamp::Task(TaskStamp::default()));

        assert_eq!(item.stamps.len(), 2);
        assert_eq!(
            item.event_stamp().and_then(|e| e.location.as_deref()),
            Some("Office")
        );
        assert!(item.remove_stamp(StampKind::Task).is_some());
        assert!(!item.has_stamp(StampKind::Task));
    }

    #[test]
    fn test_item_json_defaults() {
        let item: Item = serde_json::from_str(r#"{"uid":"n1","kind":"note"}"#).unwrap();
        assert!(item.active);
        assert!(item.stamps.is_empty());

        let mut stamped = item.clone();
        stamped.attach_stamp(Stamp::Task(TaskStamp::default()));
        let json = serde_json::to_string(&stamped).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stamped);
    }
}

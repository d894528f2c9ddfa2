//! iCalendar value parsing for EIM text fields.
//!
//! EIM carries dates as iCalendar property tails, e.g.
//! `;VALUE=DATE-TIME;TZID=America/Los_Angeles:20070201T100000` or
//! `;VALUE=DATE;X-OSAF-ANYTIME=TRUE:20070201`. Alarm triggers and durations
//! use iCalendar duration syntax (`-PT15M`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use tracing::warn;

const DATE_FORMAT: &str = "%Y%m%d";
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A calendar date or date-time, preserving how it was expressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CalendarTime {
    Date { date: NaiveDate },
    Utc { at: DateTime<Utc> },
    Floating { at: NaiveDateTime },
    Zoned { at: NaiveDateTime, tzid: String },
}

impl CalendarTime {
    pub fn is_date(&self) -> bool {
        matches!(self, CalendarTime::Date { .. })
    }

    /// The value part without parameters, as it appears after the colon.
    pub fn to_ics_value(&self) -> String {
        match self {
            CalendarTime::Date { date } => date.format(DATE_FORMAT).to_string(),
            CalendarTime::Utc { at } => at.format("%Y%m%dT%H%M%SZ").to_string(),
            CalendarTime::Floating { at } | CalendarTime::Zoned { at, .. } => {
                at.format(DATE_TIME_FORMAT).to_string()
            }
        }
    }

    pub fn tzid(&self) -> Option<&str> {
        match self {
            CalendarTime::Zoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }

    /// Parse a bare value, inferring DATE vs DATE-TIME from its shape.
    pub fn parse_bare(value: &str, tzid: Option<&str>) -> Result<Self, String> {
        if value.len() == 8 && !value.contains('T') {
            return parse_value(value, ValueKind::Date, tzid);
        }
        parse_value(value, ValueKind::DateTime, tzid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Date,
    DateTime,
}

fn parse_value(value: &str, kind: ValueKind, tzid: Option<&str>) -> Result<CalendarTime, String> {
    match kind {
        ValueKind::Date => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(|date| CalendarTime::Date { date })
            .map_err(|_| format!("invalid date '{value}'")),
        ValueKind::DateTime => {
            if let Some(utc) = value.strip_suffix('Z') {
                let at = NaiveDateTime::parse_from_str(utc, DATE_TIME_FORMAT)
                    .map_err(|_| format!("invalid date-time '{value}'"))?;
                return Ok(CalendarTime::Utc { at: at.and_utc() });
            }
            let at = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT)
                .map_err(|_| format!("invalid date-time '{value}'"))?;
            Ok(match tzid {
                Some(tzid) => CalendarTime::Zoned {
                    at,
                    tzid: tzid.to_string(),
                },
                None => CalendarTime::Floating { at },
            })
        }
    }
}

/// A parsed EIM date value: one or more times plus the anytime flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ICalDate {
    pub values: Vec<CalendarTime>,
    pub any_time: bool,
}

/// Parameters from the `;K=V;...` prefix of an iCalendar value.
#[derive(Debug, Default)]
struct Params {
    value: Option<String>,
    tzid: Option<String>,
    any_time: bool,
    related: Option<String>,
}

/// Split `;K=V;K=V:value` into parameters and the value text.
fn split_params(text: &str) -> Result<(Params, &str), String> {
    let mut params = Params::default();
    let Some(rest) = text.strip_prefix(';') else {
        return Ok((params, text.strip_prefix(':').unwrap_or(text)));
    };
    let (param_text, value) = rest
        .split_once(':')
        .ok_or_else(|| format!("missing ':' in '{text}'"))?;

    for param in param_text.split(';').filter(|p| !p.is_empty()) {
        let (key, val) = param
            .split_once('=')
            .ok_or_else(|| format!("malformed parameter '{param}'"))?;
        match key.to_ascii_uppercase().as_str() {
            "VALUE" => params.value = Some(val.to_ascii_uppercase()),
            "TZID" => params.tzid = Some(val.to_string()),
            "X-OSAF-ANYTIME" => params.any_time = val.eq_ignore_ascii_case("TRUE"),
            "RELATED" => params.related = Some(val.to_ascii_uppercase()),
            other => warn!("Skipping unknown iCalendar parameter {}={}", other, val),
        }
    }
    Ok((params, value))
}

impl ICalDate {
    /// Parse `[;PARAMS]:value[,value...]`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (params, value_text) = split_params(text.trim())?;

        if let Some(tzid) = params.tzid.as_deref() {
            tzid.parse::<Tz>()
                .map_err(|_| format!("unknown timezone '{tzid}'"))?;
        }
        let kind = match params.value.as_deref() {
            Some("DATE") => Some(ValueKind::Date),
            Some("DATE-TIME") => Some(ValueKind::DateTime),
            Some(other) => return Err(format!("unsupported VALUE '{other}'")),
            None => None,
        };

        let values = value_text
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| match kind {
                Some(kind) => parse_value(v, kind, params.tzid.as_deref()),
                None => CalendarTime::parse_bare(v, params.tzid.as_deref()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if values.is_empty() {
            return Err(format!("no date value in '{text}'"));
        }
        Ok(Self {
            values,
            any_time: params.any_time,
        })
    }

    /// The first value. Single-valued fields such as `dtstart` use this.
    pub fn first(&self) -> Option<&CalendarTime> {
        self.values.first()
    }

    pub fn into_first(self) -> Option<CalendarTime> {
        self.values.into_iter().next()
    }
}

impl Display for ICalDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Some(first) = self.first() else {
            return Ok(());
        };
        if first.is_date() {
            f.write_str(";VALUE=DATE")?;
        } else {
            f.write_str(";VALUE=DATE-TIME")?;
        }
        if let Some(tzid) = first.tzid() {
            write!(f, ";TZID={tzid}")?;
        }
        if self.any_time {
            f.write_str(";X-OSAF-ANYTIME=TRUE")?;
        }
        let values: Vec<String> = self.values.iter().map(CalendarTime::to_ics_value).collect();
        write!(f, ":{}", values.join(","))
    }
}

/// Parse an iCalendar duration with an optional sign, e.g. `-PT15M`.
///
/// Returns `(negative, magnitude)`.
pub fn parse_signed_duration(text: &str) -> Result<(bool, Duration), String> {
    let text = text.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let duration = iso8601::duration(unsigned).map_err(|e| format!("invalid duration '{text}': {e}"))?;
    Ok((negative, duration.into()))
}

/// Parse an unsigned iCalendar duration.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    match parse_signed_duration(text)? {
        (false, duration) => Ok(duration),
        (true, _) => Err(format!("negative duration '{text}' not allowed")),
    }
}

/// Render a duration in iCalendar syntax, e.g. `P1DT2H` or `PT15M`.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "PT0S".to_string();
    }
    let mut out = String::from("P");
    if secs % 604_800 == 0 {
        out.push_str(&format!("{}W", secs / 604_800));
        return out;
    }
    let days = secs / 86_400;
    secs %= 86_400;
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if secs > 0 {
        out.push('T');
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            out.push_str(&format!("{h}H"));
        }
        if m > 0 {
            out.push_str(&format!("{m}M"));
        }
        if s > 0 {
            out.push_str(&format!("{s}S"));
        }
    }
    out
}

/// Which end of the event a relative trigger is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Related {
    #[default]
    Start,
    End,
}

/// When a display alarm fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Trigger {
    Relative {
        before: bool,
        offset: Duration,
        related: Related,
    },
    Absolute { at: DateTime<Utc> },
}

impl Trigger {
    /// Parse `-PT15M`, `;RELATED=END:PT5M` or `;VALUE=DATE-TIME:20070101T100000Z`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (params, value) = split_params(text.trim())?;
        match params.value.as_deref() {
            Some("DATE-TIME") => match parse_value(value, ValueKind::DateTime, None)? {
                CalendarTime::Utc { at } => Ok(Trigger::Absolute { at }),
                _ => Err(format!("absolute trigger '{value}' must be UTC")),
            },
            Some("DURATION") | None => {
                let (before, offset) = parse_signed_duration(value)?;
                let related = match params.related.as_deref() {
                    Some("END") => Related::End,
                    Some("START") | None => Related::Start,
                    Some(other) => return Err(format!("unsupported RELATED '{other}'")),
                };
                Ok(Trigger::Relative {
                    before,
                    offset,
                    related,
                })
            }
            Some(other) => Err(format!("unsupported trigger VALUE '{other}'")),
        }
    }

    pub fn absolute(&self) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Absolute { at } => Some(*at),
            Trigger::Relative { .. } => None,
        }
    }
}

impl Display for Trigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Absolute { at } => {
                write!(f, ";VALUE=DATE-TIME:{}", at.format("%Y%m%dT%H%M%SZ"))
            }
            Trigger::Relative {
                before,
                offset,
                related,
            } => {
                if *related == Related::End {
                    f.write_str(";RELATED=END:")?;
                }
                let sign = if *before { "-" } else { "" };
                write!(f, "{sign}{}", format_duration(*offset))
            }
        }
    }
}

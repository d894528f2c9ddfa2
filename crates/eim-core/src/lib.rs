//! eim-core: Record-based synchronization engine for EIM record sets.
//!
//! This crate provides the core functionality for:
//! - Modelling record sets, records and typed fields
//! - Validating raw field values against schema constraints
//! - Applying item, note, modifiedBy, event, task and displayAlarm records
//! - Dispatching a record set to the registered schema applicators
//! - Last-writer-wins resolution and modification linkage
//!
//! Everything here is synchronous and in-memory. Transport, persistence and
//! wall-clock reads belong to the caller.

pub mod apply;
pub mod calendar;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod ical;
pub mod item;
pub mod record;
pub mod validate;

pub use apply::{ApplyContext, Applicator, ChildEntry, ParentIndex, RecordSchema, UnknownFieldPolicy};
pub use calendar::{CalendarValidator, IcalendarValidator, ParsedCalendar};
pub use dispatch::{
    ApplicatorRegistry, ApplyReport, DispatchConfig, DispatchError, Dispatcher, FailurePolicy,
    RecordFailure, UnknownSchemaPolicy,
};
pub use error::{CalendarError, LinkageError, SchemaError, StructuralViolation, ValidationError};
pub use events::{ApplyEvent, EventBus, Subscription};
pub use ical::{CalendarTime, ICalDate, Related, Trigger};
pub use item::{DisplayAlarm, EventStamp, Item, ItemKind, Stamp, StampKind, TaskStamp, TriageStatus};
pub use record::{FieldKind, FieldValue, Record, RecordField, RecordSet, SchemaId};

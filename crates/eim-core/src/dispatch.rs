//! Applicator dispatch: routes the records of a record set to the
//! applicator registered for each record's schema, in record order.

use crate::apply::{
    ApplyContext, Applicator, DisplayAlarmSchema, EventSchema, ItemSchema, ModifiedBySchema,
    NoteSchema, TaskSchema,
};
use crate::calendar::{CalendarValidator, IcalendarValidator};
use crate::error::SchemaError;
use crate::events::{ApplyEvent, EventBus};
use crate::item::{Item, StampKind};
use crate::record::{Record, RecordSet, SchemaId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("record set for {found} cannot be applied to item {expected}")]
    UidMismatch { expected: String, found: String },

    #[error("record {index}: no applicator registered for {schema}")]
    UnknownSchema { index: usize, schema: SchemaId },

    #[error("record {index} ({schema}) failed: {source}")]
    Record {
        index: usize,
        schema: SchemaId,
        #[source]
        source: SchemaError,
    },
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// What to do with records whose schema has no registered applicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownSchemaPolicy {
    /// Log and skip the record.
    #[default]
    Skip,
    Reject,
}

/// What to do when a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed record.
    #[default]
    Stop,
    /// Record the failure and continue with the next record. Structural
    /// violations still stop dispatch.
    SkipRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchConfig {
    pub unknown_schema: UnknownSchemaPolicy,
    pub on_failure: FailurePolicy,
}

/// Table from schema to applicator.
#[derive(Default)]
pub struct ApplicatorRegistry {
    applicators: HashMap<SchemaId, Box<dyn Applicator>>,
}

impl ApplicatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in EIM schema.
    pub fn standard(validator: Arc<dyn CalendarValidator>) -> Self {
        let mut registry = Self::new();
        registry.register(ItemSchema::new());
        registry.register(NoteSchema::new());
        registry.register(ModifiedBySchema::new());
        registry.register(EventSchema::new(Arc::clone(&validator)));
        registry.register(TaskSchema::new());
        registry.register(DisplayAlarmSchema::new(validator));
        registry
    }

    /// Register an applicator, replacing any previous one for its schema.
    pub fn register(&mut self, applicator: impl Applicator + 'static) -> Option<Box<dyn Applicator>> {
        let schema = applicator.schema().clone();
        self.applicators.insert(schema, Box::new(applicator))
    }

    pub fn get(&self, schema: &SchemaId) -> Option<&dyn Applicator> {
        self.applicators.get(schema).map(|a| a.as_ref())
    }

    pub fn contains(&self, schema: &SchemaId) -> bool {
        self.applicators.contains_key(schema)
    }

    pub fn len(&self) -> usize {
        self.applicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applicators.is_empty()
    }
}

/// A record that failed under `FailurePolicy::SkipRecord`.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub index: usize,
    pub schema: SchemaId,
    pub error: SchemaError,
}

/// Summary of one record set application.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: Vec<SchemaId>,
    pub failed: Vec<RecordFailure>,
    pub stamps_created: Vec<StampKind>,
    pub deactivated: bool,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Dispatcher {
    registry: ApplicatorRegistry,
    config: DispatchConfig,
    events: Option<Arc<EventBus>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(
            ApplicatorRegistry::standard(Arc::new(IcalendarValidator)),
            DispatchConfig::default(),
        )
    }
}

impl Dispatcher {
    pub fn new(registry: ApplicatorRegistry, config: DispatchConfig) -> Self {
        Self {
            registry,
            config,
            events: None,
        }
    }

    /// Publish apply events to `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &ApplicatorRegistry {
        &self.registry
    }

    pub fn config(&self) -> DispatchConfig {
        self.config
    }

    fn emit(&self, event: impl FnOnce() -> ApplyEvent) {
        if let Some(bus) = &self.events {
            bus.emit_with(event);
        }
    }

    /// Apply one record, creating the applicator's stamp first if the item
    /// lacks it. A stamp created here is detached again if the record fails.
    ///
    /// Returns the kind of stamp created, if any.
    pub fn apply_record(
        &self,
        applicator: &dyn Applicator,
        record: &Record,
        item: &mut Item,
        ctx: &ApplyContext<'_>,
    ) -> std::result::Result<Option<StampKind>, SchemaError> {
        let mut created = None;
        if !record.deleted {
            if let Some(kind) = applicator.stamp_kind().filter(|kind| !item.has_stamp(*kind)) {
                if let Some(stamp) = applicator.create_stamp(item) {
                    debug!("Creating {} stamp on {}", kind, item.uid);
                    item.attach_stamp(stamp);
                    created = Some(kind);
                }
            }
        }

        match applicator.apply_record(record, item, ctx) {
            Ok(()) => Ok(created),
            Err(e) => {
                if let Some(kind) = created {
                    item.remove_stamp(kind);
                }
                Err(e)
            }
        }
    }

    /// Apply every record of `set` to `item`, in order.
    pub fn apply_record_set(
        &self,
        set: &RecordSet,
        item: &mut Item,
        ctx: &ApplyContext<'_>,
    ) -> Result<ApplyReport> {
        if set.uuid != item.uid {
            return Err(DispatchError::UidMismatch {
                expected: item.uid.clone(),
                found: set.uuid.clone(),
            });
        }

        let mut report = ApplyReport::default();
        if set.deleted {
            info!("Record set deletes item {}", item.uid);
            item.active = false;
            report.deactivated = true;
            self.emit(|| ApplyEvent::ItemDeactivated {
                item_uid: item.uid.clone(),
            });
            return Ok(report);
        }

        for (index, record) in set.records.iter().enumerate() {
            let schema = record.schema_id();
            let Some(applicator) = self.registry.get(&schema) else {
                match self.config.unknown_schema {
                    UnknownSchemaPolicy::Skip => {
                        warn!("Skipping record {} for unregistered schema {}", index, schema);
                        self.emit(|| ApplyEvent::RecordSkipped {
                            item_uid: item.uid.clone(),
                            schema: schema.clone(),
                        });
                        report.skipped.push(schema);
                        continue;
                    }
                    UnknownSchemaPolicy::Reject => {
                        return Err(DispatchError::UnknownSchema { index, schema });
                    }
                }
            };

            let was_linked = item.is_modification();
            match self.apply_record(applicator, record, item, ctx) {
                Ok(created) => {
                    report.applied += 1;
                    if let Some(stamp) = created {
                        report.stamps_created.push(stamp);
                        self.emit(|| ApplyEvent::StampCreated {
                            item_uid: item.uid.clone(),
                            stamp,
                        });
                    }
                    if let (false, Some(master)) = (was_linked, &item.modifies) {
                        self.emit(|| ApplyEvent::LinkEstablished {
                            item_uid: item.uid.clone(),
                            master: master.clone(),
                        });
                    }
                    self.emit(|| ApplyEvent::RecordApplied {
                        item_uid: item.uid.clone(),
                        schema,
                    });
                }
                Err(error) => {
                    warn!("Record {} ({}) failed on {}: {}", index, schema, item.uid, error);
                    self.emit(|| ApplyEvent::RecordFailed {
                        item_uid: item.uid.clone(),
                        schema: schema.clone(),
                        error: error.to_string(),
                    });
                    if self.config.on_failure == FailurePolicy::Stop || error.is_structural() {
                        return Err(DispatchError::Record {
                            index,
                            schema,
                            source: error,
                        });
                    }
                    report.failed.push(RecordFailure {
                        index,
                        schema,
                        error,
                    });
                }
            }
        }

        debug!(
            "Applied {} record(s) to {} ({} skipped, {} failed)",
            report.applied,
            item.uid,
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

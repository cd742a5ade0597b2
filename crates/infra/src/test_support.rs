//! Test fixtures: a tiny `Note` domain wired through the real pipeline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{
    AggregateId, AggregateRoot, AuditInfo, DomainEvent, DomainEvents, Failure, FieldError, Outcome,
};
use keystone_events::{InMemoryTelemetrySink, TelemetryEvent};

use crate::command_dispatcher::{DispatchResult, Dispatcher, RequestScope};
use crate::config::PipelineConfig;
use crate::counter::ConcurrentCommandCounter;
use crate::persistence::InMemoryDatabase;
use crate::registry::RegistryBuilder;
use crate::request::{Command, DomainEventHandler, Query, Request, RequestHandler, Validator};

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate + events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    id: AggregateId,
    text: String,
    echoes: u32,
    audit: AuditInfo,
    #[serde(skip)]
    events: DomainEvents,
}

impl Note {
    pub fn write(text: &str) -> Self {
        let now = Utc::now();
        let mut note = Self {
            id: AggregateId::new(),
            text: text.to_string(),
            echoes: 0,
            audit: AuditInfo::created(now),
            events: DomainEvents::default(),
        };
        note.events.raise(NoteWritten {
            note_id: note.id,
            text: text.to_string(),
            at: now,
        });
        note
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn echoes(&self) -> u32 {
        self.echoes
    }

    pub fn rename(&mut self, text: &str) {
        self.text = text.to_string();
    }

    pub fn echo(&mut self) {
        self.echoes += 1;
        self.events.raise(NoteEchoed {
            note_id: self.id,
            echoes: self.echoes,
            at: Utc::now(),
        });
    }
}

impl AggregateRoot for Note {
    type Id = AggregateId;

    const AGGREGATE_TYPE: &'static str = "note";

    fn id(&self) -> &AggregateId {
        &self.id
    }

    fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }

    fn domain_events(&self) -> &DomainEvents {
        &self.events
    }

    fn domain_events_mut(&mut self) -> &mut DomainEvents {
        &mut self.events
    }
}

#[derive(Debug, Clone)]
pub struct NoteWritten {
    pub note_id: AggregateId,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl DomainEvent for NoteWritten {
    fn event_type(&self) -> &'static str {
        "NoteWritten"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.at
    }
}

#[derive(Debug, Clone)]
pub struct NoteEchoed {
    pub note_id: AggregateId,
    pub echoes: u32,
    pub at: DateTime<Utc>,
}

impl DomainEvent for NoteEchoed {
    fn event_type(&self) -> &'static str {
        "NoteEchoed"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests + handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Writes a note. The text "reject" adds the note, then fails with a conflict.
pub struct WriteNote {
    pub text: String,
}

impl WriteNote {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Request for WriteNote {
    type Output = AggregateId;
}

impl Command for WriteNote {}

pub struct WriteNoteHandler;

#[async_trait]
impl RequestHandler<WriteNote> for WriteNoteHandler {
    async fn handle(&self, request: WriteNote, scope: &RequestScope) -> DispatchResult<AggregateId> {
        let note = Note::write(&request.text);
        let id = *note.id();
        scope.change_tracker().add(note)?;

        if request.text == "reject" {
            return Ok(Outcome::failure(Failure::conflict("note rejected")));
        }

        scope
            .telemetry()
            .collect_event(TelemetryEvent::new("NoteWritten").with_property("text", &request.text));
        Ok(Outcome::success(id))
    }
}

/// Dispatches itself `remaining` more times, reporting `(in_flight, queued)`
/// as seen by each level once its nested dispatch returned.
pub struct Nest {
    pub remaining: u32,
}

impl Request for Nest {
    type Output = Vec<(usize, usize)>;
}

impl Command for Nest {}

pub struct NestHandler;

#[async_trait]
impl RequestHandler<Nest> for NestHandler {
    async fn handle(&self, request: Nest, scope: &RequestScope) -> DispatchResult<Vec<(usize, usize)>> {
        scope.telemetry().collect_event(
            TelemetryEvent::new("Nest").with_property("remaining", request.remaining),
        );

        let mut report = Vec::new();
        if request.remaining > 0 {
            let nested = scope
                .dispatch(Nest {
                    remaining: request.remaining - 1,
                })
                .await?;
            match nested {
                Outcome::Success(inner) => report = inner,
                Outcome::Failure(failure) => return Ok(Outcome::failure(failure)),
            }
        }

        report.insert(0, (scope.counter().current(), scope.telemetry().len()));
        Ok(Outcome::success(report))
    }
}

/// Adds a note, queues telemetry, then fails fatally.
pub struct Explode;

impl Request for Explode {
    type Output = ();
}

impl Command for Explode {}

pub struct ExplodeHandler;

#[async_trait]
impl RequestHandler<Explode> for ExplodeHandler {
    async fn handle(&self, _request: Explode, scope: &RequestScope) -> DispatchResult<()> {
        let mut note = Note::write("doomed");
        note.domain_events_mut().clear();
        scope.change_tracker().add(note)?;
        scope
            .telemetry()
            .collect_event(TelemetryEvent::new("Exploding"));
        Err(anyhow::anyhow!("handler exploded").into())
    }
}

pub struct CountNotes;

impl Request for CountNotes {
    type Output = usize;
}

impl Query for CountNotes {}

pub struct CountNotesHandler;

#[async_trait]
impl RequestHandler<CountNotes> for CountNotesHandler {
    async fn handle(&self, _request: CountNotes, scope: &RequestScope) -> DispatchResult<usize> {
        let notes = scope.change_tracker().list::<Note>().await?;
        scope
            .telemetry()
            .collect_event(TelemetryEvent::new("NotesCounted").with_property("count", notes.len()));
        Ok(Outcome::success(notes.len()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validators
// ─────────────────────────────────────────────────────────────────────────────

pub struct NonEmptyText;

#[async_trait]
impl Validator<WriteNote> for NonEmptyText {
    async fn validate(&self, request: &WriteNote) -> Vec<FieldError> {
        if request.text.trim().is_empty() {
            vec![FieldError::new("text", "must not be empty")]
        } else {
            vec![]
        }
    }
}

/// Records how many dispatches of the scope in `counter` are in flight
/// while validation runs. Never reports an error.
#[derive(Clone, Default)]
pub struct InFlightDuringValidation {
    pub counter: Arc<Mutex<Option<ConcurrentCommandCounter>>>,
    pub seen: Arc<Mutex<Vec<usize>>>,
}

impl InFlightDuringValidation {
    pub fn watch(&self, counter: &ConcurrentCommandCounter) {
        *self.counter.lock().unwrap() = Some(counter.clone());
    }

    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Validator<WriteNote> for InFlightDuringValidation {
    async fn validate(&self, _request: &WriteNote) -> Vec<FieldError> {
        if let Some(counter) = self.counter.lock().unwrap().as_ref() {
            self.seen.lock().unwrap().push(counter.current());
        }
        vec![]
    }
}

pub struct MaxLength(pub usize);

#[async_trait]
impl Validator<WriteNote> for MaxLength {
    async fn validate(&self, request: &WriteNote) -> Vec<FieldError> {
        if request.text.len() > self.0 {
            vec![FieldError::new("text", format!("must be at most {} characters", self.0))]
        } else {
            vec![]
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscribers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Records every event it sees as `label:kind:detail`.
#[derive(Clone)]
pub struct Recorder {
    pub label: &'static str,
    pub log: Log,
}

#[async_trait]
impl DomainEventHandler<NoteWritten> for Recorder {
    async fn handle(&self, event: &NoteWritten, _scope: &RequestScope) -> anyhow::Result<()> {
        self.log
            .push(format!("{}:written:{}", self.label, event.text));
        Ok(())
    }
}

#[async_trait]
impl DomainEventHandler<NoteEchoed> for Recorder {
    async fn handle(&self, event: &NoteEchoed, _scope: &RequestScope) -> anyhow::Result<()> {
        self.log
            .push(format!("{}:echoed:{}", self.label, event.echoes));
        Ok(())
    }
}

/// Echoes a note once when it is written.
pub struct EchoOnWrite;

#[async_trait]
impl DomainEventHandler<NoteWritten> for EchoOnWrite {
    async fn handle(&self, event: &NoteWritten, scope: &RequestScope) -> anyhow::Result<()> {
        scope
            .change_tracker()
            .modify::<Note, _, _>(&event.note_id, Note::echo)
            .await?;
        Ok(())
    }
}

/// Echoes a note every time it is echoed: a cascade that never settles.
pub struct EchoForever;

#[async_trait]
impl DomainEventHandler<NoteEchoed> for EchoForever {
    async fn handle(&self, event: &NoteEchoed, scope: &RequestScope) -> anyhow::Result<()> {
        scope
            .change_tracker()
            .modify::<Note, _, _>(&event.note_id, Note::echo)
            .await?;
        Ok(())
    }
}

/// Echoes a note again until it has been echoed `times` times.
pub struct EchoUntil {
    pub times: u32,
}

#[async_trait]
impl DomainEventHandler<NoteEchoed> for EchoUntil {
    async fn handle(&self, event: &NoteEchoed, scope: &RequestScope) -> anyhow::Result<()> {
        if event.echoes < self.times {
            scope
                .change_tracker()
                .modify::<Note, _, _>(&event.note_id, Note::echo)
                .await?;
        }
        Ok(())
    }
}

/// Takes `delay` to handle every written note.
pub struct SlowOnWrite {
    pub delay: std::time::Duration,
}

#[async_trait]
impl DomainEventHandler<NoteWritten> for SlowOnWrite {
    async fn handle(&self, _event: &NoteWritten, _scope: &RequestScope) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

pub struct FailOnWrite;

#[async_trait]
impl DomainEventHandler<NoteWritten> for FailOnWrite {
    async fn handle(&self, _event: &NoteWritten, _scope: &RequestScope) -> anyhow::Result<()> {
        anyhow::bail!("subscriber exploded")
    }
}

pub struct CancelOnWrite;

#[async_trait]
impl DomainEventHandler<NoteWritten> for CancelOnWrite {
    async fn handle(&self, _event: &NoteWritten, scope: &RequestScope) -> anyhow::Result<()> {
        scope.cancellation().cancel();
        Ok(())
    }
}

/// When a note with text `when` is written, writes a note with text `then`
/// through a nested dispatch. A failure outcome of the nested dispatch is
/// ignored.
pub struct FollowUp {
    pub when: &'static str,
    pub then: &'static str,
}

#[async_trait]
impl DomainEventHandler<NoteWritten> for FollowUp {
    async fn handle(&self, event: &NoteWritten, scope: &RequestScope) -> anyhow::Result<()> {
        if event.text == self.when {
            scope.dispatch(WriteNote::new(self.then)).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub database: Arc<InMemoryDatabase>,
    pub sink: Arc<InMemoryTelemetrySink>,
}

/// Every note handler, no validators, no subscribers.
pub fn note_handlers() -> RegistryBuilder {
    RegistryBuilder::new()
        .command::<WriteNote, _>(WriteNoteHandler)
        .command::<Nest, _>(NestHandler)
        .command::<Explode, _>(ExplodeHandler)
        .query::<CountNotes, _>(CountNotesHandler)
}

pub fn harness(builder: RegistryBuilder) -> Harness {
    harness_with(builder, PipelineConfig::default())
}

pub fn harness_with(builder: RegistryBuilder, config: PipelineConfig) -> Harness {
    let database = Arc::new(InMemoryDatabase::new());
    let sink = Arc::new(InMemoryTelemetrySink::new());
    let dispatcher = Dispatcher::with_config(
        builder.build().unwrap(),
        database.clone(),
        sink.clone(),
        config,
    );
    Harness {
        dispatcher,
        database,
        sink,
    }
}

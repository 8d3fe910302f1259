mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::{slots_of, Slot};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use crate::journal::Journal;
use crate::model::*;
use crate::notify::{SnapshotHub, Subscription};

use store::DocumentSet;

/// The document-store contract the booking core writes through.
///
/// Every call is one atomic write to one document. There are no multi-document
/// transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whole-document write keyed by `reservation.id`.
    async fn set_reservation(&self, reservation: Reservation) -> Result<(), EngineError>;

    /// Status transition to cancelled, stamping who and when. Returns the updated document.
    async fn cancel_reservation(&self, id: &str, cancelled_by: &str, at: Ms) -> Result<Reservation, EngineError>;

    /// Physical removal. Admin tooling only.
    async fn delete_reservation(&self, id: &str) -> Result<(), EngineError>;

    fn reservation(&self, id: &str) -> Option<Reservation>;

    fn subscribe_reservations(&self) -> Subscription<Vec<Reservation>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Claim (date, table) and (date, terrain) keys atomically with each
    /// reservation write so a racing second writer is rejected.
    pub claim_slots: bool,
}

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends.
/// Blocks for the first append, drains whatever else is already queued, then
/// syncs once for the whole batch and answers every sender with the result.
/// A failed batch is rolled back in full, so no sender's event is applied.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_control(&mut journal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = std::time::Instant::now();
        let result = journal.append_batch(batch.iter().map(|(event, _)| event));
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        for (_, tx) in batch {
            let reply = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(reply);
        }

        if let Some(cmd) = deferred {
            handle_control(&mut journal, cmd);
        }
    }
    debug!("journal writer stopped");
}

fn handle_control(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = journal.rewrite(&events);
            if result.is_ok() {
                info!("compacted journal {} to {} events", journal.path().display(), events.len());
            }
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { response, .. } => {
            let _ = response.send(Err(io::Error::other("append routed to control path")));
        }
    }
}

/// Journaled document store with live full-snapshot subscriptions.
pub struct Engine {
    pub(super) docs: DocumentSet,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub hub: Arc<SnapshotHub>,
    /// Serializes check → journal → apply → publish so each write is atomic and
    /// snapshots go out in commit order.
    pub(super) write_gate: Mutex<()>,
}

impl Engine {
    pub fn open(journal_path: PathBuf, options: EngineOptions) -> io::Result<Self> {
        let (journal, events) = Journal::recover(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            docs: DocumentSet::new(options.claim_slots),
            journal_tx,
            hub: Arc::new(SnapshotHub::new()),
            write_gate: Mutex::new(()),
        };
        for event in &events {
            engine.docs.apply_event(event);
        }
        for collection in [
            Collection::Reservations,
            Collection::Tables,
            Collection::Terrain,
            Collection::Schedule,
            Collection::GameSystems,
        ] {
            engine.publish(collection);
        }

        info!(
            "opened store {} ({} events replayed, slot claims {})",
            journal_path.display(),
            events.len(),
            if options.claim_slots { "on" } else { "off" }
        );
        Ok(engine)
    }

    /// Write event to the journal via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    /// Journal, apply, publish. Caller holds the write gate.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        self.docs.apply_event(event);
        self.publish(event.collection());
        Ok(())
    }

    fn publish(&self, collection: Collection) {
        match collection {
            Collection::Reservations => self.hub.publish_reservations(self.docs.reservations_snapshot()),
            Collection::Tables => self.hub.publish_tables(self.docs.tables_snapshot()),
            Collection::Terrain => self.hub.publish_terrain(self.docs.terrain_snapshot()),
            Collection::Schedule => self.hub.publish_schedule(self.docs.schedule()),
            Collection::GameSystems => self.hub.publish_game_systems(self.docs.game_systems_snapshot()),
        }
        debug!("published {} snapshot", collection.label());
    }
}

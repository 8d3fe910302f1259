use std::sync::Arc;

use tokio::sync::watch;

use crate::model::*;

/// Live view of one collection. Every delivery is the full collection, never a diff.
/// Dropping the subscription unsubscribes.
pub struct Subscription<T> {
    rx: watch::Receiver<Arc<T>>,
}

impl<T> Subscription<T> {
    /// Latest snapshot, without waiting.
    pub fn current(&self) -> Arc<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Arc<T>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Snapshot hub: one watch channel per collection. Lagging subscribers skip
/// straight to the newest snapshot.
pub struct SnapshotHub {
    reservations: watch::Sender<Arc<Vec<Reservation>>>,
    tables: watch::Sender<Arc<Vec<Table>>>,
    terrain: watch::Sender<Arc<Vec<TerrainBox>>>,
    schedule: watch::Sender<Arc<ScheduleExceptions>>,
    game_systems: watch::Sender<Arc<Vec<GameSystem>>>,
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self {
            reservations: watch::Sender::new(Arc::default()),
            tables: watch::Sender::new(Arc::default()),
            terrain: watch::Sender::new(Arc::default()),
            schedule: watch::Sender::new(Arc::default()),
            game_systems: watch::Sender::new(Arc::default()),
        }
    }

    pub fn subscribe_reservations(&self) -> Subscription<Vec<Reservation>> {
        Subscription { rx: self.reservations.subscribe() }
    }

    pub fn subscribe_tables(&self) -> Subscription<Vec<Table>> {
        Subscription { rx: self.tables.subscribe() }
    }

    pub fn subscribe_terrain(&self) -> Subscription<Vec<TerrainBox>> {
        Subscription { rx: self.terrain.subscribe() }
    }

    pub fn subscribe_schedule(&self) -> Subscription<ScheduleExceptions> {
        Subscription { rx: self.schedule.subscribe() }
    }

    pub fn subscribe_game_systems(&self) -> Subscription<Vec<GameSystem>> {
        Subscription { rx: self.game_systems.subscribe() }
    }

    // send_replace stores the value even with no receivers, so late
    // subscribers still start from the newest snapshot.

    pub fn publish_reservations(&self, snapshot: Vec<Reservation>) {
        self.reservations.send_replace(Arc::new(snapshot));
        metrics::counter!(crate::observability::SNAPSHOTS_PUBLISHED_TOTAL, "collection" => "reservations").increment(1);
    }

    pub fn publish_tables(&self, snapshot: Vec<Table>) {
        self.tables.send_replace(Arc::new(snapshot));
        metrics::counter!(crate::observability::SNAPSHOTS_PUBLISHED_TOTAL, "collection" => "tables").increment(1);
    }

    pub fn publish_terrain(&self, snapshot: Vec<TerrainBox>) {
        self.terrain.send_replace(Arc::new(snapshot));
        metrics::counter!(crate::observability::SNAPSHOTS_PUBLISHED_TOTAL, "collection" => "terrain").increment(1);
    }

    pub fn publish_schedule(&self, snapshot: ScheduleExceptions) {
        self.schedule.send_replace(Arc::new(snapshot));
        metrics::counter!(crate::observability::SNAPSHOTS_PUBLISHED_TOTAL, "collection" => "schedule").increment(1);
    }

    pub fn publish_game_systems(&self, snapshot: Vec<GameSystem>) {
        self.game_systems.send_replace(Arc::new(snapshot));
        metrics::counter!(crate::observability::SNAPSHOTS_PUBLISHED_TOTAL, "collection" => "game_systems").increment(1);
    }
}

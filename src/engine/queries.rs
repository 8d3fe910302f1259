use crate::model::*;
use crate::notify::Subscription;

use super::store::Slot;
use super::Engine;

impl Engine {
    /// Reservations matching `filter`, in date then creation order. Includes
    /// cancelled history unless the filter excludes it.
    pub fn reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        self.docs
            .reservations_snapshot()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect()
    }

    /// Active reservations on one date.
    pub fn active_reservations_on(&self, date: Day) -> Vec<Reservation> {
        self.reservations(&ReservationFilter {
            status: Some(ReservationStatus::Active),
            from: Some(date),
            to: Some(date),
        })
    }

    pub fn tables(&self) -> Vec<Table> {
        self.docs.tables_snapshot()
    }

    pub fn table(&self, id: &str) -> Option<Table> {
        self.docs.table(id)
    }

    pub fn terrain(&self) -> Vec<TerrainBox> {
        self.docs.terrain_snapshot()
    }

    pub fn terrain_box(&self, id: &str) -> Option<TerrainBox> {
        self.docs.terrain_box(id)
    }

    pub fn schedule(&self) -> ScheduleExceptions {
        self.docs.schedule()
    }

    pub fn game_systems(&self) -> Vec<GameSystem> {
        self.docs.game_systems_snapshot()
    }

    pub fn game_system(&self, id: &str) -> Option<GameSystem> {
        self.docs.game_system(id)
    }

    /// Inventory is empty until seeded or created by an admin.
    pub fn has_inventory(&self) -> bool {
        self.docs.table_count() > 0 || self.docs.terrain_count() > 0
    }

    /// Reservation id currently claiming `slot`. Always `None` without slot claims.
    pub fn slot_holder(&self, slot: &Slot) -> Option<String> {
        self.docs.slot_holder(slot)
    }

    pub fn subscribe_tables(&self) -> Subscription<Vec<Table>> {
        self.hub.subscribe_tables()
    }

    pub fn subscribe_terrain(&self) -> Subscription<Vec<TerrainBox>> {
        self.hub.subscribe_terrain()
    }

    pub fn subscribe_schedule(&self) -> Subscription<ScheduleExceptions> {
        self.hub.subscribe_schedule()
    }

    pub fn subscribe_game_systems(&self) -> Subscription<Vec<GameSystem>> {
        self.hub.subscribe_game_systems()
    }
}

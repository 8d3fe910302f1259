use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

use crate::model::*;

use super::EngineError;

/// A uniquely bookable thing on one date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Table { date: Day, table_id: String },
    Terrain { date: Day, terrain_id: String },
}

impl Slot {
    pub fn kind(&self) -> &'static str {
        match self {
            Slot::Table { .. } => "table",
            Slot::Terrain { .. } => "terrain",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Table { date, table_id } => write!(f, "table {table_id} on {date}"),
            Slot::Terrain { date, terrain_id } => write!(f, "terrain {terrain_id} on {date}"),
        }
    }
}

/// Slots an active reservation occupies. Cancelled reservations occupy none.
pub fn slots_of(reservation: &Reservation) -> Vec<Slot> {
    if !reservation.is_active() {
        return Vec::new();
    }
    let mut slots = vec![Slot::Table {
        date: reservation.date,
        table_id: reservation.table_id.clone(),
    }];
    if let Some(terrain_id) = &reservation.terrain_id {
        slots.push(Slot::Terrain {
            date: reservation.date,
            terrain_id: terrain_id.clone(),
        });
    }
    slots
}

/// Split "L13" into ("L", 13, "") so L2 sorts before L10.
fn natural_key(id: &str) -> (&str, u64, &str) {
    let digits_at = id.find(|c: char| c.is_ascii_digit()).unwrap_or(id.len());
    let (prefix, rest) = id.split_at(digits_at);
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (digits, suffix) = rest.split_at(digits_end);
    (prefix, digits.parse().unwrap_or(0), suffix)
}

/// In-memory documents for every collection, plus the optional slot-claim index.
pub struct DocumentSet {
    reservations: DashMap<String, Reservation>,
    tables: DashMap<String, Table>,
    terrain: DashMap<String, TerrainBox>,
    schedule: Mutex<ScheduleExceptions>,
    game_systems: DashMap<String, GameSystem>,
    /// Slot → id of the active reservation holding it. Only maintained when claiming.
    slots: DashMap<Slot, String>,
    claim_slots: bool,
}

impl DocumentSet {
    pub fn new(claim_slots: bool) -> Self {
        Self {
            reservations: DashMap::new(),
            tables: DashMap::new(),
            terrain: DashMap::new(),
            schedule: Mutex::new(ScheduleExceptions::default()),
            game_systems: DashMap::new(),
            slots: DashMap::new(),
            claim_slots,
        }
    }

    pub fn claims_slots(&self) -> bool {
        self.claim_slots
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn reservation(&self, id: &str) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    pub fn table(&self, id: &str) -> Option<Table> {
        self.tables.get(id).map(|e| e.value().clone())
    }

    pub fn terrain_box(&self, id: &str) -> Option<TerrainBox> {
        self.terrain.get(id).map(|e| e.value().clone())
    }

    pub fn schedule(&self) -> ScheduleExceptions {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn game_system(&self, id: &str) -> Option<GameSystem> {
        self.game_systems.get(id).map(|e| e.value().clone())
    }

    pub fn game_system_count(&self) -> usize {
        self.game_systems.len()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn terrain_count(&self) -> usize {
        self.terrain.len()
    }

    pub fn slot_holder(&self, slot: &Slot) -> Option<String> {
        self.slots.get(slot).map(|e| e.value().clone())
    }

    // ── Snapshots ────────────────────────────────────────────

    /// All reservations, ordered by date, then creation time, then id.
    pub fn reservations_snapshot(&self) -> Vec<Reservation> {
        let mut all: Vec<Reservation> = self.reservations.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    pub fn tables_snapshot(&self) -> Vec<Table> {
        let mut all: Vec<Table> = self.tables.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| natural_key(&a.id).cmp(&natural_key(&b.id)));
        all
    }

    pub fn terrain_snapshot(&self) -> Vec<TerrainBox> {
        let mut all: Vec<TerrainBox> = self.terrain.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| natural_key(&a.id).cmp(&natural_key(&b.id)));
        all
    }

    /// Catalogue in case-insensitive name order.
    pub fn game_systems_snapshot(&self) -> Vec<GameSystem> {
        let mut all: Vec<GameSystem> = self.game_systems.iter().map(|e| e.value().clone()).collect();
        all.sort_by_cached_key(|g| (g.name.to_lowercase(), g.id.clone()));
        all
    }

    /// Minimal event list that rebuilds the current state.
    pub fn to_events(&self) -> Vec<Event> {
        let mut events = vec![Event::ScheduleWritten { schedule: self.schedule() }];
        events.extend(self.tables_snapshot().into_iter().map(|table| Event::TableWritten { table }));
        events.extend(self.terrain_snapshot().into_iter().map(|terrain| Event::TerrainWritten { terrain }));
        events.extend(
            self.game_systems_snapshot()
                .into_iter()
                .map(|system| Event::GameSystemWritten { system }),
        );
        events.extend(
            self.reservations_snapshot()
                .into_iter()
                .map(|reservation| Event::ReservationWritten { reservation }),
        );
        events
    }

    // ── Slot claims ──────────────────────────────────────────

    /// Fail if any slot `reservation` needs is held by a different reservation.
    /// Caller must hold the engine's write gate until the write is applied.
    pub fn check_slots(&self, reservation: &Reservation) -> Result<(), EngineError> {
        for slot in slots_of(reservation) {
            if let Some(holder) = self.slots.get(&slot)
                && holder.value() != &reservation.id
            {
                return Err(EngineError::SlotTaken {
                    holder_id: holder.value().clone(),
                    slot,
                });
            }
        }
        Ok(())
    }

    fn release_slots(&self, reservation: &Reservation) {
        for slot in slots_of(reservation) {
            self.slots.remove_if(&slot, |_, holder| holder == &reservation.id);
        }
    }

    fn claim(&self, reservation: &Reservation) {
        for slot in slots_of(reservation) {
            // First claimant keeps the slot; replayed collisions from weak mode stay visible
            // in the reservation list.
            self.slots.entry(slot).or_insert_with(|| reservation.id.clone());
        }
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::ReservationWritten { reservation } => {
                let previous = self.reservations.insert(reservation.id.clone(), reservation.clone());
                if self.claim_slots {
                    if let Some(prev) = previous {
                        self.release_slots(&prev);
                    }
                    self.claim(reservation);
                }
            }
            Event::ReservationDeleted { id } => {
                if let Some((_, prev)) = self.reservations.remove(id)
                    && self.claim_slots
                {
                    self.release_slots(&prev);
                }
            }
            Event::TableWritten { table } => {
                self.tables.insert(table.id.clone(), table.clone());
            }
            Event::TableDeleted { id } => {
                self.tables.remove(id);
            }
            Event::TerrainWritten { terrain } => {
                self.terrain.insert(terrain.id.clone(), terrain.clone());
            }
            Event::TerrainDeleted { id } => {
                self.terrain.remove(id);
            }
            Event::ScheduleWritten { schedule } => {
                *self.schedule.lock().unwrap_or_else(PoisonError::into_inner) = schedule.clone();
            }
            Event::GameSystemWritten { system } => {
                self.game_systems.insert(system.id.clone(), system.clone());
            }
            Event::GameSystemDeleted { id } => {
                self.game_systems.remove(id);
            }
        }
    }
}

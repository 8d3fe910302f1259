use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{DocumentStore, EngineError, Slot};
use crate::limits::*;
use crate::model::*;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum BookingError {
    /// The club is closed on this date.
    DateClosed(Day),
    DateNotBookable(Day),
    MembershipInactive,
    MissingField(&'static str),
    LimitExceeded(&'static str),
    UnknownTable(String),
    UnknownTerrain(String),
    TerrainDisabled(String),
    TableTaken { table_id: String, holder: String },
    TerrainTaken { terrain_id: String, holder: String },
    /// The table carries the standing allocation on bookable dates.
    PermanentAllocation(String),
    NotPermitted,
    NotFound(String),
    AlreadyCancelled(String),
    /// Commit only writes active reservations.
    InvalidStatus(ReservationStatus),
    /// Slot-claim mode: another writer got the slot first.
    RaceLost { slot: Slot, holder_id: String },
    /// The store rejected the write. Safe to retry.
    WriteFailed(EngineError),
}

impl BookingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::WriteFailed(_))
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::DateClosed(d) => {
                write!(f, "the club is closed on {d}; bookings are not allowed")
            }
            BookingError::DateNotBookable(d) => write!(f, "{d} is not open for booking"),
            BookingError::MembershipInactive => {
                write!(f, "membership is not active; please contact an admin")
            }
            BookingError::MissingField(field) => write!(f, "missing required field: {field}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::UnknownTable(id) => write!(f, "no such table: {id}"),
            BookingError::UnknownTerrain(id) => write!(f, "no such terrain box: {id}"),
            BookingError::TerrainDisabled(id) => write!(f, "terrain box {id} is not available for booking"),
            BookingError::TableTaken { table_id, holder } => {
                write!(f, "table {table_id} is already booked by {holder}")
            }
            BookingError::TerrainTaken { terrain_id, holder } => {
                write!(f, "terrain box {terrain_id} is already booked by {holder}")
            }
            BookingError::PermanentAllocation(id) => {
                write!(f, "table {id} is permanently allocated")
            }
            BookingError::NotPermitted => write!(f, "not permitted"),
            BookingError::NotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::AlreadyCancelled(id) => write!(f, "reservation {id} is already cancelled"),
            BookingError::InvalidStatus(status) => {
                write!(f, "commit cannot write status {status:?}; use cancel")
            }
            BookingError::RaceLost { slot, holder_id } => {
                write!(f, "{slot} was taken by reservation {holder_id} first")
            }
            BookingError::WriteFailed(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for BookingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BookingError::WriteFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for BookingError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::SlotTaken { slot, holder_id } => BookingError::RaceLost { slot, holder_id },
            EngineError::NotFound(id) => BookingError::NotFound(id),
            EngineError::AlreadyCancelled(id) => BookingError::AlreadyCancelled(id),
            EngineError::Reserved(id) => BookingError::PermanentAllocation(id),
            other => BookingError::WriteFailed(other),
        }
    }
}

// ── Availability ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub reservation_id: String,
    pub name: String,
}

/// A second active reservation on a slot that already had a holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub slot: Slot,
    pub kept: String,
    pub extra: String,
}

/// Who holds which table and terrain box on one date. For display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateAvailability {
    pub date: Day,
    tables: HashMap<String, Holder>,
    terrain: HashMap<String, Holder>,
    collisions: Vec<Collision>,
}

impl DateAvailability {
    pub fn table_holder(&self, table_id: &str) -> Option<&str> {
        self.tables.get(table_id).map(|h| h.name.as_str())
    }

    pub fn terrain_holder(&self, terrain_id: &str) -> Option<&str> {
        self.terrain.get(terrain_id).map(|h| h.name.as_str())
    }

    pub fn table(&self, table_id: &str) -> Option<&Holder> {
        self.tables.get(table_id)
    }

    pub fn terrain(&self, terrain_id: &str) -> Option<&Holder> {
        self.terrain.get(terrain_id)
    }

    pub fn is_table_free(&self, table_id: &str) -> bool {
        !self.tables.contains_key(table_id)
    }

    pub fn is_terrain_free(&self, terrain_id: &str) -> bool {
        !self.terrain.contains_key(terrain_id)
    }

    /// Double bookings visible in the snapshot. They need an admin to resolve.
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }
}

/// Partition the active reservations on `date` into table and terrain holders,
/// skipping `excluding_id` (the reservation being edited).
///
/// Input order decides who is shown when two reservations collide: the first
/// one seen keeps the slot and the other is reported in `collisions`.
pub fn availability<'a>(
    date: Day,
    reservations: impl IntoIterator<Item = &'a Reservation>,
    excluding_id: Option<&str>,
) -> DateAvailability {
    let mut out = DateAvailability {
        date,
        tables: HashMap::new(),
        terrain: HashMap::new(),
        collisions: Vec::new(),
    };

    for r in reservations {
        if r.date != date || !r.is_active() || excluding_id == Some(r.id.as_str()) {
            continue;
        }
        let holder = Holder {
            reservation_id: r.id.clone(),
            name: r.member_name.clone(),
        };
        if let Some(kept) = out.tables.get(&r.table_id) {
            out.collisions.push(Collision {
                slot: Slot::Table { date, table_id: r.table_id.clone() },
                kept: kept.reservation_id.clone(),
                extra: r.id.clone(),
            });
        } else {
            out.tables.insert(r.table_id.clone(), holder.clone());
        }
        if let Some(terrain_id) = &r.terrain_id {
            if let Some(kept) = out.terrain.get(terrain_id) {
                out.collisions.push(Collision {
                    slot: Slot::Terrain { date, terrain_id: terrain_id.clone() },
                    kept: kept.reservation_id.clone(),
                    extra: r.id.clone(),
                });
            } else {
                out.terrain.insert(terrain_id.clone(), holder);
            }
        }
    }

    out
}

// ── Validation ───────────────────────────────────────────────────

/// Pre-write checks. Conflicts are not checked here; that happens as close to
/// the write as possible.
pub fn validate(
    candidate: &ReservationDraft,
    cancelled_dates: &BTreeSet<Day>,
    requester_is_member: bool,
) -> Result<(), BookingError> {
    if cancelled_dates.contains(&candidate.date) {
        return Err(BookingError::DateClosed(candidate.date));
    }
    if !requester_is_member {
        return Err(BookingError::MembershipInactive);
    }
    if candidate.table_id.as_deref().is_none_or(|t| t.trim().is_empty()) {
        return Err(BookingError::MissingField("table"));
    }
    if candidate.game_system.trim().is_empty() {
        return Err(BookingError::MissingField("game system"));
    }
    if candidate.game_system.len() > MAX_GAME_LABEL_LEN {
        return Err(BookingError::LimitExceeded("game system label too long"));
    }
    if !(MIN_PLAYER_COUNT..=MAX_PLAYER_COUNT).contains(&candidate.player_count) {
        return Err(BookingError::LimitExceeded("player count out of range"));
    }
    Ok(())
}

// ── Writes ───────────────────────────────────────────────────────

fn record_write(op: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(crate::observability::RESERVATION_WRITES_TOTAL, "op" => op, "status" => status).increment(1);
}

/// Turn a draft into a stored reservation with a single keyed write.
///
/// Creation gets a fresh id; an edit keeps its id and creation time and
/// overwrites the rest of the document.
/// Without slot claims the store does not compare against other reservations,
/// so two racing writers for the same table both succeed.
pub async fn commit<S>(store: &S, candidate: ReservationDraft) -> Result<Reservation, BookingError>
where
    S: DocumentStore + ?Sized,
{
    if let Some(status) = candidate.status
        && status != ReservationStatus::Active
    {
        return Err(BookingError::InvalidStatus(status));
    }
    let table_id = candidate
        .table_id
        .filter(|t| !t.trim().is_empty())
        .ok_or(BookingError::MissingField("table"))?;
    let id = match candidate.id {
        Some(id) if is_permanent_id(&id) => return Err(BookingError::PermanentAllocation(table_id)),
        Some(id) => id,
        None => Ulid::new().to_string(),
    };
    let created_at = store.reservation(&id).map_or_else(now_ms, |existing| existing.created_at);

    let reservation = Reservation {
        id,
        date: candidate.date,
        table_id,
        terrain_id: candidate.terrain_id.filter(|t| !t.trim().is_empty()),
        member_id: candidate.member_id,
        member_name: candidate.member_name,
        game_system: candidate.game_system.trim().to_string(),
        player_count: candidate.player_count,
        created_at,
        status: ReservationStatus::Active,
        cancelled_at: None,
        cancelled_by: None,
    };

    let result = store.set_reservation(reservation.clone()).await;
    record_write("commit", result.is_ok());
    match result {
        Ok(()) => {
            debug!("committed reservation {} for {}", reservation.id, reservation.date);
            Ok(reservation)
        }
        Err(e) => {
            warn!("commit of reservation {} failed: {e}", reservation.id);
            Err(e.into())
        }
    }
}

/// Mark a reservation cancelled. The record stays for history.
pub async fn cancel<S>(store: &S, id: &str, canceller_id: &str) -> Result<Reservation, BookingError>
where
    S: DocumentStore + ?Sized,
{
    if is_permanent_id(id) {
        return Err(BookingError::PermanentAllocation(id.to_string()));
    }
    let result = store.cancel_reservation(id, canceller_id, now_ms()).await;
    record_write("cancel", result.is_ok());
    result.map_err(|e| {
        warn!("cancel of reservation {id} failed: {e}");
        e.into()
    })
}

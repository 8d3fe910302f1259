use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::notify::Subscription;

use super::{DocumentStore, Engine, EngineError, JournalCommand};

fn check_id(id: &str) -> Result<(), EngineError> {
    if id.is_empty() {
        return Err(EngineError::LimitExceeded("empty id"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for Engine {
    async fn set_reservation(&self, reservation: Reservation) -> Result<(), EngineError> {
        check_id(&reservation.id)?;
        if is_permanent_id(&reservation.id) {
            return Err(EngineError::Reserved(reservation.id));
        }
        check_name(&reservation.member_name)?;

        let _gate = self.write_gate.lock().await;
        if let Some(existing) = self.docs.reservation(&reservation.id)
            && !existing.is_active()
        {
            return Err(EngineError::AlreadyCancelled(reservation.id));
        }
        if self.docs.claims_slots() {
            self.docs.check_slots(&reservation)?;
        }

        debug!(
            "set reservation {} ({} table {})",
            reservation.id, reservation.date, reservation.table_id
        );
        self.persist_and_apply(&Event::ReservationWritten { reservation }).await
    }

    async fn cancel_reservation(&self, id: &str, cancelled_by: &str, at: Ms) -> Result<Reservation, EngineError> {
        if is_permanent_id(id) {
            return Err(EngineError::Reserved(id.to_string()));
        }
        let _gate = self.write_gate.lock().await;
        let mut reservation = self
            .docs
            .reservation(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if !reservation.is_active() {
            return Err(EngineError::AlreadyCancelled(id.to_string()));
        }

        reservation.status = ReservationStatus::Cancelled;
        reservation.cancelled_at = Some(at);
        reservation.cancelled_by = Some(cancelled_by.to_string());
        self.persist_and_apply(&Event::ReservationWritten {
            reservation: reservation.clone(),
        })
        .await?;
        debug!("cancelled reservation {id} by {cancelled_by}");
        Ok(reservation)
    }

    async fn delete_reservation(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if self.docs.reservation(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.persist_and_apply(&Event::ReservationDeleted { id: id.to_string() }).await?;
        info!("hard-deleted reservation {id}");
        Ok(())
    }

    fn reservation(&self, id: &str) -> Option<Reservation> {
        self.docs.reservation(id)
    }

    fn subscribe_reservations(&self) -> Subscription<Vec<Reservation>> {
        self.hub.subscribe_reservations()
    }
}

impl Engine {
    // ── Inventory ────────────────────────────────────────────

    pub async fn put_table(&self, table: Table) -> Result<(), EngineError> {
        check_id(&table.id)?;
        check_name(&table.name)?;
        let _gate = self.write_gate.lock().await;
        if self.docs.table(&table.id).is_none() && self.docs.table_count() >= MAX_TABLES {
            return Err(EngineError::LimitExceeded("too many tables"));
        }
        self.persist_and_apply(&Event::TableWritten { table }).await
    }

    /// Reservations referencing the table are left alone.
    pub async fn delete_table(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if self.docs.table(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.persist_and_apply(&Event::TableDeleted { id: id.to_string() }).await
    }

    pub async fn put_terrain(&self, terrain: TerrainBox) -> Result<(), EngineError> {
        check_id(&terrain.id)?;
        check_name(&terrain.name)?;
        let _gate = self.write_gate.lock().await;
        if self.docs.terrain_box(&terrain.id).is_none() && self.docs.terrain_count() >= MAX_TERRAIN_BOXES {
            return Err(EngineError::LimitExceeded("too many terrain boxes"));
        }
        self.persist_and_apply(&Event::TerrainWritten { terrain }).await
    }

    pub async fn set_terrain_disabled(&self, id: &str, disabled: bool) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        let mut terrain = self
            .docs
            .terrain_box(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if terrain.disabled == disabled {
            return Ok(());
        }
        terrain.disabled = disabled;
        self.persist_and_apply(&Event::TerrainWritten { terrain }).await
    }

    pub async fn delete_terrain(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if self.docs.terrain_box(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.persist_and_apply(&Event::TerrainDeleted { id: id.to_string() }).await
    }

    // ── Game systems ─────────────────────────────────────────

    /// Add `name` to the catalogue, keyed by its slug. Writing a name whose
    /// slug already exists renames that entry; an identical name is a no-op.
    pub async fn put_game_system(&self, name: &str) -> Result<GameSystem, EngineError> {
        let system = GameSystem::named(name);
        check_id(&system.id)?;
        if system.name.len() > MAX_GAME_LABEL_LEN {
            return Err(EngineError::LimitExceeded("game system name too long"));
        }
        let _gate = self.write_gate.lock().await;
        match self.docs.game_system(&system.id) {
            Some(existing) if existing == system => return Ok(system),
            Some(_) => {}
            None if self.docs.game_system_count() >= MAX_GAME_SYSTEMS => {
                return Err(EngineError::LimitExceeded("too many game systems"));
            }
            None => {}
        }
        self.persist_and_apply(&Event::GameSystemWritten { system: system.clone() })
            .await?;
        debug!("catalogued game system {} ({})", system.name, system.id);
        Ok(system)
    }

    /// Reservations already labelled with the system keep their label.
    pub async fn delete_game_system(&self, id: &str) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if self.docs.game_system(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        self.persist_and_apply(&Event::GameSystemDeleted { id: id.to_string() }).await?;
        info!("removed game system {id}");
        Ok(())
    }

    // ── Schedule exceptions ──────────────────────────────────

    /// Read-modify-write of the schedule document. No write when `edit` reports no change.
    async fn update_schedule(
        &self,
        edit: impl FnOnce(&mut ScheduleExceptions) -> bool,
    ) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        let mut schedule = self.docs.schedule();
        if !edit(&mut schedule) {
            return Ok(());
        }
        if schedule.cancelled.len() + schedule.special.len() > MAX_SCHEDULE_EXCEPTIONS {
            return Err(EngineError::LimitExceeded("too many schedule exceptions"));
        }
        self.persist_and_apply(&Event::ScheduleWritten { schedule }).await
    }

    /// Close the club on `date`. Existing reservations on it are kept.
    pub async fn cancel_date(&self, date: Day) -> Result<(), EngineError> {
        self.update_schedule(|s| s.cancelled.insert(date)).await?;
        info!("closed {date}");
        Ok(())
    }

    pub async fn reopen_date(&self, date: Day) -> Result<(), EngineError> {
        self.update_schedule(|s| s.cancelled.remove(&date)).await?;
        info!("reopened {date}");
        Ok(())
    }

    pub async fn add_special_date(&self, date: Day) -> Result<(), EngineError> {
        self.update_schedule(|s| s.special.insert(date)).await?;
        info!("added special event date {date}");
        Ok(())
    }

    pub async fn remove_special_date(&self, date: Day) -> Result<(), EngineError> {
        self.update_schedule(|s| s.special.remove(&date)).await
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal as the minimal event list for the current state.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        // Holding the gate keeps the event list and the journal in step.
        let _gate = self.write_gate.lock().await;
        let events = self.docs.to_events();
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))?;
        metrics::counter!(crate::observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

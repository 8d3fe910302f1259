use std::sync::Arc;

use tracing::{debug, info};

use crate::context::SharedContext;
use crate::engine::DocumentStore;
use crate::model::*;
use crate::observability;
use crate::resolver::{self, BookingError};

/// What a member fills in. `id` is set when editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub id: Option<String>,
    pub date: Day,
    pub table_id: Option<String>,
    pub terrain_id: Option<String>,
    pub game_system: String,
    pub player_count: u32,
}

/// The booking flow: validation and a conflict check against the local
/// snapshot, then one keyed write to the store.
///
/// The conflict check only sees what the last snapshot delivered. Two desks
/// acting on the same stale snapshot can both pass it; only the store's
/// slot-claim mode catches that.
pub struct BookingDesk<S: DocumentStore> {
    store: Arc<S>,
    context: SharedContext,
}

impl<S: DocumentStore> BookingDesk<S> {
    pub fn new(store: Arc<S>, context: SharedContext) -> Self {
        Self { store, context }
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Create or edit a reservation.
    pub async fn submit(&self, requester: &Requester, request: BookingRequest) -> Result<Reservation, BookingError> {
        let result = self.try_submit(requester, request).await;
        match &result {
            Ok(r) => info!("{} booked table {} on {} ({})", r.member_name, r.table_id, r.date, r.id),
            Err(e) => rejected("submit", e),
        }
        result
    }

    async fn try_submit(&self, requester: &Requester, request: BookingRequest) -> Result<Reservation, BookingError> {
        let existing = match &request.id {
            Some(id) => Some(self.editable(requester, id)?),
            None => None,
        };

        // Edits keep the original owner even when an admin makes them.
        let (member_id, member_name) = match &existing {
            Some(r) => (r.member_id.clone(), r.member_name.clone()),
            None => (requester.id.clone(), requester.name.clone()),
        };
        let mut draft = ReservationDraft {
            id: request.id.clone(),
            date: request.date,
            table_id: request.table_id.clone(),
            terrain_id: request.terrain_id.clone().filter(|t| !t.trim().is_empty()),
            member_id,
            member_name,
            game_system: request.game_system.clone(),
            player_count: request.player_count,
            status: None,
        };

        {
            let ctx = self.context.read().await;
            draft.game_system = ctx.canonical_game_system(&draft.game_system);
            resolver::validate(&draft, &ctx.schedule().cancelled, requester.is_member)?;

            let date = draft.date;
            let date_unchanged = existing.as_ref().is_some_and(|r| r.date == date);
            if !ctx.is_bookable(date) && !date_unchanged {
                return Err(BookingError::DateNotBookable(date));
            }

            let table_id = draft.table_id.as_deref().unwrap_or_default();
            if ctx.permanent_table_on(date) == Some(table_id) {
                return Err(BookingError::PermanentAllocation(table_id.to_string()));
            }
            if ctx.table(table_id).is_none() {
                return Err(BookingError::UnknownTable(table_id.to_string()));
            }
            if let Some(terrain_id) = draft.terrain_id.as_deref() {
                let terrain = ctx
                    .terrain_box(terrain_id)
                    .ok_or_else(|| BookingError::UnknownTerrain(terrain_id.to_string()))?;
                // A box disabled after it was booked stays on that reservation.
                let already_held = existing
                    .as_ref()
                    .is_some_and(|r| r.terrain_id.as_deref() == Some(terrain_id));
                if terrain.disabled && !already_held {
                    return Err(BookingError::TerrainDisabled(terrain_id.to_string()));
                }
            }

            let avail = ctx.availability(date, draft.id.as_deref());
            if let Some(holder) = avail.table_holder(table_id) {
                return Err(BookingError::TableTaken {
                    table_id: table_id.to_string(),
                    holder: holder.to_string(),
                });
            }
            if let Some(terrain_id) = draft.terrain_id.as_deref()
                && let Some(holder) = avail.terrain_holder(terrain_id)
            {
                return Err(BookingError::TerrainTaken {
                    terrain_id: terrain_id.to_string(),
                    holder: holder.to_string(),
                });
            }
        }

        resolver::commit(self.store.as_ref(), draft).await
    }

    /// Cancel a reservation the requester owns, or any as admin.
    pub async fn cancel(&self, requester: &Requester, id: &str) -> Result<Reservation, BookingError> {
        let result = match self.editable(requester, id) {
            Ok(_) => resolver::cancel(self.store.as_ref(), id, &requester.id).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(r) => info!("{} cancelled reservation {} on {}", requester.name, r.id, r.date),
            Err(e) => rejected("cancel", e),
        }
        result
    }

    /// Physically remove a reservation. Admins only; member paths never delete.
    pub async fn hard_delete(&self, requester: &Requester, id: &str) -> Result<(), BookingError> {
        if !requester.is_admin {
            rejected("delete", &BookingError::NotPermitted);
            return Err(BookingError::NotPermitted);
        }
        if is_permanent_id(id) {
            return Err(BookingError::PermanentAllocation(id.to_string()));
        }
        self.store.delete_reservation(id).await?;
        info!("{} deleted reservation {id}", requester.name);
        Ok(())
    }

    /// Look up an active reservation the requester may change.
    fn editable(&self, requester: &Requester, id: &str) -> Result<Reservation, BookingError> {
        if is_permanent_id(id) {
            return Err(BookingError::PermanentAllocation(id.to_string()));
        }
        let existing = self
            .store
            .reservation(id)
            .ok_or_else(|| BookingError::NotFound(id.to_string()))?;
        if !requester.may_modify(&existing) {
            return Err(BookingError::NotPermitted);
        }
        if !existing.is_active() {
            return Err(BookingError::AlreadyCancelled(id.to_string()));
        }
        Ok(existing)
    }
}

fn rejected(op: &'static str, err: &BookingError) {
    let reason = observability::rejection_label(err);
    metrics::counter!(observability::BOOKING_REJECTIONS_TOTAL, "op" => op, "reason" => reason).increment(1);
    debug!("{op} rejected: {err}");
}

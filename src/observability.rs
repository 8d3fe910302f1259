use std::net::SocketAddr;

use crate::resolver::BookingError;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: reservation writes reaching the store. Labels: op, status.
pub const RESERVATION_WRITES_TOTAL: &str = "clubnight_reservation_writes_total";

/// Counter: booking attempts stopped before the store. Labels: reason.
pub const BOOKING_REJECTIONS_TOTAL: &str = "clubnight_booking_rejections_total";

/// Gauge: slots on selectable dates held by more than one active reservation,
/// the standing allocation included. Labels: slot (table, terrain).
pub const DOUBLE_BOOKINGS_OBSERVED: &str = "clubnight_double_bookings_observed";

// ── Store ───────────────────────────────────────────────────────

/// Counter: snapshots published. Labels: collection.
pub const SNAPSHOTS_PUBLISHED_TOTAL: &str = "clubnight_snapshots_published_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "clubnight_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "clubnight_journal_flush_batch_size";

/// Counter: journal compactions completed.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "clubnight_journal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a rejection to a short label for metrics.
pub fn rejection_label(err: &BookingError) -> &'static str {
    match err {
        BookingError::DateClosed(_) => "date_closed",
        BookingError::DateNotBookable(_) => "date_not_bookable",
        BookingError::MembershipInactive => "membership_inactive",
        BookingError::MissingField(_) => "missing_field",
        BookingError::LimitExceeded(_) => "limit_exceeded",
        BookingError::UnknownTable(_) => "unknown_table",
        BookingError::UnknownTerrain(_) => "unknown_terrain",
        BookingError::TerrainDisabled(_) => "terrain_disabled",
        BookingError::TableTaken { .. } => "table_taken",
        BookingError::TerrainTaken { .. } => "terrain_taken",
        BookingError::PermanentAllocation(_) => "permanent_allocation",
        BookingError::NotPermitted => "not_permitted",
        BookingError::NotFound(_) => "not_found",
        BookingError::AlreadyCancelled(_) => "already_cancelled",
        BookingError::InvalidStatus(_) => "invalid_status",
        BookingError::RaceLost { .. } => "race_lost",
        BookingError::WriteFailed(_) => "write_failed",
    }
}

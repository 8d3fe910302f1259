use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::calendar::{self, CadenceRule, SelectableDate};
use crate::model::*;
use crate::notify::{SnapshotHub, Subscription};
use crate::resolver::{self, Collision, DateAvailability};

/// Everything the booking flow reads: configuration plus the latest full
/// snapshot of each collection. Derived date lists are recomputed whenever an
/// input changes, never patched.
#[derive(Debug, Clone)]
pub struct AppContext {
    cadence: CadenceRule,
    permanent: Option<PermanentAllocation>,
    today: Day,
    reservations: Arc<Vec<Reservation>>,
    tables: Arc<Vec<Table>>,
    terrain: Arc<Vec<TerrainBox>>,
    schedule: Arc<ScheduleExceptions>,
    game_systems: Arc<Vec<GameSystem>>,
    bookable: Vec<Day>,
    selectable: Vec<SelectableDate>,
}

pub type SharedContext = Arc<RwLock<AppContext>>;

impl AppContext {
    pub fn new(cadence: CadenceRule, permanent: Option<PermanentAllocation>, today: Day) -> Self {
        let mut ctx = Self {
            cadence,
            permanent,
            today,
            reservations: Arc::default(),
            tables: Arc::default(),
            terrain: Arc::default(),
            schedule: Arc::default(),
            game_systems: Arc::default(),
            bookable: Vec::new(),
            selectable: Vec::new(),
        };
        ctx.rederive();
        ctx
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    fn rederive(&mut self) {
        self.bookable = calendar::bookable_dates(&self.cadence, self.today, &self.schedule);
        self.selectable =
            calendar::selectable_dates(&self.cadence, self.today, &self.schedule, &self.reservations);
    }

    // ── Snapshot deliveries ──────────────────────────────────

    pub fn apply_reservations(&mut self, snapshot: Arc<Vec<Reservation>>) {
        self.reservations = snapshot;
        self.rederive();
    }

    pub fn apply_tables(&mut self, snapshot: Arc<Vec<Table>>) {
        self.tables = snapshot;
    }

    pub fn apply_terrain(&mut self, snapshot: Arc<Vec<TerrainBox>>) {
        self.terrain = snapshot;
    }

    pub fn apply_schedule(&mut self, snapshot: Arc<ScheduleExceptions>) {
        self.schedule = snapshot;
        self.rederive();
    }

    pub fn apply_game_systems(&mut self, snapshot: Arc<Vec<GameSystem>>) {
        self.game_systems = snapshot;
    }

    /// Returns true when the day rolled over.
    pub fn set_today(&mut self, today: Day) -> bool {
        if self.today == today {
            return false;
        }
        self.today = today;
        self.rederive();
        true
    }

    // ── Dates ────────────────────────────────────────────────

    pub fn today(&self) -> Day {
        self.today
    }

    pub fn cadence(&self) -> &CadenceRule {
        &self.cadence
    }

    pub fn bookable_dates(&self) -> &[Day] {
        &self.bookable
    }

    pub fn selectable_dates(&self) -> &[SelectableDate] {
        &self.selectable
    }

    pub fn is_bookable(&self, date: Day) -> bool {
        self.bookable.binary_search(&date).is_ok()
    }

    pub fn is_cancelled(&self, date: Day) -> bool {
        self.schedule.is_cancelled(date)
    }

    /// The date to show: `current` if still selectable, else the earliest one.
    pub fn default_date(&self, current: Option<Day>) -> Option<Day> {
        calendar::resolve_selection(&self.selectable, current)
    }

    pub fn schedule(&self) -> &ScheduleExceptions {
        &self.schedule
    }

    // ── Reservations ─────────────────────────────────────────

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn reservation(&self, id: &str) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn permanent(&self) -> Option<&PermanentAllocation> {
        self.permanent.as_ref()
    }

    /// Table held by the standing allocation on `date`, if any.
    pub fn permanent_table_on(&self, date: Day) -> Option<&str> {
        self.permanent
            .as_ref()
            .filter(|_| self.is_bookable(date))
            .map(|p| p.table_id.as_str())
    }

    /// Active reservations on `date`, with the standing allocation first when
    /// the date is bookable.
    pub fn reservations_on(&self, date: Day) -> Vec<Reservation> {
        let mut out = Vec::new();
        if let Some(permanent) = self.permanent.as_ref().filter(|_| self.is_bookable(date)) {
            out.push(permanent.reservation_on(date));
        }
        out.extend(
            self.reservations
                .iter()
                .filter(|r| r.date == date && r.is_active())
                .cloned(),
        );
        out
    }

    pub fn availability(&self, date: Day, excluding_id: Option<&str>) -> DateAvailability {
        resolver::availability(date, &self.reservations_on(date), excluding_id)
    }

    /// Double bookings on every selectable date.
    pub fn collisions(&self) -> Vec<Collision> {
        self.selectable
            .iter()
            .flat_map(|s| self.availability(s.date, None).collisions().to_vec())
            .collect()
    }

    // ── Inventory ────────────────────────────────────────────

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn terrain(&self) -> &[TerrainBox] {
        &self.terrain
    }

    pub fn terrain_box(&self, id: &str) -> Option<&TerrainBox> {
        self.terrain.iter().find(|t| t.id == id)
    }

    /// Terrain offered for new reservations.
    pub fn selectable_terrain(&self) -> impl Iterator<Item = &TerrainBox> {
        self.terrain.iter().filter(|t| !t.disabled)
    }

    // ── Game systems ─────────────────────────────────────────

    pub fn game_systems(&self) -> &[GameSystem] {
        &self.game_systems
    }

    /// Catalogue entries whose name contains `typed`, ignoring case. Empty
    /// input matches everything.
    pub fn game_system_suggestions<'a>(&'a self, typed: &str) -> impl Iterator<Item = &'a GameSystem> + use<'a> {
        let needle = typed.trim().to_lowercase();
        self.game_systems
            .iter()
            .filter(move |g| needle.is_empty() || g.name.to_lowercase().contains(&needle))
    }

    /// The catalogue spelling of `label` when it matches an entry ignoring
    /// case and surrounding whitespace; otherwise `label` trimmed.
    pub fn canonical_game_system(&self, label: &str) -> String {
        let label = label.trim();
        let lowered = label.to_lowercase();
        self.game_systems
            .iter()
            .find(|g| g.name.to_lowercase() == lowered)
            .map_or_else(|| label.to_string(), |g| g.name.clone())
    }
}

// ── Live sync ────────────────────────────────────────────────────

pub struct ContextFeeds {
    pub reservations: Subscription<Vec<Reservation>>,
    pub tables: Subscription<Vec<Table>>,
    pub terrain: Subscription<Vec<TerrainBox>>,
    pub schedule: Subscription<ScheduleExceptions>,
    pub game_systems: Subscription<Vec<GameSystem>>,
}

impl ContextFeeds {
    pub fn from_hub(hub: &SnapshotHub) -> Self {
        Self {
            reservations: hub.subscribe_reservations(),
            tables: hub.subscribe_tables(),
            terrain: hub.subscribe_terrain(),
            schedule: hub.subscribe_schedule(),
            game_systems: hub.subscribe_game_systems(),
        }
    }

    /// Load whatever each feed currently holds.
    pub fn load_into(&self, ctx: &mut AppContext) {
        ctx.apply_tables(self.tables.current());
        ctx.apply_terrain(self.terrain.current());
        ctx.apply_schedule(self.schedule.current());
        ctx.apply_game_systems(self.game_systems.current());
        ctx.apply_reservations(self.reservations.current());
    }
}

fn report_collisions(ctx: &AppContext) {
    let collisions = ctx.collisions();
    for kind in ["table", "terrain"] {
        let held_twice = collisions.iter().filter(|c| c.slot.kind() == kind).count();
        metrics::gauge!(crate::observability::DOUBLE_BOOKINGS_OBSERVED, "slot" => kind).set(held_twice as f64);
    }
    for c in &collisions {
        warn!("double booking on {}: {} kept, {} also active", c.slot, c.kept, c.extra);
    }
}

/// Keep `ctx` current until any feed closes. Also rolls `today` over at
/// midnight UTC.
pub async fn run_sync(ctx: SharedContext, feeds: ContextFeeds) {
    run_sync_with_clock(ctx, feeds, calendar::today_utc).await
}

/// [`run_sync`] with an explicit source for today's date.
pub async fn run_sync_with_clock(ctx: SharedContext, mut feeds: ContextFeeds, clock: fn() -> Day) {
    {
        let mut guard = ctx.write().await;
        feeds.load_into(&mut guard);
        report_collisions(&guard);
    }

    let mut tick = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            snap = feeds.reservations.next() => {
                let Some(snap) = snap else { break };
                let mut guard = ctx.write().await;
                guard.apply_reservations(snap);
                report_collisions(&guard);
            }
            snap = feeds.tables.next() => {
                let Some(snap) = snap else { break };
                ctx.write().await.apply_tables(snap);
            }
            snap = feeds.terrain.next() => {
                let Some(snap) = snap else { break };
                ctx.write().await.apply_terrain(snap);
            }
            snap = feeds.game_systems.next() => {
                let Some(snap) = snap else { break };
                ctx.write().await.apply_game_systems(snap);
            }
            snap = feeds.schedule.next() => {
                let Some(snap) = snap else { break };
                let mut guard = ctx.write().await;
                guard.apply_schedule(snap);
                debug!("schedule updated, {} bookable dates", guard.bookable_dates().len());
            }
            _ = tick.tick() => {
                let today = clock();
                if ctx.write().await.set_today(today) {
                    info!("date rolled over to {today}");
                }
            }
        }
    }
    debug!("context sync stopped");
}

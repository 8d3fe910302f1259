use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unix milliseconds. Used for creation and cancellation stamps only.
pub type Ms = i64;

/// A calendar day with no time component. Every date in the system is one of these.
pub type Day = NaiveDate;

/// Reserved id namespace for the synthetic standing allocation.
pub const PERMANENT_ID_PREFIX: &str = "permanent:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableSize {
    Large,
    Small,
}

impl TableSize {
    /// Physical footprint in feet, as printed on the club floor plan.
    pub fn label(self) -> &'static str {
        match self {
            TableSize::Large => "6x4",
            TableSize::Small => "3x4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    pub size: TableSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainCategory {
    SciFi,
    Historical,
    Fantasy,
    AgeOfSigmar,
    Warhammer40k,
}

impl TerrainCategory {
    pub fn label(self) -> &'static str {
        match self {
            TerrainCategory::SciFi => "Sci-Fi",
            TerrainCategory::Historical => "Historical",
            TerrainCategory::Fantasy => "Fantasy",
            TerrainCategory::AgeOfSigmar => "Age of Sigmar",
            TerrainCategory::Warhammer40k => "Warhammer 40k",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainBox {
    pub id: String,
    pub name: String,
    pub category: TerrainCategory,
    pub image_url: String,
    #[serde(default)]
    pub uploaded_image_url: Option<String>,
    /// Disabled boxes cannot be picked for new reservations.
    #[serde(default)]
    pub disabled: bool,
}

impl TerrainBox {
    /// The uploaded override wins over the stock image.
    pub fn display_image(&self) -> &str {
        self.uploaded_image_url.as_deref().unwrap_or(&self.image_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub date: Day,
    pub table_id: String,
    pub terrain_id: Option<String>,
    pub member_id: String,
    pub member_name: String,
    pub game_system: String,
    pub player_count: u32,
    pub created_at: Ms,
    pub status: ReservationStatus,
    pub cancelled_at: Option<Ms>,
    pub cancelled_by: Option<String>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

pub fn is_permanent_id(id: &str) -> bool {
    id.starts_with(PERMANENT_ID_PREFIX)
}

/// A catalogue entry offered when members type a game label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSystem {
    /// Slug of `name`; two names with the same slug are the same system.
    pub id: String,
    pub name: String,
}

impl GameSystem {
    pub fn named(name: &str) -> Self {
        let name = name.trim().to_string();
        Self {
            id: game_system_slug(&name),
            name,
        }
    }
}

/// Lowercase ASCII alphanumerics, every other run collapsed to one `-`:
/// "Warhammer 40,000" becomes "warhammer-40-000".
pub fn game_system_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    if slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// A reservation as submitted for commit. `id` is `None` on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDraft {
    pub id: Option<String>,
    pub date: Day,
    pub table_id: Option<String>,
    pub terrain_id: Option<String>,
    pub member_id: String,
    pub member_name: String,
    pub game_system: String,
    pub player_count: u32,
    /// `None` means active. Cancelling goes through `cancel`, never commit.
    pub status: Option<ReservationStatus>,
}

/// Admin-maintained exceptions to the weekly cadence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleExceptions {
    /// Club closed; nothing can be booked.
    pub cancelled: BTreeSet<Day>,
    /// Extra bookable dates outside the cadence.
    pub special: BTreeSet<Day>,
}

impl ScheduleExceptions {
    pub fn is_cancelled(&self, date: Day) -> bool {
        self.cancelled.contains(&date)
    }

    pub fn is_special(&self, date: Day) -> bool {
        self.special.contains(&date)
    }
}

/// The signed-in user as far as booking is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: String,
    pub name: String,
    pub is_member: bool,
    pub is_admin: bool,
}

impl Requester {
    /// Owners may touch their own reservations; admins may touch anyone's.
    pub fn may_modify(&self, reservation: &Reservation) -> bool {
        self.is_admin || reservation.member_id == self.id
    }
}

/// One table held on every bookable date for a standing, non-game use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermanentAllocation {
    pub table_id: String,
    pub holder_name: String,
}

impl PermanentAllocation {
    /// Materialize the synthetic reservation for `date`. Never persisted.
    pub fn reservation_on(&self, date: Day) -> Reservation {
        Reservation {
            id: format!("{PERMANENT_ID_PREFIX}{}:{date}", self.table_id),
            date,
            table_id: self.table_id.clone(),
            terrain_id: None,
            member_id: String::new(),
            member_name: self.holder_name.clone(),
            game_system: String::new(),
            player_count: 0,
            created_at: 0,
            status: ReservationStatus::Active,
            cancelled_at: None,
            cancelled_by: None,
        }
    }
}

/// Filter used by the statistics consumer. Bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub from: Option<Day>,
    pub to: Option<Day>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.status.is_none_or(|s| s == reservation.status)
            && self.from.is_none_or(|d| reservation.date >= d)
            && self.to.is_none_or(|d| reservation.date <= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Reservations,
    Tables,
    Terrain,
    Schedule,
    GameSystems,
}

impl Collection {
    pub fn label(self) -> &'static str {
        match self {
            Collection::Reservations => "reservations",
            Collection::Tables => "tables",
            Collection::Terrain => "terrain",
            Collection::Schedule => "schedule",
            Collection::GameSystems => "game_systems",
        }
    }
}

/// Document writes, flat. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationWritten { reservation: Reservation },
    ReservationDeleted { id: String },
    TableWritten { table: Table },
    TableDeleted { id: String },
    TerrainWritten { terrain: TerrainBox },
    TerrainDeleted { id: String },
    ScheduleWritten { schedule: ScheduleExceptions },
    GameSystemWritten { system: GameSystem },
    GameSystemDeleted { id: String },
}

impl Event {
    pub fn collection(&self) -> Collection {
        match self {
            Event::ReservationWritten { .. } | Event::ReservationDeleted { .. } => {
                Collection::Reservations
            }
            Event::TableWritten { .. } | Event::TableDeleted { .. } => Collection::Tables,
            Event::TerrainWritten { .. } | Event::TerrainDeleted { .. } => Collection::Terrain,
            Event::ScheduleWritten { .. } => Collection::Schedule,
            Event::GameSystemWritten { .. } | Event::GameSystemDeleted { .. } => Collection::GameSystems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> Day {
        s.parse().unwrap()
    }

    fn reservation(id: &str, date: &str, status: ReservationStatus) -> Reservation {
        Reservation {
            id: id.into(),
            date: day(date),
            table_id: "L1".into(),
            terrain_id: None,
            member_id: "m1".into(),
            member_name: "Alex".into(),
            game_system: "Bolt Action".into(),
            player_count: 2,
            created_at: 0,
            status,
            cancelled_at: None,
            cancelled_by: None,
        }
    }

    #[test]
    fn permanent_reservation_is_tagged() {
        let alloc = PermanentAllocation {
            table_id: "L13".into(),
            holder_name: "Club Library".into(),
        };
        let r = alloc.reservation_on(day("2026-03-03"));
        assert!(is_permanent_id(&r.id));
        assert!(r.is_active());
        assert_eq!(r.table_id, "L13");
        assert_eq!(r.member_name, "Club Library");
        assert_eq!(r.id, "permanent:L13:2026-03-03");
    }

    #[test]
    fn game_system_slugs() {
        assert_eq!(game_system_slug("Warhammer 40,000"), "warhammer-40-000");
        assert_eq!(game_system_slug("  A Song of Ice and Fire "), "a-song-of-ice-and-fire");
        assert_eq!(game_system_slug("OPR Sci Fi"), game_system_slug("opr sci-fi"));
        assert_eq!(game_system_slug("!!!"), "");

        let system = GameSystem::named("  Kill Team ");
        assert_eq!(system.name, "Kill Team");
        assert_eq!(system.id, "kill-team");
    }

    #[test]
    fn labels_for_inventory() {
        assert_eq!(TableSize::Large.label(), "6x4");
        assert_eq!(TerrainCategory::AgeOfSigmar.label(), "Age of Sigmar");
        assert_eq!(Collection::GameSystems.label(), "game_systems");
    }

    #[test]
    fn terrain_display_image_prefers_upload() {
        let mut b = TerrainBox {
            id: "SCIFI-1".into(),
            name: "Sci-Fi Box 1".into(),
            category: TerrainCategory::SciFi,
            image_url: "/images/terrain/SciFi1.jpg".into(),
            uploaded_image_url: None,
            disabled: false,
        };
        assert_eq!(b.display_image(), "/images/terrain/SciFi1.jpg");
        b.uploaded_image_url = Some("https://cdn.example/x.jpg".into());
        assert_eq!(b.display_image(), "https://cdn.example/x.jpg");
    }

    #[test]
    fn filter_by_status_and_range() {
        let active = reservation("a", "2026-03-03", ReservationStatus::Active);
        let cancelled = reservation("b", "2026-03-10", ReservationStatus::Cancelled);

        let only_active = ReservationFilter {
            status: Some(ReservationStatus::Active),
            ..Default::default()
        };
        assert!(only_active.matches(&active));
        assert!(!only_active.matches(&cancelled));

        let march_first_week = ReservationFilter {
            status: None,
            from: Some(day("2026-03-01")),
            to: Some(day("2026-03-07")),
        };
        assert!(march_first_week.matches(&active));
        assert!(!march_first_week.matches(&cancelled));
        assert!(ReservationFilter::default().matches(&cancelled));
    }

    #[test]
    fn owner_or_admin_may_modify() {
        let r = reservation("a", "2026-03-03", ReservationStatus::Active);
        let owner = Requester { id: "m1".into(), name: "Alex".into(), is_member: true, is_admin: false };
        let other = Requester { id: "m2".into(), name: "Sam".into(), is_member: true, is_admin: false };
        let admin = Requester { id: "m3".into(), name: "Kim".into(), is_member: true, is_admin: true };
        assert!(owner.may_modify(&r));
        assert!(!other.may_modify(&r));
        assert!(admin.may_modify(&r));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationWritten {
            reservation: reservation("a", "2026-03-03", ReservationStatus::Active),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
        assert_eq!(decoded.collection(), Collection::Reservations);
    }
}

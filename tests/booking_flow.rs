use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use clubnight::calendar::CadenceRule;
use clubnight::context::{self, AppContext, ContextFeeds};
use clubnight::desk::{BookingDesk, BookingRequest};
use clubnight::engine::{DocumentStore, Engine, EngineOptions};
use clubnight::inventory::{self, Inventory};
use clubnight::model::*;
use clubnight::resolver::{self, BookingError};

// ── Test infrastructure ──────────────────────────────────────

fn day(s: &str) -> Day {
    s.parse().unwrap()
}

fn before_opening() -> Day {
    day("2026-02-15")
}

fn journal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("clubnight_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("clubnight.journal")
}

fn library() -> PermanentAllocation {
    PermanentAllocation {
        table_id: "L13".into(),
        holder_name: "Club Library".into(),
    }
}

struct Club {
    engine: Arc<Engine>,
    feeds: ContextFeeds,
    desk: BookingDesk<Engine>,
}

impl Club {
    async fn open(claim_slots: bool) -> Self {
        let engine = Arc::new(Engine::open(journal_path(), EngineOptions { claim_slots }).unwrap());
        inventory::seed_if_empty(&engine, &Inventory::club_default()).await.unwrap();

        let ctx = AppContext::new(CadenceRule::default(), Some(library()), before_opening()).shared();
        let feeds = ContextFeeds::from_hub(&engine.hub);
        let desk = BookingDesk::new(engine.clone(), ctx);
        let club = Self { engine, feeds, desk };
        club.refresh().await;
        club
    }

    /// Deliver the latest snapshots to the desk's context.
    async fn refresh(&self) {
        let mut ctx = self.desk.context().write().await;
        self.feeds.load_into(&mut ctx);
    }
}

fn member(id: &str, name: &str) -> Requester {
    Requester {
        id: id.into(),
        name: name.into(),
        is_member: true,
        is_admin: false,
    }
}

fn admin() -> Requester {
    Requester {
        id: "admin-1".into(),
        name: "Kim".into(),
        is_member: true,
        is_admin: true,
    }
}

fn request(date: &str, table: &str, terrain: Option<&str>) -> BookingRequest {
    BookingRequest {
        id: None,
        date: day(date),
        table_id: Some(table.into()),
        terrain_id: terrain.map(Into::into),
        game_system: "Warhammer 40k".into(),
        player_count: 2,
    }
}

// ── Dates ────────────────────────────────────────────────────

#[tokio::test]
async fn first_cadence_date_respects_opening_floor() {
    let club = Club::open(false).await;
    let ctx = club.desk.context().read().await;
    assert_eq!(ctx.bookable_dates()[0], day("2026-03-03"));
    assert!(!ctx.is_bookable(day("2026-02-17")));
    assert_eq!(ctx.bookable_dates().len(), 8);
}

#[tokio::test]
async fn cancelled_special_date_is_viewable_but_not_bookable() {
    let club = Club::open(false).await;
    club.engine.cancel_date(day("2026-03-03")).await.unwrap();
    club.engine.add_special_date(day("2026-03-03")).await.unwrap();
    club.refresh().await;

    {
        let ctx = club.desk.context().read().await;
        assert!(!ctx.bookable_dates().contains(&day("2026-03-03")));
        let entry = ctx
            .selectable_dates()
            .iter()
            .find(|s| s.date == day("2026-03-03"))
            .copied()
            .unwrap();
        assert!(entry.is_cancelled);
    }

    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);
    assert!(matches!(err, BookingError::DateClosed(_)));
}

#[tokio::test]
async fn special_event_date_is_bookable() {
    let club = Club::open(false).await;
    club.engine.add_special_date(day("2026-03-06")).await.unwrap();
    club.refresh().await;

    let r = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-06", "L1", None)).await);
    assert_eq!(r.date, day("2026-03-06"));
}

#[tokio::test]
async fn off_cadence_date_rejected() {
    let club = Club::open(false).await;
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-04", "L1", None)).await);
    assert!(matches!(err, BookingError::DateNotBookable(_)));
}

#[tokio::test]
async fn reservation_dates_stay_selectable() {
    let club = Club::open(false).await;
    club.engine.add_special_date(day("2026-03-06")).await.unwrap();
    club.refresh().await;
    assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-06", "S2", None)).await);

    // the special date is withdrawn, but the reservation still pins it in the dropdown
    club.engine.remove_special_date(day("2026-03-06")).await.unwrap();
    club.refresh().await;
    let ctx = club.desk.context().read().await;
    assert!(!ctx.is_bookable(day("2026-03-06")));
    assert!(ctx.selectable_dates().iter().any(|s| s.date == day("2026-03-06")));
}

// ── Booking ──────────────────────────────────────────────────

#[tokio::test]
async fn two_tables_same_night_both_succeed() {
    let club = Club::open(false).await;
    let a = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);
    let b = assert_ok!(club.desk.submit(&member("m2", "Sam"), request("2026-03-03", "L2", None)).await);
    assert_ne!(a.id, b.id);
    assert_eq!(a.status, ReservationStatus::Active);
    assert_eq!(a.member_name, "Alex");
}

#[tokio::test]
async fn validation_order_and_membership() {
    let club = Club::open(false).await;
    let mut guest = member("g1", "Guest");
    guest.is_member = false;

    let err = assert_err!(club.desk.submit(&guest, request("2026-03-03", "L1", None)).await);
    assert!(matches!(err, BookingError::MembershipInactive));

    let mut missing = request("2026-03-03", "L1", None);
    missing.table_id = None;
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), missing).await);
    assert!(matches!(err, BookingError::MissingField("table")));

    let mut blank = request("2026-03-03", "L1", None);
    blank.game_system = "   ".into();
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), blank).await);
    assert!(matches!(err, BookingError::MissingField("game system")));

    // nothing reached the store
    assert!(club.engine.reservations(&ReservationFilter::default()).is_empty());
}

#[tokio::test]
async fn permanent_table_is_never_bookable() {
    let club = Club::open(false).await;
    {
        let ctx = club.desk.context().read().await;
        for date in ctx.bookable_dates() {
            assert_eq!(ctx.availability(*date, None).table_holder("L13"), Some("Club Library"));
        }
    }
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-10", "L13", None)).await);
    assert!(matches!(err, BookingError::PermanentAllocation(_)));

    let err = assert_err!(club.desk.cancel(&admin(), "permanent:L13:2026-03-10").await);
    assert!(matches!(err, BookingError::PermanentAllocation(_)));
}

#[tokio::test]
async fn taken_table_and_terrain_reported_with_holder() {
    let club = Club::open(false).await;
    assert_ok!(
        club.desk
            .submit(&member("m1", "Alex"), request("2026-03-03", "L1", Some("SCIFI-3")))
            .await
    );
    club.refresh().await;

    match assert_err!(club.desk.submit(&member("m2", "Sam"), request("2026-03-03", "L1", None)).await) {
        BookingError::TableTaken { table_id, holder } => {
            assert_eq!(table_id, "L1");
            assert_eq!(holder, "Alex");
        }
        other => panic!("unexpected: {other}"),
    }
    match assert_err!(
        club.desk
            .submit(&member("m2", "Sam"), request("2026-03-03", "L2", Some("SCIFI-3")))
            .await
    ) {
        BookingError::TerrainTaken { holder, .. } => assert_eq!(holder, "Alex"),
        other => panic!("unexpected: {other}"),
    }

    // a different night is free
    assert_ok!(club.desk.submit(&member("m2", "Sam"), request("2026-03-10", "L1", Some("SCIFI-3"))).await);
}

#[tokio::test]
async fn unknown_and_disabled_inventory_rejected() {
    let club = Club::open(false).await;
    club.engine.set_terrain_disabled("HILLS-1", true).await.unwrap();
    club.refresh().await;

    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L99", None)).await);
    assert!(matches!(err, BookingError::UnknownTable(_)));
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", Some("NOPE"))).await);
    assert!(matches!(err, BookingError::UnknownTerrain(_)));
    let err = assert_err!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", Some("HILLS-1"))).await);
    assert!(matches!(err, BookingError::TerrainDisabled(_)));
}

#[tokio::test]
async fn disabled_terrain_stays_on_existing_reservation() {
    let club = Club::open(false).await;
    let alex = member("m1", "Alex");
    let r = assert_ok!(club.desk.submit(&alex, request("2026-03-03", "L1", Some("HILLS-1"))).await);

    club.engine.set_terrain_disabled("HILLS-1", true).await.unwrap();
    club.refresh().await;

    let mut edit = request("2026-03-03", "L1", Some("HILLS-1"));
    edit.id = Some(r.id.clone());
    edit.player_count = 4;
    let edited = assert_ok!(club.desk.submit(&alex, edit).await);
    assert_eq!(edited.terrain_id.as_deref(), Some("HILLS-1"));
    assert_eq!(edited.player_count, 4);
}

#[tokio::test]
async fn game_label_takes_catalogue_spelling() {
    let club = Club::open(false).await;
    let alex = member("m1", "Alex");

    let mut req = request("2026-03-03", "L1", None);
    req.game_system = "  kill TEAM ".into();
    let r = assert_ok!(club.desk.submit(&alex, req).await);
    assert_eq!(r.game_system, "Kill Team");

    // labels outside the catalogue are kept as typed, trimmed
    let mut req = request("2026-03-03", "L2", None);
    req.game_system = " Homebrew Skirmish ".into();
    let r = assert_ok!(club.desk.submit(&alex, req).await);
    assert_eq!(r.game_system, "Homebrew Skirmish");

    // catalogue changes reach the desk on the next snapshot
    assert_ok!(club.engine.put_game_system("Homebrew Skirmish").await);
    club.refresh().await;
    let mut req = request("2026-03-03", "L3", None);
    req.game_system = "HOMEBREW skirmish".into();
    let r = assert_ok!(club.desk.submit(&alex, req).await);
    assert_eq!(r.game_system, "Homebrew Skirmish");
}

// ── Edit and cancel ──────────────────────────────────────────

#[tokio::test]
async fn edit_keeps_id_owner_and_does_not_block_itself() {
    let club = Club::open(false).await;
    let alex = member("m1", "Alex");
    let original = assert_ok!(club.desk.submit(&alex, request("2026-03-03", "L1", Some("FANT-1"))).await);
    club.refresh().await;

    // same table and terrain: must not collide with itself
    let mut edit = request("2026-03-03", "L1", Some("FANT-1"));
    edit.id = Some(original.id.clone());
    edit.game_system = "Age of Sigmar".into();
    let edited = assert_ok!(club.desk.submit(&alex, edit).await);
    assert_eq!(edited.id, original.id);
    assert_eq!(edited.created_at, original.created_at);
    assert_eq!(edited.game_system, "Age of Sigmar");

    // an admin edit keeps the member as owner
    let mut moved = request("2026-03-03", "L4", None);
    moved.id = Some(original.id.clone());
    let by_admin = assert_ok!(club.desk.submit(&admin(), moved).await);
    assert_eq!(by_admin.member_id, "m1");
    assert_eq!(by_admin.member_name, "Alex");

    assert_eq!(club.engine.reservations(&ReservationFilter::default()).len(), 1);
}

#[tokio::test]
async fn only_owner_or_admin_may_change() {
    let club = Club::open(false).await;
    let r = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);

    let mut edit = request("2026-03-03", "L2", None);
    edit.id = Some(r.id.clone());
    let err = assert_err!(club.desk.submit(&member("m2", "Sam"), edit).await);
    assert!(matches!(err, BookingError::NotPermitted));

    let err = assert_err!(club.desk.cancel(&member("m2", "Sam"), &r.id).await);
    assert!(matches!(err, BookingError::NotPermitted));

    let err = assert_err!(club.desk.hard_delete(&member("m1", "Alex"), &r.id).await);
    assert!(matches!(err, BookingError::NotPermitted));

    assert_ok!(club.desk.cancel(&admin(), &r.id).await);
}

#[tokio::test]
async fn cancel_frees_table_and_keeps_history() {
    let club = Club::open(false).await;
    let alex = member("m1", "Alex");
    let r = assert_ok!(club.desk.submit(&alex, request("2026-03-03", "L1", None)).await);
    club.refresh().await;
    assert!(!club.desk.context().read().await.availability(day("2026-03-03"), None).is_table_free("L1"));

    let cancelled = assert_ok!(club.desk.cancel(&alex, &r.id).await);
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("m1"));
    assert!(cancelled.cancelled_at.is_some());
    club.refresh().await;
    assert!(club.desk.context().read().await.availability(day("2026-03-03"), None).is_table_free("L1"));

    let err = assert_err!(club.desk.cancel(&alex, &r.id).await);
    assert!(matches!(err, BookingError::AlreadyCancelled(_)));
    let err = assert_err!(club.desk.cancel(&alex, "no-such-id").await);
    assert!(matches!(err, BookingError::NotFound(_)));

    // the slot can be booked again
    assert_ok!(club.desk.submit(&member("m2", "Sam"), request("2026-03-03", "L1", None)).await);

    let history = club.engine.reservations(&ReservationFilter {
        status: Some(ReservationStatus::Cancelled),
        from: Some(day("2026-03-01")),
        to: Some(day("2026-03-31")),
    });
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].game_system, "Warhammer 40k");
}

#[tokio::test]
async fn admin_hard_delete() {
    let club = Club::open(false).await;
    let r = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);
    assert_ok!(club.desk.hard_delete(&admin(), &r.id).await);
    assert!(club.engine.reservation(&r.id).is_none());
    let err = assert_err!(club.desk.hard_delete(&admin(), &r.id).await);
    assert!(matches!(err, BookingError::NotFound(_)));
}

// ── Races ────────────────────────────────────────────────────

#[tokio::test]
async fn stale_snapshot_double_booking_is_accepted() {
    let club = Club::open(false).await;
    let first = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);
    assert_ok!(club.desk.submit(&member("m2", "Sam"), request("2026-03-03", "L2", None)).await);

    // no refresh: the desk still sees the pre-update snapshot
    tokio::time::sleep(Duration::from_millis(5)).await;
    let third = assert_ok!(club.desk.submit(&member("m3", "Jo"), request("2026-03-03", "L1", None)).await);
    assert_ne!(third.id, first.id);

    club.refresh().await;
    let ctx = club.desk.context().read().await;
    let avail = ctx.availability(day("2026-03-03"), None);
    assert_eq!(avail.table_holder("L1"), Some("Alex"));
    assert_eq!(avail.collisions().len(), 1);
}

#[tokio::test]
async fn concurrent_desks_race_in_weak_mode() {
    let club = Club::open(false).await;
    let (alex, sam) = (member("m1", "Alex"), member("m2", "Sam"));
    let (a, b) = futures::join!(
        club.desk.submit(&alex, request("2026-03-10", "L7", None)),
        club.desk.submit(&sam, request("2026-03-10", "L7", None)),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_eq!(club.engine.active_reservations_on(day("2026-03-10")).len(), 2);
}

#[tokio::test]
async fn slot_claims_reject_the_stale_racer() {
    let club = Club::open(true).await;
    let first = assert_ok!(club.desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);

    let err = assert_err!(club.desk.submit(&member("m3", "Jo"), request("2026-03-03", "L1", None)).await);
    match err {
        BookingError::RaceLost { holder_id, .. } => assert_eq!(holder_id, first.id),
        other => panic!("unexpected: {other}"),
    }

    let (alex, sam) = (member("m1", "Alex"), member("m2", "Sam"));
    let (a, b) = futures::join!(
        club.desk.submit(&alex, request("2026-03-10", "L7", None)),
        club.desk.submit(&sam, request("2026-03-10", "L7", None)),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
}

// ── Resolver against the store directly ──────────────────────

#[tokio::test]
async fn commit_twice_with_same_id_is_one_document() {
    let club = Club::open(false).await;
    let draft = ReservationDraft {
        id: Some("fixed-id".into()),
        date: day("2026-03-03"),
        table_id: Some("S1".into()),
        terrain_id: None,
        member_id: "m1".into(),
        member_name: "Alex".into(),
        game_system: "Blood Bowl".into(),
        player_count: 2,
        status: None,
    };
    assert_ok!(resolver::commit(club.engine.as_ref(), draft.clone()).await);
    assert_ok!(resolver::commit(club.engine.as_ref(), draft).await);

    let all = club.engine.reservations(&ReservationFilter::default());
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "fixed-id");
}

#[tokio::test]
async fn commit_through_trait_object() {
    let club = Club::open(false).await;
    let store: Arc<dyn DocumentStore> = club.engine.clone();
    let draft = ReservationDraft {
        id: None,
        date: day("2026-03-17"),
        table_id: Some("S3".into()),
        terrain_id: Some(String::new()),
        member_id: "m1".into(),
        member_name: "Alex".into(),
        game_system: "  Infinity ".into(),
        player_count: 2,
        status: None,
    };
    let r = assert_ok!(resolver::commit(store.as_ref(), draft).await);
    assert_eq!(r.terrain_id, None);
    assert_eq!(r.game_system, "Infinity");
    assert_ok!(resolver::cancel(store.as_ref(), &r.id, "m1").await);
}

// ── Live sync ────────────────────────────────────────────────

#[tokio::test]
async fn context_follows_store_through_sync_task() {
    let engine = Arc::new(Engine::open(journal_path(), EngineOptions::default()).unwrap());
    inventory::seed_if_empty(&engine, &Inventory::club_default()).await.unwrap();
    let ctx = AppContext::new(CadenceRule::default(), Some(library()), before_opening()).shared();
    tokio::spawn(context::run_sync_with_clock(
        ctx.clone(),
        ContextFeeds::from_hub(&engine.hub),
        before_opening,
    ));
    let desk = BookingDesk::new(engine.clone(), ctx.clone());

    let wait_for = |pred: fn(&AppContext) -> bool| {
        let ctx = ctx.clone();
        async move {
            for _ in 0..100 {
                if pred(&*ctx.read().await) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            false
        }
    };

    assert!(wait_for(|c| c.tables().len() == 22).await);
    assert_ok!(desk.submit(&member("m1", "Alex"), request("2026-03-03", "L1", None)).await);
    assert!(wait_for(|c| !c.availability("2026-03-03".parse().unwrap(), None).is_table_free("L1")).await);

    engine.cancel_date("2026-03-10".parse().unwrap()).await.unwrap();
    assert!(wait_for(|c| !c.is_bookable("2026-03-10".parse().unwrap())).await);
}

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::*;

const IMAGE_BASE: &str = "/images/terrain";

/// Tables, terrain and the game-system catalogue to load into an empty store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub terrain: Vec<TerrainBox>,
    #[serde(default)]
    pub game_systems: Vec<String>,
}

impl Inventory {
    /// The club's stock: 16 large and 6 small tables, 22 terrain boxes, and
    /// the games regularly played on club night.
    pub fn club_default() -> Self {
        Self {
            tables: default_tables(),
            terrain: default_terrain(),
            game_systems: default_game_systems(),
        }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

pub fn default_tables() -> Vec<Table> {
    let large = (1..=16).map(|i| Table {
        id: format!("L{i}"),
        name: format!("Large Table {i}"),
        size: TableSize::Large,
    });
    let small = (1..=6).map(|i| Table {
        id: format!("S{i}"),
        name: format!("Small Table {i}"),
        size: TableSize::Small,
    });
    large.chain(small).collect()
}

fn terrain_box(id: &str, name: &str, category: TerrainCategory, image: &str) -> TerrainBox {
    TerrainBox {
        id: id.into(),
        name: name.into(),
        category,
        image_url: format!("{IMAGE_BASE}/{image}"),
        uploaded_image_url: None,
        disabled: false,
    }
}

pub fn default_terrain() -> Vec<TerrainBox> {
    use TerrainCategory::*;

    let mut boxes: Vec<TerrainBox> = (1..=10)
        .map(|i| {
            // Box 4's photo was uploaded with a different case.
            let image = if i == 4 { "Scifi4.jpg".to_string() } else { format!("SciFi{i}.jpg") };
            terrain_box(&format!("SCIFI-{i}"), &format!("Sci-Fi Box {i}"), SciFi, &image)
        })
        .collect();
    boxes.extend([
        terrain_box("HIST-1", "Historical Box 1", Historical, "Historical!.jpg"),
        terrain_box("HIST-2", "Historical Box 2", Historical, "Historical2.jpg"),
        terrain_box("HIST-3", "Historical Box 3", Historical, "Historical3.jpg"),
        terrain_box("HIST-4", "Historical Box 4", Historical, "Historical4.jpg"),
        terrain_box("FANT-1", "Fantasy Box 1", Fantasy, "Fantasy1.jpg"),
        terrain_box("FANT-2", "Fantasy Box 2", Fantasy, "Fantasy2.jpg"),
        terrain_box("AOS-1", "AoS Box 1", AgeOfSigmar, "AoS_01.jpg"),
        terrain_box("AOS-2", "AoS Box 2", AgeOfSigmar, "AoS_02.jpg"),
        terrain_box("40K-1", "40k Comp Box 1", Warhammer40k, "40kComp1.jpg"),
        terrain_box("40K-2", "40k Comp Box 2", Warhammer40k, "40kComp2.jpg"),
        terrain_box("HILLS-1", "Hills Box 1", Fantasy, "Hills.jpg"),
        terrain_box("POSTAPOC-1", "Post-Apoc Box 1", SciFi, "PostApoc1.jpg"),
    ]);
    boxes
}

pub fn default_game_systems() -> Vec<String> {
    [
        "Warhammer 40,000",
        "Age of Sigmar",
        "Blood Bowl",
        "The Old World",
        "Heresy",
        "Kill Team",
        "Necromunda",
        "Middle Earth",
        "Warcry",
        "Malifaux",
        "BattleTech",
        "Infinity",
        "Zeo Genesis",
        "A Song of Ice and Fire",
        "OPR Sci Fi",
        "OPR Fantasy",
        "Untitled Pirate Game",
        "Frostgrave",
        "Stargrave",
        "Silver Bayonet",
        "Bolt Action",
        "Lion Rampant",
        "Pillage",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// "16 6x4, 6 3x4"
fn table_breakdown(tables: &[Table]) -> String {
    [TableSize::Large, TableSize::Small]
        .into_iter()
        .map(|size| format!("{} {}", tables.iter().filter(|t| t.size == size).count(), size.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// "Sci-Fi 11, Historical 4, ..." for categories present in `terrain`.
fn terrain_breakdown(terrain: &[TerrainBox]) -> String {
    use TerrainCategory::*;

    [SciFi, Historical, Fantasy, AgeOfSigmar, Warhammer40k]
        .into_iter()
        .filter_map(|category| {
            let n = terrain.iter().filter(|t| t.category == category).count();
            (n > 0).then(|| format!("{} {n}", category.label()))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write `inventory` into the store. Tables and terrain are written only when
/// the store holds neither yet; the game-system catalogue only when it is
/// empty. Returns how many documents were written.
pub async fn seed_if_empty(engine: &Engine, inventory: &Inventory) -> Result<usize, EngineError> {
    let mut written = 0;

    if !engine.has_inventory() {
        for table in &inventory.tables {
            engine.put_table(table.clone()).await?;
        }
        for terrain in &inventory.terrain {
            engine.put_terrain(terrain.clone()).await?;
        }
        written += inventory.tables.len() + inventory.terrain.len();
        info!(
            "seeded {} tables ({}) and {} terrain boxes ({})",
            inventory.tables.len(),
            table_breakdown(&inventory.tables),
            inventory.terrain.len(),
            terrain_breakdown(&inventory.terrain)
        );
    }

    if engine.game_systems().is_empty() && !inventory.game_systems.is_empty() {
        for name in &inventory.game_systems {
            engine.put_game_system(name).await?;
        }
        written += inventory.game_systems.len();
        info!("seeded {} game systems", inventory.game_systems.len());
    }

    Ok(written)
}

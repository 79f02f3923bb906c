use serde::{Deserialize, Serialize};

use crate::entities::character::{Abilities, Affect, ArmorClass, WearLocation};
use crate::entities::object::ObjectKind;
use crate::world::room::Vnum;

/// Persisted form of a player. Objects are stored flat; `Placement::Inside`
/// points at the `slot` of an earlier entry in the same list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub gold: i64,
    #[serde(default = "default_hit")]
    pub hit: i32,
    #[serde(default = "default_hit")]
    pub max_hit: i32,
    #[serde(default)]
    pub hitroll: i32,
    #[serde(default)]
    pub damroll: i32,
    #[serde(default)]
    pub abilities: Abilities,
    #[serde(default)]
    pub armor: ArmorClass,
    #[serde(default)]
    pub room: Option<Vnum>,
    #[serde(default)]
    pub affects: Vec<Affect>,
    #[serde(default)]
    pub objects: Vec<SavedObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum Placement {
    Inventory,
    Worn { location: WearLocation },
    Inside { container: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedObject {
    pub slot: u32,
    pub placement: Placement,
    #[serde(default)]
    pub prototype: Option<Vnum>,
    pub keywords: String,
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    pub kind: ObjectKind,
    #[serde(default)]
    pub weight: u32,
}

fn default_level() -> i32 {
    1
}

fn default_hit() -> i32 {
    20
}

impl CharacterRecord {
    /// Minimal record for a freshly created character.
    pub fn new(name: &str, password: String) -> Self {
        Self {
            name: name.to_string(),
            password,
            level: default_level(),
            experience: 0,
            gold: 0,
            hit: default_hit(),
            max_hit: default_hit(),
            hitroll: 0,
            damroll: 0,
            abilities: Abilities::default(),
            armor: ArmorClass::default(),
            room: None,
            affects: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

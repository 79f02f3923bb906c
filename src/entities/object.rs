use serde::{Deserialize, Serialize};

use crate::entities::character::{CharacterId, WearLocation};
use crate::world::room::Vnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectKind {
    Weapon { num_dice: u32, size_dice: u32 },
    Armor { armor: i32 },
    Container { capacity: u32 },
    Corpse { npc: bool },
    Money { amount: i64 },
    Light,
    Trinket,
}

impl ObjectKind {
    pub fn holds_contents(&self) -> bool {
        matches!(self, ObjectKind::Container { .. } | ObjectKind::Corpse { .. })
    }
}

/// Where an object lives; a back-reference resolved through the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    Nowhere,
    Room(Vnum),
    Carried(CharacterId),
    Worn(CharacterId, WearLocation),
    Inside(ObjectId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub id: ObjectId,
    pub prototype: Option<Vnum>,
    pub keywords: String,
    pub short_description: String,
    pub long_description: String,
    pub kind: ObjectKind,
    pub weight: u32,
    pub location: ObjectLocation,
    pub contents: Vec<ObjectId>,
}

impl Object {
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_ascii_lowercase();
        !keyword.is_empty()
            && self
                .keywords
                .split_whitespace()
                .any(|word| word.to_ascii_lowercase().starts_with(&keyword))
    }

    pub fn weapon_dice(&self) -> Option<(u32, u32)> {
        match self.kind {
            ObjectKind::Weapon {
                num_dice,
                size_dice,
            } => Some((num_dice, size_dice)),
            _ => None,
        }
    }
}

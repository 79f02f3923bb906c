use serde::{Deserialize, Serialize};

use crate::entities::object::ObjectId;
use crate::world::room::Vnum;

pub const LEVEL_IMMORTAL: i32 = 51;
pub const WEAR_SLOTS: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(pub u32);

/// Ordered from worst to best; "below fighting" means unable to attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Dead,
    Incapacitated,
    Stunned,
    Sleeping,
    Resting,
    Sitting,
    Fighting,
    Standing,
}

impl Position {
    pub fn rank(self) -> i32 {
        self as i32
    }

    pub fn label(self) -> &'static str {
        match self {
            Position::Dead => "dead",
            Position::Incapacitated => "incapacitated",
            Position::Stunned => "stunned",
            Position::Sleeping => "sleeping",
            Position::Resting => "resting",
            Position::Sitting => "sitting",
            Position::Fighting => "fighting",
            Position::Standing => "standing",
        }
    }

    pub fn is_awake(self) -> bool {
        self > Position::Sleeping
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Abilities {
    pub strength: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub charisma: i32,
}

impl Default for Abilities {
    fn default() -> Self {
        Self {
            strength: 13,
            intelligence: 13,
            wisdom: 13,
            dexterity: 13,
            constitution: 13,
            charisma: 13,
        }
    }
}

/// One armor value per body facing; the first entry is the one combat reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmorClass(pub [i32; 3]);

impl ArmorClass {
    pub fn uniform(value: i32) -> Self {
        Self([value; 3])
    }

    pub fn base(&self) -> i32 {
        self.0[0]
    }

    fn adjust(&mut self, delta: i32) {
        for value in &mut self.0 {
            *value += delta;
        }
    }
}

impl Default for ArmorClass {
    fn default() -> Self {
        Self::uniform(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WearLocation {
    Light,
    FingerRight,
    FingerLeft,
    NeckOne,
    NeckTwo,
    Body,
    Head,
    Legs,
    Feet,
    Hands,
    Arms,
    Shield,
    About,
    Waist,
    WristRight,
    WristLeft,
    Wield,
    Hold,
}

impl WearLocation {
    pub const ALL: [WearLocation; WEAR_SLOTS] = [
        WearLocation::Light,
        WearLocation::FingerRight,
        WearLocation::FingerLeft,
        WearLocation::NeckOne,
        WearLocation::NeckTwo,
        WearLocation::Body,
        WearLocation::Head,
        WearLocation::Legs,
        WearLocation::Feet,
        WearLocation::Hands,
        WearLocation::Arms,
        WearLocation::Shield,
        WearLocation::About,
        WearLocation::Waist,
        WearLocation::WristRight,
        WearLocation::WristLeft,
        WearLocation::Wield,
        WearLocation::Hold,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            WearLocation::Light => "<used as light>",
            WearLocation::FingerRight | WearLocation::FingerLeft => "<worn on finger>",
            WearLocation::NeckOne | WearLocation::NeckTwo => "<worn around neck>",
            WearLocation::Body => "<worn on body>",
            WearLocation::Head => "<worn on head>",
            WearLocation::Legs => "<worn on legs>",
            WearLocation::Feet => "<worn on feet>",
            WearLocation::Hands => "<worn on hands>",
            WearLocation::Arms => "<worn on arms>",
            WearLocation::Shield => "<worn as shield>",
            WearLocation::About => "<worn about body>",
            WearLocation::Waist => "<worn about waist>",
            WearLocation::WristRight | WearLocation::WristLeft => "<worn around wrist>",
            WearLocation::Wield => "<wielded>",
            WearLocation::Hold => "<held>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectLocation {
    HitRoll,
    DamRoll,
    Armor,
    Strength,
    Dexterity,
    MaxHit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affect {
    pub name: String,
    pub location: AffectLocation,
    pub modifier: i32,
    /// Remaining affect pulses.
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub npc: bool,
    pub prototype: Option<Vnum>,
    pub keywords: String,
    pub short_description: String,
    pub long_description: String,
    pub password: String,
    pub level: i32,
    pub experience: i64,
    pub gold: i64,
    pub hit: i32,
    pub max_hit: i32,
    pub hitroll: i32,
    pub damroll: i32,
    pub abilities: Abilities,
    pub armor: ArmorClass,
    pub position: Position,
    pub room: Option<Vnum>,
    pub home_room: Option<Vnum>,
    pub fighting: Option<CharacterId>,
    pub equipment: [Option<ObjectId>; WEAR_SLOTS],
    pub inventory: Vec<ObjectId>,
    pub affects: Vec<Affect>,
    pub aggressive: bool,
    pub sentinel: bool,
}

impl Character {
    pub fn new_player(id: CharacterId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            npc: false,
            prototype: None,
            keywords: name.to_ascii_lowercase(),
            short_description: name.to_string(),
            long_description: format!("{} is standing here.", name),
            password: String::new(),
            level: 1,
            experience: 0,
            gold: 0,
            hit: 20,
            max_hit: 20,
            hitroll: 0,
            damroll: 0,
            abilities: Abilities::default(),
            armor: ArmorClass::default(),
            position: Position::Standing,
            room: None,
            home_room: None,
            fighting: None,
            equipment: [None; WEAR_SLOTS],
            inventory: Vec::new(),
            affects: Vec::new(),
            aggressive: false,
            sentinel: false,
        }
    }

    pub fn is_npc(&self) -> bool {
        self.npc
    }

    /// Name as seen by others: short description for NPCs.
    pub fn display_name(&self) -> &str {
        if self.npc {
            &self.short_description
        } else {
            &self.name
        }
    }

    pub fn equipped(&self, location: WearLocation) -> Option<ObjectId> {
        self.equipment[location.index()]
    }

    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let keyword = keyword.to_ascii_lowercase();
        if keyword.is_empty() {
            return false;
        }
        if !self.npc {
            return self.name.to_ascii_lowercase().starts_with(&keyword);
        }
        self.keywords
            .split_whitespace()
            .any(|word| word.to_ascii_lowercase().starts_with(&keyword))
    }

    pub fn apply_affect(&mut self, affect: Affect) {
        self.modify(affect.location, affect.modifier);
        self.affects.push(affect);
    }

    /// Drops one pulse from every affect and returns the ones that ran out.
    pub fn tick_affects(&mut self) -> Vec<Affect> {
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.affects.len());
        for mut affect in std::mem::take(&mut self.affects) {
            affect.duration = affect.duration.saturating_sub(1);
            if affect.duration == 0 {
                expired.push(affect);
            } else {
                kept.push(affect);
            }
        }
        self.affects = kept;
        for affect in &expired {
            self.modify(affect.location, -affect.modifier);
        }
        expired
    }

    fn modify(&mut self, location: AffectLocation, delta: i32) {
        match location {
            AffectLocation::HitRoll => self.hitroll += delta,
            AffectLocation::DamRoll => self.damroll += delta,
            AffectLocation::Armor => self.armor.adjust(delta),
            AffectLocation::Strength => self.abilities.strength += delta,
            AffectLocation::Dexterity => self.abilities.dexterity += delta,
            AffectLocation::MaxHit => {
                self.max_hit = (self.max_hit + delta).max(1);
                self.hit = self.hit.min(self.max_hit);
            }
        }
    }
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

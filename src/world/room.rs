use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::entities::character::CharacterId;
use crate::entities::object::ObjectId;

/// Virtual number: the stable identifier world files use for rooms and prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vnum(pub u32);

impl fmt::Display for Vnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(word: &str) -> Option<Self> {
        let word = word.to_ascii_lowercase();
        if word.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|direction| direction.name().starts_with(&word))
    }
}

/// Static topology plus the live occupant and object sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub vnum: Vnum,
    pub name: String,
    pub description: String,
    pub exits: BTreeMap<Direction, Vnum>,
    pub outdoors: bool,
    pub peaceful: bool,
    pub occupants: Vec<CharacterId>,
    pub objects: Vec<ObjectId>,
}

impl Room {
    pub fn new(vnum: Vnum, name: impl Into<String>) -> Self {
        Self {
            vnum,
            name: name.into(),
            description: String::new(),
            exits: BTreeMap::new(),
            outdoors: false,
            peaceful: false,
            occupants: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn exit_names(&self) -> String {
        if self.exits.is_empty() {
            return "None".to_string();
        }
        self.exits
            .keys()
            .map(|direction| direction.name())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

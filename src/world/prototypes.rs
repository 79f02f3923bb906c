use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::entities::character::{Abilities, WearLocation};
use crate::entities::dice::DiceSpec;
use crate::entities::object::ObjectKind;
use crate::world::room::{Direction, Vnum};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomData {
    pub vnum: Vnum,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exits: BTreeMap<Direction, Vnum>,
    #[serde(default)]
    pub outdoors: bool,
    #[serde(default)]
    pub peaceful: bool,
}

impl RoomData {
    fn placeholder(vnum: Vnum) -> Self {
        Self {
            vnum,
            name: "An Unfinished Room".to_string(),
            description: "You are in an unfinished room.".to_string(),
            exits: BTreeMap::new(),
            outdoors: false,
            peaceful: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobilePrototype {
    pub vnum: Vnum,
    pub keywords: String,
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default = "default_level")]
    pub level: i32,
    #[serde(default)]
    pub hitroll: i32,
    #[serde(default)]
    pub damroll: i32,
    #[serde(default = "default_armor")]
    pub armor: i32,
    #[serde(default)]
    pub hit_dice: DiceSpec,
    /// Natural attack dice; zero falls back to the hit dice.
    #[serde(default)]
    pub damage_dice: DiceSpec,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub gold: i64,
    #[serde(default)]
    pub abilities: Abilities,
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default)]
    pub sentinel: bool,
}

impl MobilePrototype {
    fn placeholder(vnum: Vnum) -> Self {
        Self {
            vnum,
            keywords: "blob placeholder".to_string(),
            short_description: "a shapeless blob".to_string(),
            long_description: "A shapeless blob waits to be finished.".to_string(),
            level: 1,
            hitroll: 0,
            damroll: 0,
            armor: default_armor(),
            hit_dice: DiceSpec::new(1, 8, 1),
            damage_dice: DiceSpec::new(1, 4, 0),
            experience: 1,
            gold: 0,
            abilities: Abilities::default(),
            aggressive: false,
            sentinel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPrototype {
    pub vnum: Vnum,
    pub keywords: String,
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    #[serde(default = "default_object_kind")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub weight: u32,
}

impl ObjectPrototype {
    fn placeholder(vnum: Vnum) -> Self {
        Self {
            vnum,
            keywords: "trinket placeholder".to_string(),
            short_description: "a dull trinket".to_string(),
            long_description: "A dull trinket lies here.".to_string(),
            kind: ObjectKind::Trinket,
            weight: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipSpawn {
    pub object: Vnum,
    pub location: WearLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileSpawn {
    pub mobile: Vnum,
    pub room: Vnum,
    #[serde(default = "default_max")]
    pub max: u32,
    #[serde(default)]
    pub equipment: Vec<EquipSpawn>,
    #[serde(default)]
    pub inventory: Vec<Vnum>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpawn {
    pub object: Vnum,
    pub room: Vnum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneData {
    pub vnum: Vnum,
    pub name: String,
    /// Minutes between resets.
    #[serde(default = "default_lifespan")]
    pub lifespan: u32,
    #[serde(default)]
    pub mobiles: Vec<MobileSpawn>,
    #[serde(default)]
    pub objects: Vec<ObjectSpawn>,
}

fn default_level() -> i32 {
    1
}

fn default_armor() -> i32 {
    100
}

fn default_max() -> u32 {
    1
}

fn default_lifespan() -> u32 {
    15
}

fn default_object_kind() -> ObjectKind {
    ObjectKind::Trinket
}

/// Identifier-keyed registries, read-only once the world is running.
#[derive(Debug, Clone, Default)]
pub struct WorldData {
    pub start_room: Option<Vnum>,
    pub rooms: Vec<RoomData>,
    pub mobiles: BTreeMap<Vnum, MobilePrototype>,
    pub objects: BTreeMap<Vnum, ObjectPrototype>,
    pub zones: Vec<ZoneData>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub rooms: usize,
    pub mobiles: usize,
    pub objects: usize,
    pub zones: usize,
    pub placeholders: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWorld {
    start_room: Option<Vnum>,
    rooms: Vec<Value>,
    mobiles: Vec<Value>,
    objects: Vec<Value>,
    zones: Vec<Value>,
}

impl WorldData {
    pub fn load(path: &Path) -> Result<(Self, LoadReport), String> {
        let text = fs::read_to_string(path)
            .map_err(|err| format!("world read failed for {}: {}", path.display(), err))?;
        Self::from_yaml_str(&text)
            .map_err(|err| format!("world parse failed for {}: {}", path.display(), err))
    }

    pub fn from_yaml_str(text: &str) -> Result<(Self, LoadReport), String> {
        let raw: RawWorld = serde_yaml::from_str(text).map_err(|err| err.to_string())?;
        let mut report = LoadReport::default();
        let mut data = WorldData {
            start_room: raw.start_room,
            ..WorldData::default()
        };

        for value in raw.rooms {
            if let Some(room) = decode_record("room", value, RoomData::placeholder, &mut report) {
                data.rooms.push(room);
                report.rooms += 1;
            }
        }
        for value in raw.mobiles {
            if let Some(mobile) =
                decode_record("mobile", value, MobilePrototype::placeholder, &mut report)
            {
                data.mobiles.insert(mobile.vnum, mobile);
                report.mobiles += 1;
            }
        }
        for value in raw.objects {
            if let Some(object) =
                decode_record("object", value, ObjectPrototype::placeholder, &mut report)
            {
                data.objects.insert(object.vnum, object);
                report.objects += 1;
            }
        }
        for value in raw.zones {
            let vnum = record_vnum(&value);
            match serde_yaml::from_value::<ZoneData>(value) {
                Ok(zone) => {
                    data.zones.push(zone);
                    report.zones += 1;
                }
                Err(err) => {
                    // An empty zone would reset nothing, so there is no placeholder.
                    warn!(?vnum, error = %err, "skipping malformed zone");
                    report.skipped.push(format!("zone {:?}: {}", vnum, err));
                }
            }
        }
        Ok((data, report))
    }
}

fn record_vnum(value: &Value) -> Option<Vnum> {
    value
        .get("vnum")
        .and_then(Value::as_u64)
        .and_then(|vnum| u32::try_from(vnum).ok())
        .map(Vnum)
}

fn decode_record<T: DeserializeOwned>(
    label: &str,
    value: Value,
    placeholder: fn(Vnum) -> T,
    report: &mut LoadReport,
) -> Option<T> {
    let vnum = record_vnum(&value);
    match serde_yaml::from_value::<T>(value) {
        Ok(record) => Some(record),
        Err(err) => match vnum {
            Some(vnum) => {
                warn!(kind = label, %vnum, error = %err, "malformed record, using placeholder");
                report
                    .placeholders
                    .push(format!("{} {}: {}", label, vnum, err));
                Some(placeholder(vnum))
            }
            None => {
                warn!(kind = label, error = %err, "record without vnum skipped");
                report.skipped.push(format!("{} without vnum: {}", label, err));
                None
            }
        },
    }
}

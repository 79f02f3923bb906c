use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use crate::entities::character::{
    capitalize, ArmorClass, Character, CharacterId, Position, WearLocation,
};
use crate::entities::object::{Object, ObjectId, ObjectKind, ObjectLocation};
use crate::world::cron::CronSystem;
use crate::world::prototypes::{MobilePrototype, ObjectPrototype, WorldData, ZoneData};
use crate::world::room::{Room, Vnum};
use crate::world::time::{GameTime, Weather};

pub const VOID_ROOM: Vnum = Vnum(0);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("no such room {0}")]
    NoSuchRoom(Vnum),
    #[error("no such character {0:?}")]
    NoSuchCharacter(CharacterId),
    #[error("no such object {0:?}")]
    NoSuchObject(ObjectId),
    #[error("no such prototype {0}")]
    NoSuchPrototype(Vnum),
    #[error("wear location {0:?} is already in use")]
    SlotTaken(WearLocation),
    #[error("object {0:?} cannot hold other objects")]
    NotAContainer(ObjectId),
    #[error("{0} is already in the game")]
    AlreadyInGame(String),
}

/// Text queued for a player's session; flushed by the scheduler after each handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: CharacterId,
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ZoneState {
    pub data: ZoneData,
    /// Minutes since the last reset.
    pub age: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRespawn {
    pub mobile: Vnum,
    pub room: Vnum,
}

/// The World State Store: rooms plus the arena of live characters and objects.
/// Every cross-entity link is an identifier resolved through this arena.
#[derive(Debug)]
pub struct WorldState {
    pub rooms: BTreeMap<Vnum, Room>,
    pub mobiles: BTreeMap<Vnum, MobilePrototype>,
    pub object_prototypes: BTreeMap<Vnum, ObjectPrototype>,
    pub zones: Vec<ZoneState>,
    pub start_room: Vnum,
    pub time: GameTime,
    pub weather: Weather,
    pub(crate) corpse_timers: CronSystem<ObjectId>,
    pub(crate) respawn_timers: CronSystem<u32>,
    pub(crate) pending_respawns: HashMap<u32, PendingRespawn>,
    characters: HashMap<CharacterId, Character>,
    objects: HashMap<ObjectId, Object>,
    player_index: HashMap<String, CharacterId>,
    next_character_id: u32,
    next_object_id: u32,
    next_respawn_id: u32,
    uptime: u64,
    deliveries: Vec<Delivery>,
    shutdown_requested: bool,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(VOID_ROOM)
    }
}

impl WorldState {
    /// An empty world holding only its start room.
    pub fn new(start_room: Vnum) -> Self {
        let mut rooms = BTreeMap::new();
        let mut room = Room::new(start_room, "The Void");
        room.description = "You float in a formless void.".to_string();
        rooms.insert(start_room, room);
        Self {
            rooms,
            mobiles: BTreeMap::new(),
            object_prototypes: BTreeMap::new(),
            zones: Vec::new(),
            start_room,
            time: GameTime::default(),
            weather: Weather::default(),
            corpse_timers: CronSystem::new(),
            respawn_timers: CronSystem::new(),
            pending_respawns: HashMap::new(),
            characters: HashMap::new(),
            objects: HashMap::new(),
            player_index: HashMap::new(),
            next_character_id: 1,
            next_object_id: 1,
            next_respawn_id: 1,
            uptime: 0,
            deliveries: Vec::new(),
            shutdown_requested: false,
        }
    }

    pub fn from_data(data: WorldData, start_override: Option<Vnum>) -> Self {
        let first_room = data.rooms.first().map(|room| room.vnum);
        let start_room = start_override
            .or(data.start_room)
            .or(first_room)
            .unwrap_or(VOID_ROOM);
        let mut world = Self::new(start_room);
        if !data.rooms.is_empty() {
            world.rooms.clear();
        }
        for room_data in data.rooms {
            let mut room = Room::new(room_data.vnum, room_data.name);
            room.description = room_data.description;
            room.exits = room_data.exits;
            room.outdoors = room_data.outdoors;
            room.peaceful = room_data.peaceful;
            world.rooms.insert(room.vnum, room);
        }
        if !world.rooms.contains_key(&world.start_room) {
            warn!(start_room = %world.start_room, "start room missing, adding a void room");
            world
                .rooms
                .insert(world.start_room, Room::new(world.start_room, "The Void"));
        }
        world.mobiles = data.mobiles;
        world.object_prototypes = data.objects;
        world.zones = data
            .zones
            .into_iter()
            .map(|data| ZoneState { data, age: 0 })
            .collect();
        for index in 0..world.zones.len() {
            world.reset_zone(index);
        }
        world
    }

    pub fn uptime(&self) -> u64 {
        self.uptime
    }

    pub fn set_uptime(&mut self, seconds: u64) {
        self.uptime = self.uptime.max(seconds);
    }

    pub fn room(&self, vnum: Vnum) -> Option<&Room> {
        self.rooms.get(&vnum)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn add_room(&mut self, room: Room) {
        self.rooms.insert(room.vnum, room);
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    pub fn contains_character(&self, id: CharacterId) -> bool {
        self.characters.contains_key(&id)
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// All live identifiers in ascending order, so pulse walks are deterministic.
    pub fn character_ids(&self) -> Vec<CharacterId> {
        let mut ids: Vec<CharacterId> = self.characters.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn player_ids(&self) -> Vec<CharacterId> {
        let mut ids: Vec<CharacterId> = self.player_index.values().copied().collect();
        ids.sort();
        ids
    }

    pub fn player_by_name(&self, name: &str) -> Option<CharacterId> {
        self.player_index.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn mobile_prototype(&self, vnum: Vnum) -> Option<&MobilePrototype> {
        self.mobiles.get(&vnum)
    }

    pub fn display_name(&self, id: CharacterId) -> String {
        self.characters
            .get(&id)
            .map(|ch| ch.display_name().to_string())
            .unwrap_or_else(|| "someone".to_string())
    }

    /// Adds a character to the arena without placing it in a room.
    pub fn insert_character(&mut self, mut character: Character) -> CharacterId {
        let id = CharacterId(self.next_character_id);
        self.next_character_id += 1;
        character.id = id;
        character.room = None;
        character.fighting = None;
        if !character.npc {
            self.player_index
                .insert(character.name.to_ascii_lowercase(), id);
        }
        self.characters.insert(id, character);
        id
    }

    pub fn add_player(&mut self, name: &str, room: Vnum) -> Result<CharacterId, WorldError> {
        if !self.rooms.contains_key(&room) {
            return Err(WorldError::NoSuchRoom(room));
        }
        let id = self.insert_character(Character::new_player(CharacterId(0), name));
        self.add_character_to_room(id, room)?;
        Ok(id)
    }

    pub fn spawn_mobile(&mut self, vnum: Vnum, room: Vnum) -> Result<CharacterId, WorldError> {
        if !self.rooms.contains_key(&room) {
            return Err(WorldError::NoSuchRoom(room));
        }
        let proto = self
            .mobiles
            .get(&vnum)
            .ok_or(WorldError::NoSuchPrototype(vnum))?;
        let hit_dice = proto.hit_dice;
        let average_hit =
            (hit_dice.count * (hit_dice.sides + 1) / 2) as i32 + hit_dice.bonus;
        let mut mobile = Character::new_player(CharacterId(0), &proto.keywords);
        mobile.npc = true;
        mobile.prototype = Some(vnum);
        mobile.keywords = proto.keywords.clone();
        mobile.short_description = proto.short_description.clone();
        mobile.long_description = proto.long_description.clone();
        mobile.level = proto.level;
        mobile.experience = proto.experience;
        mobile.gold = proto.gold;
        mobile.hit = average_hit.max(1);
        mobile.max_hit = mobile.hit;
        mobile.hitroll = proto.hitroll;
        mobile.damroll = proto.damroll;
        mobile.abilities = proto.abilities;
        mobile.armor = ArmorClass::uniform(proto.armor);
        mobile.aggressive = proto.aggressive;
        mobile.sentinel = proto.sentinel;
        mobile.home_room = Some(room);
        let id = self.insert_character(mobile);
        self.add_character_to_room(id, room)?;
        debug!(mobile = %vnum, room = %room, ?id, "mobile spawned");
        Ok(id)
    }

    pub fn add_character_to_room(&mut self, id: CharacterId, room: Vnum) -> Result<(), WorldError> {
        if !self.rooms.contains_key(&room) {
            return Err(WorldError::NoSuchRoom(room));
        }
        if !self.characters.contains_key(&id) {
            return Err(WorldError::NoSuchCharacter(id));
        }
        self.remove_character_from_room(id);
        if let Some(target) = self.rooms.get_mut(&room) {
            target.occupants.push(id);
        }
        if let Some(ch) = self.characters.get_mut(&id) {
            ch.room = Some(room);
        }
        Ok(())
    }

    pub fn remove_character_from_room(&mut self, id: CharacterId) -> Option<Vnum> {
        let room = self.characters.get_mut(&id)?.room.take()?;
        if let Some(occupied) = self.rooms.get_mut(&room) {
            occupied.occupants.retain(|occupant| *occupant != id);
        }
        Some(room)
    }

    pub fn characters_in_room(&self, room: Vnum) -> Vec<CharacterId> {
        self.rooms
            .get(&room)
            .map(|room| room.occupants.clone())
            .unwrap_or_default()
    }

    pub fn same_room(&self, a: CharacterId, b: CharacterId) -> bool {
        match (self.character(a), self.character(b)) {
            (Some(a), Some(b)) => a.room.is_some() && a.room == b.room,
            _ => false,
        }
    }

    pub fn find_character_in_room(
        &self,
        room: Vnum,
        keyword: &str,
        exclude: CharacterId,
    ) -> Option<CharacterId> {
        self.rooms.get(&room)?.occupants.iter().copied().find(|id| {
            *id != exclude
                && self
                    .characters
                    .get(id)
                    .map_or(false, |ch| ch.matches_keyword(keyword))
        })
    }

    pub fn count_mobiles_in_room(&self, vnum: Vnum, room: Vnum) -> usize {
        self.rooms.get(&room).map_or(0, |room| {
            room.occupants
                .iter()
                .filter_map(|id| self.characters.get(id))
                .filter(|ch| ch.npc && ch.prototype == Some(vnum))
                .count()
        })
    }

    /// Removes a character and everything it carries from the world.
    pub fn extract_character(&mut self, id: CharacterId) -> Option<Character> {
        self.remove_character_from_room(id);
        let carried: Vec<ObjectId> = {
            let ch = self.characters.get(&id)?;
            ch.inventory
                .iter()
                .copied()
                .chain(ch.equipment.iter().flatten().copied())
                .collect()
        };
        for object in carried {
            self.extract_object(object);
        }
        let ch = self.characters.remove(&id)?;
        if !ch.npc {
            let key = ch.name.to_ascii_lowercase();
            if self.player_index.get(&key) == Some(&id) {
                self.player_index.remove(&key);
            }
        }
        for other in self.characters.values_mut() {
            if other.fighting == Some(id) {
                other.fighting = None;
            }
        }
        Some(ch)
    }

    pub fn create_object(&mut self, vnum: Vnum) -> Result<ObjectId, WorldError> {
        let proto = self
            .object_prototypes
            .get(&vnum)
            .ok_or(WorldError::NoSuchPrototype(vnum))?
            .clone();
        let id = self.create_custom_object(
            proto.kind,
            &proto.keywords,
            &proto.short_description,
            &proto.long_description,
        );
        if let Some(object) = self.objects.get_mut(&id) {
            object.prototype = Some(vnum);
            object.weight = proto.weight;
        }
        Ok(id)
    }

    pub fn create_custom_object(
        &mut self,
        kind: ObjectKind,
        keywords: &str,
        short_description: &str,
        long_description: &str,
    ) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        self.objects.insert(
            id,
            Object {
                id,
                prototype: None,
                keywords: keywords.to_string(),
                short_description: short_description.to_string(),
                long_description: long_description.to_string(),
                kind,
                weight: 0,
                location: ObjectLocation::Nowhere,
                contents: Vec::new(),
            },
        );
        id
    }

    /// Moves an object to a new location, keeping both sides of the link in step.
    pub fn move_object(&mut self, id: ObjectId, to: ObjectLocation) -> Result<(), WorldError> {
        if !self.objects.contains_key(&id) {
            return Err(WorldError::NoSuchObject(id));
        }
        match to {
            ObjectLocation::Nowhere => {}
            ObjectLocation::Room(room) => {
                if !self.rooms.contains_key(&room) {
                    return Err(WorldError::NoSuchRoom(room));
                }
            }
            ObjectLocation::Carried(owner) => {
                if !self.characters.contains_key(&owner) {
                    return Err(WorldError::NoSuchCharacter(owner));
                }
            }
            ObjectLocation::Worn(owner, slot) => {
                let ch = self
                    .characters
                    .get(&owner)
                    .ok_or(WorldError::NoSuchCharacter(owner))?;
                if let Some(current) = ch.equipped(slot) {
                    if current != id {
                        return Err(WorldError::SlotTaken(slot));
                    }
                }
            }
            ObjectLocation::Inside(container) => {
                if container == id || self.is_inside(container, id) {
                    return Err(WorldError::NotAContainer(container));
                }
                let holder = self
                    .objects
                    .get(&container)
                    .ok_or(WorldError::NoSuchObject(container))?;
                if !holder.kind.holds_contents() {
                    return Err(WorldError::NotAContainer(container));
                }
            }
        }
        self.detach_object(id);
        match to {
            ObjectLocation::Nowhere => {}
            ObjectLocation::Room(room) => {
                if let Some(room) = self.rooms.get_mut(&room) {
                    room.objects.push(id);
                }
            }
            ObjectLocation::Carried(owner) => {
                if let Some(ch) = self.characters.get_mut(&owner) {
                    ch.inventory.push(id);
                }
            }
            ObjectLocation::Worn(owner, slot) => {
                if let Some(ch) = self.characters.get_mut(&owner) {
                    ch.equipment[slot.index()] = Some(id);
                }
            }
            ObjectLocation::Inside(container) => {
                if let Some(holder) = self.objects.get_mut(&container) {
                    holder.contents.push(id);
                }
            }
        }
        if let Some(object) = self.objects.get_mut(&id) {
            object.location = to;
        }
        Ok(())
    }

    fn is_inside(&self, object: ObjectId, ancestor: ObjectId) -> bool {
        let mut current = self.objects.get(&object).map(|o| o.location);
        while let Some(ObjectLocation::Inside(parent)) = current {
            if parent == ancestor {
                return true;
            }
            current = self.objects.get(&parent).map(|o| o.location);
        }
        false
    }

    fn detach_object(&mut self, id: ObjectId) {
        let Some(location) = self.objects.get(&id).map(|object| object.location) else {
            return;
        };
        match location {
            ObjectLocation::Nowhere => {}
            ObjectLocation::Room(room) => {
                if let Some(room) = self.rooms.get_mut(&room) {
                    room.objects.retain(|object| *object != id);
                }
            }
            ObjectLocation::Carried(owner) => {
                if let Some(ch) = self.characters.get_mut(&owner) {
                    ch.inventory.retain(|object| *object != id);
                }
            }
            ObjectLocation::Worn(owner, slot) => {
                if let Some(ch) = self.characters.get_mut(&owner) {
                    if ch.equipment[slot.index()] == Some(id) {
                        ch.equipment[slot.index()] = None;
                    }
                }
            }
            ObjectLocation::Inside(container) => {
                if let Some(holder) = self.objects.get_mut(&container) {
                    holder.contents.retain(|object| *object != id);
                }
            }
        }
        if let Some(object) = self.objects.get_mut(&id) {
            object.location = ObjectLocation::Nowhere;
        }
    }

    /// Destroys an object and everything inside it.
    pub fn extract_object(&mut self, id: ObjectId) {
        self.detach_object(id);
        let Some(object) = self.objects.remove(&id) else {
            return;
        };
        self.corpse_timers.stop(id, self.uptime);
        for inner in object.contents {
            if let Some(child) = self.objects.get_mut(&inner) {
                child.location = ObjectLocation::Nowhere;
            }
            self.extract_object(inner);
        }
    }

    /// Creates the victim's corpse in its room, moving inventory, equipment and gold into it.
    pub fn make_corpse(&mut self, victim: CharacterId, lifetime_secs: u64) -> Option<ObjectId> {
        let (room, name, npc, gold, carried) = {
            let ch = self.characters.get(&victim)?;
            let carried: Vec<ObjectId> = ch
                .inventory
                .iter()
                .copied()
                .chain(ch.equipment.iter().flatten().copied())
                .collect();
            (ch.room?, ch.display_name().to_string(), ch.npc, ch.gold, carried)
        };
        let keywords = format!("corpse {}", name.to_ascii_lowercase());
        let short = format!("the corpse of {}", name);
        let long = format!("The corpse of {} is lying here.", name);
        let corpse = self.create_custom_object(ObjectKind::Corpse { npc }, &keywords, &short, &long);
        for object in carried {
            if let Err(err) = self.move_object(object, ObjectLocation::Inside(corpse)) {
                warn!(?object, error = %err, "could not move item into corpse");
            }
        }
        if gold > 0 {
            let coins = self.create_custom_object(
                ObjectKind::Money { amount: gold },
                "coins gold",
                &format!("{} gold coins", gold),
                "A pile of gold coins is lying here.",
            );
            let _ = self.move_object(coins, ObjectLocation::Inside(corpse));
            if let Some(ch) = self.characters.get_mut(&victim) {
                ch.gold = 0;
            }
        }
        if let Err(err) = self.move_object(corpse, ObjectLocation::Room(room)) {
            warn!(error = %err, "could not place corpse");
            self.extract_object(corpse);
            return None;
        }
        self.corpse_timers.set(corpse, lifetime_secs, self.uptime);
        Some(corpse)
    }

    pub fn schedule_respawn(&mut self, mobile: Vnum, room: Vnum, delay_secs: u64) {
        let id = self.next_respawn_id;
        self.next_respawn_id += 1;
        self.pending_respawns.insert(id, PendingRespawn { mobile, room });
        self.respawn_timers.set(id, delay_secs, self.uptime);
    }

    pub fn pending_respawn_count(&self) -> usize {
        self.pending_respawns.len()
    }

    /// Death handling after the corpse is made: NPCs leave the world, players go to the start room.
    pub fn remove_character(&mut self, id: CharacterId) {
        let npc = match self.characters.get(&id) {
            Some(ch) => ch.npc,
            None => return,
        };
        if npc {
            self.extract_character(id);
        } else {
            let start = self.start_room;
            if let Err(err) = self.add_character_to_room(id, start) {
                warn!(?id, error = %err, "could not relocate dead player");
            }
        }
    }

    pub fn send(&mut self, to: CharacterId, text: impl Into<String>) {
        let Some(ch) = self.characters.get(&to) else {
            return;
        };
        if ch.npc {
            return;
        }
        self.deliveries.push(Delivery {
            to,
            name: ch.name.clone(),
            text: text.into(),
        });
    }

    /// Sends to every occupant of `room` except those listed.
    pub fn send_to_room(&mut self, room: Vnum, exclude: &[CharacterId], text: &str) {
        for occupant in self.characters_in_room(room) {
            if exclude.contains(&occupant) {
                continue;
            }
            let awake = self
                .characters
                .get(&occupant)
                .map_or(false, |ch| ch.position.is_awake());
            if awake {
                self.send(occupant, text);
            }
        }
    }

    pub fn send_to_all_players(&mut self, text: &str, outdoors_only: bool) {
        for id in self.player_ids() {
            let Some(ch) = self.characters.get(&id) else {
                continue;
            };
            if !ch.position.is_awake() {
                continue;
            }
            if outdoors_only {
                let outside = ch
                    .room
                    .and_then(|room| self.rooms.get(&room))
                    .map_or(false, |room| room.outdoors);
                if !outside {
                    continue;
                }
            }
            self.send(id, text);
        }
    }

    pub fn take_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn take_shutdown_request(&mut self) -> bool {
        std::mem::take(&mut self.shutdown_requested)
    }

    pub fn describe_room(&self, room: Vnum, viewer: CharacterId) -> String {
        let Some(place) = self.rooms.get(&room) else {
            return "You see nothing but swirling mist.".to_string();
        };
        let mut out = format!("{}\r\n{}\r\n[Exits: {}]", place.name, place.description, place.exit_names());
        for object in &place.objects {
            if let Some(object) = self.objects.get(object) {
                out.push_str("\r\n");
                out.push_str(&object.long_description);
            }
        }
        for occupant in &place.occupants {
            if *occupant == viewer {
                continue;
            }
            let Some(ch) = self.characters.get(occupant) else {
                continue;
            };
            out.push_str("\r\n");
            out.push_str(&describe_occupant(ch, self));
        }
        out
    }
}

fn describe_occupant(ch: &Character, world: &WorldState) -> String {
    let name = capitalize(ch.display_name());
    match ch.position {
        Position::Standing if ch.npc && !ch.long_description.is_empty() => {
            ch.long_description.clone()
        }
        Position::Fighting => match ch.fighting {
            Some(opponent) => format!("{} is here, fighting {}.", name, world.display_name(opponent)),
            None => format!("{} is here, fighting thin air.", name),
        },
        Position::Dead => format!("{} is lying here, dead.", name),
        position => format!("{} is {} here.", name, position.label()),
    }
}

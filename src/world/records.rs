use std::collections::HashMap;
use tracing::warn;

use crate::entities::character::{Character, CharacterId, Position, WearLocation};
use crate::entities::object::{ObjectId, ObjectLocation};
use crate::persistence::record::{CharacterRecord, Placement, SavedObject};
use crate::world::state::{WorldError, WorldState};

impl WorldState {
    /// Flattens a live player into its persisted form. Containers are always
    /// written before the objects inside them.
    pub fn snapshot_character(&self, id: CharacterId) -> Option<CharacterRecord> {
        let ch = self.character(id)?;
        let mut record = CharacterRecord::new(&ch.name, ch.password.clone());
        record.level = ch.level;
        record.experience = ch.experience;
        record.gold = ch.gold;
        record.hit = ch.hit;
        record.max_hit = ch.max_hit;
        record.hitroll = ch.hitroll;
        record.damroll = ch.damroll;
        record.abilities = ch.abilities;
        record.armor = ch.armor;
        record.room = ch.room;
        record.affects = ch.affects.clone();

        let mut roots: Vec<(ObjectId, Placement)> = ch
            .inventory
            .iter()
            .map(|object| (*object, Placement::Inventory))
            .collect();
        for location in WearLocation::ALL {
            if let Some(object) = ch.equipped(location) {
                roots.push((object, Placement::Worn { location }));
            }
        }
        for (object, placement) in roots {
            self.flatten_object(object, placement, &mut record.objects);
        }
        Some(record)
    }

    fn flatten_object(&self, id: ObjectId, placement: Placement, out: &mut Vec<SavedObject>) {
        let Some(object) = self.object(id) else {
            return;
        };
        let slot = out.len() as u32;
        out.push(SavedObject {
            slot,
            placement,
            prototype: object.prototype,
            keywords: object.keywords.clone(),
            short_description: object.short_description.clone(),
            long_description: object.long_description.clone(),
            kind: object.kind.clone(),
            weight: object.weight,
        });
        for inner in &object.contents {
            self.flatten_object(*inner, Placement::Inside { container: slot }, out);
        }
    }

    /// Rehydrates a record into the arena and places the character in its saved
    /// room, or the start room when that room no longer exists.
    pub fn enter_game(&mut self, record: CharacterRecord) -> Result<CharacterId, WorldError> {
        if self.player_by_name(&record.name).is_some() {
            return Err(WorldError::AlreadyInGame(record.name));
        }
        let mut ch = Character::new_player(CharacterId(0), &record.name);
        ch.password = record.password;
        ch.level = record.level;
        ch.experience = record.experience;
        ch.gold = record.gold;
        ch.max_hit = record.max_hit.max(1);
        ch.hit = record.hit.clamp(1, ch.max_hit);
        ch.hitroll = record.hitroll;
        ch.damroll = record.damroll;
        ch.abilities = record.abilities;
        ch.armor = record.armor;
        // Saved stats already include the affect modifiers.
        ch.affects = record.affects;
        ch.position = Position::Standing;
        let room = record
            .room
            .filter(|room| self.rooms.contains_key(room))
            .unwrap_or(self.start_room);
        let id = self.insert_character(ch);

        let mut slots: HashMap<u32, ObjectId> = HashMap::new();
        for saved in record.objects {
            let object = self.create_custom_object(
                saved.kind,
                &saved.keywords,
                &saved.short_description,
                &saved.long_description,
            );
            if let Some(live) = self.object_mut(object) {
                live.prototype = saved.prototype;
                live.weight = saved.weight;
            }
            if slots.insert(saved.slot, object).is_some() {
                warn!(name = %self.display_name(id), slot = saved.slot, "duplicate object slot in record");
            }
            let target = match saved.placement {
                Placement::Inventory => ObjectLocation::Carried(id),
                Placement::Worn { location } => ObjectLocation::Worn(id, location),
                Placement::Inside { container } => match slots.get(&container) {
                    Some(parent) if *parent != object => ObjectLocation::Inside(*parent),
                    _ => ObjectLocation::Carried(id),
                },
            };
            if self.move_object(object, target).is_err() {
                // Occupied slot or a parent that cannot hold things: keep the item.
                self.move_object(object, ObjectLocation::Carried(id))?;
            }
        }

        self.add_character_to_room(id, room)?;
        Ok(id)
    }

    /// Snapshots and removes a player; the caller persists the record.
    pub fn leave_game(&mut self, id: CharacterId) -> Option<CharacterRecord> {
        let record = self.snapshot_character(id)?;
        self.extract_character(id);
        Some(record)
    }
}

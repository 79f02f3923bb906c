use tracing::{debug, info, warn};

use crate::entities::character::{capitalize, CharacterId, Position};
use crate::entities::dice::Dice;
use crate::entities::object::ObjectLocation;
use crate::world::room::{Direction, Vnum};
use crate::world::state::{WorldError, WorldState};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResetReport {
    pub mobiles: usize,
    pub objects: usize,
}

impl WorldState {
    /// Repopulates one zone: mobiles up to their room maximum, objects missing from their room.
    pub fn reset_zone(&mut self, index: usize) -> ResetReport {
        let mut report = ResetReport::default();
        let Some(zone) = self.zones.get_mut(index) else {
            return report;
        };
        zone.age = 0;
        let data = zone.data.clone();

        for spawn in &data.mobiles {
            let present = self.count_mobiles_in_room(spawn.mobile, spawn.room);
            for _ in present..spawn.max as usize {
                let mobile = match self.spawn_mobile(spawn.mobile, spawn.room) {
                    Ok(mobile) => mobile,
                    Err(err) => {
                        warn!(zone = %data.vnum, error = %err, "zone mobile spawn failed");
                        break;
                    }
                };
                report.mobiles += 1;
                for equip in &spawn.equipment {
                    let object = match self.create_object(equip.object) {
                        Ok(object) => object,
                        Err(err) => {
                            warn!(zone = %data.vnum, error = %err, "zone equipment failed");
                            continue;
                        }
                    };
                    let worn = ObjectLocation::Worn(mobile, equip.location);
                    if let Err(err) = self.move_object(object, worn) {
                        warn!(zone = %data.vnum, error = %err, "zone equipment failed");
                        self.extract_object(object);
                    }
                }
                for vnum in &spawn.inventory {
                    let placed = self
                        .create_object(*vnum)
                        .and_then(|object| self.move_object(object, ObjectLocation::Carried(mobile)));
                    if let Err(err) = placed {
                        warn!(zone = %data.vnum, error = %err, "zone inventory failed");
                    }
                }
            }
        }

        for spawn in &data.objects {
            let present = self.room(spawn.room).map_or(false, |room| {
                room.objects.iter().any(|object| {
                    self.object(*object)
                        .map_or(false, |object| object.prototype == Some(spawn.object))
                })
            });
            if present {
                continue;
            }
            let placed = self
                .create_object(spawn.object)
                .and_then(|object| self.move_object(object, ObjectLocation::Room(spawn.room)));
            match placed {
                Ok(()) => report.objects += 1,
                Err(err) => warn!(zone = %data.vnum, error = %err, "zone object spawn failed"),
            }
        }
        debug!(zone = %data.vnum, mobiles = report.mobiles, objects = report.objects, "zone reset");
        report
    }

    /// Ages every zone by `minutes` and resets the ones past their lifespan.
    pub fn age_zones(&mut self, minutes: u32) -> Vec<String> {
        let mut due = Vec::new();
        for (index, zone) in self.zones.iter_mut().enumerate() {
            zone.age = zone.age.saturating_add(minutes);
            if zone.data.lifespan > 0 && zone.age >= zone.data.lifespan {
                due.push(index);
            }
        }
        let mut names = Vec::new();
        for index in due {
            self.reset_zone(index);
            names.push(self.zones[index].data.name.clone());
        }
        if !names.is_empty() {
            info!(zones = ?names, "zones reset");
        }
        names
    }

    /// Spawns respawns whose timer has run out, unless the prototype is already back.
    pub fn spawn_due_respawns(&mut self) -> usize {
        let mut spawned = 0;
        for key in self.respawn_timers.drain_ready(self.uptime()) {
            let Some(pending) = self.pending_respawns.remove(&key) else {
                continue;
            };
            if self.count_mobiles_in_room(pending.mobile, pending.room) > 0 {
                continue;
            }
            match self.spawn_mobile(pending.mobile, pending.room) {
                Ok(_) => spawned += 1,
                Err(err) => warn!(mobile = %pending.mobile, error = %err, "respawn failed"),
            }
        }
        spawned
    }

    /// Removes rotted corpses; whatever they held drops to the floor.
    pub fn decay_corpses(&mut self) -> usize {
        let mut decayed = 0;
        for corpse in self.corpse_timers.drain_ready(self.uptime()) {
            let Some(object) = self.object(corpse) else {
                continue;
            };
            let room = match object.location {
                ObjectLocation::Room(room) => Some(room),
                _ => None,
            };
            let name = object.short_description.clone();
            let contents = object.contents.clone();
            if let Some(room) = room {
                for inner in contents {
                    if let Err(err) = self.move_object(inner, ObjectLocation::Room(room)) {
                        warn!(error = %err, "could not spill corpse contents");
                    }
                }
                self.send_to_room(
                    room,
                    &[],
                    &format!("A quivering horde of maggots consumes {}.", name),
                );
            }
            self.extract_object(corpse);
            decayed += 1;
        }
        decayed
    }

    /// Hit point regeneration for everyone not in combat; revives dead players.
    pub fn regenerate(&mut self) -> usize {
        let mut touched = 0;
        for id in self.character_ids() {
            let Some(ch) = self.character_mut(id) else {
                continue;
            };
            if ch.fighting.is_some() {
                continue;
            }
            if ch.position == Position::Dead {
                if ch.npc {
                    continue;
                }
                ch.hit = 1;
                ch.position = Position::Resting;
                touched += 1;
                self.send(id, "You slowly return to your senses.");
                continue;
            }
            if ch.hit >= ch.max_hit {
                continue;
            }
            let base = 2 + ch.level / 4 + ch.max_hit / 20;
            let gain = match ch.position {
                Position::Sleeping => base * 2,
                Position::Resting => base * 3 / 2,
                _ => base,
            };
            ch.hit = (ch.hit + gain.max(1)).min(ch.max_hit);
            if ch.position < Position::Sleeping && ch.hit > 0 {
                ch.position = Position::Resting;
            }
            touched += 1;
        }
        touched
    }

    /// Counts down every affect and reports the ones that wore off.
    pub fn expire_affects(&mut self) -> usize {
        let mut expired = 0;
        for id in self.character_ids() {
            let Some(ch) = self.character_mut(id) else {
                continue;
            };
            if ch.affects.is_empty() {
                continue;
            }
            for affect in ch.tick_affects() {
                expired += 1;
                self.send(id, format!("The {} wears off.", affect.name));
            }
        }
        expired
    }

    pub fn advance_clock(&mut self) {
        if let Some(message) = self.time.advance_hour() {
            self.send_to_all_players(message, true);
        }
    }

    pub fn advance_weather(&mut self, dice: &mut dyn Dice) {
        let month = self.time.month;
        if let Some(message) = self.weather.advance(month, dice) {
            self.send_to_all_players(message, true);
        }
    }

    /// Moves a character through an exit, telling both rooms.
    pub fn walk(&mut self, id: CharacterId, direction: Direction) -> Result<Vnum, WorldError> {
        let from = self
            .character(id)
            .and_then(|ch| ch.room)
            .ok_or(WorldError::NoSuchCharacter(id))?;
        let to = self
            .room(from)
            .and_then(|room| room.exits.get(&direction).copied())
            .ok_or(WorldError::NoSuchRoom(from))?;
        if self.room(to).is_none() {
            return Err(WorldError::NoSuchRoom(to));
        }
        let name = capitalize(&self.display_name(id));
        self.send_to_room(from, &[id], &format!("{} leaves {}.", name, direction.name()));
        self.add_character_to_room(id, to)?;
        self.send_to_room(to, &[id], &format!("{} has arrived.", name));
        Ok(to)
    }
}

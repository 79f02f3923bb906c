use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::combat::rules::CombatRules;
use crate::combat::tables::{
    dexterity_armor_bonus, experience_award, miss_narration, strength_damage_bonus,
    strength_hit_bonus, DamageTier, Narration,
};
use crate::entities::character::{capitalize, Character, CharacterId, Position, WearLocation};
use crate::entities::dice::Dice;
use crate::world::state::WorldState;

/// Rule violations; the display text is what the acting player sees.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CombatError {
    #[error("One of you is already fighting someone else.")]
    AlreadyFighting,
    #[error("They aren't here.")]
    NotHere,
    #[error("You are in no position to fight!")]
    WrongPosition,
    #[error("You can't attack yourself.")]
    SelfTarget,
    #[error("No one by that name is here.")]
    NoSuchCharacter,
}

/// One-sided combat intent; `last_attack` of `None` means the next attack is due now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engagement {
    pub target: CharacterId,
    pub last_attack: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    Miss,
    Hit { damage: i32 },
    Kill { damage: i32 },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CombatReport {
    /// True when the call fell inside the round gate and resolved nothing.
    pub gated: bool,
    pub attacks: usize,
    pub hits: usize,
    pub torn_down: usize,
    pub kills: Vec<CharacterId>,
}

#[derive(Debug)]
pub struct CombatEngine {
    rules: CombatRules,
    engagements: HashMap<CharacterId, Engagement>,
    last_update: Option<Instant>,
}

impl CombatEngine {
    pub fn new(rules: CombatRules) -> Self {
        Self {
            rules,
            engagements: HashMap::new(),
            last_update: None,
        }
    }

    pub fn rules(&self) -> &CombatRules {
        &self.rules
    }

    pub fn engagement(&self, id: CharacterId) -> Option<&Engagement> {
        self.engagements.get(&id)
    }

    pub fn engagement_count(&self) -> usize {
        self.engagements.len()
    }

    pub fn is_fighting(&self, id: CharacterId) -> bool {
        self.engagements.contains_key(&id)
    }

    pub fn start_combat(
        &mut self,
        world: &mut WorldState,
        attacker: CharacterId,
        defender: CharacterId,
    ) -> Result<(), CombatError> {
        if attacker == defender {
            return Err(CombatError::SelfTarget);
        }
        let (a, d) = match (world.character(attacker), world.character(defender)) {
            (Some(a), Some(d)) => (a, d),
            _ => return Err(CombatError::NoSuchCharacter),
        };
        let busy = |ch: &Character, other: CharacterId| {
            ch.fighting.map_or(false, |target| target != other)
                || self
                    .engagements
                    .get(&ch.id)
                    .map_or(false, |engagement| engagement.target != other)
        };
        if busy(a, defender) || busy(d, attacker) {
            return Err(CombatError::AlreadyFighting);
        }
        if !world.same_room(attacker, defender) {
            return Err(CombatError::NotHere);
        }
        let rejoining = a.fighting == Some(defender) && a.position == Position::Fighting;
        if (a.position < Position::Standing && !rejoining) || d.position < Position::Sleeping {
            return Err(CombatError::WrongPosition);
        }

        for (id, target) in [(attacker, defender), (defender, attacker)] {
            self.engagements.insert(
                id,
                Engagement {
                    target,
                    last_attack: None,
                },
            );
            if let Some(ch) = world.character_mut(id) {
                ch.fighting = Some(target);
                if ch.position > Position::Sleeping {
                    ch.position = Position::Fighting;
                }
            }
        }
        debug!(?attacker, ?defender, "combat started");
        Ok(())
    }

    /// Ends every engagement involving `id`. Safe to call for characters
    /// that are not fighting or no longer exist.
    pub fn stop_combat(&mut self, world: &mut WorldState, id: CharacterId) {
        let mut released = vec![id];
        if let Some(engagement) = self.engagements.remove(&id) {
            released.push(engagement.target);
        }
        if let Some(target) = world.character(id).and_then(|ch| ch.fighting) {
            released.push(target);
        }
        let attackers: Vec<CharacterId> = self
            .engagements
            .iter()
            .filter(|(_, engagement)| engagement.target == id)
            .map(|(attacker, _)| *attacker)
            .collect();
        released.extend(attackers);

        for other in released {
            let targets_us = other == id
                || self
                    .engagements
                    .get(&other)
                    .map_or(false, |engagement| engagement.target == id);
            if !targets_us {
                continue;
            }
            self.engagements.remove(&other);
            release(world, other);
        }
        // Opponents whose back-reference still points at us.
        for other in world.character_ids() {
            if world.character(other).and_then(|ch| ch.fighting) == Some(id) {
                self.engagements.remove(&other);
                release(world, other);
            }
        }
    }

    /// One violence pulse. Resolves at most once per round of wall-clock time.
    pub fn update(
        &mut self,
        world: &mut WorldState,
        dice: &mut dyn Dice,
        now: Instant,
    ) -> CombatReport {
        let mut report = CombatReport::default();
        let round = self.rules.round();
        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) < round {
                report.gated = true;
                return report;
            }
        }
        self.last_update = Some(now);

        let mut combatants: Vec<CharacterId> = self.engagements.keys().copied().collect();
        combatants.sort();

        for id in &combatants {
            let Some(engagement) = self.engagements.get(id).copied() else {
                continue;
            };
            if !self.engagement_valid(world, *id, engagement.target) {
                self.stop_combat(world, *id);
                report.torn_down += 1;
            }
        }

        for id in combatants {
            let Some(engagement) = self.engagements.get(&id).copied() else {
                continue;
            };
            if !self.engagement_valid(world, id, engagement.target) {
                self.stop_combat(world, id);
                report.torn_down += 1;
                continue;
            }
            let ready = engagement
                .last_attack
                .map_or(true, |last| now.saturating_duration_since(last) >= round);
            let able = world
                .character(id)
                .map_or(false, |ch| ch.position >= Position::Fighting);
            if !ready || !able {
                continue;
            }
            report.attacks += 1;
            match self.resolve_attack(world, dice, id, engagement.target) {
                AttackOutcome::Miss => {}
                AttackOutcome::Hit { .. } => report.hits += 1,
                AttackOutcome::Kill { .. } => {
                    report.hits += 1;
                    report.kills.push(engagement.target);
                }
            }
            if let Some(current) = self.engagements.get_mut(&id) {
                current.last_attack = Some(now);
            }
        }
        report
    }

    fn engagement_valid(&self, world: &WorldState, id: CharacterId, target: CharacterId) -> bool {
        if !world.same_room(id, target) {
            return false;
        }
        match (world.character(id), world.character(target)) {
            (Some(ch), Some(victim)) => {
                ch.position > Position::Stunned && victim.position > Position::Stunned
            }
            _ => false,
        }
    }

    /// Effective to-hit threshold; lower is better.
    pub fn to_hit_threshold(attacker: &Character) -> i32 {
        20 - attacker.level - attacker.hitroll - strength_hit_bonus(attacker.abilities.strength)
    }

    /// Armor value the attack roll is compared against, clamped to [-10, 10].
    pub fn effective_armor(defender: &Character) -> i32 {
        let mut armor = defender.armor.base() / 10;
        if defender.position > Position::Sleeping {
            armor -= dexterity_armor_bonus(defender.abilities.dexterity);
        }
        armor.clamp(-10, 10)
    }

    /// Resolves one attack from `attacker` against `defender`.
    pub fn resolve_attack(
        &mut self,
        world: &mut WorldState,
        dice: &mut dyn Dice,
        attacker: CharacterId,
        defender: CharacterId,
    ) -> AttackOutcome {
        let (Some(a), Some(d)) = (world.character(attacker), world.character(defender)) else {
            return AttackOutcome::Miss;
        };
        let room = a.room;
        let attacker_name = capitalize(a.display_name());
        let defender_name = d.display_name().to_string();
        let threshold = Self::to_hit_threshold(a) - Self::effective_armor(d);

        let roll = dice.d20();
        let hit = match roll {
            20 if self.rules.critical_rolls => true,
            1 if self.rules.critical_rolls => false,
            _ => roll >= threshold,
        };
        if !hit {
            let lines = miss_narration(&attacker_name, &defender_name);
            narrate(world, room, attacker, defender, &lines);
            return AttackOutcome::Miss;
        }

        let mut damage = self.roll_damage(world, dice, attacker);
        let defender_position = world
            .character(defender)
            .map_or(Position::Standing, |ch| ch.position);
        if defender_position < Position::Fighting {
            damage *= 1 + (Position::Fighting.rank() - defender_position.rank()) / 3;
        }
        let damage = damage.clamp(1, 100);

        let mut killed = false;
        if let Some(victim) = world.character_mut(defender) {
            victim.hit -= damage;
            if victim.hit <= 0 {
                killed = true;
            } else if matches!(
                victim.position,
                Position::Sleeping | Position::Resting | Position::Sitting
            ) {
                victim.position = Position::Fighting;
            }
        }
        let lines = DamageTier::for_damage(damage).narrate(&attacker_name, &defender_name);
        narrate(world, room, attacker, defender, &lines);
        if killed {
            self.kill(world, attacker, defender);
            return AttackOutcome::Kill { damage };
        }
        AttackOutcome::Hit { damage }
    }

    fn roll_damage(&self, world: &WorldState, dice: &mut dyn Dice, attacker: CharacterId) -> i32 {
        let Some(a) = world.character(attacker) else {
            return 0;
        };
        let weapon = a
            .equipped(WearLocation::Wield)
            .and_then(|object| world.object(object))
            .and_then(|object| object.weapon_dice());
        let base = match weapon {
            Some((count, sides)) => dice.roll(count, sides),
            None if a.npc => {
                match a.prototype.and_then(|vnum| world.mobile_prototype(vnum)) {
                    Some(proto) if !proto.damage_dice.is_zero() => proto.damage_dice.roll(dice),
                    Some(proto) => proto.hit_dice.roll(dice),
                    None => dice.between(0, self.rules.unarmed_max),
                }
            }
            None => dice.between(0, self.rules.unarmed_max),
        };
        base + strength_damage_bonus(a.abilities.strength) + a.damroll
    }

    fn kill(&mut self, world: &mut WorldState, killer: CharacterId, victim: CharacterId) {
        if let Some(ch) = world.character_mut(victim) {
            ch.hit = 0;
            ch.position = Position::Dead;
        }
        self.stop_combat(world, victim);

        let Some(dead) = world.character(victim).cloned() else {
            return;
        };
        let killer_info = world.character(killer).map(|ch| (ch.npc, ch.level));
        let name = capitalize(dead.display_name());
        world.send(victim, "You are dead!  Sorry...");
        if let Some(room) = dead.room {
            world.send_to_room(room, &[victim], &format!("{} is dead!  R.I.P.", name));
        }

        if let Some((false, killer_level)) = killer_info {
            if dead.npc {
                let award = experience_award(dead.experience, dead.level, killer_level, false);
                if let Some(ch) = world.character_mut(killer) {
                    ch.experience += award;
                }
                world.send(killer, format!("You receive {} experience points.", award));
            }
        }

        let lifetime = self.rules.corpse_lifetime(dead.npc);
        world.make_corpse(victim, lifetime);
        if dead.npc {
            if let (Some(prototype), Some(home)) = (dead.prototype, dead.home_room) {
                world.schedule_respawn(prototype, home, self.rules.respawn_secs);
            }
        }
        world.remove_character(victim);
        info!(victim = %dead.display_name(), npc = dead.npc, "character killed");
    }
}

fn release(world: &mut WorldState, id: CharacterId) {
    if let Some(ch) = world.character_mut(id) {
        ch.fighting = None;
        if ch.position == Position::Fighting {
            ch.position = Position::Standing;
        }
    }
}

fn narrate(
    world: &mut WorldState,
    room: Option<crate::world::room::Vnum>,
    attacker: CharacterId,
    defender: CharacterId,
    lines: &Narration,
) {
    world.send(attacker, lines.to_attacker.clone());
    world.send(defender, lines.to_defender.clone());
    if let Some(room) = room {
        world.send_to_room(room, &[attacker, defender], &lines.to_room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::dice::scripted::ScriptedDice;
    use crate::entities::object::ObjectLocation;
    use crate::world::state::fixtures::*;
    use std::time::Duration;

    fn arena() -> (WorldState, CombatEngine, CharacterId, CharacterId) {
        let mut world = world();
        let bob = world.add_player("Bob", SQUARE).unwrap();
        let goblin = world.spawn_mobile(GOBLIN, SQUARE).unwrap();
        (world, CombatEngine::new(CombatRules::default()), bob, goblin)
    }

    #[test]
    fn start_combat_links_both_sides() {
        let (mut world, mut engine, bob, goblin) = arena();
        engine.start_combat(&mut world, bob, goblin).unwrap();
        let a = world.character(bob).unwrap();
        let d = world.character(goblin).unwrap();
        assert_eq!(a.fighting, Some(goblin));
        assert_eq!(d.fighting, Some(bob));
        assert_eq!(a.position, Position::Fighting);
        assert_eq!(d.position, Position::Fighting);
        assert_eq!(engine.engagement(bob).unwrap().last_attack, None);
        assert_eq!(engine.engagement(goblin).unwrap().target, bob);
    }

    #[test]
    fn sleeping_defender_stays_asleep() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().position = Position::Sleeping;
        engine.start_combat(&mut world, bob, goblin).unwrap();
        let d = world.character(goblin).unwrap();
        assert_eq!(d.position, Position::Sleeping);
        assert_eq!(d.fighting, Some(bob));
    }

    #[test]
    fn separate_rooms_are_not_here() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.add_character_to_room(bob, TEMPLE).unwrap();
        assert_eq!(
            engine.start_combat(&mut world, bob, goblin),
            Err(CombatError::NotHere)
        );
        assert_eq!(engine.engagement_count(), 0);
        assert_eq!(world.character(bob).unwrap().fighting, None);
        assert_eq!(world.character(goblin).unwrap().fighting, None);
    }

    #[test]
    fn busy_participants_are_refused() {
        let (mut world, mut engine, bob, goblin) = arena();
        let amy = world.add_player("Amy", SQUARE).unwrap();
        engine.start_combat(&mut world, bob, goblin).unwrap();
        assert_eq!(
            engine.start_combat(&mut world, amy, goblin),
            Err(CombatError::AlreadyFighting)
        );
        assert_eq!(
            engine.start_combat(&mut world, bob, amy),
            Err(CombatError::AlreadyFighting)
        );
        // Re-issuing against the current opponent is allowed.
        assert_eq!(engine.start_combat(&mut world, bob, goblin), Ok(()));
    }

    #[test]
    fn positions_gate_combat() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(bob).unwrap().position = Position::Sitting;
        assert_eq!(
            engine.start_combat(&mut world, bob, goblin),
            Err(CombatError::WrongPosition)
        );
        world.character_mut(bob).unwrap().position = Position::Standing;
        world.character_mut(goblin).unwrap().position = Position::Stunned;
        assert_eq!(
            engine.start_combat(&mut world, bob, goblin),
            Err(CombatError::WrongPosition)
        );
        assert_eq!(
            engine.start_combat(&mut world, bob, bob),
            Err(CombatError::SelfTarget)
        );
    }

    #[test]
    fn stop_combat_is_idempotent_and_never_upgrades() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().position = Position::Sleeping;
        engine.start_combat(&mut world, bob, goblin).unwrap();
        engine.stop_combat(&mut world, bob);
        let snapshot = (
            world.character(bob).cloned(),
            world.character(goblin).cloned(),
            engine.engagement_count(),
        );
        engine.stop_combat(&mut world, bob);
        assert_eq!(
            snapshot,
            (
                world.character(bob).cloned(),
                world.character(goblin).cloned(),
                engine.engagement_count()
            )
        );
        assert_eq!(engine.engagement_count(), 0);
        assert_eq!(world.character(bob).unwrap().fighting, None);
        assert_eq!(world.character(bob).unwrap().position, Position::Standing);
        assert_eq!(world.character(goblin).unwrap().fighting, None);
        assert_eq!(world.character(goblin).unwrap().position, Position::Sleeping);
    }

    #[test]
    fn natural_twenty_always_hits() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().armor.0 = [-200; 3];
        engine.start_combat(&mut world, bob, goblin).unwrap();
        let mut dice = ScriptedDice::new(&[20, 1]);
        let outcome = engine.resolve_attack(&mut world, &mut dice, bob, goblin);
        assert_eq!(outcome, AttackOutcome::Hit { damage: 1 });
    }

    #[test]
    fn natural_one_always_misses() {
        let (mut world, mut engine, bob, goblin) = arena();
        {
            let ch = world.character_mut(bob).unwrap();
            ch.level = 10;
            ch.hitroll = 10;
        }
        world.character_mut(goblin).unwrap().armor.0 = [20; 3];
        let a = world.character(bob).unwrap();
        let d = world.character(goblin).unwrap();
        assert_eq!(CombatEngine::to_hit_threshold(a), 0);
        assert_eq!(CombatEngine::effective_armor(d), 2);

        let mut dice = ScriptedDice::new(&[1]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Miss
        );
        let mut dice = ScriptedDice::new(&[2, 1]);
        assert!(matches!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Hit { .. }
        ));
    }

    #[test]
    fn non_critical_variant_uses_threshold_only() {
        let (mut world, _, bob, goblin) = arena();
        let rules = CombatRules {
            critical_rolls: false,
            ..CombatRules::default()
        };
        let mut engine = CombatEngine::new(rules);
        world.character_mut(goblin).unwrap().armor.0 = [-200; 3];
        let mut dice = ScriptedDice::new(&[20]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Miss
        );
    }

    #[test]
    fn sleeping_defender_loses_dexterity_bonus() {
        let (mut world, _, _, goblin) = arena();
        {
            let ch = world.character_mut(goblin).unwrap();
            ch.armor.0 = [50; 3];
            ch.abilities.dexterity = 18;
        }
        assert_eq!(CombatEngine::effective_armor(world.character(goblin).unwrap()), 2);
        world.character_mut(goblin).unwrap().position = Position::Sleeping;
        assert_eq!(CombatEngine::effective_armor(world.character(goblin).unwrap()), 5);
    }

    #[test]
    fn damage_is_clamped() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().hit = 1000;
        world.character_mut(bob).unwrap().damroll = 500;
        let mut dice = ScriptedDice::new(&[20, 2]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Hit { damage: 100 }
        );
        world.character_mut(bob).unwrap().damroll = -50;
        let mut dice = ScriptedDice::new(&[20, 2]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Hit { damage: 1 }
        );
        assert_eq!(world.character(goblin).unwrap().hit, 899);
    }

    #[test]
    fn sleeping_victim_takes_double_damage_and_wakes() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().position = Position::Sleeping;
        engine.start_combat(&mut world, bob, goblin).unwrap();
        let mut dice = ScriptedDice::new(&[20, 2]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Hit { damage: 4 }
        );
        assert_eq!(world.character(goblin).unwrap().position, Position::Fighting);
    }

    #[test]
    fn wielded_weapon_dice_are_used() {
        let (mut world, mut engine, bob, goblin) = arena();
        let sword = world.create_object(SWORD).unwrap();
        world
            .move_object(sword, ObjectLocation::Worn(bob, WearLocation::Wield))
            .unwrap();
        world.character_mut(bob).unwrap().abilities.strength = 18;
        let mut dice = ScriptedDice::new(&[20, 7]);
        assert_eq!(
            engine.resolve_attack(&mut world, &mut dice, bob, goblin),
            AttackOutcome::Hit { damage: 10 }
        );
    }

    #[test]
    fn npc_kill_makes_corpse_awards_experience_and_respawns() {
        let (mut world, mut engine, bob, goblin) = arena();
        engine.start_combat(&mut world, bob, goblin).unwrap();
        world.character_mut(goblin).unwrap().hit = 3;
        world.character_mut(bob).unwrap().damroll = 10;
        let mut dice = ScriptedDice::new(&[20, 0]);
        let outcome = engine.resolve_attack(&mut world, &mut dice, bob, goblin);
        assert_eq!(outcome, AttackOutcome::Kill { damage: 10 });

        assert!(world.character(goblin).is_none());
        assert_eq!(engine.engagement_count(), 0);
        let ch = world.character(bob).unwrap();
        assert_eq!(ch.fighting, None);
        assert_eq!(ch.position, Position::Standing);
        // 90 / 3 + 90 * (2 - 1) / 4
        assert_eq!(ch.experience, 52);
        assert_eq!(world.pending_respawn_count(), 1);
        let floor = &world.room(SQUARE).unwrap().objects;
        assert_eq!(floor.len(), 1);
        let corpse = world.object(floor[0]).unwrap();
        assert_eq!(corpse.short_description, "the corpse of the goblin");
        let told: Vec<String> = world.take_deliveries().into_iter().map(|d| d.text).collect();
        assert!(told.contains(&"The goblin is dead!  R.I.P.".to_string()));
        assert!(told.contains(&"You receive 52 experience points.".to_string()));
    }

    #[test]
    fn killed_player_lands_dead_at_exactly_zero() {
        let (mut world, mut engine, bob, goblin) = arena();
        engine.start_combat(&mut world, goblin, bob).unwrap();
        world.character_mut(bob).unwrap().hit = 2;
        let mut dice = ScriptedDice::new(&[20, 6]);
        let outcome = engine.resolve_attack(&mut world, &mut dice, goblin, bob);
        assert_eq!(outcome, AttackOutcome::Kill { damage: 6 });
        let ch = world.character(bob).unwrap();
        assert_eq!(ch.hit, 0);
        assert_eq!(ch.position, Position::Dead);
        assert_eq!(ch.room, Some(TEMPLE));
        assert_eq!(world.character(goblin).unwrap().experience, 90);
        assert_eq!(world.character(goblin).unwrap().position, Position::Standing);
    }

    #[test]
    fn update_is_gated_to_one_round() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().hit = 1000;
        world.character_mut(bob).unwrap().hit = 1000;
        engine.start_combat(&mut world, bob, goblin).unwrap();
        let start = Instant::now();
        let mut dice = ScriptedDice::new(&[]).with_fallback(10);

        let first = engine.update(&mut world, &mut dice, start);
        assert_eq!(first.attacks, 2);
        let early = engine.update(&mut world, &mut dice, start + Duration::from_secs(1));
        assert!(early.gated);
        assert_eq!(early.attacks, 0);
        let next = engine.update(&mut world, &mut dice, start + Duration::from_secs(2));
        assert!(!next.gated);
        assert_eq!(next.attacks, 2);
    }

    #[test]
    fn sleeping_combatant_does_not_swing() {
        let (mut world, mut engine, bob, goblin) = arena();
        world.character_mut(goblin).unwrap().position = Position::Sleeping;
        world.character_mut(goblin).unwrap().hit = 1000;
        engine.start_combat(&mut world, bob, goblin).unwrap();
        // bob misses, so the goblin sleeps on
        let mut dice = ScriptedDice::new(&[1]);
        let report = engine.update(&mut world, &mut dice, Instant::now());
        assert_eq!(report.attacks, 1);
        assert_eq!(report.hits, 0);
        assert!(engine.is_fighting(goblin));
    }

    #[test]
    fn departed_target_is_torn_down_without_fault() {
        let (mut world, mut engine, bob, goblin) = arena();
        engine.start_combat(&mut world, goblin, bob).unwrap();
        let record = world.leave_game(bob);
        assert!(record.is_some());
        let mut dice = ScriptedDice::new(&[]);
        let report = engine.update(&mut world, &mut dice, Instant::now());
        assert_eq!(report.attacks, 0);
        assert!(report.torn_down >= 1);
        assert_eq!(engine.engagement_count(), 0);
        let ch = world.character(goblin).unwrap();
        assert_eq!(ch.fighting, None);
        assert_eq!(ch.position, Position::Standing);
    }

    #[test]
    fn separated_combatants_stop_fighting() {
        let (mut world, mut engine, bob, goblin) = arena();
        engine.start_combat(&mut world, bob, goblin).unwrap();
        world.add_character_to_room(bob, TEMPLE).unwrap();
        let mut dice = ScriptedDice::new(&[]);
        engine.update(&mut world, &mut dice, Instant::now());
        assert_eq!(engine.engagement_count(), 0);
        assert_eq!(world.character(bob).unwrap().position, Position::Standing);
        assert_eq!(world.character(goblin).unwrap().position, Position::Standing);
    }
}

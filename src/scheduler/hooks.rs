use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use crate::combat::engine::{CombatEngine, CombatError};
use crate::entities::character::{capitalize, CharacterId, Position, LEVEL_IMMORTAL};
use crate::entities::dice::Dice;
use crate::scheduler::pulse::PulseKind;
use crate::world::room::Direction;
use crate::world::state::{WorldError, WorldState};

#[derive(Debug, Error)]
pub enum PulseError {
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Combat(#[from] CombatError),
    #[error("{0}")]
    Other(String),
}

/// Everything a handler may touch. Only the scheduler thread builds one.
pub struct WorldContext<'a> {
    pub world: &'a mut WorldState,
    pub combat: &'a mut CombatEngine,
    pub dice: &'a mut dyn Dice,
    pub now: Instant,
}

/// Per-pulse callbacks. Every method defaults to doing nothing.
pub trait PulseHooks: Send {
    fn violence(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn mobile(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn zone(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn weather(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn clock(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn decay(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn regen(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }

    fn affects(&mut self, _ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        Ok(())
    }
}

pub fn dispatch(
    hooks: &mut dyn PulseHooks,
    kind: PulseKind,
    ctx: &mut WorldContext<'_>,
) -> Result<(), PulseError> {
    match kind {
        PulseKind::Violence => hooks.violence(ctx),
        PulseKind::Mobile => hooks.mobile(ctx),
        PulseKind::Zone => hooks.zone(ctx),
        PulseKind::Weather => hooks.weather(ctx),
        PulseKind::Clock => hooks.clock(ctx),
        PulseKind::Decay => hooks.decay(ctx),
        PulseKind::Regen => hooks.regen(ctx),
        PulseKind::Affects => hooks.affects(ctx),
    }
}

/// The stock world behaviour.
#[derive(Debug, Default)]
pub struct StandardHooks {
    /// Zone ages advance in minutes; this carries sub-minute zone pulses.
    zone_seconds: f64,
    zone_period: f64,
}

impl StandardHooks {
    pub fn new(zone_period_secs: f64) -> Self {
        Self {
            zone_seconds: 0.0,
            zone_period: zone_period_secs,
        }
    }
}

impl PulseHooks for StandardHooks {
    fn violence(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        let report = ctx.combat.update(ctx.world, ctx.dice, ctx.now);
        if !report.gated && report.attacks > 0 {
            debug!(
                attacks = report.attacks,
                hits = report.hits,
                kills = report.kills.len(),
                torn_down = report.torn_down,
                "violence round"
            );
        }
        Ok(())
    }

    fn mobile(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.spawn_due_respawns();
        for id in ctx.world.character_ids() {
            let Some(ch) = ctx.world.character(id) else {
                continue;
            };
            if !ch.npc || ch.fighting.is_some() || ch.position != Position::Standing {
                continue;
            }
            let (aggressive, sentinel) = (ch.aggressive, ch.sentinel);
            if aggressive && attack_first_victim(ctx, id) {
                continue;
            }
            if !sentinel && ctx.dice.roll(1, 4) == 1 {
                wander(ctx, id)?;
            }
        }
        Ok(())
    }

    fn zone(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        let period = if self.zone_period > 0.0 {
            self.zone_period
        } else {
            60.0
        };
        self.zone_seconds += period;
        let minutes = (self.zone_seconds / 60.0).floor();
        if minutes >= 1.0 {
            self.zone_seconds -= minutes * 60.0;
            ctx.world.age_zones(minutes as u32);
        }
        Ok(())
    }

    fn weather(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.advance_weather(ctx.dice);
        Ok(())
    }

    fn clock(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.advance_clock();
        Ok(())
    }

    fn decay(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.decay_corpses();
        Ok(())
    }

    fn regen(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.regenerate();
        Ok(())
    }

    fn affects(&mut self, ctx: &mut WorldContext<'_>) -> Result<(), PulseError> {
        ctx.world.expire_affects();
        Ok(())
    }
}

fn attack_first_victim(ctx: &mut WorldContext<'_>, mobile: CharacterId) -> bool {
    let Some(room) = ctx.world.character(mobile).and_then(|ch| ch.room) else {
        return false;
    };
    if ctx.world.room(room).map_or(true, |room| room.peaceful) {
        return false;
    }
    let victim = ctx.world.characters_in_room(room).into_iter().find(|other| {
        ctx.world.character(*other).map_or(false, |ch| {
            !ch.npc && ch.level < LEVEL_IMMORTAL && ch.position > Position::Stunned
        })
    });
    let Some(victim) = victim else {
        return false;
    };
    if ctx.combat.start_combat(ctx.world, mobile, victim).is_err() {
        return false;
    }
    let name = capitalize(&ctx.world.display_name(mobile));
    let target = ctx.world.display_name(victim);
    ctx.world.send(victim, format!("{} screams and attacks you!", name));
    ctx.world.send_to_room(
        room,
        &[mobile, victim],
        &format!("{} screams and attacks {}!", name, target),
    );
    true
}

fn wander(ctx: &mut WorldContext<'_>, mobile: CharacterId) -> Result<(), PulseError> {
    let Some(room) = ctx.world.character(mobile).and_then(|ch| ch.room) else {
        return Ok(());
    };
    let exits: Vec<Direction> = ctx
        .world
        .room(room)
        .map(|room| {
            room.exits
                .iter()
                .filter(|(_, to)| ctx.world.room(**to).is_some())
                .map(|(direction, _)| *direction)
                .collect()
        })
        .unwrap_or_default();
    if exits.is_empty() {
        return Ok(());
    }
    let pick = ctx.dice.between(0, exits.len() as i32 - 1) as usize;
    ctx.world.walk(mobile, exits[pick.min(exits.len() - 1)])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::rules::CombatRules;
    use crate::entities::dice::scripted::ScriptedDice;
    use crate::world::state::fixtures::*;

    fn context_parts() -> (WorldState, CombatEngine, ScriptedDice) {
        (
            world(),
            CombatEngine::new(CombatRules::default()),
            ScriptedDice::new(&[]),
        )
    }

    #[test]
    fn aggressive_mobile_attacks_a_player() {
        let (mut world, mut combat, mut dice) = context_parts();
        world.mobiles.get_mut(&GOBLIN).unwrap().aggressive = true;
        let goblin = world.spawn_mobile(GOBLIN, SQUARE).unwrap();
        let bob = world.add_player("Bob", SQUARE).unwrap();
        let mut hooks = StandardHooks::new(60.0);
        let mut ctx = WorldContext {
            world: &mut world,
            combat: &mut combat,
            dice: &mut dice,
            now: Instant::now(),
        };
        dispatch(&mut hooks, PulseKind::Mobile, &mut ctx).unwrap();
        assert_eq!(combat.engagement(goblin).unwrap().target, bob);
        assert_eq!(world.character(bob).unwrap().fighting, Some(goblin));
        let told = world.take_deliveries();
        assert_eq!(told[0].text, "The goblin screams and attacks you!");
    }

    #[test]
    fn aggressive_mobile_spares_immortals() {
        let (mut world, mut combat, mut dice) = context_parts();
        world.mobiles.get_mut(&GOBLIN).unwrap().aggressive = true;
        world.spawn_mobile(GOBLIN, SQUARE).unwrap();
        let god = world.add_player("God", SQUARE).unwrap();
        world.character_mut(god).unwrap().level = LEVEL_IMMORTAL;
        let mut hooks = StandardHooks::new(60.0);
        let mut ctx = WorldContext {
            world: &mut world,
            combat: &mut combat,
            dice: &mut dice,
            now: Instant::now(),
        };
        dispatch(&mut hooks, PulseKind::Mobile, &mut ctx).unwrap();
        assert_eq!(combat.engagement_count(), 0);
    }

    #[test]
    fn wandering_mobile_takes_an_exit() {
        let (mut world, mut combat, _) = context_parts();
        world.mobiles.get_mut(&GOBLIN).unwrap().sentinel = false;
        world
            .rooms
            .get_mut(&SQUARE)
            .unwrap()
            .exits
            .insert(Direction::North, TEMPLE);
        let goblin = world.spawn_mobile(GOBLIN, SQUARE).unwrap();
        // 1d4 = 1 wanders, then the only exit
        let mut dice = ScriptedDice::new(&[1, 0]);
        let mut hooks = StandardHooks::new(60.0);
        let mut ctx = WorldContext {
            world: &mut world,
            combat: &mut combat,
            dice: &mut dice,
            now: Instant::now(),
        };
        dispatch(&mut hooks, PulseKind::Mobile, &mut ctx).unwrap();
        assert_eq!(world.character(goblin).unwrap().room, Some(TEMPLE));
    }

    #[test]
    fn short_zone_pulses_accumulate_into_minutes() {
        let (mut world, mut combat, mut dice) = context_parts();
        world.zones.push(crate::world::state::ZoneState {
            data: crate::world::prototypes::ZoneData {
                vnum: crate::world::room::Vnum(1),
                name: "Test".to_string(),
                lifespan: 5,
                mobiles: Vec::new(),
                objects: Vec::new(),
            },
            age: 0,
        });
        let mut hooks = StandardHooks::new(30.0);
        let mut ctx = WorldContext {
            world: &mut world,
            combat: &mut combat,
            dice: &mut dice,
            now: Instant::now(),
        };
        for _ in 0..3 {
            dispatch(&mut hooks, PulseKind::Zone, &mut ctx).unwrap();
        }
        assert_eq!(world.zones[0].age, 1);
    }

    #[test]
    fn default_hooks_do_nothing() {
        struct Idle;
        impl PulseHooks for Idle {}
        let (mut world, mut combat, mut dice) = context_parts();
        let mut ctx = WorldContext {
            world: &mut world,
            combat: &mut combat,
            dice: &mut dice,
            now: Instant::now(),
        };
        for kind in PulseKind::ALL {
            dispatch(&mut Idle, kind, &mut ctx).unwrap();
        }
    }
}

use thiserror::Error;
use tracing::info;

use crate::combat::engine::CombatError;
use crate::entities::character::{capitalize, CharacterId, Position, WearLocation, LEVEL_IMMORTAL};
use crate::scheduler::hooks::WorldContext;
use crate::world::room::Direction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The player asked to leave; the session tears itself down.
    #[error("quit")]
    Quit,
    #[error("{0}")]
    Rejected(String),
    #[error("The world is not answering right now.")]
    Unavailable,
}

impl From<CombatError> for CommandError {
    fn from(err: CombatError) -> Self {
        CommandError::Rejected(err.to_string())
    }
}

fn reject<T>(text: &str) -> Result<T, CommandError> {
    Err(CommandError::Rejected(text.to_string()))
}

/// Executes one line of player input against the world.
pub trait CommandInterpreter: Send {
    fn execute(
        &mut self,
        ctx: &mut WorldContext<'_>,
        actor: CharacterId,
        line: &str,
    ) -> Result<(), CommandError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Move(Direction),
    Look,
    Kill,
    Flee,
    Say,
    Score,
    Who,
    Inventory,
    Equipment,
    Stand,
    Sit,
    Rest,
    Sleep,
    Wake,
    Quit,
    Shutdown,
}

struct CommandInfo {
    name: &'static str,
    verb: Verb,
    min_position: Position,
    min_level: i32,
    /// Must be typed in full.
    exact: bool,
}

const fn command(name: &'static str, verb: Verb, min_position: Position) -> CommandInfo {
    CommandInfo {
        name,
        verb,
        min_position,
        min_level: 0,
        exact: false,
    }
}

/// Searched in order, so earlier entries win abbreviations.
const COMMANDS: &[CommandInfo] = &[
    command("north", Verb::Move(Direction::North), Position::Standing),
    command("east", Verb::Move(Direction::East), Position::Standing),
    command("south", Verb::Move(Direction::South), Position::Standing),
    command("west", Verb::Move(Direction::West), Position::Standing),
    command("up", Verb::Move(Direction::Up), Position::Standing),
    command("down", Verb::Move(Direction::Down), Position::Standing),
    command("look", Verb::Look, Position::Resting),
    command("kill", Verb::Kill, Position::Fighting),
    command("hit", Verb::Kill, Position::Fighting),
    command("flee", Verb::Flee, Position::Fighting),
    command("say", Verb::Say, Position::Resting),
    command("score", Verb::Score, Position::Dead),
    command("who", Verb::Who, Position::Dead),
    command("inventory", Verb::Inventory, Position::Dead),
    command("equipment", Verb::Equipment, Position::Sleeping),
    command("stand", Verb::Stand, Position::Resting),
    command("sit", Verb::Sit, Position::Resting),
    command("rest", Verb::Rest, Position::Resting),
    command("sleep", Verb::Sleep, Position::Sleeping),
    command("wake", Verb::Wake, Position::Sleeping),
    CommandInfo {
        name: "quit",
        verb: Verb::Quit,
        min_position: Position::Dead,
        min_level: 0,
        exact: true,
    },
    CommandInfo {
        name: "shutdown",
        verb: Verb::Shutdown,
        min_position: Position::Dead,
        min_level: LEVEL_IMMORTAL,
        exact: true,
    },
];

fn position_refusal(position: Position) -> &'static str {
    match position {
        Position::Dead => "Lie still; you are DEAD!!! :-(",
        Position::Incapacitated => "You are in a pretty bad shape, unable to do anything!",
        Position::Stunned => "All you can do right now is think about the stars!",
        Position::Sleeping => "In your dreams, or what?",
        Position::Resting => "Nah... You feel too relaxed to do that..",
        Position::Sitting => "Maybe you should get on your feet first?",
        Position::Fighting | Position::Standing => "No way!  You're fighting for your life!",
    }
}

/// The classic verb set.
#[derive(Debug, Default)]
pub struct StandardInterpreter;

impl CommandInterpreter for StandardInterpreter {
    fn execute(
        &mut self,
        ctx: &mut WorldContext<'_>,
        actor: CharacterId,
        line: &str,
    ) -> Result<(), CommandError> {
        let line = line.trim();
        let (word, rest) = if let Some(said) = line.strip_prefix('\'') {
            ("say", said.trim())
        } else {
            match line.split_once(char::is_whitespace) {
                Some((word, rest)) => (word, rest.trim()),
                None => (line, ""),
            }
        };
        if word.is_empty() {
            return Ok(());
        }
        let word = word.to_ascii_lowercase();
        let (position, level, engaged) = ctx
            .world
            .character(actor)
            .map(|ch| (ch.position, ch.level, ch.fighting.is_some()))
            .ok_or(CommandError::Unavailable)?;

        let found = COMMANDS
            .iter()
            .filter(|info| level >= info.min_level)
            .find(|info| info.name.starts_with(&word));
        let Some(info) = found else {
            return reject("Huh?!");
        };
        if info.exact && info.name != word {
            return reject(&format!(
                "If you want to {}, you have to spell it out.",
                info.name.to_uppercase()
            ));
        }
        if position < info.min_position {
            return reject(position_refusal(position));
        }
        // An engaged character counts as fighting whatever its position says.
        if engaged && info.min_position > Position::Fighting {
            return reject(position_refusal(Position::Fighting));
        }

        match info.verb {
            Verb::Move(direction) => do_move(ctx, actor, direction),
            Verb::Look => {
                look(ctx, actor);
                Ok(())
            }
            Verb::Kill => do_kill(ctx, actor, rest),
            Verb::Flee => do_flee(ctx, actor),
            Verb::Say => do_say(ctx, actor, rest),
            Verb::Score => do_score(ctx, actor),
            Verb::Who => do_who(ctx, actor),
            Verb::Inventory => do_inventory(ctx, actor),
            Verb::Equipment => do_equipment(ctx, actor),
            Verb::Stand | Verb::Sit | Verb::Rest | Verb::Sleep | Verb::Wake => {
                change_position(ctx, actor, info.verb)
            }
            Verb::Quit => {
                if engaged {
                    return reject("No way! You are fighting.");
                }
                Err(CommandError::Quit)
            }
            Verb::Shutdown => {
                info!(by = %ctx.world.display_name(actor), "shutdown requested in game");
                ctx.world.send_to_all_players("Shutting down immediately.", false);
                ctx.world.request_shutdown();
                Ok(())
            }
        }
    }
}

fn look(ctx: &mut WorldContext<'_>, actor: CharacterId) {
    let Some(room) = ctx.world.character(actor).and_then(|ch| ch.room) else {
        return;
    };
    let text = ctx.world.describe_room(room, actor);
    ctx.world.send(actor, text);
}

fn do_move(ctx: &mut WorldContext<'_>, actor: CharacterId, direction: Direction) -> Result<(), CommandError> {
    let has_exit = ctx
        .world
        .character(actor)
        .and_then(|ch| ch.room)
        .and_then(|room| ctx.world.room(room))
        .and_then(|room| room.exits.get(&direction).copied())
        .map_or(false, |to| ctx.world.room(to).is_some());
    if !has_exit {
        return reject("Alas, you cannot go that way...");
    }
    ctx.world
        .walk(actor, direction)
        .map_err(|_| CommandError::Rejected("Alas, you cannot go that way...".to_string()))?;
    look(ctx, actor);
    Ok(())
}

fn do_kill(ctx: &mut WorldContext<'_>, actor: CharacterId, target: &str) -> Result<(), CommandError> {
    let target = target.split_whitespace().next().unwrap_or("");
    if target.is_empty() {
        return reject("Kill whom?");
    }
    let room = ctx
        .world
        .character(actor)
        .and_then(|ch| ch.room)
        .ok_or(CommandError::Unavailable)?;
    let Some(victim) = ctx.world.find_character_in_room(room, target, actor) else {
        if ctx
            .world
            .character(actor)
            .map_or(false, |ch| ch.matches_keyword(target))
        {
            return Err(CombatError::SelfTarget.into());
        }
        return reject("They aren't here.");
    };
    if ctx.world.room(room).map_or(false, |room| room.peaceful) {
        return reject("You feel ashamed trying to disturb the peace of this room.");
    }
    if ctx.world.character(actor).and_then(|ch| ch.fighting) == Some(victim) {
        return reject("You do the best you can!");
    }
    ctx.combat.start_combat(ctx.world, actor, victim)?;
    let name = capitalize(&ctx.world.display_name(actor));
    let victim_name = ctx.world.display_name(victim);
    ctx.world.send(actor, format!("You attack {}!", victim_name));
    ctx.world.send(victim, format!("{} attacks you!", name));
    ctx.world
        .send_to_room(room, &[actor, victim], &format!("{} attacks {}!", name, victim_name));
    Ok(())
}

fn do_flee(ctx: &mut WorldContext<'_>, actor: CharacterId) -> Result<(), CommandError> {
    let Some(room) = ctx.world.character(actor).and_then(|ch| ch.room) else {
        return Err(CommandError::Unavailable);
    };
    let exits: Vec<Direction> = ctx
        .world
        .room(room)
        .map(|place| {
            place
                .exits
                .iter()
                .filter(|(_, to)| ctx.world.room(**to).is_some())
                .map(|(direction, _)| *direction)
                .collect()
        })
        .unwrap_or_default();
    if exits.is_empty() {
        return reject("PANIC! You couldn't escape!");
    }
    let pick = ctx.dice.between(0, exits.len() as i32 - 1) as usize;
    let direction = exits[pick.min(exits.len() - 1)];
    let name = capitalize(&ctx.world.display_name(actor));
    ctx.world
        .send_to_room(room, &[actor], &format!("{} panics, and attempts to flee!", name));
    ctx.combat.stop_combat(ctx.world, actor);
    ctx.world
        .walk(actor, direction)
        .map_err(|_| CommandError::Rejected("PANIC! You couldn't escape!".to_string()))?;
    ctx.world.send(actor, "You flee head over heels.");
    look(ctx, actor);
    Ok(())
}

fn do_say(ctx: &mut WorldContext<'_>, actor: CharacterId, text: &str) -> Result<(), CommandError> {
    if text.is_empty() {
        return reject("Yes, but WHAT do you want to say?");
    }
    let Some(room) = ctx.world.character(actor).and_then(|ch| ch.room) else {
        return Err(CommandError::Unavailable);
    };
    let name = capitalize(&ctx.world.display_name(actor));
    ctx.world.send(actor, format!("You say '{}'", text));
    ctx.world
        .send_to_room(room, &[actor], &format!("{} says '{}'", name, text));
    Ok(())
}

fn do_score(ctx: &mut WorldContext<'_>, actor: CharacterId) -> Result<(), CommandError> {
    let Some(ch) = ctx.world.character(actor) else {
        return Err(CommandError::Unavailable);
    };
    let text = format!(
        "You are level {}.\r\nYou have {}({}) hit points.\r\nYou have scored {} exp, and have {} gold coins.\r\nYou are {}.\r\nIt is {}.",
        ch.level,
        ch.hit,
        ch.max_hit,
        ch.experience,
        ch.gold,
        ch.position.label(),
        ctx.world.time
    );
    ctx.world.send(actor, text);
    Ok(())
}

fn do_who(ctx: &mut WorldContext<'_>, actor: CharacterId) -> Result<(), CommandError> {
    let mut lines = vec!["Players".to_string(), "-------".to_string()];
    for id in ctx.world.player_ids() {
        if let Some(ch) = ctx.world.character(id) {
            lines.push(format!("[{:>2}] {}", ch.level, ch.name));
        }
    }
    lines.push(String::new());
    lines.push(format!("{} characters displayed.", lines.len() - 3));
    ctx.world.send(actor, lines.join("\r\n"));
    Ok(())
}

fn do_inventory(ctx: &mut WorldContext<'_>, actor: CharacterId) -> Result<(), CommandError> {
    let Some(ch) = ctx.world.character(actor) else {
        return Err(CommandError::Unavailable);
    };
    let mut lines = vec!["You are carrying:".to_string()];
    for object in &ch.inventory {
        if let Some(object) = ctx.world.object(*object) {
            lines.push(object.short_description.clone());
        }
    }
    if lines.len() == 1 {
        lines.push(" Nothing.".to_string());
    }
    ctx.world.send(actor, lines.join("\r\n"));
    Ok(())
}

fn do_equipment(ctx: &mut WorldContext<'_>, actor: CharacterId) -> Result<(), CommandError> {
    let Some(ch) = ctx.world.character(actor) else {
        return Err(CommandError::Unavailable);
    };
    let mut lines = vec!["You are using:".to_string()];
    for location in WearLocation::ALL {
        let Some(object) = ch.equipped(location).and_then(|id| ctx.world.object(id)) else {
            continue;
        };
        lines.push(format!("{:<20}{}", location.label(), object.short_description));
    }
    if lines.len() == 1 {
        lines.push(" Nothing.".to_string());
    }
    ctx.world.send(actor, lines.join("\r\n"));
    Ok(())
}

fn change_position(ctx: &mut WorldContext<'_>, actor: CharacterId, verb: Verb) -> Result<(), CommandError> {
    let Some((current, engaged)) = ctx
        .world
        .character(actor)
        .map(|ch| (ch.position, ch.fighting.is_some()))
    else {
        return Err(CommandError::Unavailable);
    };
    let name = capitalize(&ctx.world.display_name(actor));
    use Position::*;
    // Getting up while engaged goes straight back into the fight.
    let upright = if engaged { Fighting } else { Standing };
    let (next, you, others) = match (verb, current) {
        (Verb::Stand, Standing | Fighting) => return reject("You are already standing."),
        (Verb::Stand, Sleeping) => return reject("You have to wake up first!"),
        (Verb::Stand, _) => (upright, "You stand up.", format!("{} clambers to their feet.", name)),

        (Verb::Sit, Sitting) => return reject("You're sitting already."),
        (Verb::Sit, _) if engaged => return reject("Sit down while fighting? Are you MAD?"),
        (Verb::Sit, Sleeping) => return reject("You have to wake up first."),
        (Verb::Sit, Resting) => (Sitting, "You stop resting, and sit up.", format!("{} stops resting.", name)),
        (Verb::Sit, _) => (Sitting, "You sit down.", format!("{} sits down.", name)),

        (Verb::Rest, Resting) => return reject("You are already resting."),
        (Verb::Rest, _) if engaged => return reject("Rest while fighting? Are you MAD?"),
        (Verb::Rest, Sleeping) => return reject("You have to wake up first."),
        (Verb::Rest, _) => (
            Resting,
            "You sit down and rest your tired bones.",
            format!("{} sits down and rests.", name),
        ),

        (Verb::Sleep, Sleeping) => return reject("You are already sound asleep."),
        (Verb::Sleep, _) if engaged => return reject("Sleep while fighting? Are you MAD?"),
        (Verb::Sleep, _) => (Sleeping, "You go to sleep.", format!("{} lies down and falls asleep.", name)),

        (Verb::Wake, Sleeping) if engaged => (
            Fighting,
            "You awaken, and leap to your feet!",
            format!("{} awakens and leaps up to fight.", name),
        ),
        (Verb::Wake, Sleeping) => (Sitting, "You awaken, and sit up.", format!("{} awakens.", name)),
        (Verb::Wake, _) => return reject("You are already awake..."),

        _ => return reject("Huh?!"),
    };
    let room = ctx.world.character(actor).and_then(|ch| ch.room);
    if let Some(ch) = ctx.world.character_mut(actor) {
        ch.position = next;
    }
    ctx.world.send(actor, you);
    if let Some(room) = room {
        ctx.world.send_to_room(room, &[actor], &others);
    }
    Ok(())
}

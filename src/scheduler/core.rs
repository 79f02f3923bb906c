use crossbeam_channel::{Receiver, Select, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::combat::engine::CombatEngine;
use crate::entities::character::{capitalize, CharacterId};
use crate::entities::dice::{Dice, RandomDice};
use crate::interpreter::{CommandError, CommandInterpreter, StandardInterpreter};
use crate::persistence::record::CharacterRecord;
use crate::scheduler::hooks::{dispatch, PulseHooks, StandardHooks, WorldContext};
use crate::scheduler::pulse::{PulseKind, PulseTimings};
use crate::world::state::{WorldError, WorldState};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnterError {
    #[error("That character is already playing.")]
    AlreadyPlaying,
    #[error("The world is not accepting players right now.")]
    Unavailable,
}

/// Messages session threads send to the scheduler thread.
#[derive(Debug)]
pub enum WorldRequest {
    Enter {
        record: CharacterRecord,
        reply: Sender<Result<CharacterId, EnterError>>,
    },
    Command {
        id: CharacterId,
        line: String,
        reply: Sender<Result<(), CommandError>>,
    },
    Leave {
        id: CharacterId,
        reply: Sender<Option<CharacterRecord>>,
    },
}

/// Session-side end of the world request queue.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    sender: Sender<WorldRequest>,
}

impl WorldHandle {
    pub fn new(sender: Sender<WorldRequest>) -> Self {
        Self { sender }
    }

    pub fn enter(&self, record: CharacterRecord) -> Result<CharacterId, EnterError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.sender
            .send(WorldRequest::Enter { record, reply })
            .map_err(|_| EnterError::Unavailable)?;
        response.recv().map_err(|_| EnterError::Unavailable)?
    }

    pub fn command(&self, id: CharacterId, line: &str) -> Result<(), CommandError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.sender
            .send(WorldRequest::Command {
                id,
                line: line.to_string(),
                reply,
            })
            .map_err(|_| CommandError::Unavailable)?;
        response.recv().map_err(|_| CommandError::Unavailable)?
    }

    /// `None` when the character was already gone or the scheduler has stopped.
    pub fn leave(&self, id: CharacterId) -> Option<CharacterRecord> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.sender.send(WorldRequest::Leave { id, reply }).ok()?;
        response.recv().ok().flatten()
    }
}

/// Where world output goes once a request or pulse finishes.
pub trait SessionSink: Send + Sync {
    fn deliver(&self, name: &str, text: &str);

    fn shutdown_requested(&self) {}
}

/// The Pulse Scheduler. Owns the world outright; nothing else can reach it
/// except through the request queue.
pub struct Scheduler {
    world: WorldState,
    combat: CombatEngine,
    interpreter: Box<dyn CommandInterpreter>,
    hooks: Box<dyn PulseHooks>,
    dice: Box<dyn Dice>,
    timings: PulseTimings,
    sink: Arc<dyn SessionSink>,
    started: Instant,
}

impl Scheduler {
    pub fn new(
        world: WorldState,
        combat: CombatEngine,
        timings: PulseTimings,
        sink: Arc<dyn SessionSink>,
    ) -> Self {
        Self {
            world,
            combat,
            interpreter: Box::new(StandardInterpreter),
            hooks: Box::new(StandardHooks::new(timings.zone)),
            dice: Box::new(RandomDice::from_entropy()),
            timings,
            sink,
            started: Instant::now(),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn PulseHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_dice(mut self, dice: Box<dyn Dice>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Box<dyn CommandInterpreter>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Runs on the scheduler thread.
    pub fn spawn(self) -> SchedulerHandle {
        let (sender, requests) = crossbeam_channel::unbounded();
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(1);
        let thread = thread::spawn(move || self.run(requests, shutdown_rx));
        SchedulerHandle {
            world: WorldHandle::new(sender),
            shutdown,
            thread,
        }
    }

    /// Waits on the shutdown channel, the request queue and the eight pulse
    /// tickers, handling exactly one event at a time. Returns the world when
    /// shutdown is signalled or every sender is gone.
    pub fn run(mut self, requests: Receiver<WorldRequest>, shutdown: Receiver<()>) -> WorldState {
        let tickers: Vec<(PulseKind, Receiver<Instant>)> = PulseKind::ALL
            .into_iter()
            .map(|kind| (kind, crossbeam_channel::tick(self.timings.period(kind))))
            .collect();

        let mut select = Select::new();
        let shutdown_index = select.recv(&shutdown);
        let request_index = select.recv(&requests);
        let ticker_indices: Vec<usize> = tickers.iter().map(|(_, rx)| select.recv(rx)).collect();

        info!(
            rooms = self.world.rooms.len(),
            characters = self.world.character_count(),
            "pulse scheduler started"
        );
        loop {
            let operation = select.select();
            let index = operation.index();
            if index == shutdown_index {
                if operation.recv(&shutdown).is_err() {
                    debug!("shutdown channel closed");
                }
                break;
            }
            if index == request_index {
                match operation.recv(&requests) {
                    Ok(request) => self.handle_request(request),
                    Err(_) => {
                        debug!("request queue closed");
                        break;
                    }
                }
                continue;
            }
            let Some(slot) = ticker_indices.iter().position(|candidate| *candidate == index) else {
                continue;
            };
            let (kind, ticker) = &tickers[slot];
            match operation.recv(ticker) {
                Ok(fired) => self.run_pulse(*kind, fired),
                Err(_) => warn!(pulse = kind.name(), "pulse timer closed"),
            }
        }
        info!(uptime = self.world.uptime(), "pulse scheduler stopped");
        self.world
    }

    fn run_pulse(&mut self, kind: PulseKind, fired: Instant) {
        let uptime = fired.saturating_duration_since(self.started).as_secs();
        self.world.set_uptime(uptime);
        let outcome = {
            let mut ctx = WorldContext {
                world: &mut self.world,
                combat: &mut self.combat,
                dice: self.dice.as_mut(),
                now: fired,
            };
            let hooks = self.hooks.as_mut();
            panic::catch_unwind(AssertUnwindSafe(|| dispatch(hooks, kind, &mut ctx)))
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(pulse = kind.name(), error = %err, "pulse handler failed"),
            Err(payload) => error!(
                pulse = kind.name(),
                panic = %panic_message(payload.as_ref()),
                "pulse handler panicked"
            ),
        }
        self.flush();
    }

    fn handle_request(&mut self, request: WorldRequest) {
        match request {
            WorldRequest::Enter { record, reply } => {
                let result = self.enter(record);
                let _ = reply.send(result);
            }
            WorldRequest::Command { id, line, reply } => {
                let result = self.command(id, &line);
                let _ = reply.send(result);
            }
            WorldRequest::Leave { id, reply } => {
                let record = self.leave(id);
                let _ = reply.send(record);
            }
        }
    }

    fn enter(&mut self, record: CharacterRecord) -> Result<CharacterId, EnterError> {
        let name = record.name.clone();
        let id = match self.world.enter_game(record) {
            Ok(id) => id,
            Err(WorldError::AlreadyInGame(_)) => return Err(EnterError::AlreadyPlaying),
            Err(err) => {
                warn!(%name, error = %err, "could not place character");
                return Err(EnterError::Unavailable);
            }
        };
        if let Some(room) = self.world.character(id).and_then(|ch| ch.room) {
            let view = self.world.describe_room(room, id);
            self.world.send(id, view);
            self.world
                .send_to_room(room, &[id], &format!("{} has entered the game.", name));
            info!(%name, ?id, %room, "character entered the game");
        }
        self.flush();
        Ok(id)
    }

    fn command(&mut self, id: CharacterId, line: &str) -> Result<(), CommandError> {
        if !self.world.contains_character(id) {
            return Err(CommandError::Unavailable);
        }
        let outcome = {
            let mut ctx = WorldContext {
                world: &mut self.world,
                combat: &mut self.combat,
                dice: self.dice.as_mut(),
                now: Instant::now(),
            };
            let interpreter = self.interpreter.as_mut();
            panic::catch_unwind(AssertUnwindSafe(|| interpreter.execute(&mut ctx, id, line)))
        };
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                error!(?id, %line, panic = %panic_message(payload.as_ref()), "command panicked");
                Err(CommandError::Rejected("Huh?!".to_string()))
            }
        };
        self.flush();
        if self.world.take_shutdown_request() {
            self.sink.shutdown_requested();
        }
        result
    }

    fn leave(&mut self, id: CharacterId) -> Option<CharacterRecord> {
        if !self.world.contains_character(id) {
            return None;
        }
        self.combat.stop_combat(&mut self.world, id);
        let name = capitalize(&self.world.display_name(id));
        if let Some(room) = self.world.character(id).and_then(|ch| ch.room) {
            self.world
                .send_to_room(room, &[id], &format!("{} has left the game.", name));
        }
        let record = self.world.leave_game(id);
        info!(%name, ?id, "character left the game");
        self.flush();
        record
    }

    fn flush(&mut self) {
        for delivery in self.world.take_deliveries() {
            self.sink.deliver(&delivery.name, &delivery.text);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct SchedulerHandle {
    world: WorldHandle,
    shutdown: Sender<()>,
    thread: JoinHandle<WorldState>,
}

impl SchedulerHandle {
    pub fn handle(&self) -> WorldHandle {
        self.world.clone()
    }

    /// Stops the loop after its current event and hands back the world.
    pub fn shutdown(self) -> Result<WorldState, String> {
        let _ = self.shutdown.send(());
        self.thread
            .join()
            .map_err(|_| "scheduler thread panicked".to_string())
    }
}

use crossbeam_channel::{Receiver, Sender};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::entities::character::CharacterId;
use crate::interpreter::CommandError;
use crate::net::line::LineReader;
use crate::net::login_flow::{LoginFlow, LoginFlowConfig, SessionStep};
use crate::net::registry::{normalize_newlines, SessionHandle, SessionRegistry};
use crate::persistence::record::CharacterRecord;
use crate::persistence::store::CharacterStore;
use crate::scheduler::core::{EnterError, WorldHandle};

const PROMPT: &str = "\r\n> ";

/// Everything a connection thread needs, shared by every connection.
#[derive(Clone)]
pub struct ConnectionContext {
    pub world: WorldHandle,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn CharacterStore>,
    pub login: LoginFlowConfig,
    pub write_timeout: Duration,
}

/// Every accepted transport from accept until its thread has torn down, so
/// shutdown can reach sessions still sitting at the login prompts.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, Option<TcpStream>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(self: &Arc<Self>, stream: &TcpStream) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let clone = match stream.try_clone() {
            Ok(clone) => Some(clone),
            Err(err) => {
                warn!(error = %err, "transport clone failed; shutdown cannot force it closed");
                None
            }
        };
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, clone);
        ConnectionGuard {
            table: Arc::clone(self),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shuts down every open transport; blocked readers see end of input.
    pub fn close_all(&self) -> usize {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        for stream in streams.values().flatten() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        streams.len()
    }
}

pub struct ConnectionGuard {
    table: Arc<ConnectionTable>,
    id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.table
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

struct Playing {
    handle: Arc<SessionHandle>,
    id: CharacterId,
}

fn send(outbound: &Sender<Vec<u8>>, text: &str) {
    let _ = outbound.send(normalize_newlines(text).into_bytes());
}

fn spawn_writer(mut stream: TcpStream, queue: Receiver<Vec<u8>>, peer: SocketAddr) -> JoinHandle<()> {
    thread::spawn(move || {
        for bytes in queue.iter() {
            if let Err(err) = stream.write_all(&bytes) {
                debug!(%peer, error = %err, "write failed");
                break;
            }
        }
        let _ = stream.flush();
    })
}

/// Runs one session from greeting to teardown on the calling thread.
pub fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> Result<(), String> {
    stream
        .set_nonblocking(false)
        .map_err(|err| format!("connection blocking mode failed: {}", err))?;
    stream
        .set_write_timeout(Some(ctx.write_timeout))
        .map_err(|err| format!("write timeout set failed: {}", err))?;
    let write_half = stream
        .try_clone()
        .map_err(|err| format!("stream clone failed: {}", err))?;
    let read_half = stream
        .try_clone()
        .map_err(|err| format!("stream clone failed: {}", err))?;

    let (outbound, queue) = crossbeam_channel::unbounded();
    let writer = spawn_writer(write_half, queue, peer);
    info!(%peer, "connection opened");

    let mut flow = LoginFlow::new(ctx.login.clone());
    let mut reader = LineReader::new(read_half);
    send(&outbound, &flow.greeting());
    let mut playing: Option<Playing> = None;

    let reason = loop {
        let line = match reader.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => break "closed by peer".to_string(),
            Err(err) => break format!("read failed: {}", err),
        };
        let replies = reader.take_replies();
        if !replies.is_empty() {
            let _ = outbound.send(replies);
        }
        debug!(%peer, state = ?flow.state(), len = line.len(), "line received");

        let step = match flow.handle_line(&line, ctx.store.as_ref()) {
            Ok(step) => step,
            Err(err) => break err.to_string(),
        };
        match step {
            SessionStep::Reply(text) => send(&outbound, &text),
            SessionStep::Ignore => send(&outbound, PROMPT),
            SessionStep::Enter { record, greeting } => {
                match enter_world(ctx, &stream, &outbound, record, &greeting) {
                    Ok(session) => {
                        info!(%peer, name = %session.handle.name(), "session playing");
                        playing = Some(session);
                        send(&outbound, PROMPT);
                    }
                    Err(EnterError::AlreadyPlaying) => {
                        let text = flow.enter_refused(&EnterError::AlreadyPlaying.to_string());
                        send(&outbound, &text);
                    }
                    Err(EnterError::Unavailable) => {
                        send(&outbound, "The game is closing down. Come back later.\r\n");
                        break "world unavailable".to_string();
                    }
                }
            }
            SessionStep::Command(line) => {
                let Some(session) = &playing else {
                    break "command before entering the game".to_string();
                };
                match ctx.world.command(session.id, &line) {
                    Ok(()) => send(&outbound, PROMPT),
                    Err(CommandError::Rejected(text)) => {
                        send(&outbound, &format!("{}{}", text, PROMPT))
                    }
                    Err(CommandError::Quit) => {
                        flow.disconnect();
                        send(&outbound, "Goodbye, friend.. Come back soon!\r\n");
                        break "quit".to_string();
                    }
                    Err(CommandError::Unavailable) => break "world unavailable".to_string(),
                }
            }
        }
    };

    flow.disconnect();
    if let Some(session) = playing.take() {
        leave_world(ctx, session);
    }
    drop(outbound);
    if writer.join().is_err() {
        warn!(%peer, "writer thread panicked");
    }
    let _ = stream.shutdown(Shutdown::Both);
    info!(%peer, %reason, "connection closed");
    Ok(())
}

/// Registers the session before the character appears, so the first room
/// description has somewhere to go.
fn enter_world(
    ctx: &ConnectionContext,
    stream: &TcpStream,
    outbound: &Sender<Vec<u8>>,
    record: CharacterRecord,
    greeting: &str,
) -> Result<Playing, EnterError> {
    let handle = Arc::new(SessionHandle::new(
        &record.name,
        outbound.clone(),
        stream.try_clone().ok(),
    ));
    if !ctx.registry.register(Arc::clone(&handle)) {
        return Err(EnterError::AlreadyPlaying);
    }
    handle.send_text(greeting);
    match ctx.world.enter(record) {
        Ok(id) => Ok(Playing { handle, id }),
        Err(err) => {
            ctx.registry.unregister(&handle);
            Err(err)
        }
    }
}

fn leave_world(ctx: &ConnectionContext, session: Playing) {
    let name = session.handle.name().to_string();
    ctx.registry.unregister(&session.handle);
    match ctx.world.leave(session.id) {
        Some(record) => match ctx.store.save(&record) {
            Ok(()) => info!(%name, "character saved"),
            Err(err) => warn!(%name, error = %err, "character save failed"),
        },
        None => debug!(%name, "character was no longer in the world"),
    }
}


#[cfg(test)]
mod tests {
    use super::client::Client;
    use super::*;
    use crate::combat::engine::CombatEngine;
    use crate::combat::rules::CombatRules;
    use crate::persistence::store::MemoryCharacterStore;
    use crate::scheduler::core::{Scheduler, SchedulerHandle};
    use crate::scheduler::pulse::PulseTimings;
    use crate::world::state::fixtures;
    use std::net::TcpListener;

    struct Rig {
        addr: SocketAddr,
        store: Arc<MemoryCharacterStore>,
        registry: Arc<SessionRegistry>,
        connections: Arc<ConnectionTable>,
        scheduler: SchedulerHandle,
        server: JoinHandle<()>,
    }

    /// Serves `connections` connections, each on its own thread.
    fn rig(store: MemoryCharacterStore, connections: usize) -> Rig {
        let store = Arc::new(store);
        let registry = Arc::new(SessionRegistry::new());
        let scheduler = Scheduler::new(
            fixtures::world(),
            CombatEngine::new(CombatRules::default()),
            PulseTimings::uniform(3600.0),
            Arc::clone(&registry) as Arc<dyn crate::scheduler::core::SessionSink>,
        )
        .spawn();
        let ctx = ConnectionContext {
            world: scheduler.handle(),
            registry: Arc::clone(&registry),
            store: Arc::clone(&store) as Arc<dyn CharacterStore>,
            login: LoginFlowConfig::default(),
            write_timeout: Duration::from_secs(5),
        };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let connection_table = Arc::new(ConnectionTable::new());
        let table = Arc::clone(&connection_table);
        let server = thread::spawn(move || {
            let mut sessions = Vec::new();
            for _ in 0..connections {
                let (stream, peer) = listener.accept().unwrap();
                let guard = table.track(&stream);
                let ctx = ctx.clone();
                sessions.push(thread::spawn(move || {
                    let _guard = guard;
                    handle_connection(stream, peer, &ctx).unwrap();
                }));
            }
            for session in sessions {
                session.join().unwrap();
            }
        });
        Rig {
            addr,
            store,
            registry,
            connections: connection_table,
            scheduler,
            server,
        }
    }

    fn login(client: &mut Client, name: &str, password: &str) {
        client.expect("known? ");
        client.send(name);
        client.expect("Password: ");
        client.send(password);
        client.expect("Enjoyable.");
        client.expect("> ");
    }

    #[test]
    fn new_character_plays_and_quits() {
        let rig = rig(MemoryCharacterStore::new(), 1);
        let mut client = Client::connect(rig.addr);
        client.expect("known? ");
        client.send("bob");
        client.expect("Did I get that right, Bob (Y/N)? ");
        client.send("y");
        client.expect("Give me a password for Bob: ");
        client.send("hunter22");
        client.expect("Please retype password: ");
        client.send("hunter22");
        client.expect("Enjoyable.");
        client.expect("The Void");
        client.expect("> ");

        client.send("say hello");
        client.expect("You say 'hello'");
        client.send("fly");
        client.expect("Huh?!");
        client.send("quit");
        client.expect("Goodbye, friend.. Come back soon!");
        assert!(client.closed());

        rig.server.join().unwrap();
        assert!(rig.store.exists("bob"));
        assert!(rig.registry.is_empty());
        assert!(rig.connections.is_empty());
        let world = rig.scheduler.shutdown().unwrap();
        assert_eq!(world.character_count(), 0);
    }

    #[test]
    fn same_character_cannot_play_twice() {
        let store = MemoryCharacterStore::new();
        store
            .save(&CharacterRecord::new("Bob", "hunter22".to_string()))
            .unwrap();
        let rig = rig(store, 2);

        let mut first = Client::connect(rig.addr);
        login(&mut first, "Bob", "hunter22");

        let mut second = Client::connect(rig.addr);
        second.expect("known? ");
        second.send("Bob");
        second.expect("Password: ");
        second.send("hunter22");
        second.expect("That character is already playing.");
        second.expect("known? ");
        second.hang_up();

        first.send("quit");
        first.expect("Goodbye");
        rig.server.join().unwrap();
        rig.scheduler.shutdown().unwrap();
    }

    #[test]
    fn dropped_connection_still_saves_the_character() {
        let store = MemoryCharacterStore::new();
        store
            .save(&CharacterRecord::new("Bob", "hunter22".to_string()))
            .unwrap();
        let rig = rig(store, 1);
        let mut client = Client::connect(rig.addr);
        login(&mut client, "Bob", "hunter22");
        client.hang_up();

        rig.server.join().unwrap();
        let saved = rig.store.load("bob").unwrap().unwrap();
        assert_eq!(saved.room, Some(fixtures::TEMPLE));
        assert!(saved.password.starts_with("sha1$"));
        let world = rig.scheduler.shutdown().unwrap();
        assert_eq!(world.character_count(), 0);
    }
}

use std::net::TcpListener;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::net::connection::{handle_connection, ConnectionContext, ConnectionTable};
use crate::net::login_flow::LoginFlowConfig;
use crate::net::registry::SessionRegistry;
use crate::persistence::autosave::save_online_characters;
use crate::persistence::store::CharacterStore;
use crate::scheduler::core::{Scheduler, SchedulerHandle, SessionSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ServerSignal {
    Running = 0,
    Shutdown = 1,
}

/// Process-wide run flag, flipped by signals or the in-game shutdown command.
#[derive(Debug)]
pub struct ServerControl {
    signal: AtomicU8,
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            signal: AtomicU8::new(ServerSignal::Running as u8),
        }
    }

    pub fn request_shutdown(&self) {
        self.signal.store(ServerSignal::Shutdown as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.signal.load(Ordering::SeqCst) == ServerSignal::Running as u8
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub shutdown_grace: Duration,
    pub write_timeout: Duration,
    pub login: LoginFlowConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".to_string(),
            shutdown_grace: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            login: LoginFlowConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub saved_players: usize,
    pub save_errors: usize,
    pub closed_sessions: usize,
    /// Connections still tearing down when the grace period ran out.
    pub lingering_sessions: usize,
}

/// World output goes to the registry; the shutdown command flips the control.
struct ServerSink {
    registry: Arc<SessionRegistry>,
    control: Arc<ServerControl>,
}

impl SessionSink for ServerSink {
    fn deliver(&self, name: &str, text: &str) {
        self.registry.deliver(name, text);
    }

    fn shutdown_requested(&self) {
        info!("shutdown requested from inside the game");
        self.control.request_shutdown();
    }
}

pub struct GameServer {
    config: ServerConfig,
    control: Arc<ServerControl>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn CharacterStore>,
    connections: Arc<ConnectionTable>,
}

impl GameServer {
    pub fn new(config: ServerConfig, store: Arc<dyn CharacterStore>, control: Arc<ServerControl>) -> Self {
        Self {
            config,
            control,
            registry: Arc::new(SessionRegistry::new()),
            store,
            connections: Arc::new(ConnectionTable::new()),
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sink to hand to the scheduler that will serve this server's sessions.
    pub fn sink(&self) -> Arc<dyn SessionSink> {
        Arc::new(ServerSink {
            registry: Arc::clone(&self.registry),
            control: Arc::clone(&self.control),
        })
    }

    /// Accepted transports whose threads have not finished teardown.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn run(&self, scheduler: Scheduler) -> Result<ShutdownReport, String> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .map_err(|err| format!("bind {} failed: {}", self.config.bind_addr, err))?;
        self.serve(listener, scheduler)
    }

    /// Accepts until the control flag drops, then runs the shutdown sequence.
    pub fn serve(&self, listener: TcpListener, scheduler: Scheduler) -> Result<ShutdownReport, String> {
        listener
            .set_nonblocking(true)
            .map_err(|err| format!("listener nonblocking failed: {}", err))?;
        let addr = listener
            .local_addr()
            .map_err(|err| format!("listener address failed: {}", err))?;
        let scheduler = scheduler.spawn();
        let ctx = ConnectionContext {
            world: scheduler.handle(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            login: self.config.login.clone(),
            write_timeout: self.config.write_timeout,
        };
        info!(%addr, "game server listening");

        while self.control.is_running() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let guard = self.connections.track(&stream);
                    let ctx = ctx.clone();
                    thread::spawn(move || {
                        let _guard = guard;
                        if let Err(err) = handle_connection(stream, peer, &ctx) {
                            warn!(%peer, error = %err, "connection error");
                        }
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                }
            }
        }
        drop(listener);
        drop(ctx);
        Ok(self.shutdown(scheduler))
    }

    fn shutdown(&self, scheduler: SchedulerHandle) -> ShutdownReport {
        info!("game server shutting down");
        let mut report = ShutdownReport::default();
        match scheduler.shutdown() {
            Ok(world) => {
                let saved = save_online_characters(&world, self.store.as_ref());
                report.saved_players = saved.saved_players;
                report.save_errors = saved.player_errors.len();
            }
            Err(err) => error!(error = %err, "world lost at shutdown; nothing saved"),
        }
        self.registry.close_all();
        report.closed_sessions = self.connections.close_all();
        report.lingering_sessions = self.wait_for_connections(self.config.shutdown_grace);
        if report.lingering_sessions > 0 {
            warn!(
                lingering = report.lingering_sessions,
                "grace period over with connections still open"
            );
        }
        info!(
            saved = report.saved_players,
            closed = report.closed_sessions,
            "game server stopped"
        );
        report
    }

    fn wait_for_connections(&self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        loop {
            let open = self.active_connections();
            if open == 0 || Instant::now() >= deadline {
                return open;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

/// Turns SIGINT/SIGTERM into a shutdown request. The thread is detached and
/// dies with the process.
pub fn spawn_signal_watcher(control: Arc<ServerControl>) -> Result<JoinHandle<()>, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| format!("signal runtime failed: {}", err))?;
    Ok(thread::spawn(move || {
        runtime.block_on(async move {
            wait_for_signal().await;
            info!("termination signal received");
            control.request_shutdown();
        });
    }))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

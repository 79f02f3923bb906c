pub mod combat;
pub mod config;
pub mod entities;
pub mod interpreter;
pub mod net;
pub mod persistence;
pub mod scheduler;
pub mod telemetry;
pub mod world;

use std::sync::Arc;
use tracing::{info, warn};

use crate::combat::engine::CombatEngine;
use crate::config::{AppConfig, StorageKind};
use crate::net::server::{spawn_signal_watcher, GameServer, ServerConfig, ServerControl};
use crate::persistence::store::{CharacterStore, FileCharacterStore, MemoryCharacterStore};
use crate::scheduler::core::Scheduler;
use crate::telemetry::logging::LogConfig;
use crate::world::prototypes::WorldData;
use crate::world::state::WorldState;

pub fn run(args: &[String]) -> Result<(), String> {
    let config = AppConfig::from_args(args)?;
    telemetry::logging::init(&LogConfig {
        level: config.log_level.clone(),
        dir: Some(config.log_dir.clone()),
    })?;
    info!(bind = %config.bind_addr(), "diku starting");

    let world = load_world(&config)?;
    info!(
        rooms = world.room_count(),
        characters = world.character_count(),
        objects = world.object_count(),
        "world booted"
    );

    let store: Arc<dyn CharacterStore> = match config.storage {
        StorageKind::File => {
            info!(dir = %config.player_dir.display(), "player files");
            Arc::new(FileCharacterStore::new(&config.player_dir, config.player_cache))
        }
        StorageKind::Memory => {
            warn!("in-memory player storage, characters are lost on exit");
            Arc::new(MemoryCharacterStore::new())
        }
    };

    let control = Arc::new(ServerControl::new());
    let _signals = spawn_signal_watcher(Arc::clone(&control))?;
    let server = GameServer::new(
        ServerConfig {
            bind_addr: config.bind_addr(),
            shutdown_grace: config.shutdown_grace(),
            ..ServerConfig::default()
        },
        store,
        control,
    );
    let scheduler = Scheduler::new(
        world,
        CombatEngine::new(config.combat.clone()),
        config.pulses,
        server.sink(),
    );

    let report = server.run(scheduler)?;
    info!(
        saved = report.saved_players,
        save_errors = report.save_errors,
        closed = report.closed_sessions,
        lingering = report.lingering_sessions,
        "normal termination of game"
    );
    if report.save_errors > 0 {
        return Err(format!("{} characters could not be saved", report.save_errors));
    }
    Ok(())
}

/// A missing world file boots the bare start room; a broken one is fatal.
fn load_world(config: &AppConfig) -> Result<WorldState, String> {
    if !config.world_path.exists() {
        warn!(path = %config.world_path.display(), "world file missing, booting an empty world");
        return Ok(WorldState::from_data(WorldData::default(), config.start_room));
    }
    let (data, report) = WorldData::load(&config.world_path)?;
    info!(
        rooms = report.rooms,
        mobiles = report.mobiles,
        objects = report.objects,
        zones = report.zones,
        placeholders = report.placeholders.len(),
        skipped = report.skipped.len(),
        "world data loaded"
    );
    Ok(WorldState::from_data(data, config.start_room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn shipped_world_and_config_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = AppConfig::load(&root.join("config/diku.yml")).unwrap();
        assert_eq!(config, AppConfig::default());

        let (data, report) = WorldData::load(&root.join(&config.world_path)).unwrap();
        assert!(report.placeholders.is_empty());
        assert!(report.skipped.is_empty());
        let world = WorldState::from_data(data, None);
        assert_eq!(world.room_count(), 5);
        assert_eq!(world.character_count(), 4);
    }

    #[test]
    fn missing_world_file_boots_the_start_room() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            world_path: dir.path().join("absent.yml"),
            ..AppConfig::default()
        };
        let world = load_world(&config).unwrap();
        assert_eq!(world.room_count(), 1);
        assert_eq!(world.character_count(), 0);
    }
}

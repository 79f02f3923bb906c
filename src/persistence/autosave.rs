use tracing::{info, warn};

use crate::persistence::store::CharacterStore;
use crate::world::state::WorldState;

#[derive(Debug, Default)]
pub struct AutosaveReport {
    pub saved_players: usize,
    pub player_errors: Vec<String>,
}

/// Best effort: a failed save is recorded and the rest still go out.
pub fn save_online_characters(world: &WorldState, store: &dyn CharacterStore) -> AutosaveReport {
    let mut report = AutosaveReport::default();
    for id in world.player_ids() {
        let Some(record) = world.snapshot_character(id) else {
            continue;
        };
        match store.save(&record) {
            Ok(()) => report.saved_players += 1,
            Err(err) => {
                warn!(name = %record.name, error = %err, "autosave failed");
                report.player_errors.push(err.to_string());
            }
        }
    }
    info!(
        saved = report.saved_players,
        failed = report.player_errors.len(),
        "autosave completed"
    );
    report
}

use serde::Deserialize;
use std::time::Duration;

/// Combat constants and the variant switches of the attack algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CombatRules {
    /// Natural 20 always hits and natural 1 always misses.
    pub critical_rolls: bool,
    pub round_secs: u64,
    /// Upper bound of an unarmed player's damage roll.
    pub unarmed_max: i32,
    pub npc_corpse_secs: u64,
    pub player_corpse_secs: u64,
    pub respawn_secs: u64,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            critical_rolls: true,
            round_secs: 2,
            unarmed_max: 2,
            npc_corpse_secs: 300,
            player_corpse_secs: 600,
            respawn_secs: 60,
        }
    }
}

impl CombatRules {
    pub fn round(&self) -> Duration {
        Duration::from_secs(self.round_secs.max(1))
    }

    pub fn corpse_lifetime(&self, npc: bool) -> u64 {
        if npc {
            self.npc_corpse_secs
        } else {
            self.player_corpse_secs
        }
    }
}

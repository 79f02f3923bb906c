/// Stepped bonus shared by the strength to-hit, strength damage and dexterity armor tables.
pub fn ability_bonus(score: i32) -> i32 {
    match score {
        i32::MIN..=3 => -3,
        4..=5 => -2,
        6..=7 => -1,
        8..=13 => 0,
        14..=15 => 1,
        16..=17 => 2,
        18 => 3,
        _ => 4,
    }
}

pub fn strength_hit_bonus(strength: i32) -> i32 {
    ability_bonus(strength)
}

pub fn strength_damage_bonus(strength: i32) -> i32 {
    ability_bonus(strength)
}

pub fn dexterity_armor_bonus(dexterity: i32) -> i32 {
    ability_bonus(dexterity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageTier {
    Barely,
    Hits,
    Hard,
    VeryHard,
    ExtremelyHard,
    Massacre,
}

/// Lines for the attacker, the defender and everyone else in the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narration {
    pub to_attacker: String,
    pub to_defender: String,
    pub to_room: String,
}

impl DamageTier {
    pub fn for_damage(damage: i32) -> Self {
        match damage {
            i32::MIN..=2 => DamageTier::Barely,
            3..=4 => DamageTier::Hits,
            5..=6 => DamageTier::Hard,
            7..=10 => DamageTier::VeryHard,
            11..=15 => DamageTier::ExtremelyHard,
            _ => DamageTier::Massacre,
        }
    }

    pub fn narrate(self, attacker: &str, defender: &str) -> Narration {
        let (you, them, room) = match self {
            DamageTier::Barely => (
                format!("You barely hit {}.", defender),
                format!("{} barely hits you.", attacker),
                format!("{} barely hits {}.", attacker, defender),
            ),
            DamageTier::Hits => (
                format!("You hit {}.", defender),
                format!("{} hits you.", attacker),
                format!("{} hits {}.", attacker, defender),
            ),
            DamageTier::Hard => (
                format!("You hit {} hard.", defender),
                format!("{} hits you hard.", attacker),
                format!("{} hits {} hard.", attacker, defender),
            ),
            DamageTier::VeryHard => (
                format!("You hit {} very hard.", defender),
                format!("{} hits you very hard.", attacker),
                format!("{} hits {} very hard.", attacker, defender),
            ),
            DamageTier::ExtremelyHard => (
                format!("You hit {} extremely hard.", defender),
                format!("{} hits you extremely hard.", attacker),
                format!("{} hits {} extremely hard.", attacker, defender),
            ),
            DamageTier::Massacre => (
                format!("You massacre {} to small fragments with your hit.", defender),
                format!("{} massacres you to small fragments with the hit.", attacker),
                format!("{} massacres {} to small fragments with the hit.", attacker, defender),
            ),
        };
        Narration {
            to_attacker: you,
            to_defender: them,
            to_room: room,
        }
    }
}

pub fn miss_narration(attacker: &str, defender: &str) -> Narration {
    Narration {
        to_attacker: format!("You miss {}.", defender),
        to_defender: format!("{} misses you.", attacker),
        to_room: format!("{} misses {}.", attacker, defender),
    }
}

/// Experience for killing `victim_experience`-worth NPC; never less than one point.
pub fn experience_award(
    victim_experience: i64,
    victim_level: i32,
    attacker_level: i32,
    attacker_is_npc: bool,
) -> i64 {
    let level_diff = i64::from(victim_level - attacker_level);
    let divisor = if attacker_is_npc { 8 } else { 4 };
    (victim_experience / 3 + victim_experience * level_diff / divisor).max(1)
}

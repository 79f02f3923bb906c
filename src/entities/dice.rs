use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Source of every random number the simulation consumes.
pub trait Dice: Send {
    /// Sum of `count` rolls of a `sides`-faced die; zero when either is zero.
    fn roll(&mut self, count: u32, sides: u32) -> i32;

    /// Uniform integer in `low..=high`.
    fn between(&mut self, low: i32, high: i32) -> i32;

    fn d20(&mut self) -> i32 {
        self.roll(1, 20)
    }
}

#[derive(Debug)]
pub struct RandomDice {
    rng: StdRng,
}

impl RandomDice {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Dice for RandomDice {
    fn roll(&mut self, count: u32, sides: u32) -> i32 {
        if sides == 0 {
            return 0;
        }
        (0..count)
            .map(|_| self.rng.gen_range(1..=sides) as i32)
            .sum()
    }

    fn between(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// `NdS+B` as written in world files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub bonus: i32,
}

impl DiceSpec {
    pub fn new(count: u32, sides: u32, bonus: i32) -> Self {
        Self {
            count,
            sides,
            bonus,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.count == 0 || self.sides == 0
    }

    pub fn roll(&self, dice: &mut dyn Dice) -> i32 {
        dice.roll(self.count, self.sides) + self.bonus
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::Dice;
    use std::collections::VecDeque;

    /// Hands out queued values in order, then `fallback` forever.
    #[derive(Debug, Default)]
    pub struct ScriptedDice {
        values: VecDeque<i32>,
        fallback: i32,
    }

    impl ScriptedDice {
        pub fn new(values: &[i32]) -> Self {
            Self {
                values: values.iter().copied().collect(),
                fallback: 1,
            }
        }

        pub fn with_fallback(mut self, fallback: i32) -> Self {
            self.fallback = fallback;
            self
        }

        fn next(&mut self) -> i32 {
            self.values.pop_front().unwrap_or(self.fallback)
        }
    }

    impl Dice for ScriptedDice {
        fn roll(&mut self, count: u32, sides: u32) -> i32 {
            if count == 0 || sides == 0 {
                return 0;
            }
            self.next()
        }

        fn between(&mut self, low: i32, high: i32) -> i32 {
            self.next().clamp(low, high.max(low))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_dice_stay_in_range() {
        let mut dice = RandomDice::from_seed(7);
        for _ in 0..200 {
            let roll = dice.roll(2, 6);
            assert!((2..=12).contains(&roll));
            let value = dice.between(0, 2);
            assert!((0..=2).contains(&value));
        }
        assert_eq!(dice.roll(3, 0), 0);
        assert_eq!(dice.between(5, 5), 5);
    }

    #[test]
    fn dice_spec_adds_bonus() {
        let mut dice = scripted::ScriptedDice::new(&[4]);
        assert_eq!(DiceSpec::new(1, 8, 3).roll(&mut dice), 7);
        assert!(DiceSpec::new(0, 8, 0).is_zero());
    }
}

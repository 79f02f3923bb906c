use std::fmt;

use crate::entities::dice::Dice;

pub const HOURS_PER_DAY: u32 = 24;
pub const DAYS_PER_MONTH: u32 = 35;
pub const MONTHS_PER_YEAR: u32 = 17;

const MONTH_NAMES: [&str; MONTHS_PER_YEAR as usize] = [
    "Month of Winter",
    "Month of the Winter Wolf",
    "Month of the Frost Giant",
    "Month of the Old Forces",
    "Month of the Grand Struggle",
    "Month of the Spring",
    "Month of Nature",
    "Month of Futility",
    "Month of the Dragon",
    "Month of the Sun",
    "Month of the Heat",
    "Month of the Battle",
    "Month of the Dark Shades",
    "Month of the Shadows",
    "Month of the Long Shadows",
    "Month of the Ancient Darkness",
    "Month of the Great Evil",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sun {
    Dark,
    Rise,
    Light,
    Set,
}

/// One game hour passes per clock pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTime {
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: u32,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            hour: 0,
            day: 0,
            month: 0,
            year: 1,
        }
    }
}

impl GameTime {
    pub fn sun(&self) -> Sun {
        match self.hour {
            0..=4 => Sun::Dark,
            5 => Sun::Rise,
            6..=20 => Sun::Light,
            21 => Sun::Set,
            _ => Sun::Dark,
        }
    }

    /// Advances one hour and returns the announcement for a sun change, if any.
    pub fn advance_hour(&mut self) -> Option<&'static str> {
        self.hour += 1;
        if self.hour >= HOURS_PER_DAY {
            self.hour = 0;
            self.day += 1;
            if self.day >= DAYS_PER_MONTH {
                self.day = 0;
                self.month += 1;
                if self.month >= MONTHS_PER_YEAR {
                    self.month = 0;
                    self.year += 1;
                }
            }
        }
        match self.hour {
            5 => Some("The sun rises in the east."),
            6 => Some("The day has begun."),
            21 => Some("The sun slowly disappears in the west."),
            22 => Some("The night has begun."),
            _ => None,
        }
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month as usize).min(MONTH_NAMES.len() - 1)]
    }
}

impl fmt::Display for GameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour12 = match self.hour % 12 {
            0 => 12,
            hour => hour,
        };
        let meridiem = if self.hour >= 12 { "pm" } else { "am" };
        write!(
            f,
            "{}{}, day {} of the {}, year {}",
            hour12,
            meridiem,
            self.day + 1,
            self.month_name(),
            self.year
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sky {
    Cloudless,
    Cloudy,
    Raining,
    Lightning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weather {
    /// Millibar, kept in 960..=1040.
    pub pressure: i32,
    pub change: i32,
    pub sky: Sky,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            pressure: 1000,
            change: 0,
            sky: Sky::Cloudless,
        }
    }
}

impl Weather {
    /// Drifts the pressure and moves the sky; returns the announcement for outdoor players.
    pub fn advance(&mut self, month: u32, dice: &mut dyn Dice) -> Option<&'static str> {
        let summer = (9..=16).contains(&month);
        let diff = match (summer, self.pressure) {
            (true, pressure) if pressure > 985 => -2,
            (true, _) => 2,
            (false, pressure) if pressure > 1015 => -2,
            (false, _) => 2,
        };
        self.change += dice.roll(1, 4) * diff + dice.roll(2, 6) - dice.roll(2, 6);
        self.change = self.change.clamp(-12, 12);
        self.pressure = (self.pressure + self.change).clamp(960, 1040);

        let (next, message) = match self.sky {
            Sky::Cloudless if self.pressure < 990 => {
                (Sky::Cloudy, Some("The sky is getting cloudy."))
            }
            Sky::Cloudless if self.pressure < 1010 && dice.roll(1, 4) == 1 => {
                (Sky::Cloudy, Some("The sky is getting cloudy."))
            }
            Sky::Cloudy if self.pressure < 970 => (Sky::Raining, Some("It starts to rain.")),
            Sky::Cloudy if self.pressure < 990 && dice.roll(1, 4) == 1 => {
                (Sky::Raining, Some("It starts to rain."))
            }
            Sky::Cloudy if self.pressure > 1030 && dice.roll(1, 4) == 1 => {
                (Sky::Cloudless, Some("The clouds disappear."))
            }
            Sky::Raining if self.pressure < 970 && dice.roll(1, 4) == 1 => (
                Sky::Lightning,
                Some("Lightning starts to show in the sky."),
            ),
            Sky::Raining if self.pressure > 1030 => (Sky::Cloudless, Some("The rain stops.")),
            Sky::Raining if self.pressure > 1010 && dice.roll(1, 4) == 1 => {
                (Sky::Cloudy, Some("The rain stops."))
            }
            Sky::Lightning if self.pressure > 1010 => {
                (Sky::Raining, Some("The lightning has stopped."))
            }
            Sky::Lightning if self.pressure > 990 && dice.roll(1, 4) == 1 => {
                (Sky::Raining, Some("The lightning has stopped."))
            }
            sky => (sky, None),
        };
        self.sky = next;
        message
    }
}

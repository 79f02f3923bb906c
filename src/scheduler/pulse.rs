use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PulseKind {
    Violence,
    Mobile,
    Zone,
    Weather,
    Clock,
    Decay,
    Regen,
    Affects,
}

impl PulseKind {
    pub const ALL: [PulseKind; 8] = [
        PulseKind::Violence,
        PulseKind::Mobile,
        PulseKind::Zone,
        PulseKind::Weather,
        PulseKind::Clock,
        PulseKind::Decay,
        PulseKind::Regen,
        PulseKind::Affects,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PulseKind::Violence => "violence",
            PulseKind::Mobile => "mobile",
            PulseKind::Zone => "zone",
            PulseKind::Weather => "weather",
            PulseKind::Clock => "clock",
            PulseKind::Decay => "decay",
            PulseKind::Regen => "regen",
            PulseKind::Affects => "affects",
        }
    }
}

/// Pulse periods in seconds. Fractions are allowed so tests can run fast.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PulseTimings {
    pub violence: f64,
    pub mobile: f64,
    pub zone: f64,
    pub weather: f64,
    pub clock: f64,
    pub decay: f64,
    pub regen: f64,
    pub affects: f64,
}

impl Default for PulseTimings {
    fn default() -> Self {
        Self {
            violence: 2.0,
            mobile: 10.0,
            zone: 60.0,
            weather: 30.0,
            clock: 60.0,
            decay: 15.0,
            regen: 60.0,
            affects: 60.0,
        }
    }
}

impl PulseTimings {
    pub fn uniform(seconds: f64) -> Self {
        Self {
            violence: seconds,
            mobile: seconds,
            zone: seconds,
            weather: seconds,
            clock: seconds,
            decay: seconds,
            regen: seconds,
            affects: seconds,
        }
    }

    pub fn seconds(&self, kind: PulseKind) -> f64 {
        match kind {
            PulseKind::Violence => self.violence,
            PulseKind::Mobile => self.mobile,
            PulseKind::Zone => self.zone,
            PulseKind::Weather => self.weather,
            PulseKind::Clock => self.clock,
            PulseKind::Decay => self.decay,
            PulseKind::Regen => self.regen,
            PulseKind::Affects => self.affects,
        }
    }

    /// Never shorter than a millisecond; non-finite values fall back to the default.
    pub fn period(&self, kind: PulseKind) -> Duration {
        let seconds = self.seconds(kind);
        let seconds = if seconds.is_finite() {
            seconds
        } else {
            Self::default().seconds(kind)
        };
        Duration::from_secs_f64(seconds.max(0.001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_periods_match_classic_pulses() {
        let timings = PulseTimings::default();
        let expected = [2, 10, 60, 30, 60, 15, 60, 60];
        for (kind, secs) in PulseKind::ALL.into_iter().zip(expected) {
            assert_eq!(timings.period(kind), Duration::from_secs(secs), "{}", kind.name());
        }
    }

    #[test]
    fn overrides_and_floor() {
        let timings: PulseTimings = serde_yaml::from_str("violence: 0.5\nzone: 0\n").unwrap();
        assert_eq!(timings.period(PulseKind::Violence), Duration::from_millis(500));
        assert_eq!(timings.period(PulseKind::Zone), Duration::from_millis(1));
        assert_eq!(timings.period(PulseKind::Mobile), Duration::from_secs(10));
    }
}

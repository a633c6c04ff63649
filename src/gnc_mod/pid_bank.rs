use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pid::{Pid, PidValues};

// ---------------------------------------------------------------------------
// PID channel identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PidType {
    Alpha,
    VertSpeed,
    PitchAngle,
    PitchRate,
    FlightPathAngle,
    DeltaPitch,
    Altitude,
    Beta,
    YawRate,
    YawHeading,
    TaxiHeading,
    RollRate,
    DeltaRoll,
    BankAngle,
    RollHeading,
    ForwardAccel,
    Speed,
    TaxiForwardAccel,
    TaxiSpeed,
    TaxiYawRate,
}

/// Which loop cadence a channel runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRate {
    Inner,
    VerticalMiddle,
    VerticalOuter,
    LateralMiddle,
    LateralOuter,
}

impl PidType {
    pub const ALL: [PidType; 20] = [
        PidType::Alpha,
        PidType::VertSpeed,
        PidType::PitchAngle,
        PidType::PitchRate,
        PidType::FlightPathAngle,
        PidType::DeltaPitch,
        PidType::Altitude,
        PidType::Beta,
        PidType::YawRate,
        PidType::YawHeading,
        PidType::TaxiHeading,
        PidType::RollRate,
        PidType::DeltaRoll,
        PidType::BankAngle,
        PidType::RollHeading,
        PidType::ForwardAccel,
        PidType::Speed,
        PidType::TaxiForwardAccel,
        PidType::TaxiSpeed,
        PidType::TaxiYawRate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PidType::Alpha => "alpha",
            PidType::VertSpeed => "vert_speed",
            PidType::PitchAngle => "pitch_angle",
            PidType::PitchRate => "pitch_rate",
            PidType::FlightPathAngle => "flightpath_angle",
            PidType::DeltaPitch => "delta_pitch",
            PidType::Altitude => "altitude",
            PidType::Beta => "beta",
            PidType::YawRate => "yaw_rate",
            PidType::YawHeading => "yaw_heading",
            PidType::TaxiHeading => "taxi_heading",
            PidType::RollRate => "roll_rate",
            PidType::DeltaRoll => "delta_roll",
            PidType::BankAngle => "bank_angle",
            PidType::RollHeading => "roll_heading",
            PidType::ForwardAccel => "forward_accel",
            PidType::Speed => "speed",
            PidType::TaxiForwardAccel => "taxi_forward_accel",
            PidType::TaxiSpeed => "taxi_speed",
            PidType::TaxiYawRate => "taxi_yaw_rate",
        }
    }

    pub fn loop_rate(self) -> LoopRate {
        match self {
            PidType::VertSpeed
            | PidType::PitchAngle
            | PidType::PitchRate
            | PidType::FlightPathAngle
            | PidType::DeltaPitch => LoopRate::VerticalMiddle,
            PidType::Altitude => LoopRate::VerticalOuter,
            PidType::YawRate | PidType::TaxiHeading | PidType::DeltaRoll | PidType::BankAngle => {
                LoopRate::LateralMiddle
            }
            PidType::YawHeading | PidType::RollHeading => LoopRate::LateralOuter,
            _ => LoopRate::Inner,
        }
    }
}

impl fmt::Display for PidType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PidType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PidType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

// ---------------------------------------------------------------------------
// PID bank: one PID per channel, indexed by PidType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PidBank {
    pids: [Pid; 20],
}

impl PidBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PidType, &Pid)> {
        PidType::ALL.iter().copied().zip(self.pids.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PidType, &mut Pid)> {
        PidType::ALL.iter().copied().zip(self.pids.iter_mut())
    }

    pub fn set_controlling_value(&mut self, value: f64) {
        for pid in &mut self.pids {
            pid.set_controlling_value(value);
        }
    }

    pub fn reset_states(&mut self) {
        for pid in &mut self.pids {
            pid.reset_state();
        }
    }

    pub fn reset_timings(&mut self) {
        for pid in &mut self.pids {
            pid.reset_timing();
        }
    }

    /// Diagnostic snapshot of every channel.
    pub fn values(&self) -> Vec<(PidType, PidValues)> {
        self.iter().map(|(t, p)| (t, p.values())).collect()
    }
}

impl Index<PidType> for PidBank {
    type Output = Pid;

    fn index(&self, t: PidType) -> &Pid {
        &self.pids[t as usize]
    }
}

impl IndexMut<PidType> for PidBank {
    fn index_mut(&mut self, t: PidType) -> &mut Pid {
        &mut self.pids[t as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_lists_every_variant_in_discriminant_order() {
        for (i, t) in PidType::ALL.iter().enumerate() {
            assert_eq!(*t as usize, i);
        }
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for t in PidType::ALL {
            assert_eq!(t.name().parse::<PidType>(), Ok(t));
        }
        assert!("rudder".parse::<PidType>().is_err());
    }

    #[test]
    fn loop_assignment() {
        assert_eq!(PidType::Altitude.loop_rate(), LoopRate::VerticalOuter);
        assert_eq!(PidType::PitchRate.loop_rate(), LoopRate::VerticalMiddle);
        assert_eq!(PidType::BankAngle.loop_rate(), LoopRate::LateralMiddle);
        assert_eq!(PidType::RollHeading.loop_rate(), LoopRate::LateralOuter);
        assert_eq!(PidType::RollRate.loop_rate(), LoopRate::Inner);
        assert_eq!(PidType::TaxiYawRate.loop_rate(), LoopRate::Inner);
    }

    #[test]
    fn indexing_targets_one_channel() {
        let mut bank = PidBank::new();
        bank[PidType::Beta] = Pid::new(2.0, 0.0, 0.0);
        assert_eq!(bank[PidType::Beta].from_target(1.0, 0.0, 0.1), 2.0);
        assert_eq!(bank[PidType::Alpha].from_target(1.0, 0.0, 0.1), 0.0);
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::gnc::gain_table::truncate_gain;
use crate::gnc::{
    AutopilotLimitsAndSettings, CommonController, ControlMethod, GainSet, GainTable, LoopFactors,
    PidBank, PidType,
};
use crate::physics::units::FT_PER_M;

/// Keys nobody claimed, reported once the file is parsed.
type Unknown = BTreeMap<String, toml::Value>;

// ---------------------------------------------------------------------------
// Top-level autopilot configuration
// ---------------------------------------------------------------------------

/// Structured autopilot settings, usually read from TOML:
///
/// ```toml
/// control_method = "bank_to_turn_no_yaw"
/// min_taxi_turn_radius = 15.24          # m
///
/// [loop_factors]
/// vertical_middle = 4
///
/// [limits_and_settings]
/// bank_angle_max = 45.0
///
/// [pids.alpha]
/// kp = 0.2
/// update_interval = 0.01
///
/// [[pids.speed.gain_table]]
/// control_value = 100.0
/// kp = 0.5
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub control_method: Option<String>,
    pub min_taxi_turn_radius: Option<f64>, // m
    pub loop_factors: LoopFactorConfig,
    pub limits_and_settings: Option<LimitsConfig>,
    pub pids: BTreeMap<String, PidConfig>,
    #[serde(flatten)]
    pub unknown: Unknown,
}

impl AutopilotConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: AutopilotConfig = toml::from_str(text)?;
        config.report_unknown_keys();
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), pids = config.pids.len(), "autopilot configuration loaded");
        Ok(config)
    }

    pub fn control_method(&self) -> ConfigResult<ControlMethod> {
        match &self.control_method {
            None => Ok(ControlMethod::default()),
            Some(name) => name
                .parse()
                .map_err(ConfigError::InvalidControlMethod),
        }
    }

    pub fn limits(&self) -> AutopilotLimitsAndSettings {
        self.limits_and_settings
            .as_ref()
            .map(LimitsConfig::resolve)
            .unwrap_or_default()
    }

    /// One PID per channel; channels without a block keep empty gains.
    pub fn pid_bank(&self) -> PidBank {
        let mut bank = PidBank::new();
        for (key, block) in &self.pids {
            let name = key.strip_prefix("pid_").unwrap_or(key);
            let Ok(pid_type) = name.parse::<PidType>() else {
                warn!(pid = %key, "unknown pid block ignored");
                continue;
            };
            let pid = &mut bank[pid_type];
            pid.set_gain_table(block.gain_table(pid_type));
            if let Some(interval) = block.update_interval {
                if interval > 0.0 {
                    pid.try_set_update_interval(interval);
                } else {
                    info!(pid = %pid_type, interval, "pid update_interval ignored, must be greater than 0");
                }
            }
        }
        bank
    }

    /// Validated controller built from these settings.
    pub fn build_controller(&self) -> ConfigResult<CommonController> {
        let mut controller = CommonController::with_settings(
            self.control_method()?,
            self.pid_bank(),
            self.loop_factors.resolve()?,
            self.limits(),
        );
        if let Some(radius_m) = self.min_taxi_turn_radius {
            controller.set_min_taxi_turn_radius(radius_m * FT_PER_M);
        }
        Ok(controller)
    }

    fn report_unknown_keys(&self) {
        warn_unknown("autopilot", &self.unknown);
        warn_unknown("loop_factors", &self.loop_factors.unknown);
        if let Some(limits) = &self.limits_and_settings {
            warn_unknown("limits_and_settings", &limits.unknown);
        }
        for (name, block) in &self.pids {
            warn_unknown(name, &block.unknown);
            for row in &block.gain_table {
                warn_unknown(name, &row.unknown);
            }
        }
    }
}

fn warn_unknown(block: &str, keys: &Unknown) {
    for key in keys.keys() {
        warn!(block, key = %key, "unrecognized configuration key");
    }
}

// ---------------------------------------------------------------------------
// Loop rate factors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoopFactorConfig {
    pub vertical_middle: Option<u8>,
    pub vertical_outer: Option<u8>,
    pub lateral_middle: Option<u8>,
    pub lateral_outer: Option<u8>,
    pub speed_middle: Option<u8>,
    pub speed_outer: Option<u8>,
    #[serde(flatten)]
    pub unknown: Unknown,
}

impl LoopFactorConfig {
    pub fn resolve(&self) -> ConfigResult<LoopFactors> {
        let pick = |value: Option<u8>, name: &'static str| match value {
            Some(0) => Err(ConfigError::InvalidLoopFactor { name }),
            Some(v) => Ok(v),
            None => Ok(1),
        };
        Ok(LoopFactors {
            vertical_middle: pick(self.vertical_middle, "vertical middle")?,
            vertical_outer: pick(self.vertical_outer, "vertical outer")?,
            lateral_middle: pick(self.lateral_middle, "lateral middle")?,
            lateral_outer: pick(self.lateral_outer, "lateral outer")?,
            speed_middle: pick(self.speed_middle, "speed middle")?,
            speed_outer: pick(self.speed_outer, "speed outer")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Limits and settings
// ---------------------------------------------------------------------------

/// Overrides applied on top of the built-in limit defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub afterburner_threshold: Option<f64>,
    pub speedbrake_threshold: Option<f64>,
    pub turn_roll_in_multiplier: Option<f64>,
    pub route_allowable_angle_error: Option<f64>, // deg
    pub pitch_gload_min: Option<f64>,
    pub pitch_gload_max: Option<f64>,
    pub alpha_min: Option<f64>,
    pub alpha_max: Option<f64>,
    pub pitch_rate_min: Option<f64>,
    pub pitch_rate_max: Option<f64>,
    pub vert_speed_min: Option<f64>,
    pub vert_speed_max: Option<f64>,
    pub yaw_gload_max: Option<f64>,
    pub taxi_speed_max_fps: Option<f64>,
    pub taxi_yaw_rate_max: Option<f64>,
    pub beta_max: Option<f64>,
    pub yaw_rate_max: Option<f64>,
    pub roll_rate_max: Option<f64>,
    pub bank_angle_max: Option<f64>,
    pub forward_accel_min: Option<f64>,
    pub forward_accel_max: Option<f64>,
    #[serde(flatten)]
    pub unknown: Unknown,
}

impl LimitsConfig {
    pub fn resolve(&self) -> AutopilotLimitsAndSettings {
        let mut l = AutopilotLimitsAndSettings::default();
        if let Some(v) = self.afterburner_threshold {
            l.set_afterburner_threshold(v);
        }
        if let Some(v) = self.speedbrake_threshold {
            l.set_speed_brake_threshold(v);
        }
        if let Some(v) = self.route_allowable_angle_error {
            l.route_allowable_angle_error = v.to_radians();
        }

        let overrides = [
            (&mut l.turn_roll_in_multiplier, self.turn_roll_in_multiplier),
            (&mut l.pitch_g_load_min, self.pitch_gload_min),
            (&mut l.pitch_g_load_max, self.pitch_gload_max),
            (&mut l.alpha_min, self.alpha_min),
            (&mut l.alpha_max, self.alpha_max),
            (&mut l.pitch_rate_min, self.pitch_rate_min),
            (&mut l.pitch_rate_max, self.pitch_rate_max),
            (&mut l.vert_speed_min, self.vert_speed_min),
            (&mut l.vert_speed_max, self.vert_speed_max),
            (&mut l.yaw_g_load_max, self.yaw_gload_max),
            (&mut l.taxi_speed_max, self.taxi_speed_max_fps),
            (&mut l.taxi_yaw_rate_max, self.taxi_yaw_rate_max),
            (&mut l.beta_max, self.beta_max),
            (&mut l.yaw_rate_max, self.yaw_rate_max),
            (&mut l.roll_rate_max, self.roll_rate_max),
            (&mut l.bank_angle_max, self.bank_angle_max),
            (&mut l.forward_accel_min, self.forward_accel_min),
            (&mut l.forward_accel_max, self.forward_accel_max),
        ];
        for (field, value) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }
        l
    }
}

// ---------------------------------------------------------------------------
// PID blocks
// ---------------------------------------------------------------------------

/// Gain keywords shared by scalar blocks and gain-table rows.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct GainFields {
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    pub max_error_accum: Option<f64>,
    pub low_pass_alpha: Option<f64>,
    pub ignore_large_error_accum: Option<f64>,
    pub ignore_small_error_accum: Option<f64>,
    pub kt_anti_windup_gain: Option<f64>,
}

const GAIN_KEYS: [&str; 8] = [
    "kp",
    "ki",
    "kd",
    "max_error_accum",
    "low_pass_alpha",
    "ignore_large_error_accum",
    "ignore_small_error_accum",
    "kt_anti_windup_gain",
];

impl GainFields {
    fn present(&self) -> [bool; 8] {
        [
            self.kp.is_some(),
            self.ki.is_some(),
            self.kd.is_some(),
            self.max_error_accum.is_some(),
            self.low_pass_alpha.is_some(),
            self.ignore_large_error_accum.is_some(),
            self.ignore_small_error_accum.is_some(),
            self.kt_anti_windup_gain.is_some(),
        ]
    }

    fn any(&self) -> bool {
        self.present().iter().any(|p| *p)
    }

    fn to_gain_set(self, controlling_value: f64) -> GainSet {
        let base = GainSet::default();
        GainSet {
            controlling_value,
            kp: self.kp.map_or(base.kp, truncate_gain),
            ki: self.ki.map_or(base.ki, truncate_gain),
            kd: self.kd.map_or(base.kd, truncate_gain),
            lowpass_alpha: self.low_pass_alpha.unwrap_or(base.lowpass_alpha),
            max_accum: match self.max_error_accum {
                Some(m) if m >= 0.0 => m,
                Some(m) => {
                    warn!(max_error_accum = m, "max_error_accum must be non-negative, default kept");
                    base.max_accum
                }
                None => base.max_accum,
            },
            max_error_zero: self.ignore_large_error_accum.unwrap_or(base.max_error_zero),
            min_error_zero: self.ignore_small_error_accum.unwrap_or(base.min_error_zero),
            kt_anti_windup: self.kt_anti_windup_gain.map_or(base.kt_anti_windup, truncate_gain),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GainRowConfig {
    pub control_value: Option<f64>,
    #[serde(flatten)]
    pub gains: GainFields,
    #[serde(flatten)]
    pub unknown: Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub update_interval: Option<f64>, // s
    pub gain_table: Vec<GainRowConfig>,
    #[serde(flatten)]
    pub gains: GainFields,
    #[serde(flatten)]
    pub unknown: Unknown,
}

impl PidConfig {
    /// Rows without `control_value`, or missing a gain an earlier row set,
    /// are logged and dropped. Scalar gains form a row at control value 0.
    pub fn gain_table(&self, pid: PidType) -> GainTable {
        let mut seen = [false; 8];
        let mut rows = Vec::with_capacity(self.gain_table.len() + 1);

        for row in &self.gain_table {
            let present = row.gains.present();
            let mut valid = true;
            for (i, key) in GAIN_KEYS.iter().enumerate() {
                if seen[i] && !present[i] {
                    error!(%pid, key, "gain_table row missing a value earlier rows set");
                    valid = false;
                }
                seen[i] |= present[i];
            }
            match row.control_value {
                None => error!(%pid, "gain_table row missing control_value"),
                Some(cv) if valid => rows.push(row.gains.to_gain_set(cv)),
                Some(_) => {}
            }
        }

        if self.gains.any() {
            if !self.gain_table.is_empty() {
                error!(%pid, "both tabular and scalar gains given");
            }
            rows.push(self.gains.to_gain_set(0.0));
        }
        GainTable::from_rows(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        control_method = "BANK_TO_TURN_WITH_YAW"
        min_taxi_turn_radius = 20.0

        [loop_factors]
        vertical_middle = 4
        lateral_outer = 2

        [limits_and_settings]
        bank_angle_max = 45.0
        afterburner_threshold = 0.95
        route_allowable_angle_error = 2.0

        [pids.pid_alpha]
        kp = 0.2
        ki = 0.01
        update_interval = 0.02

        [[pids.speed.gain_table]]
        control_value = 50.0
        kp = 0.4
        kd = 0.1

        [[pids.speed.gain_table]]
        control_value = 400.0
        kp = 0.2
        kd = 0.05
    "#;

    #[test]
    fn parses_full_controller() {
        let config = AutopilotConfig::from_toml_str(SAMPLE).unwrap();
        let c = config.build_controller().unwrap();
        assert_eq!(c.control_method(), ControlMethod::BankToTurnWithYaw);
        assert_eq!(c.loop_factors().vertical_middle, 4);
        assert_eq!(c.loop_factors().lateral_outer, 2);
        assert_eq!(c.loop_factors().speed_middle, 1);

        let limits = c.default_limits_and_settings();
        assert_eq!(limits.bank_angle_max, 45.0);
        assert!(limits.enable_afterburner_auto_control);
        assert!((limits.route_allowable_angle_error - 2.0_f64.to_radians()).abs() < 1e-12);

        assert!((c.min_taxi_turn_radius_ft() - 20.0 * FT_PER_M).abs() < 1e-9);
    }

    #[test]
    fn pid_blocks_fill_the_bank() {
        let config = AutopilotConfig::from_toml_str(SAMPLE).unwrap();
        let bank = config.pid_bank();

        let alpha = &bank[PidType::Alpha];
        assert_eq!(alpha.update_interval(), Some(0.02));
        assert_eq!(alpha.gain_table().len(), 1);
        assert!((alpha.gain_table().rows()[0].kp - 0.2).abs() < 1e-12);

        let speed = bank[PidType::Speed].gain_table();
        assert_eq!(speed.len(), 2);
        let mid = speed.interpolate(225.0);
        assert!((mid.kp - 0.3).abs() < 1e-9, "kp {}", mid.kp);
    }

    #[test]
    fn zero_loop_factor_is_rejected() {
        let config = AutopilotConfig::from_toml_str("[loop_factors]\nlateral_middle = 0\n").unwrap();
        assert!(matches!(
            config.build_controller(),
            Err(ConfigError::InvalidLoopFactor { name: "lateral middle" })
        ));
    }

    #[test]
    fn bad_control_method_is_rejected() {
        let config = AutopilotConfig::from_toml_str("control_method = \"barrel_roll\"").unwrap();
        assert!(matches!(config.control_method(), Err(ConfigError::InvalidControlMethod(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            AutopilotConfig::from_toml_str("control_method = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn non_positive_interval_is_ignored() {
        let config = AutopilotConfig::from_toml_str("[pids.beta]\nkp = 1.0\nupdate_interval = 0.0\n").unwrap();
        assert_eq!(config.pid_bank()[PidType::Beta].update_interval(), None);
    }

    #[test]
    fn negative_max_error_accum_keeps_default() {
        let config = AutopilotConfig::from_toml_str("[pids.alpha]\nki = 1.0\nmax_error_accum = -1.0\n").unwrap();
        let mut bank = config.pid_bank();
        assert_eq!(bank[PidType::Alpha].gain_table().rows()[0].max_accum, f64::MAX);
        bank[PidType::Alpha].from_target(1.0, 0.0, 0.1);
        assert!(bank[PidType::Alpha].from_target(1.0, 0.0, 0.2).is_finite());
    }

    #[test]
    fn inconsistent_rows_are_dropped() {
        let text = r#"
            [[pids.yaw_rate.gain_table]]
            control_value = 10.0
            kp = 1.0
            ki = 0.5

            [[pids.yaw_rate.gain_table]]
            control_value = 20.0
            kp = 2.0

            [[pids.yaw_rate.gain_table]]
            kp = 3.0
            ki = 0.1

            [[pids.yaw_rate.gain_table]]
            control_value = 30.0
            kp = 3.0
            ki = 0.1
        "#;
        let config = AutopilotConfig::from_toml_str(text).unwrap();
        let table = config.pid_bank()[PidType::YawRate].gain_table().clone();
        let keys: Vec<f64> = table.rows().iter().map(|r| r.controlling_value).collect();
        assert_eq!(keys, vec![10.0, 30.0]);
    }

    #[test]
    fn unknown_keys_are_collected_not_fatal() {
        let config = AutopilotConfig::from_toml_str(
            "flaps = 3\n[limits_and_settings]\nwing_sweep = 1.0\n[pids.alpha]\nkq = 2.0\n",
        )
        .unwrap();
        assert!(config.unknown.contains_key("flaps"));
        assert!(config.limits_and_settings.as_ref().unwrap().unknown.contains_key("wing_sweep"));
        assert!(config.pids["alpha"].unknown.contains_key("kq"));
        assert!(config.pids["alpha"].gains.kp.is_none());
    }

    #[test]
    fn empty_config_builds_defaults() {
        let config = AutopilotConfig::from_toml_str("").unwrap();
        let c = config.build_controller().unwrap();
        assert_eq!(c.control_method(), ControlMethod::BankToTurnNoYaw);
        assert_eq!(*c.default_limits_and_settings(), AutopilotLimitsAndSettings::default());
    }
}

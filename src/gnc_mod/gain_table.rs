use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gain set (one row of a gain schedule)
// ---------------------------------------------------------------------------

/// Gains that apply at a single controlling value (typically dynamic
/// pressure in psf).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSet {
    pub controlling_value: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub lowpass_alpha: f64,  // 0..1, 1 = unfiltered derivative
    pub max_accum: f64,      // |integral| ceiling
    pub max_error_zero: f64, // no accumulation above this |error|
    pub min_error_zero: f64, // no accumulation below this |error|
    pub kt_anti_windup: f64,
}

impl Default for GainSet {
    fn default() -> Self {
        Self {
            controlling_value: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            lowpass_alpha: 1.0,
            max_accum: f64::MAX,
            max_error_zero: f64::MAX,
            min_error_zero: f32::MIN_POSITIVE as f64,
            kt_anti_windup: 0.0,
        }
    }
}

impl GainSet {
    /// All-zero gains. Returned by an empty table.
    pub fn zero() -> Self {
        Self {
            controlling_value: 0.0,
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            lowpass_alpha: 0.0,
            max_accum: 0.0,
            max_error_zero: 0.0,
            min_error_zero: 0.0,
            kt_anti_windup: 0.0,
        }
    }

    pub fn with_pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp: truncate_gain(kp), ki: truncate_gain(ki), kd: truncate_gain(kd), ..Self::default() }
    }

    pub fn at(mut self, controlling_value: f64) -> Self {
        self.controlling_value = controlling_value;
        self
    }

    fn lerp(lo: &GainSet, hi: &GainSet, value: f64) -> GainSet {
        let span = hi.controlling_value - lo.controlling_value;
        let f = (value - lo.controlling_value) / span;
        let mix = |a: f64, b: f64| a + f * (b - a);
        GainSet {
            controlling_value: value,
            kp: mix(lo.kp, hi.kp),
            ki: mix(lo.ki, hi.ki),
            kd: mix(lo.kd, hi.kd),
            lowpass_alpha: mix(lo.lowpass_alpha, hi.lowpass_alpha),
            max_accum: mix(lo.max_accum, hi.max_accum),
            max_error_zero: mix(lo.max_error_zero, hi.max_error_zero),
            min_error_zero: mix(lo.min_error_zero, hi.min_error_zero),
            kt_anti_windup: mix(lo.kt_anti_windup, hi.kt_anti_windup),
        }
    }
}

/// Gains smaller than this are treated as exactly zero.
pub const GAIN_TRUNCATION: f64 = 100.0 * f32::EPSILON as f64;

pub fn truncate_gain(gain: f64) -> f64 {
    if gain.abs() < GAIN_TRUNCATION {
        0.0
    } else {
        gain
    }
}

// ---------------------------------------------------------------------------
// Gain table
// ---------------------------------------------------------------------------

/// Gain schedule ordered by strictly increasing controlling value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GainTable {
    rows: Vec<GainSet>,
}

impl GainTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Single-row table: constant gains regardless of controlling value.
    pub fn constant(gains: GainSet) -> Self {
        Self { rows: vec![gains] }
    }

    /// Build from rows in any order. Rows repeating an earlier key are dropped.
    pub fn from_rows(rows: impl IntoIterator<Item = GainSet>) -> Self {
        let mut table = Self::new();
        for row in rows {
            if !table.insert(row) {
                tracing::warn!(
                    control_value = row.controlling_value,
                    "duplicate gain table control value dropped"
                );
            }
        }
        table
    }

    pub fn rows(&self) -> &[GainSet] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Sorted insert. Returns false (table untouched) when the key exists.
    pub fn insert(&mut self, gains: GainSet) -> bool {
        match self
            .rows
            .binary_search_by(|r| r.controlling_value.total_cmp(&gains.controlling_value))
        {
            Ok(_) => false,
            Err(idx) => {
                self.rows.insert(idx, gains);
                true
            }
        }
    }

    /// Interpolated gains at `value`, clamped to the end rows.
    pub fn interpolate(&self, value: f64) -> GainSet {
        match self.rows.as_slice() {
            [] => GainSet::zero(),
            [only] => *only,
            rows => {
                let first = &rows[0];
                let last = &rows[rows.len() - 1];
                if value <= first.controlling_value {
                    return *first;
                }
                if value >= last.controlling_value {
                    return *last;
                }
                let hi = rows.partition_point(|r| r.controlling_value <= value);
                let lo = &rows[hi - 1];
                if lo.controlling_value == value {
                    return *lo;
                }
                GainSet::lerp(lo, &rows[hi], value)
            }
        }
    }

    fn row_mut(&mut self, controlling_value: f64) -> Option<&mut GainSet> {
        self.rows
            .iter_mut()
            .find(|r| r.controlling_value == controlling_value)
    }

    pub fn set_kp(&mut self, controlling_value: f64, kp: f64) -> bool {
        self.row_mut(controlling_value)
            .map(|r| r.kp = truncate_gain(kp))
            .is_some()
    }

    pub fn set_ki(&mut self, controlling_value: f64, ki: f64) -> bool {
        self.row_mut(controlling_value)
            .map(|r| r.ki = truncate_gain(ki))
            .is_some()
    }

    pub fn set_kd(&mut self, controlling_value: f64, kd: f64) -> bool {
        self.row_mut(controlling_value)
            .map(|r| r.kd = truncate_gain(kd))
            .is_some()
    }

    pub fn set_lowpass_alpha(&mut self, controlling_value: f64, alpha: f64) -> bool {
        self.row_mut(controlling_value)
            .map(|r| r.lowpass_alpha = alpha)
            .is_some()
    }

    pub fn set_max_accum(&mut self, controlling_value: f64, max_accum: f64) -> bool {
        self.row_mut(controlling_value)
            .map(|r| r.max_accum = max_accum)
            .is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_row() -> GainTable {
        GainTable::from_rows([
            GainSet::with_pid(1.0, 0.5, 0.1).at(100.0),
            GainSet::with_pid(3.0, 0.5, 0.3).at(300.0),
        ])
    }

    #[test]
    fn empty_table_gives_zero_gains() {
        let g = GainTable::new().interpolate(123.0);
        assert_eq!(g.kp, 0.0);
        assert_eq!(g.max_accum, 0.0);
    }

    #[test]
    fn single_row_is_constant() {
        let t = GainTable::constant(GainSet::with_pid(2.0, 0.0, 0.0).at(50.0));
        assert_eq!(t.interpolate(-1e6).kp, 2.0);
        assert_eq!(t.interpolate(1e6).kp, 2.0);
    }

    #[test]
    fn key_values_reproduce_rows() {
        let t = two_row();
        assert_eq!(t.interpolate(100.0), t.rows()[0]);
        assert_eq!(t.interpolate(300.0), t.rows()[1]);
    }

    #[test]
    fn midpoint_interpolates_linearly() {
        let g = two_row().interpolate(200.0);
        assert!((g.kp - 2.0).abs() < 1e-12, "kp = {}", g.kp);
        assert!((g.kd - 0.2).abs() < 1e-12);
        assert!((g.ki - 0.5).abs() < 1e-12, "equal neighbours stay equal");
    }

    #[test]
    fn ends_are_clamped() {
        let t = two_row();
        assert_eq!(t.interpolate(0.0).kp, 1.0);
        assert_eq!(t.interpolate(1_000.0).kp, 3.0);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = two_row();
        let before = t.clone();
        assert!(!t.insert(GainSet::with_pid(9.0, 9.0, 9.0).at(100.0)));
        assert_eq!(t, before);
    }

    #[test]
    fn insert_keeps_order() {
        let mut t = two_row();
        assert!(t.insert(GainSet::with_pid(2.0, 0.0, 0.0).at(200.0)));
        assert!(t.insert(GainSet::with_pid(0.5, 0.0, 0.0).at(10.0)));
        let keys: Vec<f64> = t.rows().iter().map(|r| r.controlling_value).collect();
        assert_eq!(keys, vec![10.0, 100.0, 200.0, 300.0]);
    }

    #[test]
    fn field_setters_need_existing_key() {
        let mut t = two_row();
        assert!(t.set_kp(300.0, 4.0));
        assert_eq!(t.rows()[1].kp, 4.0);
        assert!(!t.set_ki(250.0, 1.0));
        assert!(t.set_max_accum(100.0, 5.0));
        assert_eq!(t.rows()[0].max_accum, 5.0);
    }

    #[test]
    fn tiny_gains_truncate_to_zero() {
        assert_eq!(truncate_gain(1e-9), 0.0);
        assert_eq!(truncate_gain(-1e-9), 0.0);
        assert_eq!(truncate_gain(0.01), 0.01);
    }

    #[test]
    fn default_small_error_gate_is_float_min() {
        let g = GainSet::default();
        assert_eq!(g.min_error_zero, f32::MIN_POSITIVE as f64);
        assert_eq!(g.max_error_zero, f64::MAX);
    }
}

// ---------------------------------------------------------------------------
// Unit conversions (the control laws run in feet, knots, and degrees)
// ---------------------------------------------------------------------------

pub const G0: f64 = 9.80665;            // m/s^2
pub const G_FTPS2: f64 = 32.174;        // ft/s^2
pub const FT_PER_M: f64 = 3.28084;
pub const M_PER_FT: f64 = 0.3048;
pub const FPS_PER_KNOT: f64 = 1.68781;
pub const MPS_PER_KNOT: f64 = 0.514_444;
pub const PSF_PER_PA: f64 = 0.020_885_434;
pub const LBF_PER_N: f64 = 0.224_808_94;

pub fn mps_to_fps(v: f64) -> f64 {
    v * FT_PER_M
}

pub fn fps_to_mps(v: f64) -> f64 {
    v * M_PER_FT
}

pub fn mps_to_fpm(v: f64) -> f64 {
    v * FT_PER_M * 60.0
}

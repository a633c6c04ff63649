use crate::gnc::Environment;
use crate::physics::units::{FT_PER_M, G0, MPS_PER_KNOT, M_PER_FT, PSF_PER_PA};

// ---------------------------------------------------------------------------
// ISA 1976 Standard Atmosphere (sea level to 86 km)
// ---------------------------------------------------------------------------

const R_AIR: f64 = 287.052_87; // specific gas constant for dry air, J/(kg·K)
const GAMMA: f64 = 1.4;        // ratio of specific heats

const T0: f64 = 288.15;        // sea-level temperature, K
const P0: f64 = 101_325.0;     // sea-level pressure, Pa

/// Atmospheric properties at a given geometric altitude.
#[derive(Debug, Clone, Copy)]
pub struct Atmo {
    pub density: f64,      // kg/m^3
    pub pressure: f64,     // Pa
    pub temperature: f64,  // K
    pub sound_speed: f64,  // m/s
}

/// ISA 1976 standard atmosphere model.
///
/// Piecewise temperature profile with 7 layers from 0-86 km.
/// Clamps negative altitudes to sea level; returns near-vacuum above 86 km.
pub fn isa(altitude_m: f64) -> Atmo {
    let h = altitude_m.max(0.0);

    let (temperature, pressure) = if h < 11_000.0 {
        // Troposphere: lapse -6.5 K/km
        gradient_layer(h, 0.0, T0, -0.0065, P0)
    } else if h < 20_000.0 {
        // Tropopause: isothermal 216.65 K
        isothermal_layer(h, 11_000.0, 216.65, 22_632.1)
    } else if h < 32_000.0 {
        // Stratosphere I: lapse +1.0 K/km
        gradient_layer(h, 20_000.0, 216.65, 0.001, 5_474.89)
    } else if h < 47_000.0 {
        // Stratosphere II: lapse +2.8 K/km
        gradient_layer(h, 32_000.0, 228.65, 0.0028, 868.019)
    } else if h < 51_000.0 {
        // Mesosphere I: isothermal 270.65 K
        isothermal_layer(h, 47_000.0, 270.65, 110.906)
    } else if h < 71_000.0 {
        // Mesosphere II: lapse -2.8 K/km
        gradient_layer(h, 51_000.0, 270.65, -0.0028, 66.9389)
    } else if h < 86_000.0 {
        // Mesosphere III: lapse -2.0 K/km
        gradient_layer(h, 71_000.0, 214.65, -0.002, 3.956_42)
    } else {
        // Above 86 km: exponential decay approximation
        let t = 186.87;
        let p = 0.3734 * (-0.000_15 * (h - 86_000.0)).exp();
        (t, p.max(0.0))
    };

    let density = if temperature > 0.0 {
        pressure / (R_AIR * temperature)
    } else {
        0.0
    };

    Atmo {
        density,
        pressure,
        temperature,
        sound_speed: (GAMMA * R_AIR * temperature).sqrt(),
    }
}

// ---------------------------------------------------------------------------
// Airspeed conversions
// ---------------------------------------------------------------------------

/// ISA-backed `Environment` for the autopilot's airspeed targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAtmosphere;

impl Environment for StandardAtmosphere {
    fn fps_from_mach(&self, alt_m: f64, mach: f64) -> f64 {
        mach * isa(alt_m).sound_speed * FT_PER_M
    }

    fn fps_from_kcas(&self, alt_m: f64, kcas: f64) -> f64 {
        let a0 = isa(0.0).sound_speed;
        let qc = impact_pressure(kcas * MPS_PER_KNOT / a0, P0);
        let atmo = isa(alt_m);
        mach_from_impact_pressure(qc, atmo.pressure) * atmo.sound_speed * FT_PER_M
    }

    fn dynamic_pressure_psf(&self, alt_m: f64, speed_fps: f64) -> f64 {
        let v = speed_fps * M_PER_FT;
        0.5 * isa(alt_m).density * v * v * PSF_PER_PA
    }
}

/// Pitot impact pressure at `mach` for static pressure `p`. Rayleigh pitot
/// formula above Mach 1.
pub fn impact_pressure(mach: f64, p: f64) -> f64 {
    let m2 = mach * mach;
    if mach <= 1.0 {
        p * ((1.0 + 0.2 * m2).powf(3.5) - 1.0)
    } else {
        p * (166.921_58 * mach.powi(7) / (7.0 * m2 - 1.0).powf(2.5) - 1.0)
    }
}

/// Inverse of [`impact_pressure`].
pub fn mach_from_impact_pressure(qc: f64, p: f64) -> f64 {
    if p <= 0.0 || qc <= 0.0 {
        return 0.0;
    }
    let ratio = qc / p + 1.0;
    let subsonic = (5.0 * (ratio.powf(2.0 / 7.0) - 1.0)).sqrt();
    if subsonic <= 1.0 {
        return subsonic;
    }
    // Fixed-point iteration on the Rayleigh relation converges from M = 1.
    let mut m = subsonic;
    for _ in 0..50 {
        let next = 0.881_285 * (ratio * (1.0 - 1.0 / (7.0 * m * m)).powf(2.5)).sqrt();
        if (next - m).abs() < 1e-10 {
            return next;
        }
        m = next;
    }
    m
}

// ---------------------------------------------------------------------------
// Layer helpers
// ---------------------------------------------------------------------------

/// Gradient layer: T = T_base + lapse * (h - h_base)
fn gradient_layer(h: f64, h_base: f64, t_base: f64, lapse: f64, p_base: f64) -> (f64, f64) {
    let t = t_base + lapse * (h - h_base);
    let p = p_base * (t / t_base).powf(-G0 / (lapse * R_AIR));
    (t, p)
}

/// Isothermal layer: T = const, pressure decays exponentially
fn isothermal_layer(h: f64, h_base: f64, t: f64, p_base: f64) -> (f64, f64) {
    let p = p_base * ((-G0 / (R_AIR * t)) * (h - h_base)).exp();
    (t, p)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Conversions between simulation units (px, ms) and physical units.

/// The number of pixels per metre.
pub const PX_PER_M: f64 = 10.0;

/// Converts metres to pixels.
pub fn m_to_px(m: f64) -> f64 {
    m * PX_PER_M
}

/// Converts pixels to metres.
pub fn px_to_m(px: f64) -> f64 {
    px / PX_PER_M
}

/// Converts a speed in km/h to px/ms.
pub fn kmh_to_px_per_ms(kmh: f64) -> f64 {
    kmh * 1000.0 / 3600.0 * PX_PER_M / 1000.0
}

/// Converts a speed in px/ms to km/h.
pub fn px_per_ms_to_kmh(v: f64) -> f64 {
    v * 1000.0 / PX_PER_M * 3600.0 / 1000.0
}

/// Converts a speed in px/ms to m/s.
pub fn px_per_ms_to_mps(v: f64) -> f64 {
    v * 1000.0 / PX_PER_M
}

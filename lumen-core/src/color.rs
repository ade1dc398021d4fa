//! Saturating RGB colors

/// A packed RGB color
///
/// All arithmetic saturates at the channel bounds, nothing ever wraps around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

fn to_channel(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.max(0.0).min(1.0) * 255.0).round() as u8
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    /// Build a color from intensities in `[0, 1]`, out of range values are clamped
    pub fn from_f32(r: f32, g: f32, b: f32) -> Color {
        Color {
            r: to_channel(r),
            g: to_channel(g),
            b: to_channel(b),
        }
    }

    /// HSV color, all components in `[0, 1]`
    ///
    /// Hue wraps around, saturation and value are clamped.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Color {
        let h = if h.is_finite() { h.rem_euclid(1.0) } else { 0.0 };
        let s = s.max(0.0).min(1.0);
        let v = v.max(0.0).min(1.0);

        let sector = h * 6.0;
        let i = sector.floor();
        let f = sector - i;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match i as u32 % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Color::from_f32(r, g, b)
    }

    /// Channels as intensities in `[0, 1]`
    pub fn to_f32(self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }

    /// Multiply every channel, clamping the result
    pub fn scale(self, factor: f32) -> Color {
        let [r, g, b] = self.to_f32();
        Color::from_f32(r * factor, g * factor, b * factor)
    }

    /// Linear fade towards `other`, `t` is clamped to `[0, 1]`
    pub fn fade(self, other: Color, t: f32) -> Color {
        let t = if t.is_nan() { 0.0 } else { t.max(0.0).min(1.0) };
        let [r0, g0, b0] = self.to_f32();
        let [r1, g1, b1] = other.to_f32();
        Color::from_f32(
            r0 + (r1 - r0) * t,
            g0 + (g1 - g0) * t,
            b0 + (b1 - b0) * t,
        )
    }

    pub fn is_black(self) -> bool {
        self == Color::BLACK
    }
}

impl std::ops::Add for Color {
    type Output = Color;

    fn add(self, other: Color) -> Color {
        Color {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
        }
    }
}

impl std::ops::AddAssign for Color {
    fn add_assign(&mut self, other: Color) {
        *self = *self + other;
    }
}

impl std::ops::Mul<f32> for Color {
    type Output = Color;

    fn mul(self, factor: f32) -> Color {
        self.scale(factor)
    }
}

impl From<[u8; 3]> for Color {
    fn from(c: [u8; 3]) -> Color {
        Color::new(c[0], c[1], c[2])
    }
}

impl From<Color> for tiny_skia::Color {
    fn from(c: Color) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(c.r, c.g, c.b, 255)
    }
}

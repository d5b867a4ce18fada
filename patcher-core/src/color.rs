//! Colour conversions used when rotating palette hues.

use serde::Deserialize;

/// An 8-bit-per-channel colour expanded from the GBA's 15-bit format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

fn expand5(c: u16) -> u8 {
    let c = (c & 0x1F) as u8;
    (c << 3) | (c >> 2)
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub fn from_rgb15(value: u16) -> Self {
        Self {
            r: expand5(value),
            g: expand5(value >> 5),
            b: expand5(value >> 10),
        }
    }

    pub fn to_rgb15(self) -> u16 {
        (self.r as u16 >> 3) | ((self.g as u16 >> 3) << 5) | ((self.b as u16 >> 3) << 10)
    }

    pub fn luma(self) -> f64 {
        0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64
    }

    fn from_unit(r: f64, g: f64, b: f64) -> Self {
        let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self {
            r: channel(r),
            g: channel(g),
            b: channel(b),
        }
    }

    pub fn to_hsv(self) -> Hsv {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };

        Hsv {
            hue,
            saturation,
            value: max,
        }
    }

    pub fn to_oklab(self) -> Oklab {
        let lin = |c: u8| {
            let c = c as f64 / 255.0;
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        let (r, g, b) = (lin(self.r), lin(self.g), lin(self.b));

        let l = (0.412_221_470_8 * r + 0.536_332_536_3 * g + 0.051_445_992_9 * b).cbrt();
        let m = (0.211_903_498_2 * r + 0.680_699_545_1 * g + 0.107_396_956_6 * b).cbrt();
        let s = (0.088_302_461_9 * r + 0.281_718_837_6 * g + 0.629_978_700_5 * b).cbrt();

        Oklab {
            l: 0.210_454_255_3 * l + 0.793_617_785_0 * m - 0.004_072_046_8 * s,
            a: 1.977_998_495_1 * l - 2.428_592_205_0 * m + 0.450_593_709_9 * s,
            b: 0.025_904_037_1 * l + 0.782_771_766_2 * m - 0.808_675_766_0 * s,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hsv {
    /// Degrees in `[0, 360)`.
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Hsv {
    pub fn to_rgb(self) -> Rgb {
        let c = self.value * self.saturation;
        let h = self.hue.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.value - c;
        Rgb::from_unit(r + m, g + m, b + m)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Oklab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Oklab {
    pub fn rotate_hue(self, radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self {
            l: self.l,
            a: self.a * cos - self.b * sin,
            b: self.a * sin + self.b * cos,
        }
    }

    pub fn to_rgb(self) -> Rgb {
        let l = (self.l + 0.396_337_777_4 * self.a + 0.215_803_757_3 * self.b).powi(3);
        let m = (self.l - 0.105_561_345_8 * self.a - 0.063_854_172_8 * self.b).powi(3);
        let s = (self.l - 0.089_484_177_5 * self.a - 1.291_485_548_0 * self.b).powi(3);

        let r = 4.076_741_662_1 * l - 3.307_711_591_3 * m + 0.230_969_929_2 * s;
        let g = -1.268_438_004_6 * l + 2.609_757_401_1 * m - 0.341_319_396_5 * s;
        let b = -0.004_196_086_3 * l - 0.703_418_614_7 * m + 1.707_614_701_0 * s;

        let gamma = |c: f64| {
            if c <= 0.003_130_8 {
                12.92 * c
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        };
        Rgb::from_unit(gamma(r), gamma(g), gamma(b))
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub enum ColorSpace {
    #[serde(rename = "HSV")]
    Hsv,
    #[default]
    Oklab,
}

impl ColorSpace {
    pub fn math(self) -> &'static dyn PaletteMath {
        match self {
            ColorSpace::Hsv => &HsvMath,
            ColorSpace::Oklab => &OklabMath,
        }
    }
}

/// Hue and lightness adjustment of a single colour.
pub trait PaletteMath {
    /// Rotates the hue by `degrees` and multiplies lightness by
    /// `lightness`, capping it at full brightness.
    fn adjust(&self, color: Rgb, degrees: f64, lightness: f64) -> Rgb;

    fn shift_hue(&self, color: Rgb, degrees: f64) -> Rgb {
        self.adjust(color, degrees, 1.0)
    }
}

/// HSV rotation that keeps each colour's original luma. Black and white
/// are left untouched.
pub struct HsvMath;

impl PaletteMath for HsvMath {
    fn adjust(&self, color: Rgb, degrees: f64, lightness: f64) -> Rgb {
        if color == Rgb::BLACK || color == Rgb::WHITE {
            return color;
        }
        let orig_luma = color.luma();
        let mut hsv = color.to_hsv();
        hsv.hue = (hsv.hue + degrees).rem_euclid(360.0);
        hsv.value = (hsv.value * lightness).min(1.0);
        let rgb = hsv.to_rgb();

        let luma = rgb.luma();
        if luma == 0.0 {
            return rgb;
        }
        let ratio = orig_luma / luma;
        let scale = |c: u8| (c as f64 * ratio).min(255.0) as u8;
        Rgb {
            r: scale(rgb.r),
            g: scale(rgb.g),
            b: scale(rgb.b),
        }
    }
}

pub struct OklabMath;

impl PaletteMath for OklabMath {
    fn adjust(&self, color: Rgb, degrees: f64, lightness: f64) -> Rgb {
        let mut lab = color.to_oklab().rotate_hue(degrees.to_radians());
        lab.l = (lab.l * lightness).min(1.0);
        lab.to_rgb()
    }
}

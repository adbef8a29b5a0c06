//! Coarse plate category from the dominant background color.

use common::plates::{ColorEstimate, PlateColor};
use image::DynamicImage;

/// Saturation below which a crop is treated as white.
const LOW_SATURATION: u8 = 50;

// Hue bands on the 8-bit scale (degrees / 2).
const YELLOW_HUE: std::ops::RangeInclusive<u8> = 20..=35;
const BLUE_HUE: std::ops::RangeInclusive<u8> = 100..=130;
const RED_HUE_LOW: u8 = 10;
const RED_HUE_HIGH: u8 = 170;

/// RGB to HSV with hue in 0..180 and saturation/value in 0..=255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let degrees = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
    let hue = ((degrees / 2.0).round() as u32 % 180) as u8;

    (hue, saturation.round() as u8, max as u8)
}

fn argmax(histogram: &[u32]) -> u8 {
    let mut best = 0;
    for (i, &count) in histogram.iter().enumerate() {
        if count > histogram[best] {
            best = i;
        }
    }
    best as u8
}

/// Estimate plate color from per-channel HSV histogram peaks.
pub fn classify_color(crop: &DynamicImage) -> ColorEstimate {
    let rgb = crop.to_rgb8();

    let mut hue = [0u32; 180];
    let mut saturation = [0u32; 256];
    let mut value = [0u32; 256];
    for pixel in rgb.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        hue[h as usize] += 1;
        saturation[s as usize] += 1;
        value[v as usize] += 1;
    }

    let (h, s, v) = (argmax(&hue), argmax(&saturation), argmax(&value));

    let color = if s < LOW_SATURATION {
        PlateColor::White
    } else if YELLOW_HUE.contains(&h) {
        PlateColor::Yellow
    } else if BLUE_HUE.contains(&h) {
        PlateColor::Blue
    } else if h <= RED_HUE_LOW || h >= RED_HUE_HIGH {
        PlateColor::Red
    } else {
        PlateColor::White
    };

    ColorEstimate {
        color,
        plate_type: color.plate_type(),
        dominant_hue: h,
        dominant_saturation: s,
        dominant_value: v,
    }
}

//! Dense floating-point disparity maps.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use image::GrayImage;

use pm_core::{Error, Result};

/// Per-pixel disparity with a validity mask.
///
/// Every pixel starts valid; the left-right consistency check clears the
/// mask for occluded or mismatched pixels. Later stages overwrite the
/// *values* of invalid pixels but leave the mask untouched, so exporters
/// can still distinguish measured from filled disparities.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    pub data: Vec<f64>,
    pub valid: Vec<bool>,
    width: u32,
    height: u32,
    pub min_disparity: i32,
    pub max_disparity: i32,
}

impl DisparityMap {
    pub fn new(width: u32, height: u32, min_d: i32, max_d: i32) -> Self {
        let size = (width as usize) * (height as usize);
        Self {
            data: vec![0.0; size],
            valid: vec![true; size],
            width,
            height,
            min_disparity: min_d,
            max_disparity: max_d,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f64 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f64) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    #[inline]
    pub fn is_valid(&self, x: u32, y: u32) -> bool {
        self.valid[self.index(x, y)]
    }

    pub fn set_valid(&mut self, x: u32, y: u32, valid: bool) {
        let idx = self.index(x, y);
        self.valid[idx] = valid;
    }

    /// Fraction of pixels still marked valid.
    pub fn valid_fraction(&self) -> f64 {
        if self.valid.is_empty() {
            return 0.0;
        }
        self.valid.iter().filter(|&&v| v).count() as f64 / self.valid.len() as f64
    }

    /// 8-bit visualization: the valid min..max range is linearly rescaled
    /// to 0..255; invalid pixels come out black.
    pub fn to_image(&self) -> GrayImage {
        let mut min_val = f64::INFINITY;
        let mut max_val = f64::NEG_INFINITY;
        for (&d, &ok) in self.data.iter().zip(&self.valid) {
            if ok && d.is_finite() {
                min_val = min_val.min(d);
                max_val = max_val.max(d);
            }
        }
        let range = max_val - min_val;

        let mut img = GrayImage::new(self.width, self.height);
        for (i, px) in img.as_mut().iter_mut().enumerate() {
            let d = self.data[i];
            *px = if !self.valid[i] || !d.is_finite() {
                0
            } else if range > 0.0 {
                (((d - min_val) / range) * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        img
    }

    /// Write `x, y, disparity` lines with 8-digit precision, `x` as the
    /// outer index. With `nan_invalid` set, invalid pixels are written as
    /// `NaN` instead of their filled value.
    pub fn write_csv<W: Write>(&self, out: &mut W, nan_invalid: bool) -> Result<()> {
        for x in 0..self.width {
            for y in 0..self.height {
                if nan_invalid && !self.is_valid(x, y) {
                    writeln!(out, "{x}, {y}, NaN")?;
                } else {
                    writeln!(out, "{x}, {y}, {:.8}", self.get(x, y))?;
                }
            }
        }
        Ok(())
    }

    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P, nan_invalid: bool) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_csv(&mut out, nan_invalid)
    }

    /// Parse a CSV produced by [`write_csv`](Self::write_csv).
    ///
    /// Dimensions are inferred from the largest coordinates seen; `NaN`
    /// entries come back as invalid pixels.
    pub fn read_csv<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries: Vec<(u32, u32, f64)> = Vec::new();
        let mut width = 0u32;
        let mut height = 0u32;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            fn parse<'a>(field: Option<&'a str>, line: &str, lineno: usize) -> Result<&'a str> {
                field.ok_or_else(|| {
                    Error::InvalidInput(format!("malformed CSV line {}: '{line}'", lineno + 1))
                })
            }
            let x: u32 = parse(fields.next(), &line, lineno)?.parse().map_err(|_| {
                Error::InvalidInput(format!("bad column index on CSV line {}", lineno + 1))
            })?;
            let y: u32 = parse(fields.next(), &line, lineno)?.parse().map_err(|_| {
                Error::InvalidInput(format!("bad row index on CSV line {}", lineno + 1))
            })?;
            let d: f64 = parse(fields.next(), &line, lineno)?.parse().map_err(|_| {
                Error::InvalidInput(format!("bad disparity on CSV line {}", lineno + 1))
            })?;
            width = width.max(x + 1);
            height = height.max(y + 1);
            entries.push((x, y, d));
        }

        if entries.is_empty() {
            return Err(Error::InvalidInput("empty disparity CSV".to_string()));
        }

        let mut map = DisparityMap::new(width, height, 0, 0);
        for (x, y, d) in entries {
            map.set(x, y, d);
            if d.is_nan() {
                map.set_valid(x, y, false);
            }
        }

        let finite = map.data.iter().copied().filter(|d| d.is_finite());
        map.min_disparity = finite.clone().fold(f64::INFINITY, f64::min).floor() as i32;
        map.max_disparity = finite.fold(f64::NEG_INFINITY, f64::max).ceil() as i32;
        Ok(map)
    }

    pub fn read_csv_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_csv(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_image_rescales_valid_range() {
        let mut map = DisparityMap::new(3, 1, 0, 10);
        map.set(0, 0, 2.0);
        map.set(1, 0, 7.0);
        map.set(2, 0, 12.0);
        map.set_valid(2, 0, false);

        let img = map.to_image();
        // Valid range is 2..7; the invalid pixel renders black.
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 255);
        assert_eq!(img.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn csv_round_trip_preserves_values() {
        let mut map = DisparityMap::new(4, 3, 0, 20);
        for y in 0..3 {
            for x in 0..4 {
                map.set(x, y, 0.125 + f64::from(x) * 3.5 + f64::from(y) * 0.0625);
            }
        }

        let mut buf = Vec::new();
        map.write_csv(&mut buf, false).unwrap();
        let back = DisparityMap::read_csv(buf.as_slice()).unwrap();

        assert_eq!(back.width(), 4);
        assert_eq!(back.height(), 3);
        for y in 0..3 {
            for x in 0..4 {
                let a = map.get(x, y);
                let b = back.get(x, y);
                // Written with 8 fractional digits.
                assert!((a - b).abs() < 5e-9, "({x}, {y}): {a} vs {b}");
            }
        }
    }

    #[test]
    fn invalid_pixels_round_trip_as_nan() {
        let mut map = DisparityMap::new(2, 1, 0, 5);
        map.set(0, 0, 3.0);
        map.set(1, 0, 4.0);
        map.set_valid(1, 0, false);

        let mut buf = Vec::new();
        map.write_csv(&mut buf, true).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("NaN"));

        let back = DisparityMap::read_csv(buf.as_slice()).unwrap();
        assert!(back.is_valid(0, 0));
        assert!(!back.is_valid(1, 0));
        assert!(back.get(1, 0).is_nan());
    }

    #[test]
    fn csv_rows_iterate_x_outer() {
        let mut map = DisparityMap::new(2, 2, 0, 5);
        map.set(1, 0, 9.0);
        let mut buf = Vec::new();
        map.write_csv(&mut buf, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("0, 0"));
        assert!(lines[1].starts_with("0, 1"));
        assert!(lines[2].starts_with("1, 0"));
    }
}

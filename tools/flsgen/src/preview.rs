//! PNG preview of a generated landscape, one colour per class.
use std::path::Path;

use anyhow::{Context, Result};
use flsgen_core::{EMPTY, NO_DATA};

const PALETTE: [[u8; 3]; 10] = [
    [ 34, 139,  34], // forest green
    [218, 165,  32], // goldenrod
    [ 70, 130, 180], // steel blue
    [205,  92,  92], // indian red
    [147, 112, 219], // purple
    [ 60, 179, 113], // sea green
    [244, 164,  96], // sandy brown
    [ 95, 158, 160], // cadet blue
    [199,  21, 133], // violet red
    [128, 128,   0], // olive
];
const EMPTY_RGB: [u8; 3] = [245, 245, 235];
const NO_DATA_RGB: [u8; 3] = [40, 40, 40];

fn class_color(value: i32) -> [u8; 3] {
    match value {
        EMPTY   => EMPTY_RGB,
        NO_DATA => NO_DATA_RGB,
        v       => PALETTE[v.rem_euclid(PALETTE.len() as i32) as usize],
    }
}

/// Write `raster` (`nb_rows × nb_cols`, row-major) as an RGB PNG.
pub fn write_png(path: &Path, raster: &[i32], nb_rows: usize, nb_cols: usize) -> Result<()> {
    let mut img = image::RgbImage::new(nb_cols as u32, nb_rows as u32);
    for r in 0..nb_rows {
        for c in 0..nb_cols {
            img.put_pixel(c as u32, r as u32, image::Rgb(class_color(raster[r * nb_cols + c])));
        }
    }
    img.save(path).with_context(|| format!("cannot save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_and_classes_get_distinct_colours() {
        assert_eq!(class_color(EMPTY), EMPTY_RGB);
        assert_eq!(class_color(NO_DATA), NO_DATA_RGB);
        assert_ne!(class_color(0), class_color(1));
        assert_eq!(class_color(0), class_color(PALETTE.len() as i32), "palette wraps");
    }
}

//! Single-band GeoTIFF reading and writing.
//!
//! Georeferencing is carried by the standard GeoTIFF tags: pixel scale,
//! one tie point at the top-left corner, a minimal GeoKey directory holding
//! the EPSG code, and the GDAL no-data string.
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

// GeoKey ids and values.
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta {
    pub width: usize,
    pub height: usize,
    /// Top-left corner.
    pub x_min: f64,
    pub y_max: f64,
    pub res_x: f64,
    pub res_y: f64,
    pub epsg: Option<u16>,
    pub nodata: Option<f64>,
}

impl RasterMeta {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, x_min: 0.0, y_max: 0.0, res_x: 1.0, res_y: 1.0, epsg: None, nodata: None }
    }

    fn geo_keys(&self) -> Option<Vec<u16>> {
        let epsg = self.epsg?;
        let (model, key) = if (4000..5000).contains(&epsg) {
            (MODEL_GEOGRAPHIC, GEOGRAPHIC_TYPE)
        } else {
            (MODEL_PROJECTED, PROJECTED_CS_TYPE)
        };
        #[rustfmt::skip]
        let keys = vec![
            1, 1, 0, 3,
            GT_MODEL_TYPE,  0, 1, model,
            GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            key,            0, 1, epsg,
        ];
        Some(keys)
    }
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// First band as `f32`, with whatever georeferencing the file carries.
pub fn read_f32(path: &Path) -> Result<(Vec<f32>, RasterMeta)> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file)).with_context(|| format!("not a TIFF: {}", path.display()))?;
    let (width, height) = decoder.dimensions()?;
    let mut meta = RasterMeta::new(width as usize, height as usize);

    if let Ok(scale) = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE) {
        if scale.len() >= 2 {
            meta.res_x = scale[0];
            meta.res_y = scale[1];
        }
    }
    if let Ok(tie) = decoder.get_tag_f64_vec(MODEL_TIEPOINT) {
        if tie.len() >= 6 {
            meta.x_min = tie[3] - tie[0] * meta.res_x;
            meta.y_max = tie[4] + tie[1] * meta.res_y;
        }
    }
    if let Ok(keys) = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY) {
        meta.epsg = keys
            .chunks_exact(4)
            .skip(1)
            .find(|k| k[0] == PROJECTED_CS_TYPE || k[0] == GEOGRAPHIC_TYPE)
            .map(|k| k[3]);
    }
    if let Ok(nodata) = decoder.get_tag_ascii_string(GDAL_NODATA) {
        meta.nodata = nodata.trim_matches(char::from(0)).trim().parse().ok();
    }

    let data: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => bail!("unsupported pixel type in {}", path.display()),
    };
    if data.len() != meta.width * meta.height {
        bail!("{} is not a single-band raster", path.display());
    }
    Ok((data, meta))
}

/// Mask raster: a cell is masked when it equals the file's no-data value
/// (or is NaN when the file declares none).
pub fn read_mask(path: &Path) -> Result<(Vec<bool>, RasterMeta)> {
    let (data, meta) = read_f32(path)?;
    let nodata = meta.nodata.map(|v| v as f32);
    let masked = data
        .iter()
        .map(|&v| match nodata {
            Some(nd) => v == nd || v.is_nan(),
            None => v.is_nan(),
        })
        .collect();
    Ok((masked, meta))
}

// ── Writing ───────────────────────────────────────────────────────────────────

fn write_band<C>(path: &Path, meta: &RasterMeta, data: &[C::Inner]) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    if data.len() != meta.width * meta.height {
        bail!("raster size does not match {}x{}", meta.width, meta.height);
    }
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<C>(meta.width as u32, meta.height as u32)?;
    let tags = image.encoder();
    tags.write_tag(MODEL_PIXEL_SCALE, &[meta.res_x, meta.res_y, 0.0][..])?;
    tags.write_tag(MODEL_TIEPOINT, &[0.0, 0.0, 0.0, meta.x_min, meta.y_max, 0.0][..])?;
    if let Some(keys) = meta.geo_keys() {
        tags.write_tag(GEO_KEY_DIRECTORY, &keys[..])?;
    }
    if let Some(nodata) = meta.nodata {
        tags.write_tag(GDAL_NODATA, nodata.to_string().as_str())?;
    }
    image.write_data(data).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

pub fn write_f32(path: &Path, meta: &RasterMeta, data: &[f32]) -> Result<()> {
    write_band::<colortype::Gray32Float>(path, meta, data)
}

pub fn write_i32(path: &Path, meta: &RasterMeta, data: &[i32]) -> Result<()> {
    write_band::<colortype::GrayI32>(path, meta, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("flsgen-{}-{name}", std::process::id()))
    }

    #[test]
    fn georeferencing_survives_a_write_read_cycle() {
        let path = temp("terrain.tif");
        let meta = RasterMeta {
            x_min: 500_000.0,
            y_max: 6_200_000.0,
            res_x: 30.0,
            res_y: 30.0,
            epsg: Some(2154),
            nodata: Some(-9999.0),
            ..RasterMeta::new(4, 3)
        };
        let data: Vec<f32> = (0..12).map(|v| v as f32 * 0.5).collect();
        write_f32(&path, &meta, &data).unwrap();
        let (back, back_meta) = read_f32(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, data);
        assert_eq!(back_meta, meta);
    }

    #[test]
    fn nodata_cells_become_masked() {
        let path = temp("mask.tif");
        let meta = RasterMeta { nodata: Some(-2.0), ..RasterMeta::new(3, 1) };
        write_i32(&path, &meta, &[0, -2, 1]).unwrap();
        let (mask, _) = read_mask(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(mask, vec![false, true, false]);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let path = temp("bad.tif");
        assert!(write_f32(&path, &RasterMeta::new(2, 2), &[0.0; 3]).is_err());
    }
}

//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate. Only north-up grids described by the
//! ModelPixelScale and ModelTiepoint tags are understood; projections are not
//! interpreted. No-data is carried through the GDAL_NODATA ASCII tag.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Read the first band of a GeoTIFF as `f64`.
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

/// Write a raster as a single-band 32-bit float GeoTIFF.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster<f64>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer)?;
    writer.flush()?;
    Ok(())
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

pub(crate) fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<Raster<f64>> {
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(tiff_err("Cannot read dimensions"))?;
    let (rows, cols) = (height as usize, width as usize);

    let data: Vec<f64> = match decoder
        .read_image()
        .map_err(tiff_err("Cannot read image data"))?
    {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Multi-band images decode interleaved; keep the first band only
    let bands = data.len() / (rows * cols).max(1);
    let data = if bands > 1 {
        data.into_iter().step_by(bands).collect()
    } else {
        data
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    let nodata = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    raster.set_nodata(Some(nodata.unwrap_or(f64::NAN)));

    Ok(raster)
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

pub(crate) fn encode_geotiff<W: Write + Seek>(raster: &Raster<f64>, writer: W) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| if raster.is_nodata(v) { f32::NAN } else { v as f32 })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let gt = raster.transform();
    let scale = [gt.cell_width, gt.cell_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    // Version 1.1.0 with two keys: projected model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    image
        .encoder()
        .write_tag(Tag::Unknown(GDAL_NODATA), "nan")
        .map_err(tiff_err("Cannot write nodata tag"))?;

    image
        .write_data(&data)
        .map_err(tiff_err("Cannot write image data"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    #[test]
    fn test_prediction_raster_survives_encoding() {
        let mut raster = Raster::from_vec(vec![1.5, f64::NAN, -3.25, 8.0, 0.0, 2.0], 2, 3)
            .unwrap()
            .with_transform(GeoTransform::new(500.0, 1200.0, 25.0, -25.0))
            .with_nodata(Some(f64::NAN));
        raster.set(1, 2, 4.0).unwrap();

        let mut buf = Cursor::new(Vec::new());
        encode_geotiff(&raster, &mut buf).unwrap();
        buf.set_position(0);
        let back = decode_geotiff(buf).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_relative_eq!(back.transform().origin_x, 500.0);
        assert_relative_eq!(back.transform().origin_y, 1200.0);
        assert_relative_eq!(back.transform().cell_height, -25.0);
        assert!(back.get(0, 1).unwrap().is_nan());
        assert!(back.is_nodata(back.get(0, 1).unwrap()));
        assert_relative_eq!(back.get(0, 2).unwrap(), -3.25);
        assert_relative_eq!(back.get(1, 2).unwrap(), 4.0);
    }
}

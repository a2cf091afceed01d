//! PDF snapshot export.
//!
//! Produces a single A4-landscape page with:
//! - a header (title and generation timestamp)
//! - the rendered map, composited onto white and scaled to fit
//! - a legend with one swatch and NDVI band per growth stage
//! - the map bounds (north-east and south-west corners) and zoom

use std::path::Path;

use chrono::NaiveDateTime;
use image::RgbaImage;
use log::info;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::raster::stage_color;
use crate::{Error, GrowthStage, Result, Viewport};

/// A4 landscape in PDF points.
pub const PAGE_WIDTH: f32 = 842.0;
pub const PAGE_HEIGHT: f32 = 595.0;

const MARGIN: f32 = 36.0;
const SIDEBAR_WIDTH: f32 = 170.0;
const HEADER_HEIGHT: f32 = 50.0;
const SWATCH: f32 = 10.0;

pub const SNAPSHOT_TITLE: &str = "Sugarcane Growth Stage Map";

/// Download name for a snapshot taken at `at`.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use sugarcane_map::snapshot_filename;
///
/// let at = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(7, 5, 0).unwrap();
/// assert_eq!(snapshot_filename(at), "sugarcane-map-20240309-070500.pdf");
/// ```
pub fn snapshot_filename(at: NaiveDateTime) -> String {
    format!("sugarcane-map-{}.pdf", at.format("%Y%m%d-%H%M%S"))
}

/// A finished snapshot document.
#[derive(Debug, Clone)]
pub struct SnapshotDocument {
    filename: String,
    bytes: Vec<u8>,
}

impl SnapshotDocument {
    /// Lay out the page around `map` (usually the output of
    /// [`rasterize_view`](crate::rasterize_view) for `viewport`).
    pub fn build(map: &RgbaImage, viewport: &Viewport, generated_at: NaiveDateTime) -> Result<Self> {
        if map.width() == 0 || map.height() == 0 {
            return Err(Error::Export("map image is empty".to_string()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => map.width() as i64,
                "Height" => map.height() as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            flatten_on_white(map),
        ));

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Im1" => image_id },
        });

        let mut ops = Vec::new();
        header_ops(&mut ops, generated_at);
        map_ops(&mut ops, map.width() as f32, map.height() as f32);
        legend_ops(&mut ops);
        bounds_ops(&mut ops, viewport);

        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;

        let filename = snapshot_filename(generated_at);
        info!("[export] built {} ({} bytes)", filename, bytes.len());

        Ok(Self { filename, bytes })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the document into `dir` under its snapshot filename.
    pub fn save_in(&self, dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Drop alpha by blending every pixel over white.
fn flatten_on_white(map: &RgbaImage) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((map.width() * map.height() * 3) as usize);
    for pixel in map.pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        for channel in [r, g, b] {
            let blended = (channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255;
            rgb.push(blended as u8);
        }
    }
    rgb
}

fn text(ops: &mut Vec<Operation>, x: f32, y: f32, size: f32, line: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(line)]));
    ops.push(Operation::new("ET", vec![]));
}

fn fill_color(ops: &mut Vec<Operation>, rgb: [u8; 3]) {
    ops.push(Operation::new(
        "rg",
        rgb.iter().map(|c| (*c as f32 / 255.0).into()).collect(),
    ));
}

fn header_ops(ops: &mut Vec<Operation>, generated_at: NaiveDateTime) {
    fill_color(ops, [0, 0, 0]);
    text(ops, MARGIN, PAGE_HEIGHT - MARGIN - 18.0, 18.0, SNAPSHOT_TITLE);
    let stamp = format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    text(ops, MARGIN, PAGE_HEIGHT - MARGIN - 34.0, 10.0, &stamp);
}

/// Scale the map to fit the area left of the sidebar, keeping its aspect ratio.
fn map_ops(ops: &mut Vec<Operation>, width: f32, height: f32) {
    let area_w = PAGE_WIDTH - 2.0 * MARGIN - SIDEBAR_WIDTH;
    let area_h = PAGE_HEIGHT - 2.0 * MARGIN - HEADER_HEIGHT;
    let scale = (area_w / width).min(area_h / height);
    let (w, h) = (width * scale, height * scale);
    let y = MARGIN + (area_h - h);

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![w.into(), 0.into(), 0.into(), h.into(), MARGIN.into(), y.into()],
    ));
    ops.push(Operation::new("Do", vec!["Im1".into()]));
    ops.push(Operation::new("Q", vec![]));

    // frame
    ops.push(Operation::new("w", vec![0.5_f32.into()]));
    ops.push(Operation::new("re", vec![MARGIN.into(), y.into(), w.into(), h.into()]));
    ops.push(Operation::new("S", vec![]));
}

fn sidebar_x() -> f32 {
    PAGE_WIDTH - MARGIN - SIDEBAR_WIDTH + 14.0
}

fn legend_ops(ops: &mut Vec<Operation>) {
    let x = sidebar_x();
    let mut y = PAGE_HEIGHT - MARGIN - HEADER_HEIGHT - 12.0;

    fill_color(ops, [0, 0, 0]);
    text(ops, x, y, 12.0, "Growth Stages");

    for stage in GrowthStage::ALL {
        y -= 20.0;
        let [r, g, b, _] = stage_color(stage).0;
        fill_color(ops, [r, g, b]);
        ops.push(Operation::new(
            "re",
            vec![x.into(), (y - 1.0).into(), SWATCH.into(), SWATCH.into()],
        ));
        ops.push(Operation::new("f", vec![]));

        fill_color(ops, [0, 0, 0]);
        let label = match stage.legend_range() {
            Some((lo, hi)) => format!("{} (NDVI {:.1} - {:.1})", stage, lo, hi),
            None => stage.to_string(),
        };
        text(ops, x + SWATCH + 6.0, y, 9.0, &label);
    }
}

fn bounds_ops(ops: &mut Vec<Operation>, viewport: &Viewport) {
    let x = sidebar_x();
    let mut y = PAGE_HEIGHT - MARGIN - HEADER_HEIGHT - 140.0;
    let ne = viewport.bounds_ne();
    let sw = viewport.bounds_sw();

    fill_color(ops, [0, 0, 0]);
    text(ops, x, y, 12.0, "Map Bounds");
    for line in [
        format!("North-East: {:.5}, {:.5}", ne.lat, ne.lng),
        format!("South-West: {:.5}, {:.5}", sw.lat, sw.lng),
        format!("Zoom: {}", viewport.zoom),
    ] {
        y -= 16.0;
        text(ops, x, y, 9.0, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::Rgba;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(13, 45, 9).unwrap()
    }

    #[test]
    fn test_filename_is_timestamped() {
        assert_eq!(snapshot_filename(at()), "sugarcane-map-20240115-134509.pdf");
    }

    #[test]
    fn test_flatten_on_white() {
        let mut map = RgbaImage::new(2, 1);
        map.put_pixel(1, 0, Rgba([37, 99, 235, 255]));
        assert_eq!(flatten_on_white(&map), vec![255, 255, 255, 37, 99, 235]);
    }

    #[test]
    fn test_document_is_a_single_page_pdf() {
        let mut map = RgbaImage::new(64, 48);
        map.put_pixel(10, 10, Rgba([37, 99, 235, 255]));
        let viewport = Viewport::new(14.0488, 121.2799, 10, 64, 48);

        let snapshot = SnapshotDocument::build(&map, &viewport, at()).unwrap();
        assert_eq!(snapshot.filename(), "sugarcane-map-20240115-134509.pdf");
        assert!(snapshot.bytes().starts_with(b"%PDF-1.5"));

        let parsed = Document::load_mem(snapshot.bytes()).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn test_empty_map_is_rejected() {
        let viewport = Viewport::new(14.0488, 121.2799, 10, 0, 0);
        let result = SnapshotDocument::build(&RgbaImage::new(0, 0), &viewport, at());
        assert!(matches!(result, Err(Error::Export(_))));
    }
}

//! Sector-to-sector resampling of one raster onto another.
//!
//! Pixels cover a finite area: pixel `(i, j)` of a `w x h` raster over sector
//! `s` spans longitudes `s.min_lon + i * s.lon_delta / w` to the next column
//! and is sampled at its centre. The source-to-destination transform is
//!
//! ```text
//! x_d = tx + sx * x_s        y_d = ty + sy * y_s
//! sx  = (dst.w / dst.lon_delta) * (src.lon_delta / src.w)
//! tx  = (src.min_lon - dst.min_lon) * dst.w / dst.lon_delta
//! ty  = (dst.max_lat - src.max_lat) * dst.h / dst.lat_delta
//! ```
//!
//! Image rasters are sampled bilinearly and blended source-over. Element
//! buffers copy the element whose area contains the mapped pixel centre and
//! treat the source missing-data value as transparent.

use image::RgbaImage;
use tracing::debug;

use super::buffer::ElementBuffer;
use super::data_raster::DataRaster;
use super::sector::Sector;

// =============================================================================
// Transforms
// =============================================================================

/// Affine map from source pixel space to destination pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelTransform {
    pub tx: f64,
    pub ty: f64,
    pub sx: f64,
    pub sy: f64,
}

impl PixelTransform {
    /// Transform between a `src_w x src_h` raster over `src` and a
    /// `dst_w x dst_h` raster over `dst`.
    pub fn between(
        src: &Sector,
        src_w: u32,
        src_h: u32,
        dst: &Sector,
        dst_w: u32,
        dst_h: u32,
    ) -> Self {
        let dst_x_density = dst_w as f64 / dst.lon_delta();
        let dst_y_density = dst_h as f64 / dst.lat_delta();
        Self {
            tx: (src.min_lon - dst.min_lon) * dst_x_density,
            ty: (dst.max_lat - src.max_lat) * dst_y_density,
            sx: dst_x_density * (src.lon_delta() / src_w as f64),
            sy: dst_y_density * (src.lat_delta() / src_h as f64),
        }
    }

    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.tx + self.sx * x, self.ty + self.sy * y)
    }

    #[inline]
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.tx) / self.sx, (y - self.ty) / self.sy)
    }
}

/// Map a geographic position to pixel coordinates of a `width x height`
/// raster over `sector`.
///
/// Translates by `(-max_lat, -min_lon)` and scales by
/// `(width / lon_delta, -height / lat_delta)`; rows grow southward.
pub fn geo_to_pixel(sector: &Sector, width: u32, height: u32, lat: f64, lon: f64) -> (f64, f64) {
    let x = (lon - sector.min_lon) * (width as f64 / sector.lon_delta());
    let y = (lat - sector.max_lat) * (-(height as f64) / sector.lat_delta());
    (x, y)
}

/// Half-open range of destination pixels, by column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    fn intersect(&self, other: &PixelRect) -> PixelRect {
        PixelRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }
}

/// Pixels whose centres fall in `[lo, hi)` along one axis, clamped to `[0, n)`.
fn centre_span(lo: f64, hi: f64, n: u32) -> (u32, u32) {
    let first = (lo - 0.5).ceil().max(0.0);
    let end = (hi - 0.5).ceil().min(n as f64);
    if !(first < end) {
        return (0, 0);
    }
    (first as u32, end as u32)
}

fn rect_from_extent(x_lo: f64, x_hi: f64, y_lo: f64, y_hi: f64, width: u32, height: u32) -> PixelRect {
    let (x0, x1) = centre_span(x_lo, x_hi, width);
    let (y0, y1) = centre_span(y_lo, y_hi, height);
    PixelRect { x0, y0, x1, y1 }
}

/// Destination pixels covered by the source footprint and the clip sector.
fn destination_rect(
    transform: &PixelTransform,
    src_w: u32,
    src_h: u32,
    dst: &Sector,
    dst_w: u32,
    dst_h: u32,
    clip: Option<&Sector>,
) -> PixelRect {
    let (fx1, fy1) = transform.apply(src_w as f64, src_h as f64);
    let footprint = rect_from_extent(transform.tx, fx1, transform.ty, fy1, dst_w, dst_h);

    match clip {
        Some(clip) => {
            let (cx0, cy0) = geo_to_pixel(dst, dst_w, dst_h, clip.max_lat, clip.min_lon);
            let (cx1, cy1) = geo_to_pixel(dst, dst_w, dst_h, clip.min_lat, clip.max_lon);
            footprint.intersect(&rect_from_extent(cx0, cx1, cy0, cy1, dst_w, dst_h))
        }
        None => footprint,
    }
}

// =============================================================================
// Drawing
// =============================================================================

/// Resample `source` onto `canvas`, limited to `clip` when given.
///
/// A no-op when the sectors share no area, when the clip rectangle holds no
/// pixel centre, or when one raster is an image and the other a buffer.
pub fn draw_on_canvas(source: &DataRaster, canvas: &mut DataRaster, clip: Option<&Sector>) {
    let src_sector = source.sector();
    let dst_sector = canvas.sector();
    if !src_sector.intersects_interior(&dst_sector) {
        return;
    }
    if let Some(clip) = clip {
        if !clip.intersects_interior(&dst_sector) {
            return;
        }
    }

    let (src_w, src_h) = (source.width(), source.height());
    let (dst_w, dst_h) = (canvas.width(), canvas.height());
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return;
    }

    let transform = PixelTransform::between(&src_sector, src_w, src_h, &dst_sector, dst_w, dst_h);
    let rect = destination_rect(&transform, src_w, src_h, &dst_sector, dst_w, dst_h, clip);
    if rect.is_empty() {
        return;
    }

    match (source, canvas) {
        (DataRaster::Image(src), DataRaster::Image(dst)) => {
            draw_image(&src.image, &mut dst.image, &transform, &rect)
        }
        (DataRaster::Buffer(src), DataRaster::Buffer(dst)) => {
            if dst.buffer.is_mapped() {
                debug!("canvas buffer is read-only, skipping draw");
                return;
            }
            draw_buffer(&src.buffer, &mut dst.buffer, &transform, &rect)
        }
        (src, dst) => debug!(
            source = ?src.pixel_format(),
            canvas = ?dst.pixel_format(),
            "raster kinds differ, skipping draw"
        ),
    }
}

/// Bilinear sample at continuous pixel position `(u, v)` with clamped edges,
/// returning premultiplied RGBA in `[0, 1]`.
fn sample_bilinear(image: &RgbaImage, u: f64, v: f64) -> [f64; 4] {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    let u = u.clamp(0.0, max_x);
    let v = v.clamp(0.0, max_y);

    let x0 = u.floor() as u32;
    let y0 = v.floor() as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = u - x0 as f64;
    let fy = v - y0 as f64;

    let weights = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x1, y0, fx * (1.0 - fy)),
        (x0, y1, (1.0 - fx) * fy),
        (x1, y1, fx * fy),
    ];

    let mut out = [0.0; 4];
    for (x, y, w) in weights {
        if w == 0.0 {
            continue;
        }
        let p = image.get_pixel(x, y).0;
        let a = p[3] as f64 / 255.0;
        out[0] += w * a * p[0] as f64 / 255.0;
        out[1] += w * a * p[1] as f64 / 255.0;
        out[2] += w * a * p[2] as f64 / 255.0;
        out[3] += w * a;
    }
    out
}

fn draw_image(src: &RgbaImage, dst: &mut RgbaImage, transform: &PixelTransform, rect: &PixelRect) {
    for yd in rect.y0..rect.y1 {
        for xd in rect.x0..rect.x1 {
            let (xs, ys) = transform.invert(xd as f64 + 0.5, yd as f64 + 0.5);
            let s = sample_bilinear(src, xs - 0.5, ys - 0.5);
            if s[3] <= 0.0 {
                continue;
            }

            let pixel = dst.get_pixel_mut(xd, yd);
            let d = pixel.0;
            let da = d[3] as f64 / 255.0;
            let out_a = s[3] + da * (1.0 - s[3]);
            let mut out = [0u8; 4];
            for c in 0..3 {
                let dc = d[c] as f64 / 255.0 * da;
                let premul = s[c] + dc * (1.0 - s[3]);
                out[c] = to_channel(premul / out_a);
            }
            out[3] = to_channel(out_a);
            pixel.0 = out;
        }
    }
}

#[inline]
fn to_channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn draw_buffer(
    src: &ElementBuffer,
    dst: &mut ElementBuffer,
    transform: &PixelTransform,
    rect: &PixelRect,
) {
    let bands = src.bands().min(dst.bands());
    let max_x = src.width() - 1;
    let max_y = src.height() - 1;

    for yd in rect.y0..rect.y1 {
        for xd in rect.x0..rect.x1 {
            let (xs, ys) = transform.invert(xd as f64 + 0.5, yd as f64 + 0.5);
            let sx = (xs.floor().max(0.0) as u32).min(max_x);
            let sy = (ys.floor().max(0.0) as u32).min(max_y);
            for band in 0..bands {
                let value = src.get(sx, sy, band);
                if src.is_missing(value) {
                    continue;
                }
                dst.set(xd, yd, band, value);
            }
        }
    }
}

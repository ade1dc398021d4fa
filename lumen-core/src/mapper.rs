//! Voronoi mapping between a 2D raster and a planar rig
//!
//! Visualizations that would rather draw shapes than address single LEDs get a
//! [`SpatialMapper`].  Its raster is a [`tiny_skia::Pixmap`] covering the rig's
//! bounding box.  Each pixel belongs to the closest LED as long as that LED is within
//! the capture radius.  After drawing, [`SpatialMapper::sample_to_leds`] sets every
//! LED to the mean color of its pixels.
//!
//! Computing the assignment is a brute-force search over all pixels and LEDs.  The
//! result only depends on the rig and the options, so it is memoized in a
//! [`MapperCache`].
use crate::color::Color;
use crate::error::{Error, Result};
use crate::rig::{ColorBuffer, Point, Rig};
use std::{collections, fmt, rc};

/// Tolerance for the coplanarity check, in rig units
const PLANE_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperOptions {
    /// Size of the longer raster side in pixels
    pub max_dimension: u32,
    /// Maximum distance of a pixel to its LED, in rig units
    pub capture_radius: f32,
}

#[derive(Debug, Default)]
pub struct MapperBuilder {
    /// Can also be set from config as `"mapper.max_dimension"`.
    pub max_dimension: Option<u32>,

    /// Can also be set from config as `"mapper.capture_radius"`.
    pub capture_radius: Option<f32>,
}

impl MapperBuilder {
    pub fn new() -> MapperBuilder {
        Default::default()
    }

    pub fn max_dimension(&mut self, pixels: u32) -> &mut MapperBuilder {
        self.max_dimension = Some(pixels);
        self
    }

    pub fn capture_radius(&mut self, radius: f32) -> &mut MapperBuilder {
        self.capture_radius = Some(radius);
        self
    }

    pub fn options(&self) -> MapperOptions {
        MapperOptions {
            max_dimension: self
                .max_dimension
                .unwrap_or_else(|| crate::CONFIG.get_or("mapper.max_dimension", 128)),
            capture_radius: self
                .capture_radius
                .unwrap_or_else(|| crate::CONFIG.get_or("mapper.capture_radius", 0.05)),
        }
    }
}

/// Pixel to LED assignment of one rig
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    width: u32,
    height: u32,

    /// Rig axes spanning the raster
    axes: [usize; 2],
    /// Rig coordinates of the raster's top left corner
    origin: [f32; 2],
    /// Pixels per rig unit
    scale: f32,

    led_pixels: Vec<Option<(f32, f32)>>,
    assignment: Vec<Option<u32>>,
    pixels: Vec<Vec<u32>>,
}

impl Mapping {
    pub fn new(rig: &Rig, options: &MapperOptions) -> Result<Mapping> {
        if rig.is_empty() {
            return Err(Error::EmptyRig(rig.id().to_string()));
        }

        // The plane normal, z first so flat rigs in the xy plane keep their orientation
        let normal = [2, 1, 0]
            .iter()
            .copied()
            .find(|axis| {
                let (min, max) = bounds(rig, *axis);
                max - min <= PLANE_EPSILON
            })
            .ok_or_else(|| Error::NonCoplanar(rig.id().to_string()))?;
        let axes = match normal {
            2 => [0, 1],
            1 => [0, 2],
            _ => [1, 2],
        };

        let radius = options.capture_radius.max(0.0);
        let (min_u, max_u) = bounds(rig, axes[0]);
        let (min_v, max_v) = bounds(rig, axes[1]);
        let extent = |min: f32, max: f32| {
            let e = max - min;
            if e > 0.0 {
                e
            } else {
                1.0
            }
        };
        let w = extent(min_u, max_u) + 2.0 * radius;
        let h = extent(min_v, max_v) + 2.0 * radius;

        let max_dimension = options.max_dimension.max(1);
        let scale = max_dimension as f32 / w.max(h);
        let width = ((w * scale).round() as u32).max(1);
        let height = ((h * scale).round() as u32).max(1);
        let origin = [min_u - radius, min_v - radius];

        let mut mapping = Mapping {
            width,
            height,
            axes,
            origin,
            scale,
            led_pixels: Vec::with_capacity(rig.len()),
            assignment: vec![None; (width * height) as usize],
            pixels: vec![Vec::new(); rig.len()],
        };

        for led in rig.leds() {
            let (x, y) = mapping.to_pixel(&led.position);
            let inside = x >= 0.0 && y >= 0.0 && x < width as f32 && y < height as f32;
            mapping.led_pixels.push(if inside { Some((x, y)) } else { None });
        }

        let max_dist_sq = (radius * scale).powi(2);
        for py in 0..height {
            for px in 0..width {
                let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);

                let mut best: Option<(usize, f32)> = None;
                for (i, pos) in mapping.led_pixels.iter().enumerate() {
                    if let Some((lx, ly)) = pos {
                        let d = (cx - lx).powi(2) + (cy - ly).powi(2);
                        if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                            best = Some((i, d));
                        }
                    }
                }

                if let Some((led, d)) = best {
                    if d <= max_dist_sq {
                        let p = py * width + px;
                        mapping.assignment[p as usize] = Some(led as u32);
                        mapping.pixels[led].push(p);
                    }
                }
            }
        }

        log::debug!("Mapping for {:?}:", rig.id());
        log::debug!("    Raster   = {}x{}", width, height);
        log::debug!("    Scale    = {:.3} px/unit", scale);
        log::debug!(
            "    Unmapped = {} LEDs",
            mapping.pixels.iter().filter(|p| p.is_empty()).count()
        );

        Ok(mapping)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixels per rig unit
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// LED owning the pixel at `(x, y)`
    pub fn assignment(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.assignment[(y * self.width + x) as usize].map(|led| led as usize)
    }

    /// Indices (`y * width + x`) of all pixels owned by `led`
    pub fn pixels_of(&self, led: usize) -> &[u32] {
        self.pixels.get(led).map(|p| &p[..]).unwrap_or(&[])
    }

    /// Raster position of an LED, `None` if it is outside the raster
    pub fn led_pixel(&self, led: usize) -> Option<(f32, f32)> {
        self.led_pixels.get(led).copied().flatten()
    }

    /// Project a point in rig space onto the raster
    pub fn to_pixel(&self, point: &Point) -> (f32, f32) {
        (
            (point[self.axes[0]] - self.origin[0]) * self.scale,
            (point[self.axes[1]] - self.origin[1]) * self.scale,
        )
    }
}

fn bounds(rig: &Rig, axis: usize) -> (f32, f32) {
    rig.leds()
        .iter()
        .map(|led| led.position[axis])
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), v| {
            (min.min(v), max.max(v))
        })
}

/// Memoized mappings, keyed by rig id and options
///
/// Each entry remembers the rig it was computed for, a different rig under the
/// same id replaces the entry.
#[derive(Debug, Default)]
pub struct MapperCache {
    entries: collections::HashMap<(String, u32, u32), (Rig, rc::Rc<Mapping>)>,
}

impl MapperCache {
    pub fn new() -> MapperCache {
        Default::default()
    }

    pub fn mapping(&mut self, rig: &Rig, options: &MapperOptions) -> Result<rc::Rc<Mapping>> {
        let key = (
            rig.id().to_string(),
            options.max_dimension,
            options.capture_radius.to_bits(),
        );
        match self.entries.get(&key) {
            Some((cached, m)) if cached == rig => {
                log::trace!("Reusing mapping for {:?}", rig.id());
                return Ok(m.clone());
            }
            Some(_) => log::debug!("Rig {:?} changed, remapping", rig.id()),
            None => (),
        }

        let m = rc::Rc::new(Mapping::new(rig, options)?);
        self.entries.insert(key, (rig.clone(), m.clone()));
        Ok(m)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A drawable raster bound to one rig
pub struct SpatialMapper {
    mapping: rc::Rc<Mapping>,
    raster: tiny_skia::Pixmap,
}

impl fmt::Debug for SpatialMapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SpatialMapper {{ raster: {}x{} }}",
            self.mapping.width, self.mapping.height
        )
    }
}

impl SpatialMapper {
    pub fn new(mapping: rc::Rc<Mapping>) -> Result<SpatialMapper> {
        let raster = tiny_skia::Pixmap::new(mapping.width, mapping.height).ok_or(Error::Raster {
            width: mapping.width,
            height: mapping.height,
        })?;
        Ok(SpatialMapper { mapping, raster })
    }

    /// Look up (or compute) the mapping of `rig` and bind a fresh raster to it
    pub fn initialize(
        rig: &Rig,
        options: &MapperOptions,
        cache: &mut MapperCache,
    ) -> Result<SpatialMapper> {
        SpatialMapper::new(cache.mapping(rig, options)?)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn raster(&self) -> &tiny_skia::Pixmap {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut tiny_skia::Pixmap {
        &mut self.raster
    }

    /// Fill the raster with a single color
    pub fn clear(&mut self, color: Color) {
        self.raster.fill(color.into());
    }

    /// Set every LED that owns pixels to their mean color
    ///
    /// LEDs without pixels keep whatever the buffer holds.
    pub fn sample_to_leds(&self, leds: &mut ColorBuffer) {
        let pixels = self.raster.pixels();

        for (led, owned) in self.mapping.pixels.iter().enumerate() {
            if owned.is_empty() {
                continue;
            }

            let mut sum = [0u32; 3];
            for p in owned {
                let c = pixels[*p as usize].demultiply();
                sum[0] += u32::from(c.red());
                sum[1] += u32::from(c.green());
                sum[2] += u32::from(c.blue());
            }

            let n = owned.len() as u32;
            let mean = |s: u32| ((s + n / 2) / n) as u8;
            leds.set(led, Color::new(mean(sum[0]), mean(sum[1]), mean(sum[2])));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::LedDescriptor;

    fn options(max_dimension: u32, capture_radius: f32) -> MapperOptions {
        MapperBuilder::new()
            .max_dimension(max_dimension)
            .capture_radius(capture_radius)
            .options()
    }

    fn rig(id: &str, points: &[(f32, f32)]) -> Rig {
        Rig::new(
            id,
            points
                .iter()
                .enumerate()
                .map(|(i, (x, y))| LedDescriptor::new(Point::new(*x, *y, 0.0), 0, i as u16))
                .collect(),
        )
    }

    #[test]
    fn test_two_leds() {
        let rig = rig("pair", &[(0.0, 0.0), (10.0, 0.0)]);
        let mut cache = MapperCache::new();
        let mut mapper = SpatialMapper::initialize(&rig, &options(22, 6.0), &mut cache).unwrap();

        assert_eq!(mapper.mapping().width(), 22);
        assert_eq!(mapper.mapping().height(), 13);

        let mut paint = tiny_skia::Paint::default();
        paint.set_color(Color::RED.into());
        let left = tiny_skia::Rect::from_xywh(0.0, 0.0, 11.0, 13.0).unwrap();
        mapper.raster_mut().fill(Color::BLUE.into());
        mapper
            .raster_mut()
            .fill_rect(left, &paint, tiny_skia::Transform::identity(), None);

        let mut leds = rig.buffer();
        mapper.sample_to_leds(&mut leds);
        assert_eq!(leds.get(0), Some(Color::RED));
        assert_eq!(leds.get(1), Some(Color::BLUE));
    }

    #[test]
    fn test_idempotent() {
        let rig = Rig::grid("grid", 5, 3, 1.0);
        let opts = options(64, 0.6);

        let a = Mapping::new(&rig, &opts).unwrap();
        let b = Mapping::new(&rig, &opts).unwrap();
        assert_eq!(a, b);

        let mut cache = MapperCache::new();
        let c1 = cache.mapping(&rig, &opts).unwrap();
        let c2 = cache.mapping(&rig, &opts).unwrap();
        assert!(rc::Rc::ptr_eq(&c1, &c2));
        assert_eq!(*c1, a);
        assert_eq!(cache.len(), 1);

        cache.mapping(&rig, &options(32, 0.6)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_same_id_remaps() {
        let opts = options(32, 0.5);
        let mut cache = MapperCache::new();

        let small = cache.mapping(&Rig::grid("rig", 2, 2, 1.0), &opts).unwrap();
        assert!(small.led_pixel(3).is_some());
        assert!(small.led_pixel(4).is_none());

        let big = cache.mapping(&Rig::grid("rig", 4, 4, 1.0), &opts).unwrap();
        assert!(!rc::Rc::ptr_eq(&small, &big));
        assert!(big.led_pixel(15).is_some());
        assert!(!big.pixels_of(15).is_empty());
        assert_eq!(cache.len(), 1);

        let again = cache.mapping(&Rig::grid("rig", 4, 4, 1.0), &opts).unwrap();
        assert!(rc::Rc::ptr_eq(&big, &again));
    }

    #[test]
    fn test_nearest() {
        let rig = rig(
            "scatter",
            &[(0.0, 0.0), (3.0, 1.0), (1.5, 4.0), (4.2, 3.3), (0.4, 2.2), (2.6, 2.5)],
        );
        let opts = options(48, 1.5);
        let m = Mapping::new(&rig, &opts).unwrap();
        let radius_px = opts.capture_radius * m.scale();

        for y in 0..m.height() {
            for x in 0..m.width() {
                let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
                let dists: Vec<f32> = (0..rig.len())
                    .map(|i| {
                        let (lx, ly) = m.led_pixel(i).unwrap();
                        ((cx - lx).powi(2) + (cy - ly).powi(2)).sqrt()
                    })
                    .collect();
                let closest = dists.iter().cloned().fold(f32::INFINITY, f32::min);

                match m.assignment(x, y) {
                    Some(led) => {
                        assert!(dists[led] <= closest + 1e-4);
                        assert!(dists[led] <= radius_px + 1e-4);
                    }
                    None => assert!(closest > radius_px - 1e-4),
                }
            }
        }
    }

    #[test]
    fn test_inverse_lists() {
        let rig = Rig::grid("grid", 4, 4, 1.0);
        let m = Mapping::new(&rig, &options(40, 0.5)).unwrap();

        let mut total = 0;
        for led in 0..rig.len() {
            assert!(!m.pixels_of(led).is_empty());
            for p in m.pixels_of(led) {
                assert_eq!(m.assignment(p % m.width(), p / m.width()), Some(led));
            }
            total += m.pixels_of(led).len();
        }
        let assigned = (0..m.height())
            .flat_map(|y| (0..m.width()).map(move |x| (x, y)))
            .filter(|(x, y)| m.assignment(*x, *y).is_some())
            .count();
        assert_eq!(total, assigned);
    }

    #[test]
    fn test_single_led() {
        let rig = rig("one", &[(5.0, 5.0)]);
        let m = Mapping::new(&rig, &options(16, 2.0)).unwrap();
        // 1 unit extent plus 2 units padding on both sides
        assert_eq!((m.width(), m.height()), (16, 16));
        assert!(!m.pixels_of(0).is_empty());
    }

    #[test]
    fn test_shadowed_led_untouched() {
        // The second LED sits on top of the first one and loses every tie
        let rig = rig("dup", &[(0.0, 0.0), (0.0, 0.0), (2.0, 0.0)]);
        let mut mapper =
            SpatialMapper::initialize(&rig, &options(20, 1.0), &mut MapperCache::new()).unwrap();
        assert!(mapper.mapping().pixels_of(1).is_empty());

        mapper.clear(Color::GREEN);
        let mut leds = rig.buffer();
        leds.set(1, Color::WHITE);
        mapper.sample_to_leds(&mut leds);

        assert_eq!(leds.get(0), Some(Color::GREEN));
        assert_eq!(leds.get(1), Some(Color::WHITE));
        assert_eq!(leds.get(2), Some(Color::GREEN));
    }

    #[test]
    fn test_vertical_plane() {
        let rig = Rig::new(
            "wall",
            vec![
                LedDescriptor::new(Point::new(0.0, 1.0, 0.0), 0, 0),
                LedDescriptor::new(Point::new(2.0, 1.0, 1.0), 0, 1),
            ],
        );
        let m = Mapping::new(&rig, &options(32, 0.5)).unwrap();
        let (x0, _) = m.led_pixel(0).unwrap();
        let (x1, y1) = m.led_pixel(1).unwrap();
        assert!(x1 > x0);
        assert!(y1 > 0.0);
    }

    #[test]
    fn test_rejects() {
        let bent = Rig::new(
            "bent",
            vec![
                LedDescriptor::new(Point::new(0.0, 0.0, 0.0), 0, 0),
                LedDescriptor::new(Point::new(1.0, 1.0, 0.0), 0, 1),
                LedDescriptor::new(Point::new(0.0, 1.0, 1.0), 0, 2),
            ],
        );
        assert!(matches!(
            Mapping::new(&bent, &options(32, 0.5)),
            Err(Error::NonCoplanar(_))
        ));
        assert!(matches!(
            Mapping::new(&Rig::new("none", vec![]), &options(32, 0.5)),
            Err(Error::EmptyRig(_))
        ));
    }
}

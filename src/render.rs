use crate::config::{RenderConfig, ScaleUpper};
use crate::types::{JoinedCounties, School};
use anyhow::{anyhow, Context, Result};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use rstar::AABB;
use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const MARKER: Rgb<u8> = Rgb([0, 0, 0]);
const MARKER_RADIUS: i64 = 3;
/// Fraction of the image left empty around the fitted counties.
const MARGIN: f64 = 0.05;

/// Viridis anchor colors at 9 evenly spaced stops; values between
/// stops are linearly interpolated.
const VIRIDIS: [[u8; 3]; 9] = [
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [109, 205, 89],
    [253, 231, 37],
];

/// Render the choropleth with school markers and write it as
/// `<output_dir>/<STATE>_pop_density_vs_higher_education.jpeg`.
/// Returns the written path. Nothing is written if any step fails.
pub fn render_map(
    config: &RenderConfig,
    state: &str,
    joined: &JoinedCounties,
    schools: &[School],
) -> Result<PathBuf> {
    if joined.is_empty() {
        return Err(anyhow!(
            "No counties matched for state {}; nothing to render",
            state
        ));
    }

    let upper = scale_upper_bound(&joined.densities, config.scale_upper);
    println!(
        "Rendering {} counties, color scale 0..{}",
        joined.len(),
        upper
    );

    let viewport = Viewport::fit(joined, config.width, config.height)?;
    let mut img = rasterize(&viewport, config.width, config.height, joined, upper);
    draw_schools(&mut img, &viewport, schools);
    draw_colorbar(&mut img);

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", config.output_dir))?;
    let path = config
        .output_dir
        .join(format!("{}_pop_density_vs_higher_education.jpeg", state));
    img.save(&path)
        .with_context(|| format!("Failed to write map image {:?}", path))?;
    println!("{} map created in {:?}", state, config.output_dir);

    Ok(path)
}

/// Upper bound of the color scale: the mean density rounded to a whole
/// number (as the tool has always done) or the maximum, per config.
/// Callers guarantee a non-empty slice.
pub fn scale_upper_bound(densities: &[f64], mode: ScaleUpper) -> f64 {
    match mode {
        ScaleUpper::Mean => (densities.iter().sum::<f64>() / densities.len() as f64).round(),
        ScaleUpper::Max => densities.iter().cloned().fold(f64::MIN, f64::max),
    }
}

/// Map a value in [0, 1] onto the viridis ramp. Out-of-range input is
/// clamped, which is how densities above the scale's upper bound all
/// land on the brightest color.
pub fn viridis(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - i as f64;

    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    Rgb([
        lerp(VIRIDIS[i][0], VIRIDIS[i + 1][0]),
        lerp(VIRIDIS[i][1], VIRIDIS[i + 1][1]),
        lerp(VIRIDIS[i][2], VIRIDIS[i + 1][2]),
    ])
}

// Web Mercator, normalized to [0, 1] in both axes.
fn mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
    (x, y)
}

fn inverse_mercator(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lon, lat)
}

/// Pixel mapping fitted to the joined counties' bounding box, with a
/// margin, preserving aspect ratio in Mercator space.
pub struct Viewport {
    min_x: f64,
    min_y: f64,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Viewport {
    pub fn fit(joined: &JoinedCounties, width: u32, height: u32) -> Result<Self> {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for feature in &joined.features {
            let rect = feature
                .geometry
                .bounding_rect()
                .ok_or_else(|| anyhow!("County {} has empty geometry", feature.fips))?;
            for (lon, lat) in [(rect.min().x, rect.min().y), (rect.max().x, rect.max().y)] {
                let (x, y) = mercator(lon, lat);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        // Degenerate extents (a single point) still get a valid scale.
        let dx = (max_x - min_x).max(1e-9);
        let dy = (max_y - min_y).max(1e-9);

        let usable_w = width as f64 * (1.0 - 2.0 * MARGIN);
        let usable_h = height as f64 * (1.0 - 2.0 * MARGIN);
        let scale = (usable_w / dx).min(usable_h / dy);

        Ok(Self {
            min_x,
            min_y,
            scale,
            offset_x: (width as f64 - dx * scale) / 2.0,
            offset_y: (height as f64 - dy * scale) / 2.0,
        })
    }

    pub fn to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = mercator(lon, lat);
        (
            (x - self.min_x) * self.scale + self.offset_x,
            (y - self.min_y) * self.scale + self.offset_y,
        )
    }

    pub fn pixel_to_lonlat(&self, px: f64, py: f64) -> (f64, f64) {
        let x = (px - self.offset_x) / self.scale + self.min_x;
        let y = (py - self.offset_y) / self.scale + self.min_y;
        inverse_mercator(x, y)
    }
}

/// Shade each pixel by the density of the county containing it. Rows
/// render in parallel; candidate counties come from the bbox index so
/// each pixel only runs point-in-polygon against a handful of
/// geometries.
fn rasterize(
    viewport: &Viewport,
    width: u32,
    height: u32,
    joined: &JoinedCounties,
    upper: f64,
) -> RgbImage {
    let tree = joined.spatial_index();

    let rows: Vec<Vec<Rgb<u8>>> = (0..height)
        .into_par_iter()
        .map(|py| {
            (0..width)
                .map(|px| {
                    let (lon, lat) =
                        viewport.pixel_to_lonlat(px as f64 + 0.5, py as f64 + 0.5);
                    let point = Point::new(lon, lat);
                    let envelope = AABB::from_point([lon, lat]);

                    for candidate in tree.locate_in_envelope_intersecting(&envelope) {
                        if joined.features[candidate.index].geometry.contains(&point) {
                            let density = joined.densities[candidate.index];
                            let t = if upper > 0.0 { density / upper } else { 0.0 };
                            return viridis(t);
                        }
                    }
                    BACKGROUND
                })
                .collect()
        })
        .collect();

    let mut img = RgbImage::new(width, height);
    for (py, row) in rows.into_iter().enumerate() {
        for (px, color) in row.into_iter().enumerate() {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
    img
}

/// One filled disc per school at its projected position.
fn draw_schools(img: &mut RgbImage, viewport: &Viewport, schools: &[School]) {
    let (width, height) = (img.width() as i64, img.height() as i64);
    for school in schools {
        let (px, py) = viewport.to_pixel(school.lon, school.lat);
        let (cx, cy) = (px.round() as i64, py.round() as i64);
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                if dx * dx + dy * dy > MARKER_RADIUS * MARKER_RADIUS {
                    continue;
                }
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && x < width && y >= 0 && y < height {
                    img.put_pixel(x as u32, y as u32, MARKER);
                }
            }
        }
    }
}

/// Vertical viridis ramp along the right edge, brightest at the top.
fn draw_colorbar(img: &mut RgbImage) {
    let width = img.width();
    let height = img.height();
    if width < 48 || height < 10 {
        return;
    }

    let bar_left = width - 36;
    let bar_right = width - 16;
    let bar_top = height / 5;
    let bar_bottom = height * 4 / 5;

    for y in bar_top..bar_bottom {
        let t = 1.0 - (y - bar_top) as f64 / (bar_bottom - bar_top) as f64;
        let color = viridis(t);
        for x in bar_left..bar_right {
            img.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CountyFeature;
    use geo::{polygon, MultiPolygon};

    fn unit_square_county(density: f64) -> JoinedCounties {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        JoinedCounties {
            densities: vec![density],
            fips: vec!["44001".to_string()],
            features: vec![CountyFeature {
                fips: "44001".to_string(),
                name: "Bristol".to_string(),
                geometry: MultiPolygon::new(vec![square]),
            }],
        }
    }

    #[test]
    fn viridis_endpoints_and_clamping() {
        assert_eq!(viridis(0.0), Rgb([68, 1, 84]));
        assert_eq!(viridis(1.0), Rgb([253, 231, 37]));
        assert_eq!(viridis(-5.0), viridis(0.0));
        assert_eq!(viridis(7.0), viridis(1.0));
    }

    #[test]
    fn scale_upper_modes() {
        let densities = [100.0, 200.0, 330.0];
        assert_eq!(scale_upper_bound(&densities, ScaleUpper::Mean), 210.0);
        assert_eq!(scale_upper_bound(&densities, ScaleUpper::Max), 330.0);
    }

    #[test]
    fn mean_upper_is_rounded_to_whole_number() {
        let densities = [1.2, 1.3];
        assert_eq!(scale_upper_bound(&densities, ScaleUpper::Mean), 1.0);
    }

    #[test]
    fn viewport_roundtrip() {
        let joined = unit_square_county(1.0);
        let viewport = Viewport::fit(&joined, 200, 200).unwrap();

        let (px, py) = viewport.to_pixel(0.5, 0.5);
        let (lon, lat) = viewport.pixel_to_lonlat(px, py);
        assert!((lon - 0.5).abs() < 1e-9, "lon drifted: {}", lon);
        assert!((lat - 0.5).abs() < 1e-9, "lat drifted: {}", lat);
    }

    #[test]
    fn viewport_keeps_margin() {
        let joined = unit_square_county(1.0);
        let viewport = Viewport::fit(&joined, 200, 200).unwrap();

        // Corners of the county bbox stay inside the usable area.
        let (px, py) = viewport.to_pixel(0.0, 1.0);
        assert!(px >= 0.0 && px <= 200.0);
        assert!(py >= 0.0 && py <= 200.0);
    }

    #[test]
    fn rasterize_shades_county_interior() {
        let joined = unit_square_county(42.0);
        let viewport = Viewport::fit(&joined, 64, 64).unwrap();
        let img = rasterize(&viewport, 64, 64, &joined, 42.0);

        // Center of the image is inside the county: density == upper.
        assert_eq!(*img.get_pixel(32, 32), viridis(1.0));
        // Margin corner is outside every county.
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
    }

    #[test]
    fn school_markers_are_drawn() {
        let joined = unit_square_county(42.0);
        let viewport = Viewport::fit(&joined, 64, 64).unwrap();
        let mut img = rasterize(&viewport, 64, 64, &joined, 42.0);

        let schools = vec![School {
            lon: 0.5,
            lat: 0.5,
            name: "Brown University".to_string(),
        }];
        draw_schools(&mut img, &viewport, &schools);

        let (px, py) = viewport.to_pixel(0.5, 0.5);
        assert_eq!(*img.get_pixel(px.round() as u32, py.round() as u32), MARKER);
    }

    #[test]
    fn empty_join_is_a_descriptive_error() {
        let config = RenderConfig::default();
        let err = render_map(&config, "RI", &JoinedCounties::default(), &[]).unwrap_err();
        assert!(err.to_string().contains("No counties matched"));
    }
}

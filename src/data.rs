use crate::types::{CountyFeature, PopulationRecord, School};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Load the nationwide school table and keep only rows for `state`.
pub fn load_schools(path: &Path, state: &str) -> Result<Vec<School>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open schools CSV: {:?}", path))?;
    read_schools(file, state)
}

fn read_schools(reader: impl Read, state: &str) -> Result<Vec<School>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let state_idx = column_index(&headers, "STATE")?;
    let x_idx = column_index(&headers, "X")?;
    let y_idx = column_index(&headers, "Y")?;
    let name_idx = column_index(&headers, "NAME")?;

    let mut schools = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.get(state_idx).unwrap_or("") != state {
            continue;
        }
        // Rows with unusable coordinates can't be plotted; drop them.
        let lon: f64 = match record.get(x_idx).unwrap_or("").parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let lat: f64 = match record.get(y_idx).unwrap_or("").parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        schools.push(School {
            lon,
            lat,
            name: record.get(name_idx).unwrap_or("").to_string(),
        });
    }

    Ok(schools)
}

/// Load the per-state population density table.
pub fn load_population(path: &Path) -> Result<Vec<PopulationRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open population CSV: {:?}", path))?;
    read_population(file)
}

fn read_population(reader: impl Read) -> Result<Vec<PopulationRecord>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let name_idx = column_index(&headers, "CTYNAME")?;
    let density_idx = column_index(&headers, "popDensity")?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let county = record.get(name_idx).unwrap_or("").to_string();
        if county.is_empty() {
            continue;
        }
        let raw = record.get(density_idx).unwrap_or("");
        let density: f64 = raw
            .parse()
            .with_context(|| format!("Bad popDensity value {:?} for {:?}", raw, county))?;
        records.push(PopulationRecord { county, density });
    }

    Ok(records)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow!("Column '{}' not found in CSV", name))
}

/// Fetch the nationwide county boundary collection. Any network, HTTP
/// or parse failure is fatal; there is no retry or partial-result mode.
pub async fn fetch_counties(url: &str) -> Result<Vec<CountyFeature>> {
    println!("Fetching county boundaries from {}...", url);
    let body = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch county boundaries from {}", url))?
        .error_for_status()
        .context("County boundary request returned an error status")?
        .text()
        .await
        .context("Failed to read county boundary response body")?;

    let geojson: GeoJson = body
        .parse()
        .context("Failed to parse county boundaries as GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("County boundaries must be a FeatureCollection")),
    };

    let counties = counties_from_collection(collection);
    println!("Loaded {} county boundaries", counties.len());
    Ok(counties)
}

/// Convert the raw feature collection into typed county features.
/// Features without a usable id, NAME property, or polygonal geometry
/// are skipped; the nationwide dataset is known to be clean.
fn counties_from_collection(collection: FeatureCollection) -> Vec<CountyFeature> {
    use std::convert::TryInto;

    let mut counties = Vec::new();
    for feature in collection.features {
        let fips = match &feature.id {
            Some(geojson::feature::Id::String(s)) => s.clone(),
            Some(geojson::feature::Id::Number(n)) => n.to_string(),
            None => {
                debug!("skipping feature without id");
                continue;
            }
        };

        let name = match feature
            .properties
            .as_ref()
            .and_then(|props| props.get("NAME"))
        {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => {
                debug!(fips = %fips, "skipping feature without NAME property");
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let converted: std::result::Result<geo::Geometry<f64>, _> =
                    geom.value.try_into();
                match converted {
                    Ok(geo::Geometry::MultiPolygon(mp)) => mp,
                    Ok(geo::Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
                    _ => continue, // points, lines
                }
            }
            None => continue,
        };

        counties.push(CountyFeature {
            fips,
            name,
            geometry,
        });
    }

    counties
}

use geo::algorithm::bounding_rect::BoundingRect;
use geo::MultiPolygon;
use rstar::{RTree, RTreeObject, AABB};

/// One county boundary from the nationwide GeoJSON collection.
/// `name` is the county name without the word "County".
#[derive(Debug, Clone)]
pub struct CountyFeature {
    pub fips: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// One row of the per-state population density CSV.
/// `county` keeps the CSV's own format: "<Name> County".
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationRecord {
    pub county: String,
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct School {
    pub lon: f64,
    pub lat: f64,
    pub name: String,
}

/// Output of the county join: three parallel vectors, always equal
/// length and index-aligned to the same county.
#[derive(Debug, Clone, Default)]
pub struct JoinedCounties {
    pub densities: Vec<f64>,
    pub fips: Vec<String>,
    pub features: Vec<CountyFeature>,
}

impl JoinedCounties {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding-box index over the joined counties, for narrowing
    /// point-in-polygon checks to a handful of candidates.
    pub fn spatial_index(&self) -> RTree<CountyIndex> {
        let items: Vec<CountyIndex> = self
            .features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                feature.geometry.bounding_rect().map(|rect| CountyIndex {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        RTree::bulk_load(items)
    }
}

/// Wrapper tying an RTree envelope back to an index into the parallel
/// vectors of `JoinedCounties`.
pub struct CountyIndex {
    pub index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for CountyIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

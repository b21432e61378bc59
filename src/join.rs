use crate::states::FipsRange;
use crate::types::{CountyFeature, JoinedCounties, PopulationRecord};
use std::collections::HashSet;
use tracing::warn;

/// Candidate name for matching: the CSV's "<Name> County" with its
/// trailing word dropped ("Bristol County" -> "Bristol").
pub fn strip_last_word(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    words[..words.len().saturating_sub(1)].join(" ")
}

/// Intersect the nationwide boundary collection with the per-state
/// population table.
///
/// A feature is kept when its name appears in the population table
/// (after stripping the trailing "County" word) AND its id parses to a
/// FIPS code strictly inside the state's bounds. The lower bound is
/// exclusive, matching the range semantics the bounds table was built
/// with. Density comes from the first population row whose CTYNAME is
/// "<name> County"; a matched feature with no such row is skipped with
/// a warning rather than failing the run.
///
/// The three output vectors are equal length, index-aligned, and follow
/// the collection's feature order, so identical inputs always produce
/// identical output.
pub fn join_counties(
    counties: &[CountyFeature],
    population: &[PopulationRecord],
    range: FipsRange,
) -> JoinedCounties {
    let candidates: HashSet<String> = population
        .iter()
        .map(|record| strip_last_word(&record.county))
        .collect();

    let mut joined = JoinedCounties::default();

    for feature in counties {
        if !candidates.contains(&feature.name) {
            continue;
        }

        let fips: u32 = match feature.fips.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(id = %feature.fips, "county id is not numeric, skipping");
                continue;
            }
        };
        if !range.contains(fips) {
            continue;
        }

        let key = format!("{} County", feature.name);
        match population.iter().find(|record| record.county == key) {
            Some(record) => {
                joined.densities.push(record.density);
                joined.fips.push(feature.fips.clone());
                joined.features.push(feature.clone());
            }
            None => {
                warn!(
                    county = %feature.name,
                    "no population row for matched county, skipping"
                );
            }
        }
    }

    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn feature(fips: &str, name: &str) -> CountyFeature {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        CountyFeature {
            fips: fips.to_string(),
            name: name.to_string(),
            geometry: MultiPolygon::new(vec![square]),
        }
    }

    fn record(county: &str, density: f64) -> PopulationRecord {
        PopulationRecord {
            county: county.to_string(),
            density,
        }
    }

    const RI: FipsRange = FipsRange {
        lower: 44000,
        upper: 45000,
    };

    #[test]
    fn ri_scenario() {
        let counties = vec![feature("44001", "Bristol")];
        let population = vec![record("Bristol County", 1500.0)];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.fips, vec!["44001"]);
        assert_eq!(joined.densities, vec![1500.0]);
        assert_eq!(joined.features.len(), 1);
        assert_eq!(joined.features[0].name, "Bristol");
    }

    #[test]
    fn lower_bound_is_excluded() {
        let counties = vec![feature("44000", "Bristol"), feature("44001", "Bristol")];
        let population = vec![record("Bristol County", 1500.0)];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.fips, vec!["44001"]);
    }

    #[test]
    fn out_of_range_same_name_is_excluded() {
        // Bristol County exists in both RI (44001) and MA (25005); only
        // the in-range code survives the bounds filter.
        let counties = vec![feature("25005", "Bristol"), feature("44001", "Bristol")];
        let population = vec![record("Bristol County", 1500.0)];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.fips, vec!["44001"]);
    }

    #[test]
    fn population_row_without_feature_contributes_nothing() {
        let counties = vec![feature("44001", "Bristol")];
        let population = vec![
            record("Bristol County", 1500.0),
            record("Atlantis County", 9.0),
        ];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn matched_feature_without_population_row_is_skipped() {
        // "Bristol Township" strips to "Bristol", so the feature name
        // matches, but the density lookup key "Bristol County" has no
        // row. The county is dropped and the vectors stay aligned.
        let counties = vec![feature("44001", "Bristol"), feature("44003", "Kent")];
        let population = vec![
            record("Bristol Township", 12.0),
            record("Kent County", 1000.0),
        ];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.fips, vec!["44003"]);
        assert_eq!(joined.densities, vec![1000.0]);
        assert_eq!(joined.features.len(), 1);
    }

    #[test]
    fn density_is_first_matching_row() {
        let counties = vec![feature("44001", "Bristol")];
        let population = vec![
            record("Bristol County", 1500.0),
            record("Bristol County", 9999.0),
        ];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.densities, vec![1500.0]);
    }

    #[test]
    fn non_numeric_id_is_skipped() {
        let counties = vec![feature("44XX1", "Bristol"), feature("44001", "Bristol")];
        let population = vec![record("Bristol County", 1500.0)];

        let joined = join_counties(&counties, &population, RI);
        assert_eq!(joined.fips, vec!["44001"]);
    }

    #[test]
    fn outputs_stay_parallel_and_deterministic() {
        let counties = vec![
            feature("44001", "Bristol"),
            feature("44003", "Kent"),
            feature("44005", "Newport"),
            feature("44007", "Providence"),
        ];
        let population = vec![
            record("Bristol County", 1500.0),
            record("Kent County", 1000.0),
            record("Newport County", 800.0),
            record("Providence County", 1593.7),
        ];

        let first = join_counties(&counties, &population, RI);
        let second = join_counties(&counties, &population, RI);

        assert_eq!(first.densities.len(), first.fips.len());
        assert_eq!(first.fips.len(), first.features.len());
        assert_eq!(first.fips, second.fips);
        assert_eq!(first.densities, second.densities);
        assert_eq!(first.fips, vec!["44001", "44003", "44005", "44007"]);
    }

    #[test]
    fn strip_last_word_handles_multiword_names() {
        assert_eq!(strip_last_word("Bristol County"), "Bristol");
        assert_eq!(strip_last_word("Kings County"), "Kings");
        assert_eq!(strip_last_word("De Witt County"), "De Witt");
        assert_eq!(strip_last_word("County"), "");
        assert_eq!(strip_last_word(""), "");
    }
}

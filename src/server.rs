use crate::config::AppConfig;
use crate::types::{CountyIndex, JoinedCounties, School};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

struct AppState {
    joined: JoinedCounties,
    schools: Vec<School>,
    tree: RTree<CountyIndex>,
}

#[derive(Deserialize)]
struct QueryParams {
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct QueryResponse {
    fips: String,
    name: String,
    density: f64,
    schools: Vec<String>,
}

/// Serve generated maps plus a point-in-county lookup API for the
/// joined data.
pub async fn start_server(
    config: AppConfig,
    joined: JoinedCounties,
    schools: Vec<School>,
) -> Result<()> {
    println!("Building spatial index for {} counties...", joined.len());
    let tree = joined.spatial_index();

    let state = Arc::new(AppState {
        joined,
        schools,
        tree,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    println!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/api/query", get(query_handler))
        .nest_service("/maps", ServeDir::new(&config.render.output_dir))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    for candidate in state.tree.locate_in_envelope_intersecting(&envelope) {
        let feature = &state.joined.features[candidate.index];
        if feature.geometry.contains(&point) {
            return Json(Some(QueryResponse {
                fips: feature.fips.clone(),
                name: feature.name.clone(),
                density: state.joined.densities[candidate.index],
                schools: schools_in(&feature.geometry, &state.schools),
            }));
        }
    }

    Json(None)
}

/// Names of the schools whose location falls inside the county, the
/// serve-mode counterpart of the map's hover labels.
fn schools_in(geometry: &geo::MultiPolygon<f64>, schools: &[School]) -> Vec<String> {
    schools
        .iter()
        .filter(|school| geometry.contains(&Point::new(school.lon, school.lat)))
        .map(|school| school.name.clone())
        .collect()
}

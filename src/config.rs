use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub render: RenderConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub schools_csv: PathBuf,
    /// Filename pattern for the per-state density table; `{STATE}` is
    /// replaced with the two letter code.
    pub population_csv_pattern: String,
    pub counties_url: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            schools_csv: PathBuf::from("data/Postsecondary_School_Locations_2021.csv"),
            population_csv_pattern: "data/{STATE}_Population_Density_2021.csv".to_string(),
            counties_url:
                "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json"
                    .to_string(),
        }
    }
}

impl InputConfig {
    pub fn population_csv(&self, state: &str) -> PathBuf {
        PathBuf::from(self.population_csv_pattern.replace("{STATE}", state))
    }
}

/// Upper bound of the choropleth color scale. The original author left
/// mean-vs-max unresolved, so it is a setting rather than a constant.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScaleUpper {
    #[default]
    Mean,
    Max,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub scale_upper: ScaleUpper,
    pub output_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 900,
            scale_upper: ScaleUpper::Mean,
            output_dir: PathBuf::from("maps"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Missing config file is not an error; every setting has a default
    /// matching the fixed paths the tool was built around.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

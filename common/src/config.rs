use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Overrides the English weekday names substituted into prompt templates.
    #[serde(default)]
    pub weekday_names: Option<Vec<String>>,
    #[serde(default = "default_match_count")]
    pub default_match_count: usize,
    #[serde(default = "default_vector_threshold")]
    pub default_vector_threshold: f64,
    #[serde(default = "default_keyword_threshold")]
    pub default_keyword_threshold: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_match_count() -> usize {
    5
}

fn default_vector_threshold() -> f64 {
    0.5
}

fn default_keyword_threshold() -> f64 {
    0.3
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

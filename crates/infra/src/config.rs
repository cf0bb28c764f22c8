use neighbourly_domain::rating::RatingWeights;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub rating_max_age_days: f64,
    pub rating_recency_floor: f64,
    pub rating_unverified_factor: f64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("rating_max_age_days", 365.0)?
            .set_default("rating_recency_floor", 0.5)?
            .set_default("rating_unverified_factor", 0.7)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn rating_weights(&self) -> RatingWeights {
        RatingWeights {
            max_age_days: self.rating_max_age_days,
            recency_floor: self.rating_recency_floor,
            unverified_factor: self.rating_unverified_factor,
        }
    }
}

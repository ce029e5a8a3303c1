use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::entities::CrawlOptions;

#[derive(Clone, Debug, PartialEq)]
pub struct CrawlSettings {
    pub max_pages: usize,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl CrawlSettings {
    pub fn options(&self) -> CrawlOptions {
        CrawlOptions {
            max_pages: self.max_pages,
            concurrency: self.concurrency,
            timeout_per_request: self.timeout,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: 5,
            concurrency: 3,
            timeout: Duration::from_millis(8_000),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_refinements: u32,
    /// Accepted deviation from the target word count, as a fraction.
    pub length_tolerance: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_millis(45_000),
            max_tokens: 4096,
            temperature: 0.7,
            max_refinements: 2,
            length_tolerance: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueSettings {
    pub max_retries: u32,
    pub stuck_threshold: Duration,
    pub retention: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            stuck_threshold: Duration::from_millis(600_000),
            retention: Duration::from_millis(86_400_000),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub crawl: CrawlSettings,
    pub generation: GenerationSettings,
    pub queue: QueueSettings,
    pub worker_interval: Option<Duration>,
    pub cron_secret: Option<String>,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://seoscribe.db?mode=rwc".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let openai_base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let crawl_defaults = CrawlSettings::default();
        let crawl = CrawlSettings {
            max_pages: parse_var("SCRAPE_MAX_PAGES", crawl_defaults.max_pages)?.max(1),
            concurrency: parse_var("SCRAPE_CONCURRENCY", crawl_defaults.concurrency)?.max(1),
            timeout: millis_var("SCRAPE_TIMEOUT_MS", crawl_defaults.timeout)?,
        };

        let gen_defaults = GenerationSettings::default();
        let generation = GenerationSettings {
            model: env::var("OPENAI_MODEL").unwrap_or(gen_defaults.model),
            timeout: millis_var("LLM_TIMEOUT_MS", gen_defaults.timeout)?,
            max_tokens: parse_var("LLM_MAX_TOKENS", gen_defaults.max_tokens)?,
            temperature: parse_var("LLM_TEMPERATURE", gen_defaults.temperature)?,
            max_refinements: parse_var("GENERATION_MAX_REFINEMENTS", gen_defaults.max_refinements)?,
            length_tolerance: parse_var(
                "GENERATION_LENGTH_TOLERANCE",
                gen_defaults.length_tolerance,
            )?,
        };

        let queue_defaults = QueueSettings::default();
        let queue = QueueSettings {
            max_retries: parse_var("MAX_RETRIES", queue_defaults.max_retries)?.max(1),
            stuck_threshold: millis_var("STUCK_JOB_THRESHOLD_MS", queue_defaults.stuck_threshold)?,
            retention: millis_var("JOB_RETENTION_MS", queue_defaults.retention)?,
        };

        let worker_interval = interval_var("WORKER_INTERVAL_SECS")?;

        let cron_secret = env::var("CRON_SECRET").ok().filter(|s| !s.is_empty());

        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "seoscribe".to_string());

        let metrics_port = parse_var("METRICS_PORT", 9000u16)?;

        Ok(Config {
            database_url,
            server_host,
            server_port,
            openai_api_key,
            openai_base_url,
            crawl,
            generation,
            queue,
            worker_interval,
            cron_secret,
            otel_exporter_endpoint,
            service_name,
            metrics_port,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn millis_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let ms = parse_var(name, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

/// Optional tick interval in whole seconds; zero is raised to one so the
/// worker never spins.
fn interval_var(name: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw.clone()))?;
            Ok(Some(Duration::from_secs(secs.max(1))))
        }
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid value for {0}: {1:?}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let crawl = CrawlSettings::default();
        assert_eq!(crawl.max_pages, 5);
        assert_eq!(crawl.concurrency, 3);
        assert_eq!(crawl.timeout, Duration::from_millis(8_000));

        let queue = QueueSettings::default();
        assert_eq!(queue.max_retries, 3);
        assert_eq!(queue.stuck_threshold, Duration::from_millis(600_000));
        assert_eq!(queue.retention, Duration::from_millis(86_400_000));
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        env::set_var("SEOSCRIBE_TEST_BAD_PORT", "90x0");
        let err = parse_var("SEOSCRIBE_TEST_BAD_PORT", 9000u16).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "SEOSCRIBE_TEST_BAD_PORT"));

        env::set_var("SEOSCRIBE_TEST_GOOD_PORT", " 9100 ");
        assert_eq!(parse_var("SEOSCRIBE_TEST_GOOD_PORT", 9000u16).unwrap(), 9100);
        assert_eq!(parse_var("SEOSCRIBE_TEST_UNSET_PORT", 9000u16).unwrap(), 9000);
    }

    #[test]
    fn test_worker_interval_never_zero() {
        env::set_var("SEOSCRIBE_TEST_INTERVAL_ZERO", "0");
        assert_eq!(
            interval_var("SEOSCRIBE_TEST_INTERVAL_ZERO").unwrap(),
            Some(Duration::from_secs(1))
        );

        env::set_var("SEOSCRIBE_TEST_INTERVAL_BAD", "soon");
        assert!(interval_var("SEOSCRIBE_TEST_INTERVAL_BAD").is_err());
        assert_eq!(interval_var("SEOSCRIBE_TEST_INTERVAL_UNSET").unwrap(), None);
    }

    #[test]
    fn test_crawl_options_carry_settings() {
        let options = CrawlSettings {
            max_pages: 2,
            concurrency: 1,
            timeout: Duration::from_millis(10),
        }
        .options();
        assert_eq!(options.max_pages, 2);
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.timeout_per_request, Duration::from_millis(10));
    }
}

use crate::app_config::{AppConfig, Environment, ExtractionPolicy};
use crate::ConfigError;

const DEFAULT_VISION_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_VISION_BASE_URL: &str = "https://api.anthropic.com";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let env = parse_environment(&or_default("PRICECRAWL_ENV", "development"))?;
    let log_level = or_default("PRICECRAWL_LOG_LEVEL", "info");
    let retailers_path = PathBuf::from(or_default(
        "PRICECRAWL_RETAILERS_PATH",
        "./config/retailers.yaml",
    ));
    let output_dir = PathBuf::from(or_default("PRICECRAWL_OUTPUT_DIR", "./data"));
    let artifact_dir = optional("PRICECRAWL_ARTIFACT_DIR").map_or_else(
        || std::env::temp_dir().join("pricecrawl-screenshots"),
        PathBuf::from,
    );
    let database_url = optional("DATABASE_URL");
    let headless = parse_bool("PRICECRAWL_HEADLESS", &or_default("PRICECRAWL_HEADLESS", "true"))?;

    let nav_timeout_secs = parse_u64("PRICECRAWL_NAV_TIMEOUT_SECS", "30")?;
    let page_delay_ms = parse_u64("PRICECRAWL_PAGE_DELAY_MS", "1500")?;
    let max_pages_per_category = parse_u32("PRICECRAWL_MAX_PAGES_PER_CATEGORY", "20")?;
    let max_concurrent_sessions = parse_usize("PRICECRAWL_MAX_CONCURRENT_SESSIONS", "2")?;
    if max_concurrent_sessions == 0 {
        return Err(invalid(
            "PRICECRAWL_MAX_CONCURRENT_SESSIONS",
            "must be at least 1".to_string(),
        ));
    }
    if max_pages_per_category == 0 {
        return Err(invalid(
            "PRICECRAWL_MAX_PAGES_PER_CATEGORY",
            "must be at least 1".to_string(),
        ));
    }

    let extraction_policy = parse_extraction_policy(&or_default(
        "PRICECRAWL_EXTRACTION_POLICY",
        "vision-last-resort",
    ))?;

    let vision_api_key = optional("PRICECRAWL_VISION_API_KEY");
    let vision_model = or_default("PRICECRAWL_VISION_MODEL", DEFAULT_VISION_MODEL);
    let vision_base_url = or_default("PRICECRAWL_VISION_BASE_URL", DEFAULT_VISION_BASE_URL);
    let vision_max_attempts = parse_u32("PRICECRAWL_VISION_MAX_ATTEMPTS", "3")?;
    if vision_max_attempts == 0 {
        return Err(invalid(
            "PRICECRAWL_VISION_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    let vision_backoff_ms = parse_u64("PRICECRAWL_VISION_BACKOFF_MS", "2000")?;
    let vision_timeout_secs = parse_u64("PRICECRAWL_VISION_TIMEOUT_SECS", "60")?;

    Ok(AppConfig {
        env,
        log_level,
        retailers_path,
        output_dir,
        artifact_dir,
        database_url,
        headless,
        nav_timeout_secs,
        page_delay_ms,
        max_pages_per_category,
        max_concurrent_sessions,
        extraction_policy,
        vision_api_key,
        vision_model,
        vision_base_url,
        vision_max_attempts,
        vision_backoff_ms,
        vision_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognised values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICECRAWL_ENV".to_string(),
            reason: format!(
                "unrecognized environment '{other}'; expected development, test, or production"
            ),
        }),
    }
}

fn parse_extraction_policy(s: &str) -> Result<ExtractionPolicy, ConfigError> {
    match s {
        "vision-last-resort" => Ok(ExtractionPolicy::VisionLastResort),
        "vision-primary" => Ok(ExtractionPolicy::VisionPrimary),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICECRAWL_EXTRACTION_POLICY".to_string(),
            reason: format!(
                "unrecognized policy '{other}'; expected vision-last-resort or vision-primary"
            ),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use crate::config::types::{
    Config, FetcherConfig, OrchestratorConfig, OutputConfig, StorageConfig, UserAgentConfig,
    VerifierConfig,
};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Upper bound on sampled links per page
const MAX_PROBES_LIMIT: usize = 50;

/// Upper bound on concurrently processed jobs
const MAX_CONCURRENT_JOBS_LIMIT: usize = 1024;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_fetcher_config(&config.fetcher)?;
    validate_verifier_config(&config.verifier)?;
    validate_orchestrator_config(&config.orchestrator)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> ConfigResult<()> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be >= 1, got {}",
            config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Validates verifier configuration
fn validate_verifier_config(config: &VerifierConfig) -> ConfigResult<()> {
    if config.probe_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "probe_timeout_secs must be >= 1, got {}",
            config.probe_timeout_secs
        )));
    }

    if config.max_probes < 1 || config.max_probes > MAX_PROBES_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_probes must be between 1 and {}, got {}",
            MAX_PROBES_LIMIT, config.max_probes
        )));
    }

    Ok(())
}

/// Validates orchestrator configuration
fn validate_orchestrator_config(config: &OrchestratorConfig) -> ConfigResult<()> {
    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > MAX_CONCURRENT_JOBS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_jobs must be between 1 and {}, got {}",
            MAX_CONCURRENT_JOBS_LIMIT, config.max_concurrent_jobs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> ConfigResult<()> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> ConfigResult<()> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> ConfigResult<()> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain @ and have text on both sides
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => {
            return Err(ConfigError::Validation(format!(
                "Invalid email format: '{}'",
                email
            )))
        }
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

use phonenumber::country::Id as CountryId;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub email_api_url: String,
    pub email_api_key: String,
    pub push_api_url: Option<String>,
    pub push_api_key: Option<String>,
    /// Default region for parsing local SMS numbers (ISO 3166 alpha-2).
    pub sms_default_region: String,
    /// When set, admin routes require a matching `X-Api-Key` header.
    pub admin_api_key: Option<String>,
    /// When set, the automatic batch and dispatch run on this interval.
    pub batch_interval_secs: Option<u64>,
}

fn require_http_url(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|url| validate_http_url(name, url))
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url)
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            email_api_url: require_http_url("EMAIL_API_URL")?,
            email_api_key: std::env::var("EMAIL_API_KEY")
                .map_err(|_| anyhow::anyhow!("EMAIL_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("EMAIL_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            push_api_url: optional_var("PUSH_API_URL")
                .map(|url| validate_http_url("PUSH_API_URL", url))
                .transpose()?,
            push_api_key: optional_var("PUSH_API_KEY"),
            sms_default_region: optional_var("SMS_DEFAULT_REGION")
                .unwrap_or_else(|| "CD".to_string())
                .to_uppercase(),
            admin_api_key: optional_var("ADMIN_API_KEY"),
            batch_interval_secs: optional_var("BATCH_INTERVAL_SECS")
                .map(|s| {
                    s.parse::<u64>()
                        .ok()
                        .filter(|secs| *secs > 0)
                        .ok_or_else(|| {
                            anyhow::anyhow!("BATCH_INTERVAL_SECS must be a positive number")
                        })
                })
                .transpose()?,
        };

        config.sms_region()?;

        if config.push_api_url.is_some() && config.push_api_key.is_none() {
            anyhow::bail!("PUSH_API_KEY is required when PUSH_API_URL is set");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Email API URL: {}", config.email_api_url);
        if let Some(ref push) = config.push_api_url {
            tracing::info!("Push API configured: {}", push);
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set, admin routes are unauthenticated");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Parsed SMS default region.
    pub fn sms_region(&self) -> anyhow::Result<CountryId> {
        self.sms_default_region.parse::<CountryId>().map_err(|_| {
            anyhow::anyhow!(
                "SMS_DEFAULT_REGION '{}' is not a valid country code",
                self.sms_default_region
            )
        })
    }
}

use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub razorpay: RazorpayConfig,
    pub billing: BillingConfig,
    pub smtp: SmtpConfig,
    /// Trace export is off when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub currency: String,
    /// Seller name printed on invoices and used as the mail sender name.
    pub brand: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

impl SubscriptionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        Self::from_lookup(common_config, |key| env::var(key).ok())
    }

    /// Builds the service settings from `lookup`, which answers variable
    /// names the way the process environment does.
    pub fn from_lookup<F>(common_config: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvLookup {
            lookup,
            is_prod: common_config.is_production(),
        };

        let brand = vars.get("BILLING_BRAND", Some("kGamify"))?;

        let smtp_enabled = vars
            .optional("SMTP_ENABLED")
            .map(|v| v.parse().unwrap_or(false))
            .unwrap_or(false);
        let smtp_port = vars.get("SMTP_PORT", Some("587"))?;
        let smtp_port = smtp_port.parse::<u16>().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid SMTP_PORT '{}': {}", smtp_port, e))
        })?;

        // Credentials for a disabled mailer stay optional even in production.
        let (smtp_user, smtp_password) = if smtp_enabled {
            (vars.get("SMTP_USER", Some(""))?, vars.get("SMTP_PASSWORD", Some(""))?)
        } else {
            (
                vars.optional("SMTP_USER").unwrap_or_default(),
                vars.optional("SMTP_PASSWORD").unwrap_or_default(),
            )
        };

        Ok(SubscriptionConfig {
            mongodb: MongoConfig {
                uri: Secret::new(vars.get("MONGODB_URI", Some("mongodb://localhost:27017"))?),
                database: vars.get("MONGODB_DATABASE", Some("job_portal"))?,
            },
            // Gateway secrets may be empty in every environment; the endpoints
            // that need them answer 500 until they are set.
            razorpay: RazorpayConfig {
                key_id: vars.optional("RAZORPAY_KEY_ID").unwrap_or_default(),
                key_secret: Secret::new(vars.optional("RAZORPAY_KEY_SECRET").unwrap_or_default()),
                webhook_secret: Secret::new(
                    vars.optional("RAZORPAY_WEBHOOK_SECRET").unwrap_or_default(),
                ),
                api_base_url: vars
                    .optional("RAZORPAY_API_BASE_URL")
                    .unwrap_or_else(|| "https://api.razorpay.com/v1".to_string()),
            },
            billing: BillingConfig {
                currency: vars
                    .optional("BILLING_CURRENCY")
                    .unwrap_or_else(|| "INR".to_string()),
                brand: brand.clone(),
            },
            smtp: SmtpConfig {
                host: vars.get("SMTP_HOST", Some("smtp.gmail.com"))?,
                port: smtp_port,
                user: smtp_user,
                password: Secret::new(smtp_password),
                from_email: vars.get("SMTP_FROM_EMAIL", Some("noreply@example.com"))?,
                from_name: vars.optional("SMTP_FROM_NAME").unwrap_or(brand),
                enabled: smtp_enabled,
            },
            otlp_endpoint: vars.optional("OTLP_ENDPOINT").filter(|s| !s.is_empty()),
            common: common_config,
        })
    }
}

struct EnvLookup<F> {
    lookup: F,
    is_prod: bool,
}

impl<F> EnvLookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn get(&self, key: &str, default: Option<&str>) -> Result<String, AppError> {
        resolve(key, self.optional(key), default, self.is_prod)
    }
}

fn resolve(
    key: &str,
    value: Option<String>,
    default: Option<&str>,
    is_prod: bool,
) -> Result<String, AppError> {
    match value {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

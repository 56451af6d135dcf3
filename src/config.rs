use std::net::IpAddr;

use chrono::Duration;

use crate::credential::CredentialPolicy;
use crate::credential::rate_limit::RateLimit;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub totp_issuer: String,
    pub log_level: String,
    pub reset_token_ttl_mins: i64,
    pub email_verify_ttl_mins: i64,
    pub otp_ttl_mins: i64,
    pub totp_enroll_ttl_mins: i64,
    pub issue_limit: u32,
    pub verify_limit: u32,
    pub rate_window_secs: u64,
    pub smtp: Option<SmtpConfig>,
    pub sms: Option<SmsConfig>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

/// A generic HTTP SMS gateway: POST {"to", "body"} with a bearer token.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("CREDO_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid CREDO_HOST: {e}"))?;

        let port: u16 = env_or("CREDO_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid CREDO_PORT: {e}"))?;

        let base_url = env_or("CREDO_BASE_URL", &format!("http://{host}:{port}"));
        let totp_issuer = env_or("CREDO_TOTP_ISSUER", "Credo");
        let log_level = env_or("CREDO_LOG_LEVEL", "info");

        let reset_token_ttl_mins = env_parse("CREDO_RESET_TOKEN_TTL_MINS", "60")?;
        let email_verify_ttl_mins = env_parse("CREDO_EMAIL_VERIFY_TTL_MINS", "1440")?;
        let otp_ttl_mins = env_parse("CREDO_OTP_TTL_MINS", "10")?;
        let totp_enroll_ttl_mins = env_parse("CREDO_TOTP_ENROLL_TTL_MINS", "15")?;
        let issue_limit = env_parse("CREDO_ISSUE_LIMIT", "5")?;
        let verify_limit = env_parse("CREDO_VERIFY_LIMIT", "10")?;
        let rate_window_secs = env_parse("CREDO_RATE_WINDOW_SECS", "3600")?;

        let smtp = match (
            std::env::var("CREDO_SMTP_HOST").ok(),
            std::env::var("CREDO_SMTP_PORT").ok(),
            std::env::var("CREDO_SMTP_USER").ok(),
            std::env::var("CREDO_SMTP_PASS").ok(),
            std::env::var("CREDO_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid CREDO_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        let sms = match (
            std::env::var("CREDO_SMS_GATEWAY_URL").ok(),
            std::env::var("CREDO_SMS_API_KEY").ok(),
        ) {
            (Some(gateway_url), Some(api_key)) => Some(SmsConfig {
                gateway_url,
                api_key,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            base_url,
            totp_issuer,
            log_level,
            reset_token_ttl_mins,
            email_verify_ttl_mins,
            otp_ttl_mins,
            totp_enroll_ttl_mins,
            issue_limit,
            verify_limit,
            rate_window_secs,
            smtp,
            sms,
        })
    }

    pub fn credential_policy(&self) -> CredentialPolicy {
        CredentialPolicy {
            reset_token_ttl: Duration::minutes(self.reset_token_ttl_mins),
            email_verify_ttl: Duration::minutes(self.email_verify_ttl_mins),
            otp_ttl: Duration::minutes(self.otp_ttl_mins),
            totp_enroll_ttl: Duration::minutes(self.totp_enroll_ttl_mins),
            issue_limit: RateLimit {
                max: self.issue_limit,
                window_secs: self.rate_window_secs,
            },
            verify_limit: RateLimit {
                max: self.verify_limit,
                window_secs: self.rate_window_secs,
            },
            recovery_batch_size: 10,
        }
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}

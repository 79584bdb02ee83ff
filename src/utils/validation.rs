use crate::utils::error::{ProvisionError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ProvisionError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// 服務名稱與 systemd unit 名稱只允許 [A-Za-z0-9_.@-]
pub fn validate_unit_name(field_name: &str, value: &str) -> Result<()> {
    static UNIT_NAME: OnceLock<Regex> = OnceLock::new();
    let re = UNIT_NAME.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@-]*$").expect("unit name pattern is valid")
    });

    if !re.is_match(value) {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Only letters, digits and '_', '.', '@', '-' are allowed".to_string(),
        });
    }
    Ok(())
}

pub fn validate_env_key(field_name: &str, value: &str) -> Result<()> {
    static ENV_KEY: OnceLock<Regex> = OnceLock::new();
    let re = ENV_KEY
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key pattern is valid"));

    if !re.is_match(value) {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Not a valid environment variable name".to_string(),
        });
    }
    Ok(())
}

pub fn validate_unique<'a, I>(field_name: &str, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(ProvisionError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: value.to_string(),
                reason: "Duplicate entry".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("database.key_url", "https://www.mongodb.org/static/pgp/server-7.0.asc").is_ok());
        assert!(validate_url("database.key_url", "http://127.0.0.1:8080/key.asc").is_ok());
        assert!(validate_url("database.key_url", "").is_err());
        assert!(validate_url("database.key_url", "not a url").is_err());
        assert!(validate_url("database.key_url", "ftp://example.com/key.asc").is_err());
    }

    #[test]
    fn test_validate_unit_name() {
        assert!(validate_unit_name("services.unit", "telegram-storage-bot").is_ok());
        assert!(validate_unit_name("services.unit", "worker@1").is_ok());
        assert!(validate_unit_name("services.unit", "").is_err());
        assert!(validate_unit_name("services.unit", "../etc/passwd").is_err());
        assert!(validate_unit_name("services.unit", "two words").is_err());
    }

    #[test]
    fn test_validate_env_key() {
        assert!(validate_env_key("env.required_keys", "MONGODB_URI").is_ok());
        assert!(validate_env_key("env.required_keys", "_PRIVATE").is_ok());
        assert!(validate_env_key("env.required_keys", "1BAD").is_err());
        assert!(validate_env_key("env.required_keys", "BAD-KEY").is_err());
    }

    #[test]
    fn test_validate_unique() {
        assert!(validate_unique("services.name", ["backend", "control_bot"]).is_ok());
        assert!(validate_unique("services.name", ["backend", "backend"]).is_err());
    }
}

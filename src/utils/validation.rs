use crate::utils::error::{BridgeError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(BridgeError::validation(field_name, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(BridgeError::validation(
                field_name,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(BridgeError::validation(
            field_name,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::validation(
            field_name,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_absolute_path(field_name: &str, path: &str) -> Result<()> {
    validate_non_empty_string(field_name, path)?;
    if !path.starts_with('/') {
        return Err(BridgeError::validation(field_name, "Path must be absolute"));
    }
    if path.contains('\0') {
        return Err(BridgeError::validation(field_name, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(BridgeError::validation(
            field_name,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// Strips surrounding slashes so the prefix can be joined with `/` into
/// object keys. An empty result is rejected, it would address the whole bucket.
pub fn normalize_prefix(field_name: &str, prefix: &str) -> Result<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(BridgeError::validation(
            field_name,
            "Prefix cannot be empty or consist only of slashes",
        ));
    }
    Ok(trimmed.to_string())
}

//! Secret references in configuration values.
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and takes the first line
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is used verbatim

use crate::error::{ClientError, ClientResult};

const PASS_PREFIX: &str = "pass::";
const ENV_PREFIX: &str = "env::";

/// Resolves `value`, expanding a `pass::` or `env::` prefix.
pub fn resolve(value: &str) -> ClientResult<String> {
    if let Some(path) = value.strip_prefix(PASS_PREFIX) {
        resolve_pass(path)
    } else if let Some(var) = value.strip_prefix(ENV_PREFIX) {
        std::env::var(var)
            .map_err(|_| ClientError::Secret(format!("environment variable `{}` is not set", var)))
    } else {
        Ok(value.to_string())
    }
}

/// Returns `true` when `value` points elsewhere instead of holding the secret.
pub fn is_reference(value: &str) -> bool {
    value.starts_with(PASS_PREFIX) || value.starts_with(ENV_PREFIX)
}

/// Masks a plain-text secret for display; references are shown as-is.
pub fn redact(value: &str) -> String {
    if is_reference(value) {
        value.to_string()
    } else {
        "<redacted>".to_string()
    }
}

fn resolve_pass(path: &str) -> ClientResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| ClientError::Secret(format!("failed to run `pass show {}`: {}", path, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ClientError::Secret(format!(
            "`pass show {}` failed ({}): {}",
            path,
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ClientError::Secret(format!("`pass show {}` produced no output", path)))
}

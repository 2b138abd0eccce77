use regex::{Captures, Regex};
use std::env;

use crate::ConfigError;

/// Interpolate environment variables in a string.
///
/// `${VAR}` is replaced with the value of `VAR`; `${VAR:-fallback}` uses
/// `fallback` when `VAR` is unset. Every unset variable without a fallback is
/// reported at once.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |cap: &Captures<'_>| {
        let var_name = &cap[1];
        match (env::var(var_name), cap.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        missing.dedup();
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result.into_owned())
}

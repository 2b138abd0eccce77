use crate::types::{AbookConfig, HumanDuration};
use crate::ConfigError;

impl AbookConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.collection.trim().is_empty() {
            errors.push(ConfigError::InvalidValue {
                field: "collection".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let grace = self.command.grace_period.as_duration();
        if grace.subsec_nanos() != 0 {
            errors.push(ConfigError::InvalidValue {
                field: "command.grace_period".to_string(),
                reason: format!("must be a whole number of seconds, got {}", self.command.grace_period),
            });
        }

        let remote = &self.remote;
        for (field, rate) in [
            ("remote.failure_rate", remote.failure_rate),
            ("remote.latency_rate", remote.latency_rate),
            ("remote.mutation_rate", remote.mutation_rate),
            ("remote.insertion_rate", remote.insertion_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                errors.push(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("probability must be within [0, 1], got {}", rate),
                });
            }
        }

        if remote.min_latency.as_duration() > remote.max_latency.as_duration() {
            errors.push(ConfigError::InvalidValue {
                field: "remote.min_latency".to_string(),
                reason: format!(
                    "{} exceeds remote.max_latency {}",
                    remote.min_latency, remote.max_latency
                ),
            });
        }

        if remote.quota_limit == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "remote.quota_limit".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if remote.max_page_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "remote.max_page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.sync.page_size == 0 || self.sync.page_size > remote.max_page_size {
            errors.push(ConfigError::InvalidValue {
                field: "sync.page_size".to_string(),
                reason: format!(
                    "must be between 1 and remote.max_page_size ({}), got {}",
                    remote.max_page_size, self.sync.page_size
                ),
            });
        }

        if remote.page_cache_capacity == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "remote.page_cache_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            None => Ok(()),
            Some(first) => Err(first),
        }
    }

    /// Whole seconds of the grace-period countdown.
    pub fn grace_period_secs(&self) -> u64 {
        self.command.grace_period.as_duration().as_secs()
    }

    /// Periodic sync interval, or `None` when disabled.
    pub fn sync_interval(&self) -> Option<HumanDuration> {
        if self.sync.interval.is_zero() {
            None
        } else {
            Some(self.sync.interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: &ConfigError) -> &str {
        match err {
            ConfigError::InvalidValue { field, .. } => field,
            _ => "",
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AbookConfig::default().validate().is_empty());
        assert!(AbookConfig::default().validate_or_err().is_ok());
    }

    #[test]
    fn test_rates_out_of_range() {
        let mut config = AbookConfig::default();
        config.remote.failure_rate = 1.5;
        config.remote.mutation_rate = -0.1;

        let errors = config.validate();
        let fields: Vec<_> = errors.iter().map(field_of).collect();
        assert!(fields.contains(&"remote.failure_rate"));
        assert!(fields.contains(&"remote.mutation_rate"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_latency_bounds_inverted() {
        let mut config = AbookConfig::default();
        config.remote.min_latency = HumanDuration::from_secs(2);
        config.remote.max_latency = HumanDuration::from_millis(100);

        let errors = config.validate();
        assert!(errors.iter().any(|e| field_of(e) == "remote.min_latency"));
    }

    #[test]
    fn test_page_size_must_fit_remote_limit() {
        let mut config = AbookConfig::default();
        config.sync.page_size = 1000;
        assert!(config
            .validate()
            .iter()
            .any(|e| field_of(e) == "sync.page_size"));

        config.sync.page_size = 0;
        assert!(config
            .validate()
            .iter()
            .any(|e| field_of(e) == "sync.page_size"));
    }

    #[test]
    fn test_fractional_grace_period_rejected() {
        let mut config = AbookConfig::default();
        config.command.grace_period = HumanDuration::from_millis(2500);
        let err = config.validate_or_err().unwrap_err();
        assert_eq!(field_of(&err), "command.grace_period");
    }

    #[test]
    fn test_empty_collection_and_zero_quota() {
        let mut config = AbookConfig::default();
        config.collection = "  ".to_string();
        config.remote.quota_limit = 0;

        let errors = config.validate();
        assert!(errors.iter().any(|e| field_of(e) == "collection"));
        assert!(errors.iter().any(|e| field_of(e) == "remote.quota_limit"));
    }

    #[test]
    fn test_sync_interval_zero_disables() {
        let mut config = AbookConfig::default();
        assert!(config.sync_interval().is_some());
        config.sync.interval = HumanDuration::from_secs(0);
        assert!(config.sync_interval().is_none());
    }
}

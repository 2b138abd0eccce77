use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Human-readable duration (e.g., "200ms", "3s", "1h").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn from_secs(secs: u64) -> Self {
        HumanDuration(Duration::from_secs(secs))
    }

    pub fn from_millis(millis: u64) -> Self {
        HumanDuration(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
            (num, "ms")
        } else if let Some(num) = s.strip_suffix('s') {
            (num, "s")
        } else if let Some(num) = s.strip_suffix('m') {
            (num, "m")
        } else if let Some(num) = s.strip_suffix('h') {
            (num, "h")
        } else if let Some(num) = s.strip_suffix('d') {
            (num, "d")
        } else {
            return Err(format!("Invalid duration format: {}", s));
        };

        let num: u64 = num_str
            .trim()
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", s))?;

        let duration = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num * 60),
            "h" => Duration::from_secs(num * 3600),
            _ => Duration::from_secs(num * 86400),
        };

        Ok(HumanDuration(duration))
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0.as_millis();
        let secs = self.0.as_secs();

        // Only collapse to a coarser unit when nothing is lost.
        if millis % 1000 != 0 {
            write!(f, "{}ms", millis)
        } else if secs % 86400 == 0 && secs > 0 {
            write!(f, "{}d", secs / 86400)
        } else if secs % 3600 == 0 && secs > 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs % 60 == 0 && secs > 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

impl Serialize for HumanDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HumanDuration::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Command life cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Length of the cancellable window after the optimistic change.
    #[serde(default = "default_grace_period")]
    pub grace_period: HumanDuration,
}

fn default_grace_period() -> HumanDuration {
    HumanDuration::from_secs(3)
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            grace_period: default_grace_period(),
        }
    }
}

/// Fetch-since synchronisation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval of the periodic pull. Zero disables the background task.
    #[serde(default = "default_sync_interval")]
    pub interval: HumanDuration,
    /// Page size requested for list operations.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_sync_interval() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_page_size() -> usize {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval: default_sync_interval(),
            page_size: default_page_size(),
        }
    }
}

/// Simulated remote endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Requests allowed per hourly window.
    #[serde(default = "default_quota_limit")]
    pub quota_limit: u32,
    /// Largest page size the remote accepts.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    /// Probability of an injected 500 per request.
    #[serde(default)]
    pub failure_rate: f64,
    /// Probability of an injected delay per request.
    #[serde(default)]
    pub latency_rate: f64,
    #[serde(default = "default_min_latency")]
    pub min_latency: HumanDuration,
    #[serde(default = "default_max_latency")]
    pub max_latency: HumanDuration,
    /// Probability that a list request mutates an existing record out-of-band.
    #[serde(default)]
    pub mutation_rate: f64,
    /// Probability that a list request inserts an unseen record out-of-band.
    #[serde(default)]
    pub insertion_rate: f64,
    /// Fixed RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Number of cached pages kept by the client facade.
    #[serde(default = "default_page_cache_capacity")]
    pub page_cache_capacity: u64,
}

fn default_quota_limit() -> u32 {
    5000
}

fn default_max_page_size() -> usize {
    500
}

fn default_min_latency() -> HumanDuration {
    HumanDuration::from_millis(50)
}

fn default_max_latency() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_page_cache_capacity() -> u64 {
    256
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            quota_limit: default_quota_limit(),
            max_page_size: default_max_page_size(),
            failure_rate: 0.0,
            latency_rate: 0.0,
            min_latency: default_min_latency(),
            max_latency: default_max_latency(),
            mutation_rate: 0.0,
            insertion_rate: 0.0,
            seed: None,
            page_cache_capacity: default_page_cache_capacity(),
        }
    }
}

/// Top-level abook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbookConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Remote collection ("address book") the local book mirrors.
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_collection() -> String {
    "default".to_string()
}

impl Default for AbookConfig {
    fn default() -> Self {
        AbookConfig {
            name: None,
            collection: default_collection(),
            command: CommandConfig::default(),
            sync: SyncSettings::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration_parsing() {
        assert_eq!(
            HumanDuration::from_str("200ms").unwrap().as_duration(),
            Duration::from_millis(200)
        );
        assert_eq!(
            HumanDuration::from_str("3s").unwrap().as_duration(),
            Duration::from_secs(3)
        );
        assert_eq!(
            HumanDuration::from_str("5m").unwrap().as_duration(),
            Duration::from_secs(300)
        );
        assert_eq!(
            HumanDuration::from_str(" 1H ").unwrap().as_duration(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_human_duration_rejects_garbage() {
        assert!(HumanDuration::from_str("3").is_err());
        assert!(HumanDuration::from_str("xs").is_err());
        assert!(HumanDuration::from_str("").is_err());
    }

    #[test]
    fn test_human_duration_display_is_lossless() {
        assert_eq!(HumanDuration::from_millis(1500).to_string(), "1500ms");
        assert_eq!(HumanDuration::from_secs(90).to_string(), "90s");
        assert_eq!(HumanDuration::from_secs(120).to_string(), "2m");
        assert_eq!(HumanDuration::from_secs(7200).to_string(), "2h");
        assert_eq!(HumanDuration::from_secs(0).to_string(), "0s");
    }

    #[test]
    fn test_defaults() {
        let config = AbookConfig::default();
        assert_eq!(config.collection, "default");
        assert_eq!(config.command.grace_period.as_duration(), Duration::from_secs(3));
        assert_eq!(config.sync.page_size, 100);
        assert_eq!(config.remote.quota_limit, 5000);
        assert_eq!(config.remote.failure_rate, 0.0);
        assert!(config.remote.seed.is_none());
    }
}

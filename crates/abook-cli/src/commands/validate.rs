use std::path::Path;

use abook_config::AbookConfig;

pub fn run(config_path: &Path, print: bool) -> anyhow::Result<()> {
    let config = AbookConfig::from_file(config_path)?;
    if print {
        print!("{}", config.to_yaml()?);
    }
    let errors = config.validate();

    if errors.is_empty() {
        println!("Configuration is valid.");
        Ok(())
    } else {
        eprintln!("Configuration has {} error(s):", errors.len());
        for (i, err) in errors.iter().enumerate() {
            eprintln!("  {}: {}", i + 1, err);
        }
        anyhow::bail!("{} validation error(s) found", errors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_valid_file_prints_and_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abook.yaml");
        fs::write(&path, "collection: friends\ncommand:\n  grace_period: 5s\n").unwrap();
        assert!(run(&path, true).is_ok());
    }

    #[test]
    fn test_invalid_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abook.yaml");
        fs::write(&path, "collection: \"\"\nremote:\n  failure_rate: 2.0\n").unwrap();
        let err = run(&path, false).unwrap_err();
        assert!(err.to_string().contains("2 validation error(s)"));
    }
}

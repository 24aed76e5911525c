//! Configuration validation

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::defaults::builtin_binsets;
use super::duration::parse_duration;
use super::types::{Config, ExclusionConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tool(config)?;
    validate_timeouts(config)?;
    validate_exclusions("exclusions", &config.exclusions)?;
    validate_exclusions("race_exclusions", &config.race_exclusions)?;
    validate_integration(config)?;
    validate_regression(config)?;
    debug!("configuration validation passed");
    Ok(())
}

/// Compile a pattern, mapping failures to a config error
pub fn compile_pattern(pattern: &str) -> std::result::Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn validate_tool(config: &Config) -> Result<()> {
    if config.tool.command.is_empty() || config.tool.command[0].is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "tool.command".to_string(),
            message: "command cannot be empty".to_string(),
        }
        .into());
    }

    if config.tool.workers == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "tool.workers".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    config.tool.stagger_duration()?;
    Ok(())
}

fn validate_timeouts(config: &Config) -> Result<()> {
    let timeouts = [
        ("build.timeout", &config.build.timeout),
        ("test.timeout", &config.test.timeout),
        ("race.timeout", &config.race.timeout),
        ("bench.timeout", &config.bench.timeout),
        ("coverage.timeout", &config.coverage.timeout),
        ("integration.timeout", &config.integration.timeout),
    ];
    for (field, value) in timeouts {
        let duration = parse_duration(value)?;
        if duration.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: "timeout must be greater than zero".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn validate_exclusions(field: &str, rules: &[ExclusionConfig]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        if rule.unit.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}[{}].unit", field, i),
                message: "unit pattern cannot be empty".to_string(),
            }
            .into());
        }
        compile_pattern(&rule.unit)?;
        compile_pattern(&rule.name)?;
    }
    Ok(())
}

fn validate_integration(config: &Config) -> Result<()> {
    compile_pattern(&config.integration.run_pattern)?;
    if config.integration.func_prefix.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "integration.func_prefix".to_string(),
            message: "prefix cannot be empty".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_regression(config: &Config) -> Result<()> {
    let regression = &config.regression;
    compile_pattern(&regression.tests)?;

    let known = builtin_binsets()
        .iter()
        .any(|(name, _)| *name == regression.binset)
        || regression.binsets.contains_key(&regression.binset);
    if !known {
        return Err(ConfigError::UnknownBinSet(regression.binset.clone()).into());
    }

    for (name, binaries) in &regression.binsets {
        if binaries.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("regression.binsets.{}", name),
                message: "binary set cannot be empty".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CountdownError;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_command() {
        let mut config = Config::default();
        config.tool.command = Vec::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.tool.workers = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_exclusion_pattern() {
        let mut config = Config::default();
        config.race_exclusions = vec![ExclusionConfig::new("v.io/(", ".*")];
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            CountdownError::Config(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_validate_unknown_binset() {
        let mut config = Config::default();
        config.regression.binset = "everything".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            CountdownError::Config(ConfigError::UnknownBinSet(_))
        ));
    }

    #[test]
    fn test_validate_custom_binset() {
        let mut config = Config::default();
        config
            .regression
            .binsets
            .insert("mine".to_string(), vec!["agentd".to_string()]);
        config.regression.binset = "mine".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.coverage.timeout = "0".to_string();
        assert!(validate_config(&config).is_err());
    }
}

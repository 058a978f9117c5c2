use std::{path::Path, time::Duration};

use anyhow::{Context, bail};

use crate::{Config, StorageConfig};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

    for warning in validate(&config)? {
        log::warn!("{warning}");
    }

    Ok(config)
}

/// Checks values serde accepts but the limiter cannot work with.
///
/// Hard errors abort startup, the returned strings are warnings worth logging.
pub(crate) fn validate(config: &Config) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();
    let rate_limit = &config.rate_limit;

    for (tier, quota) in &rate_limit.tiers {
        if quota.points == 0 {
            bail!("Rate limit tier '{tier}' must allow at least one point per window");
        }

        if quota.duration.is_zero() {
            bail!("Rate limit tier '{tier}' must have a non-zero duration");
        }

        if quota.duration < Duration::from_secs(1) {
            bail!("Rate limit tier '{tier}' has a duration below one second, windows are counted in whole seconds");
        }

        if quota.block_duration.is_some_and(|block| block.is_zero()) {
            warnings.push(format!(
                "Rate limit tier '{tier}' has a zero block_duration, exhausted keys will not be blocked"
            ));
        }

        if quota.key_prefix.as_deref() == Some("") {
            bail!("Rate limit tier '{tier}' has an empty key_prefix, keys would collide with other tiers");
        }
    }

    match &rate_limit.storage {
        StorageConfig::Memory => {
            if rate_limit.enabled {
                warnings.push(
                    "Rate limit storage is memory only: quotas are enforced per process, not across the fleet"
                        .to_string(),
                );
            }
        }
        StorageConfig::Redis(redis) => {
            if redis.retry.attempts == 0 {
                bail!("Redis retry policy needs at least one attempt");
            }

            if redis.response_timeout.is_zero() {
                bail!("Redis response_timeout must be greater than zero");
            }

            if redis.retry.backoff > redis.retry.max_backoff {
                bail!(
                    "Redis retry backoff ({:?}) is larger than max_backoff ({:?})",
                    redis.retry.backoff,
                    redis.retry.max_backoff
                );
            }

            if redis.pool.max_size == Some(0) {
                bail!("Redis pool max_size must be greater than zero");
            }
        }
    }

    if !rate_limit.enabled {
        warnings.push("Rate limiting is disabled, every request will be admitted".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn zero_points_is_an_error() {
        let config = parse(indoc! {r#"
            [rate_limit.tiers."get:search"]
            points = 0
            duration = "60s"
        "#});

        let error = validate(&config).unwrap_err();
        insta::assert_snapshot!(error, @"Rate limit tier 'get:search' must allow at least one point per window");
    }

    #[test]
    fn sub_second_duration_is_an_error() {
        let config = parse(indoc! {r#"
            [rate_limit.tiers."get:search"]
            points = 10
            duration = "500ms"
        "#});

        assert!(validate(&config).is_err());
    }

    #[test]
    fn memory_storage_warns() {
        let config = parse("");

        let warnings = validate(&config).unwrap();
        insta::assert_debug_snapshot!(warnings, @r#"
        [
            "Rate limit storage is memory only: quotas are enforced per process, not across the fleet",
        ]
        "#);
    }

    #[test]
    fn zero_block_duration_warns() {
        let config = parse(indoc! {r#"
            [rate_limit.storage]
            type = "redis"
            url = "redis://localhost:6379"

            [rate_limit.tiers."mutate:thought"]
            points = 3
            duration = "60s"
            block_duration = "0s"
        "#});

        let warnings = validate(&config).unwrap();
        insta::assert_debug_snapshot!(warnings, @r#"
        [
            "Rate limit tier 'mutate:thought' has a zero block_duration, exhausted keys will not be blocked",
        ]
        "#);
    }

    #[test]
    fn redis_retry_needs_an_attempt() {
        let config = parse(indoc! {r#"
            [rate_limit.storage]
            type = "redis"
            url = "redis://localhost:6379"

            [rate_limit.storage.retry]
            attempts = 0
        "#});

        let error = validate(&config).unwrap_err();
        insta::assert_snapshot!(error, @"Redis retry policy needs at least one attempt");
    }

    #[test]
    fn backoff_above_cap_is_an_error() {
        let config = parse(indoc! {r#"
            [rate_limit.storage]
            type = "redis"
            url = "redis://localhost:6379"

            [rate_limit.storage.retry]
            backoff = "1s"
            max_backoff = "100ms"
        "#});

        assert!(validate(&config).is_err());
    }

    #[test]
    fn load_reads_and_validates_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnstile.toml");

        std::fs::write(
            &path,
            indoc! {r#"
                [rate_limit.tiers."get:standard"]
                points = 0
                duration = "60s"
            "#},
        )
        .unwrap();

        assert!(load(&path).is_err());

        std::fs::write(&path, "[server]\nlisten_address = \"127.0.0.1:7000\"\n").unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.server.listen_address, Some("127.0.0.1:7000".parse().unwrap()));
    }
}

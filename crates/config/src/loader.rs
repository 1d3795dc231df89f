use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate(&config)?;

    if config.quota.monthly_limit.is_none() && config.quota.daily_limit.is_none() {
        log::warn!("No upload quotas configured, authenticated users can upload without a cap");
    }

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let rate_limits = &config.server.rate_limits;

    if rate_limits.enabled && rate_limits.requests_per_second == 0 {
        bail!("server.rate_limits.requests_per_second must be greater than zero");
    }

    if rate_limits.enabled && rate_limits.uploads_per_minute == 0 {
        bail!("server.rate_limits.uploads_per_minute must be greater than zero");
    }

    if config.quota.monthly_limit == Some(0) {
        bail!("quota.monthly_limit must be greater than zero, omit it to disable the monthly cap");
    }

    if config.quota.daily_limit == Some(0) {
        bail!("quota.daily_limit must be greater than zero, omit it to disable the daily cap");
    }

    if config.retention.max_age_days == 0 {
        bail!("retention.max_age_days must be greater than zero");
    }

    config.server.health.validate()?;

    if let Some(tls) = &config.server.tls {
        tls.validate()?;
    }

    if let Err(e) = url::Url::parse(&config.detector.url) {
        bail!("detector.url '{}' is not a valid URL: {e}", config.detector.url);
    }

    Ok(())
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();
                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }
                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

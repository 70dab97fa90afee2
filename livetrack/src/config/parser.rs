//! INI parsing: the single place where INI key names map to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::consumer::clamp_limit;

/// Parse `ini` over [`ConfigFile::default`].
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [session] section
    if let Some(section) = ini.section(Some("session")) {
        if let Some(v) = non_empty(section, "origin") {
            if !(v.starts_with("http://") || v.starts_with("https://")) {
                return Err(invalid("session", "origin", v, "must start with http:// or https://"));
            }
            config.session.origin = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = non_empty(section, "delivery_id") {
            config.session.delivery_id =
                Some(parse_value(v, "session", "delivery_id", "must be a positive integer")?);
        }
        if let Some(v) = non_empty(section, "channel_url") {
            if !(v.starts_with("ws://") || v.starts_with("wss://")) {
                return Err(invalid("session", "channel_url", v, "must start with ws:// or wss://"));
            }
            config.session.channel_url = Some(v.to_string());
        }
    }

    // [gate] section
    if let Some(section) = ini.section(Some("gate")) {
        if let Some(v) = non_empty(section, "min_interval_secs") {
            config.gate.min_interval_secs =
                parse_value(v, "gate", "min_interval_secs", "must be a non-negative integer (seconds)")?;
        }
        if let Some(v) = non_empty(section, "min_distance_m") {
            let metres: f64 = parse_value(v, "gate", "min_distance_m", "must be a number (metres)")?;
            if !metres.is_finite() || metres < 0.0 {
                return Err(invalid("gate", "min_distance_m", v, "must be zero or greater"));
            }
            config.gate.min_distance_m = metres;
        }
    }

    // [transport] section
    if let Some(section) = ini.section(Some("transport")) {
        if let Some(v) = non_empty(section, "backoff_base_ms") {
            config.transport.backoff_base_ms =
                parse_value(v, "transport", "backoff_base_ms", "must be a positive integer (milliseconds)")?;
        }
        if let Some(v) = non_empty(section, "backoff_max_ms") {
            config.transport.backoff_max_ms =
                parse_value(v, "transport", "backoff_max_ms", "must be a positive integer (milliseconds)")?;
        }
        if config.transport.backoff_max_ms < config.transport.backoff_base_ms {
            return Err(invalid(
                "transport",
                "backoff_max_ms",
                &config.transport.backoff_max_ms.to_string(),
                "must not be smaller than backoff_base_ms",
            ));
        }
    }

    // [producer] section
    if let Some(section) = ini.section(Some("producer")) {
        if let Some(v) = non_empty(section, "persist") {
            config.producer.persist = parse_bool(v, "producer", "persist")?;
        }
        if let Some(v) = non_empty(section, "persist_path") {
            config.producer.persist_path = v.to_string();
        }
        if let Some(v) = non_empty(section, "status") {
            config.producer.status = v.to_string();
        }
        if let Some(v) = non_empty(section, "simulate_tick_ms") {
            let tick: u64 =
                parse_value(v, "producer", "simulate_tick_ms", "must be a positive integer (milliseconds)")?;
            if tick == 0 {
                return Err(invalid("producer", "simulate_tick_ms", v, "must be greater than zero"));
            }
            config.producer.simulate_tick_ms = tick;
        }
    }

    // [consumer] section
    if let Some(section) = ini.section(Some("consumer")) {
        if let Some(v) = non_empty(section, "history_path") {
            config.consumer.history_path = v.to_string();
        }
        if let Some(v) = non_empty(section, "history_limit") {
            let limit: usize =
                parse_value(v, "consumer", "history_limit", "must be a positive integer")?;
            config.consumer.history_limit = clamp_limit(limit);
        }
        if let Some(v) = non_empty(section, "history_timeout_secs") {
            config.consumer.history_timeout_secs =
                parse_value(v, "consumer", "history_timeout_secs", "must be a positive integer (seconds)")?;
        }
        if let Some(v) = non_empty(section, "speed_kmph") {
            let speed: f64 = parse_value(v, "consumer", "speed_kmph", "must be a number (km/h)")?;
            if !speed.is_finite() || speed <= 0.0 {
                return Err(invalid("consumer", "speed_kmph", v, "must be greater than zero"));
            }
            config.consumer.speed_kmph = speed;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_value<T: FromStr>(
    value: &str,
    section: &str,
    key: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value.parse().map_err(|_| invalid(section, key, value, reason))
}

fn parse_bool(value: &str, section: &str, key: &str) -> Result<bool, ConfigFileError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile, ConfigFileError> {
        parse_ini(&Ini::load_from_str(text).unwrap())
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_overlays_values() {
        let config = parse(
            "[session]\norigin = https://shop.example.com/\ndelivery_id = 12\n\
             [gate]\nmin_interval_secs = 5\nmin_distance_m = 10.5\n\
             [producer]\npersist = yes\nstatus = en_route\n\
             [consumer]\nhistory_limit = 5000\nspeed_kmph = 45\n",
        )
        .unwrap();
        assert_eq!(config.session.origin, "https://shop.example.com");
        assert_eq!(config.session.delivery_id, Some(12));
        assert_eq!(config.gate.min_interval_secs, 5);
        assert_eq!(config.gate.min_distance_m, 10.5);
        assert!(config.producer.persist);
        assert_eq!(config.producer.status, "en_route");
        assert_eq!(config.consumer.history_limit, 1000);
        assert_eq!(config.consumer.speed_kmph, 45.0);
        assert_eq!(config.transport, ConfigFile::default().transport);
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let config = parse("[session]\nchannel_url =\ndelivery_id = \n").unwrap();
        assert_eq!(config.session.channel_url, None);
        assert_eq!(config.session.delivery_id, None);
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = parse("[gate]\nmin_distance_m = far\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "gate");
                assert_eq!(key, "min_distance_m");
                assert_eq!(value, "far");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_non_http_origin() {
        assert!(parse("[session]\norigin = ftp://example.com\n").is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        assert!(parse("[transport]\nbackoff_base_ms = 5000\nbackoff_max_ms = 1000\n").is_err());
    }

    #[test]
    fn test_rejects_zero_speed() {
        assert!(parse("[consumer]\nspeed_kmph = 0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_bool() {
        assert!(parse("[producer]\npersist = maybe\n").is_err());
    }
}

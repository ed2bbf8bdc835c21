use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::{info, warn};

use crate::model::OptimizationSettings;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "LOAD_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "LOAD_PLANNER_API_PORT";

    fn from_env() -> Self {
        let host_value = env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = env_string(Self::PORT_VAR)
            .map(|raw| parse_port(&raw))
            .unwrap_or(Self::DEFAULT_PORT);

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            display_host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

fn parse_port(raw: &str) -> u16 {
    match raw.parse::<u16>() {
        Ok(value) if value != 0 => value,
        Ok(_) => {
            warn!(
                "{} must not be 0. Using {}.",
                ApiConfig::PORT_VAR,
                ApiConfig::DEFAULT_PORT
            );
            ApiConfig::DEFAULT_PORT
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}'): {}. Using {}.",
                ApiConfig::PORT_VAR,
                raw,
                err,
                ApiConfig::DEFAULT_PORT
            );
            ApiConfig::DEFAULT_PORT
        }
    }
}

/// Default optimization settings applied when a request does not override them.
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfig {
    settings: OptimizationSettings,
}

impl OptimizerConfig {
    const MAX_UTILIZATION_VAR: &'static str = "LOAD_PLANNER_MAX_UTILIZATION";
    const ALLOW_SPLITTING_VAR: &'static str = "LOAD_PLANNER_ALLOW_UNIT_SPLITTING";
    const DATE_RANGE_VAR: &'static str = "LOAD_PLANNER_DATE_GROUPING_RANGE_DAYS";
    const RESPECT_ASSIGNMENTS_VAR: &'static str = "LOAD_PLANNER_RESPECT_CURRENT_ASSIGNMENTS";

    fn from_env() -> Self {
        let max_utilization = load_f64_with_warning(
            Self::MAX_UTILIZATION_VAR,
            OptimizationSettings::DEFAULT_MAX_UTILIZATION,
            |value| value > 0.0 && value <= 100.0,
            "must be greater than 0 and at most 100",
            "Reduced packing ceiling leaves spare room in every container",
        );

        let allow_unit_splitting = env_string(Self::ALLOW_SPLITTING_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ALLOW_SPLITTING_VAR))
            .unwrap_or(OptimizationSettings::DEFAULT_ALLOW_UNIT_SPLITTING);

        let range_days = env_string(Self::DATE_RANGE_VAR)
            .and_then(|raw| parse_days(&raw, Self::DATE_RANGE_VAR));

        let respect_current_assignments = env_string(Self::RESPECT_ASSIGNMENTS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::RESPECT_ASSIGNMENTS_VAR))
            .unwrap_or(OptimizationSettings::DEFAULT_RESPECT_CURRENT_ASSIGNMENTS);

        let settings = OptimizationSettings::builder()
            .max_utilization(max_utilization)
            .allow_unit_splitting(allow_unit_splitting)
            .shipping_date_grouping_range_days(range_days)
            .respect_current_assignments(respect_current_assignments)
            .build();

        Self { settings }
    }

    /// Returns the configured default settings.
    pub fn settings(&self) -> OptimizationSettings {
        self.settings
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_days(raw: &str, var_name: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(days) => Some(days),
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as a number of days: {}. Date grouping stays disabled.",
                var_name, raw, err
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    let Some(raw) = env_string(var_name) else {
        return default;
    };
    match raw.parse::<f64>() {
        Ok(value) if validator(value) => {
            let tolerance = (default.abs().max(1.0)) * 1e-9;
            if (value - default).abs() > tolerance {
                info!("{} ({} = {}).", notice, var_name, value);
            }
            value
        }
        Ok(_) => {
            warn!(
                "{} contains invalid value '{}': {}. Using {}.",
                var_name, raw, invalid_hint, default
            );
            default
        }
        Err(err) => {
            warn!(
                "Could not parse {} ('{}') as number: {}. Using {}.",
                var_name, raw, err, default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // case and whitespace
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("Yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("off", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("9000"), 9000);
        assert_eq!(parse_port("0"), ApiConfig::DEFAULT_PORT);
        assert_eq!(parse_port("http"), ApiConfig::DEFAULT_PORT);
        assert_eq!(parse_port("70000"), ApiConfig::DEFAULT_PORT);
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("7", "TEST_VAR"), Some(7));
        assert_eq!(parse_days(" 0 ", "TEST_VAR"), Some(0));
        assert_eq!(parse_days("-3", "TEST_VAR"), None);
        assert_eq!(parse_days("week", "TEST_VAR"), None);
    }

    #[test]
    fn test_default_api_config_binds_everywhere() {
        let config = ApiConfig::default();
        assert!(config.binds_to_all_interfaces());
        assert_eq!(config.socket_addr().port(), 8080);
        assert_eq!(config.display_host(), "0.0.0.0");
    }

    #[test]
    fn test_missing_variable_uses_default() {
        let value = load_f64_with_warning(
            "LOAD_PLANNER_TEST_SURELY_UNSET_VARIABLE",
            42.0,
            |v| v > 0.0,
            "must be positive",
            "changed",
        );
        assert_eq!(value, 42.0);
    }
}

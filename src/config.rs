use std::time::Duration;

/// Default bounded wait for captures and IMU samples.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// How modalities that were not requested count toward a cycle's aggregate
/// validity flag. Only requested modalities are ever fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModalityPolicy {
    /// A modality that was not requested counts as satisfied.
    #[default]
    Compat,
    /// Depth, color and IR must all be present.
    Strict,
}

/// Per-session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bounded wait for a new capture.
    pub timeout: Duration,
    /// Bounded wait for an inertial sample.
    pub imu_timeout: Duration,
    pub modality_policy: ModalityPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            imu_timeout: DEFAULT_TIMEOUT,
            modality_policy: ModalityPolicy::Compat,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `KINZ_TIMEOUT_MS`, `KINZ_IMU_TIMEOUT_MS` and
    /// `KINZ_MODALITY_POLICY` (`compat` | `strict`).
    pub fn from_env() -> Self {
        let timeout_ms = read_env_u64("KINZ_TIMEOUT_MS", DEFAULT_TIMEOUT.as_millis() as u64);
        let imu_timeout_ms = read_env_u64("KINZ_IMU_TIMEOUT_MS", timeout_ms);
        let modality_policy = match read_env_string("KINZ_MODALITY_POLICY", "compat").as_str() {
            "compat" => ModalityPolicy::Compat,
            "strict" => ModalityPolicy::Strict,
            other => {
                log::warn!(
                    "Unknown KINZ_MODALITY_POLICY='{}', using compat (supported: compat|strict)",
                    other
                );
                ModalityPolicy::Compat
            }
        };

        let config = SessionConfig {
            timeout: Duration::from_millis(timeout_ms),
            imu_timeout: Duration::from_millis(imu_timeout_ms),
            modality_policy,
        };
        log::debug!("Session config: {:?}", config);
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.imu_timeout = timeout;
        self
    }

    pub fn with_modality_policy(mut self, policy: ModalityPolicy) -> Self {
        self.modality_policy = policy;
        self
    }
}

fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| default.to_string())
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("Invalid {}='{}', using default {}", name, v, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert_eq!(config.imu_timeout, config.timeout);
        assert_eq!(config.modality_policy, ModalityPolicy::Compat);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("KINZ_TEST_U64", " 250 ");
        assert_eq!(read_env_u64("KINZ_TEST_U64", 7), 250);
        std::env::set_var("KINZ_TEST_U64", "soon");
        assert_eq!(read_env_u64("KINZ_TEST_U64", 7), 7);
        assert_eq!(read_env_u64("KINZ_TEST_UNSET", 7), 7);
        std::env::set_var("KINZ_TEST_STR", "Strict");
        assert_eq!(read_env_string("KINZ_TEST_STR", "compat"), "strict");
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_timeout(Duration::from_millis(5))
            .with_modality_policy(ModalityPolicy::Strict);
        assert_eq!(config.imu_timeout, Duration::from_millis(5));
        assert_eq!(config.modality_policy, ModalityPolicy::Strict);
    }
}

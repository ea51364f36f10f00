//! Client identity rotation and pacing between page loads.

use std::time::Duration;

use rand::Rng;

use crate::config::AntiDetectionConfig;

/// Real browser user agents rotated across page loads.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

/// Headers sent with every rendered page load. Matches what the sites see
/// from a mainland-Chinese desktop browser.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Accept-Encoding", "gzip, deflate, br"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
];

/// Identity (user agent + headers) for one page load.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub headers: &'static [(&'static str, &'static str)],
}

/// Produces identities and pacing delays per the configured policy.
#[derive(Debug, Clone, Default)]
pub struct AntiDetection {
    config: AntiDetectionConfig,
}

impl AntiDetection {
    pub fn new(config: AntiDetectionConfig) -> Self {
        Self { config }
    }

    /// A fresh identity for one page load.
    pub fn identity(&self) -> ClientIdentity {
        let user_agent = if self.config.rotate_user_agents {
            let idx = rand::rng().random_range(0..USER_AGENTS.len());
            USER_AGENTS[idx]
        } else {
            USER_AGENTS[0]
        };

        ClientIdentity {
            user_agent: user_agent.to_string(),
            headers: DEFAULT_HEADERS,
        }
    }

    /// Pause between distinct parsers, when random delays are enabled.
    pub async fn pause_between_parsers(&self) {
        if !self.config.random_delays {
            return;
        }
        let delay = jitter(self.config.delay_between_parsers_secs);
        tracing::debug!("pausing {:.2}s before next parser", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

/// Uniform random duration within an inclusive seconds range.
pub fn jitter(range_secs: (u64, u64)) -> Duration {
    let (min, max) = range_secs;
    if min >= max {
        return Duration::from_secs(min);
    }
    let secs = rand::rng().random_range(min as f64..=max as f64);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uses_pool_user_agents() {
        let anti = AntiDetection::default();
        for _ in 0..20 {
            let identity = anti.identity();
            assert!(USER_AGENTS.contains(&identity.user_agent.as_str()));
        }
    }

    #[test]
    fn rotation_disabled_pins_first_agent() {
        let mut config = AntiDetectionConfig::default();
        config.rotate_user_agents = false;
        let anti = AntiDetection::new(config);
        assert_eq!(anti.identity().user_agent, USER_AGENTS[0]);
    }

    #[test]
    fn headers_carry_language_and_dnt() {
        let identity = AntiDetection::default().identity();
        let names: Vec<&str> = identity.headers.iter().map(|(k, _)| *k).collect();
        assert!(names.contains(&"Accept-Language"));
        assert!(names.contains(&"DNT"));
    }

    #[test]
    fn jitter_stays_within_range() {
        for _ in 0..50 {
            let d = jitter((2, 5));
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn jitter_degenerate_range_is_constant() {
        assert_eq!(jitter((3, 3)), Duration::from_secs(3));
    }
}

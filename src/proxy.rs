//! Tiered, cost-aware proxy pool with per-provider health and failover.
//!
//! Providers are configured in strict priority order, cheapest first. Each
//! provider encapsulates its own authentication scheme: most residential
//! gateways take a templated username carrying the country pin and a
//! rotating session ID, so successive requests exit from different IPs.
//! Health is in-memory for the lifetime of one invocation.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Consecutive provider failures before it is put on cooldown.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// Provider cooldown length.
pub const PROVIDER_COOLDOWN_MINUTES: i64 = 5;

/// A ready-to-use proxy endpoint with credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub provider: String,
    /// e.g. "http://gw.dataimpulse.com:823"
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
enum ProviderKind {
    DataImpulse { username: String, password: String },
    IpRoyal { username: String, password: String },
    PacketStream { api_key: String },
    ScraperApi { api_key: String, monthly_limit: u32 },
    SmartProxy { username: String, password: String },
    Oxylabs { username: String, password: String },
    BrightData { username: String, password: String },
    StaticList { proxies: Vec<ProxyConfig> },
}

#[derive(Debug, Clone, Default)]
struct ProviderHealth {
    successes: u64,
    failures: u64,
    consecutive_failures: u32,
    cooldown_until: Option<DateTime<Utc>>,
    requests_used: u32,
}

struct Provider {
    name: &'static str,
    kind: ProviderKind,
    health: ProviderHealth,
}

impl Provider {
    fn build_proxy(&self, country: &str) -> Option<ProxyConfig> {
        let session: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
        let proxy = match &self.kind {
            ProviderKind::DataImpulse { username, password } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://gw.dataimpulse.com:823".to_string(),
                username: Some(format!("{}__cr.{}__sess.{}", username, country, session)),
                password: Some(password.clone()),
            },
            ProviderKind::IpRoyal { username, password } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://geo.iproyal.com:12321".to_string(),
                username: Some(username.clone()),
                password: Some(format!("{}_country-{}_session-{}", password, country, session)),
            },
            ProviderKind::PacketStream { api_key } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://proxy.packetstream.io:31112".to_string(),
                username: Some("packetstream".to_string()),
                password: Some(format!("{}_country-{}", api_key, country.to_uppercase())),
            },
            ProviderKind::ScraperApi { api_key, monthly_limit } => {
                if self.health.requests_used >= *monthly_limit {
                    return None;
                }
                ProxyConfig {
                    provider: self.name.to_string(),
                    server: "http://proxy-server.scraperapi.com:8001".to_string(),
                    username: Some(format!("scraperapi.country_code={}", country)),
                    password: Some(api_key.clone()),
                }
            }
            ProviderKind::SmartProxy { username, password } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://gate.smartproxy.com:10001".to_string(),
                username: Some(format!(
                    "user-{}-country-{}-session-{}",
                    username, country, session
                )),
                password: Some(password.clone()),
            },
            ProviderKind::Oxylabs { username, password } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://pr.oxylabs.io:7777".to_string(),
                username: Some(format!(
                    "customer-{}-cc-{}-sessid-{}",
                    username, country, session
                )),
                password: Some(password.clone()),
            },
            ProviderKind::BrightData { username, password } => ProxyConfig {
                provider: self.name.to_string(),
                server: "http://brd.superproxy.io:22225".to_string(),
                username: Some(format!("{}-country-{}-session-{}", username, country, session)),
                password: Some(password.clone()),
            },
            ProviderKind::StaticList { proxies } => {
                if proxies.is_empty() {
                    return None;
                }
                let idx = rand::thread_rng().gen_range(0..proxies.len());
                let mut p = proxies[idx].clone();
                p.provider = self.name.to_string();
                p
            }
        };
        Some(proxy)
    }
}

pub struct ProxyManager {
    providers: Vec<Provider>,
    country: String,
}

impl ProxyManager {
    /// Build the provider list from configuration, cheapest tier first.
    /// Providers whose credentials are absent are simply not configured.
    pub fn from_config(config: &Config) -> Self {
        let mut providers = Vec::new();

        if let (Some(u), Some(p)) = (&config.dataimpulse_username, &config.dataimpulse_password) {
            providers.push(Provider {
                name: "dataimpulse",
                kind: ProviderKind::DataImpulse {
                    username: u.clone(),
                    password: p.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let (Some(u), Some(p)) = (&config.iproyal_username, &config.iproyal_password) {
            providers.push(Provider {
                name: "iproyal",
                kind: ProviderKind::IpRoyal {
                    username: u.clone(),
                    password: p.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let Some(key) = &config.packetstream_api_key {
            providers.push(Provider {
                name: "packetstream",
                kind: ProviderKind::PacketStream {
                    api_key: key.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let Some(key) = &config.scraperapi_key {
            providers.push(Provider {
                name: "scraperapi",
                kind: ProviderKind::ScraperApi {
                    api_key: key.clone(),
                    monthly_limit: config.scraperapi_limit,
                },
                health: ProviderHealth::default(),
            });
        }
        if let (Some(u), Some(p)) = (&config.smartproxy_username, &config.smartproxy_password) {
            providers.push(Provider {
                name: "smartproxy",
                kind: ProviderKind::SmartProxy {
                    username: u.clone(),
                    password: p.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let (Some(u), Some(p)) = (&config.oxylabs_username, &config.oxylabs_password) {
            providers.push(Provider {
                name: "oxylabs",
                kind: ProviderKind::Oxylabs {
                    username: u.clone(),
                    password: p.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let (Some(u), Some(p)) = (&config.brightdata_username, &config.brightdata_password) {
            providers.push(Provider {
                name: "brightdata",
                kind: ProviderKind::BrightData {
                    username: u.clone(),
                    password: p.clone(),
                },
                health: ProviderHealth::default(),
            });
        }
        if let Some(list) = &config.proxy_list {
            let proxies = parse_proxy_list(list);
            if !proxies.is_empty() {
                providers.push(Provider {
                    name: "static",
                    kind: ProviderKind::StaticList { proxies },
                    health: ProviderHealth::default(),
                });
            }
        }

        if !providers.is_empty() {
            info!(
                "Proxy manager configured with {} provider(s): {:?}",
                providers.len(),
                providers.iter().map(|p| p.name).collect::<Vec<_>>()
            );
        }

        ProxyManager {
            providers,
            country: config.proxy_country.clone(),
        }
    }

    #[cfg(test)]
    fn with_providers(providers: Vec<(&'static str, ProviderKind)>, country: &str) -> Self {
        ProxyManager {
            providers: providers
                .into_iter()
                .map(|(name, kind)| Provider {
                    name,
                    kind,
                    health: ProviderHealth::default(),
                })
                .collect(),
            country: country.to_string(),
        }
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Pick a proxy from the highest-priority available provider.
    ///
    /// Cooling providers are skipped; when every provider is cooling, the
    /// one whose cooldown expires first is cleared and used (degraded-mode
    /// fallback). Returns None only when nothing is configured or no
    /// provider can produce an endpoint.
    pub fn get_proxy(&mut self) -> Option<ProxyConfig> {
        self.get_proxy_at(Utc::now())
    }

    pub fn get_proxy_at(&mut self, now: DateTime<Utc>) -> Option<ProxyConfig> {
        if self.providers.is_empty() {
            return None;
        }

        let any_available = self.providers.iter().any(|p| !cooling(&p.health, now));
        if !any_available {
            // Degraded mode: clear the earliest-expiring cooldown.
            if let Some(provider) = self
                .providers
                .iter_mut()
                .min_by_key(|p| p.health.cooldown_until.unwrap_or(now))
            {
                warn!(
                    "All proxy providers cooling down; falling back to '{}'",
                    provider.name
                );
                provider.health.cooldown_until = None;
            }
        }

        for i in 0..self.providers.len() {
            if cooling(&self.providers[i].health, now) {
                continue;
            }
            match self.providers[i].build_proxy(&self.country) {
                Some(proxy) => {
                    let health = &mut self.providers[i].health;
                    health.requests_used += 1;
                    debug!("Selected proxy provider '{}'", proxy.provider);
                    return Some(proxy);
                }
                None => {
                    // Internal failure (exhausted quota, empty list): count it
                    // and move on to the next provider.
                    self.note_internal_failure(i, now);
                }
            }
        }
        None
    }

    /// Feedback from the orchestrator: the request through this proxy
    /// succeeded. Zeroes consecutive failures and clears cooldown.
    pub fn mark_success(&mut self, proxy: &ProxyConfig) {
        if let Some(provider) = self.provider_mut(&proxy.provider) {
            provider.health.successes += 1;
            provider.health.consecutive_failures = 0;
            provider.health.cooldown_until = None;
        }
    }

    /// Feedback from the orchestrator: the request through this proxy
    /// failed.
    pub fn mark_failed(&mut self, proxy: &ProxyConfig) {
        self.mark_failed_at(proxy, Utc::now())
    }

    pub fn mark_failed_at(&mut self, proxy: &ProxyConfig, now: DateTime<Utc>) {
        let Some(idx) = self.providers.iter().position(|p| p.name == proxy.provider) else {
            return;
        };
        self.note_internal_failure(idx, now);
    }

    fn note_internal_failure(&mut self, idx: usize, now: DateTime<Utc>) {
        let provider = &mut self.providers[idx];
        provider.health.failures += 1;
        provider.health.consecutive_failures += 1;
        if provider.health.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            provider.health.cooldown_until =
                Some(now + Duration::minutes(PROVIDER_COOLDOWN_MINUTES));
            warn!(
                "Proxy provider '{}' cooling down after {} consecutive failures",
                provider.name, provider.health.consecutive_failures
            );
        }
    }

    fn provider_mut(&mut self, name: &str) -> Option<&mut Provider> {
        self.providers.iter_mut().find(|p| p.name == name)
    }

    #[cfg(test)]
    fn consecutive_failures(&self, name: &str) -> u32 {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.health.consecutive_failures)
            .unwrap_or(0)
    }
}

fn cooling(health: &ProviderHealth, now: DateTime<Utc>) -> bool {
    health.cooldown_until.map(|u| now < u).unwrap_or(false)
}

/// Parse the `PROXY_LIST` format: comma-separated `server|user|pass`
/// entries; user and pass may be omitted for open proxies.
pub fn parse_proxy_list(raw: &str) -> Vec<ProxyConfig> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut parts = entry.split('|');
            let server = parts.next()?.trim();
            if server.is_empty() {
                return None;
            }
            Some(ProxyConfig {
                provider: "static".to_string(),
                server: server.to_string(),
                username: parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                password: parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_provider_manager() -> ProxyManager {
        ProxyManager::with_providers(
            vec![
                (
                    "dataimpulse",
                    ProviderKind::DataImpulse {
                        username: "u1".into(),
                        password: "p1".into(),
                    },
                ),
                (
                    "oxylabs",
                    ProviderKind::Oxylabs {
                        username: "u2".into(),
                        password: "p2".into(),
                    },
                ),
            ],
            "gb",
        )
    }

    #[test]
    fn test_priority_order_prefers_first_provider() {
        let mut mgr = two_provider_manager();
        let proxy = mgr.get_proxy().unwrap();
        assert_eq!(proxy.provider, "dataimpulse");
    }

    #[test]
    fn test_session_ids_rotate_between_calls() {
        let mut mgr = two_provider_manager();
        let a = mgr.get_proxy().unwrap().username.unwrap();
        let b = mgr.get_proxy().unwrap().username.unwrap();
        // Both carry the country pin; session suffix differs almost surely.
        assert!(a.contains("__cr.gb__"));
        assert!(b.contains("__cr.gb__"));
    }

    #[test]
    fn test_three_failures_cool_provider_until_window_elapses() {
        let mut mgr = two_provider_manager();
        let t0 = Utc::now();
        let proxy = mgr.get_proxy_at(t0).unwrap();
        for _ in 0..3 {
            mgr.mark_failed_at(&proxy, t0);
        }

        // Next selection skips the cooling provider
        let next = mgr.get_proxy_at(t0 + Duration::minutes(1)).unwrap();
        assert_eq!(next.provider, "oxylabs");

        // After the 5-minute window the first provider is preferred again
        let later = mgr.get_proxy_at(t0 + Duration::minutes(6)).unwrap();
        assert_eq!(later.provider, "dataimpulse");
    }

    #[test]
    fn test_mark_success_clears_consecutive_failures() {
        let mut mgr = two_provider_manager();
        let proxy = mgr.get_proxy().unwrap();
        mgr.mark_failed(&proxy);
        mgr.mark_failed(&proxy);
        assert_eq!(mgr.consecutive_failures("dataimpulse"), 2);

        mgr.mark_success(&proxy);
        assert_eq!(mgr.consecutive_failures("dataimpulse"), 0);
    }

    #[test]
    fn test_all_cooling_falls_back_to_earliest_expiring() {
        let mut mgr = two_provider_manager();
        let t0 = Utc::now();

        let first = mgr.get_proxy_at(t0).unwrap();
        for _ in 0..3 {
            mgr.mark_failed_at(&first, t0);
        }
        let second = mgr.get_proxy_at(t0).unwrap();
        for _ in 0..3 {
            mgr.mark_failed_at(&second, t0 + Duration::minutes(1));
        }

        // Everything cooling: the earliest-expiring (dataimpulse) is cleared
        let fallback = mgr.get_proxy_at(t0 + Duration::minutes(2)).unwrap();
        assert_eq!(fallback.provider, "dataimpulse");
    }

    #[test]
    fn test_empty_manager_returns_none() {
        let mut mgr = ProxyManager::with_providers(vec![], "gb");
        assert!(mgr.get_proxy().is_none());
        assert!(!mgr.has_providers());
    }

    #[test]
    fn test_parse_proxy_list_entries() {
        let proxies = parse_proxy_list(
            "http://1.2.3.4:8080|alice|secret, http://5.6.7.8:3128 , ,http://9.9.9.9:80|bob",
        );
        assert_eq!(proxies.len(), 3);
        assert_eq!(proxies[0].server, "http://1.2.3.4:8080");
        assert_eq!(proxies[0].username.as_deref(), Some("alice"));
        assert_eq!(proxies[0].password.as_deref(), Some("secret"));
        assert_eq!(proxies[1].username, None);
        assert_eq!(proxies[2].username.as_deref(), Some("bob"));
        assert_eq!(proxies[2].password, None);
    }

    #[test]
    fn test_scraperapi_quota_exhaustion_falls_through() {
        let mut mgr = ProxyManager::with_providers(
            vec![
                (
                    "scraperapi",
                    ProviderKind::ScraperApi {
                        api_key: "key".into(),
                        monthly_limit: 1,
                    },
                ),
                (
                    "brightdata",
                    ProviderKind::BrightData {
                        username: "u".into(),
                        password: "p".into(),
                    },
                ),
            ],
            "gb",
        );

        assert_eq!(mgr.get_proxy().unwrap().provider, "scraperapi");
        // Quota spent: selection falls through to the next tier
        assert_eq!(mgr.get_proxy().unwrap().provider, "brightdata");
    }
}

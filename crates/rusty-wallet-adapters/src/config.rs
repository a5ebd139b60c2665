use rusty_wallet_core::chains::{self, ChainEnum};
use rusty_wallet_core::ControllerSettings;

pub const ENV_CACHE_TTL_MS: &str = "RUSTY_WALLET_CACHE_TTL_MS";
pub const ENV_MAX_GAS_PRICE_MULTIPLIER: &str = "RUSTY_WALLET_MAX_GAS_PRICE_MULTIPLIER";
pub const ENV_DEFAULT_CHAIN: &str = "RUSTY_WALLET_DEFAULT_CHAIN";
pub const ENV_RELAY_URL: &str = "RUSTY_WALLET_RELAY_URL";
pub const ENV_RELAY_CHAIN: &str = "RUSTY_WALLET_RELAY_CHAIN";
pub const ENV_RELAY_TIMEOUT_MS: &str = "RUSTY_WALLET_RELAY_TIMEOUT_MS";
pub const ENV_INTERNAL_ORIGINS: &str = "RUSTY_WALLET_INTERNAL_ORIGINS";
pub const ENV_PROFILE: &str = "RUSTY_WALLET_PROFILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProfile {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub profile: RuntimeProfile,
    pub cache_ttl_ms: u64,
    pub max_gas_price_multiplier: u128,
    pub default_chain: ChainEnum,
    pub relay_url: Option<String>,
    /// Chain served by `relay_url`; the default chain when unset.
    pub relay_chain: Option<ChainEnum>,
    pub relay_timeout_ms: u64,
    pub internal_origins: Vec<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let settings = ControllerSettings::default();
        Self {
            profile: RuntimeProfile::Development,
            cache_ttl_ms: settings.cache_ttl_ms,
            max_gas_price_multiplier: settings.max_gas_price_multiplier,
            default_chain: settings.default_chain,
            relay_url: None,
            relay_chain: None,
            relay_timeout_ms: 15_000,
            internal_origins: vec!["rusty-wallet://internal".to_owned()],
        }
    }
}

impl WalletConfig {
    /// Defaults overridden by `RUSTY_WALLET_*` variables. Unparseable values
    /// keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(profile) = lookup(ENV_PROFILE) {
            if profile.eq_ignore_ascii_case("production") {
                cfg.profile = RuntimeProfile::Production;
            }
        }
        if let Some(ttl) = parse_var(&lookup, ENV_CACHE_TTL_MS) {
            cfg.cache_ttl_ms = ttl;
        }
        if let Some(multiplier) = parse_var(&lookup, ENV_MAX_GAS_PRICE_MULTIPLIER) {
            cfg.max_gas_price_multiplier = multiplier;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_CHAIN) {
            match parse_chain(&raw) {
                Some(chain) => cfg.default_chain = chain,
                None => tracing::warn!(value = %raw, "ignoring unknown {ENV_DEFAULT_CHAIN}"),
            }
        }
        if let Some(url) = lookup(ENV_RELAY_URL).filter(|u| !u.trim().is_empty()) {
            cfg.relay_url = Some(url.trim().trim_end_matches('/').to_owned());
        }
        if let Some(raw) = lookup(ENV_RELAY_CHAIN) {
            match parse_chain(&raw) {
                Some(chain) => cfg.relay_chain = Some(chain),
                None => tracing::warn!(value = %raw, "ignoring unknown {ENV_RELAY_CHAIN}"),
            }
        }
        if let Some(timeout) = parse_var(&lookup, ENV_RELAY_TIMEOUT_MS) {
            cfg.relay_timeout_ms = timeout;
        }
        if let Some(origins) = lookup(ENV_INTERNAL_ORIGINS) {
            cfg.internal_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_owned)
                .collect();
        }
        cfg
    }

    pub fn relay_chain_id(&self) -> u64 {
        self.relay_chain.unwrap_or(self.default_chain).info().id
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.profile == RuntimeProfile::Production
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            cache_ttl_ms: self.cache_ttl_ms,
            max_gas_price_multiplier: self.max_gas_price_multiplier,
            default_chain: self.default_chain,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(value = %raw, "ignoring unparseable {key}");
            None
        }
    }
}

/// Accepts a chain key (`ETH`), server id (`matic`), or numeric id.
fn parse_chain(raw: &str) -> Option<ChainEnum> {
    let raw = raw.trim();
    chains::CHAINS
        .iter()
        .find(|c| c.key.eq_ignore_ascii_case(raw))
        .or_else(|| chains::chain_by_server_id(raw))
        .or_else(|| chains::parse_chain_id(raw).and_then(chains::chain_by_id))
        .map(|c| c.chain)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply_and_bad_values_keep_defaults() {
        let cfg = WalletConfig::from_lookup(lookup(&[
            (ENV_CACHE_TTL_MS, "500"),
            (ENV_MAX_GAS_PRICE_MULTIPLIER, "many"),
            (ENV_DEFAULT_CHAIN, "matic"),
            (ENV_RELAY_URL, "http://127.0.0.1:8545/"),
            (ENV_INTERNAL_ORIGINS, "a://x, b://y,"),
            (ENV_PROFILE, "Production"),
        ]));
        assert_eq!(cfg.cache_ttl_ms, 500);
        assert_eq!(cfg.max_gas_price_multiplier, 10);
        assert_eq!(cfg.default_chain, ChainEnum::Polygon);
        assert_eq!(cfg.relay_url.as_deref(), Some("http://127.0.0.1:8545"));
        assert_eq!(cfg.internal_origins, vec!["a://x", "b://y"]);
        assert!(cfg.strict_runtime_required());

        let settings = cfg.controller_settings();
        assert_eq!(settings.cache_ttl_ms, 500);
        assert_eq!(settings.default_chain, ChainEnum::Polygon);
        assert_eq!(cfg.relay_chain_id(), 137);
    }

    #[test]
    fn relay_chain_overrides_the_default_chain() {
        let cfg = WalletConfig::from_lookup(lookup(&[(ENV_RELAY_CHAIN, "0x38")]));
        assert_eq!(cfg.relay_chain, Some(ChainEnum::Bsc));
        assert_eq!(cfg.relay_chain_id(), 56);
        assert_eq!(WalletConfig::default().relay_chain_id(), 1);
    }

    #[test]
    fn default_chain_accepts_key_and_numeric_id() {
        assert_eq!(parse_chain("base"), Some(ChainEnum::Base));
        assert_eq!(parse_chain("0xa4b1"), Some(ChainEnum::Arbitrum));
        assert_eq!(parse_chain("10"), Some(ChainEnum::Op));
        assert_eq!(parse_chain("nope"), None);
    }
}

use super::{Config, ConfigLayer, StoreBackend};

pub fn merge_layers(layers: impl IntoIterator<Item = Option<ConfigLayer>>) -> Config {
    let mut config = Config::default();
    for layer in layers.into_iter().flatten() {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply `VALOR_*` overrides read through `lookup`.
pub fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    if let Some(value) = parse_var(&get, "VALOR_SNAPSHOT_INTERVAL") {
        config.collab.snapshot_interval = value;
    }
    if let Some(prefix) = get("VALOR_CHANNEL_PREFIX") {
        config.collab.channel_prefix = prefix;
    }
    if let Some(prefix) = get("VALOR_SNAPSHOT_KEY_PREFIX") {
        config.collab.snapshot_key_prefix = prefix;
    }
    if let Some(value) = parse_var(&get, "VALOR_PRESENCE_TTL_MS") {
        config.collab.presence_ttl_ms = value;
    }
    if let Some(value) = parse_var(&get, "VALOR_MAX_ROOM_MEMBERS") {
        config.collab.max_room_members = value;
    }
    if let Some(value) = parse_var(&get, "VALOR_OPS_PER_MINUTE") {
        config.collab.ops_per_minute_limit = value;
    }
    if let Some(value) = parse_var(&get, "VALOR_STORE_TIMEOUT_MS") {
        config.collab.store_timeout_ms = value;
    }
    if let Some(raw) = get("VALOR_ALLOWED_TENANTS") {
        config.collab.tenant_allowlist_enabled = true;
        config.collab.allowed_tenants = raw
            .split(',')
            .map(str::trim)
            .filter(|tenant| !tenant.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(dir) = get("VALOR_STORE_DIR") {
        config.store.backend = StoreBackend::Fs;
        config.store.dir = Some(dir.into());
    }
    if get("VALOR_LOG_FILE").is_some() {
        config.logging.file.enabled = true;
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}

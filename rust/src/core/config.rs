use std::path::Path;
use std::sync::Arc;

use duet_storage_traits::RemoteStore;
use duet_supabase::{SupabaseConfig, SupabaseRemoteStore, DEFAULT_MESSAGES_TABLE};
use serde::Deserialize;

pub(crate) const CONFIG_FILE_NAME: &str = "duet_config.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) disable_network: Option<bool>,
    pub(crate) supabase_url: Option<String>,
    pub(crate) supabase_anon_key: Option<String>,
    pub(crate) access_token: Option<String>,
    pub(crate) messages_table: Option<String>,
}

pub(crate) fn load_app_config(data_dir: &Path) -> AppConfig {
    let path = data_dir.join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "invalid config, using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let v = serde_json::json!({
        "disable_network": false,
        "supabase_url": "",
        "supabase_anon_key": "",
        "messages_table": DEFAULT_MESSAGES_TABLE,
    });
    format!("{v:#}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    fn network_enabled_with(&self, env: &impl Fn(&str) -> Option<String>) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        env("DUET_DISABLE_NETWORK").as_deref() != Some("1")
    }

    /// Environment variables take precedence over file values.
    fn supabase_config_with(
        &self,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Option<SupabaseConfig> {
        if !self.network_enabled_with(env) {
            return None;
        }
        let url = non_empty(env("DUET_SUPABASE_URL"))
            .or_else(|| non_empty(self.supabase_url.clone()))?;
        let anon_key = non_empty(env("DUET_SUPABASE_ANON_KEY"))
            .or_else(|| non_empty(self.supabase_anon_key.clone()))?;
        let mut config = SupabaseConfig::new(url, anon_key);
        if let Some(token) =
            non_empty(env("DUET_ACCESS_TOKEN")).or_else(|| non_empty(self.access_token.clone()))
        {
            config = config.with_access_token(token);
        }
        if let Some(table) = non_empty(self.messages_table.clone()) {
            config = config.with_table(table);
        }
        Some(config)
    }

    /// The configured remote store, or `None` for a local-only app.
    pub(crate) fn remote_store(&self) -> Option<Arc<dyn RemoteStore>> {
        let config = self.supabase_config_with(&|key: &str| std::env::var(key).ok())?;
        match SupabaseRemoteStore::new(config) {
            Some(store) => Some(Arc::new(store)),
            None => {
                tracing::warn!("supabase config is not usable; running local-only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(json: &str) -> AppConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn missing_and_unknown_keys_are_tolerated() {
        let config = parse(r#"{"supabase_url":"https://x.supabase.co","future_key":1}"#);
        assert_eq!(config.supabase_url.as_deref(), Some("https://x.supabase.co"));
        assert!(config.disable_network.is_none());
    }

    #[test]
    fn file_values_build_supabase_config() {
        let config = parse(
            r#"{"supabase_url":"https://x.supabase.co","supabase_anon_key":"anon","access_token":"jwt","messages_table":"chat"}"#,
        );
        let supabase = config.supabase_config_with(&env_from(&[])).unwrap();
        assert_eq!(supabase.url, "https://x.supabase.co");
        assert_eq!(supabase.anon_key, "anon");
        assert_eq!(supabase.access_token.as_deref(), Some("jwt"));
        assert_eq!(supabase.table, "chat");
    }

    #[test]
    fn env_overrides_file() {
        let config = parse(r#"{"supabase_url":"https://file.supabase.co","supabase_anon_key":"file"}"#);
        let env = env_from(&[
            ("DUET_SUPABASE_URL", "https://env.supabase.co"),
            ("DUET_ACCESS_TOKEN", "env-jwt"),
        ]);
        let supabase = config.supabase_config_with(&env).unwrap();
        assert_eq!(supabase.url, "https://env.supabase.co");
        assert_eq!(supabase.anon_key, "file");
        assert_eq!(supabase.access_token.as_deref(), Some("env-jwt"));
        assert_eq!(supabase.table, DEFAULT_MESSAGES_TABLE);
    }

    #[test]
    fn missing_credentials_mean_local_only() {
        let config = parse(r#"{"supabase_url":"https://x.supabase.co","supabase_anon_key":"  "}"#);
        assert!(config.supabase_config_with(&env_from(&[])).is_none());
        assert!(AppConfig::default().supabase_config_with(&env_from(&[])).is_none());
    }

    #[test]
    fn disabling_network_wins() {
        let full = r#"{"supabase_url":"https://x.supabase.co","supabase_anon_key":"anon"}"#;
        let env = env_from(&[("DUET_DISABLE_NETWORK", "1")]);
        assert!(parse(full).supabase_config_with(&env).is_none());

        let explicit = parse(
            r#"{"disable_network":true,"supabase_url":"https://x.supabase.co","supabase_anon_key":"anon"}"#,
        );
        assert!(explicit.supabase_config_with(&env_from(&[])).is_none());

        // An explicit `false` in the file beats the environment.
        let enabled = parse(
            r#"{"disable_network":false,"supabase_url":"https://x.supabase.co","supabase_anon_key":"anon"}"#,
        );
        assert!(enabled.supabase_config_with(&env).is_some());
    }

    #[test]
    fn default_json_round_trips() {
        let config: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(config.disable_network, Some(false));
        assert!(config.supabase_config_with(&env_from(&[])).is_none());
    }

    #[test]
    fn unreadable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"{not json").unwrap();
        let config = load_app_config(dir.path());
        assert!(config.supabase_url.is_none());
        assert!(load_app_config(&dir.path().join("missing")).disable_network.is_none());
    }
}

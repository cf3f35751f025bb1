use std::path::Path;

use serde::Deserialize;

use crate::identity::DEFAULT_IDENTITY_CACHE_CAPACITY;
use crate::transport::EVENT_DIRECT_MESSAGE;

pub const CONFIG_FILE_NAME: &str = "chat_config.json";

const DEFAULT_INITIAL_PAGE_SIZE: u32 = 30;
const DEFAULT_OLDER_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Newest-first window fetched when a peer is selected.
    pub initial_page_size: u32,
    pub older_page_size: u32,
    pub identity_cache_capacity: usize,
    /// Push event carrying newly delivered direct messages.
    pub incoming_event: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            initial_page_size: DEFAULT_INITIAL_PAGE_SIZE,
            older_page_size: DEFAULT_OLDER_PAGE_SIZE,
            identity_cache_capacity: DEFAULT_IDENTITY_CACHE_CAPACITY,
            incoming_event: EVENT_DIRECT_MESSAGE.to_string(),
        }
    }
}

impl AppConfig {
    fn sanitized(mut self) -> Self {
        // Zero-sized pages would never advance the cursor.
        if self.initial_page_size == 0 {
            self.initial_page_size = DEFAULT_INITIAL_PAGE_SIZE;
        }
        if self.older_page_size == 0 {
            self.older_page_size = DEFAULT_OLDER_PAGE_SIZE;
        }
        if self.incoming_event.trim().is_empty() {
            self.incoming_event = EVENT_DIRECT_MESSAGE.to_string();
        }
        self
    }
}

/// Read `<data_dir>/chat_config.json`. Missing or malformed files give defaults.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let mut config = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    };
    if let Some(size) = std::env::var("SPHERE_CHAT_INITIAL_PAGE_SIZE")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
    {
        config.initial_page_size = size;
    }
    config.sanitized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.older_page_size, 20);
        assert_eq!(cfg.incoming_event, "message:dm");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            br#"{"older_page_size": 5, "incoming_event": ""}"#,
        )
        .unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.older_page_size, 5);
        assert_eq!(cfg.identity_cache_capacity, DEFAULT_IDENTITY_CACHE_CAPACITY);
        assert_eq!(cfg.incoming_event, "message:dm");
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"{not json").unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.older_page_size, AppConfig::default().older_page_size);
    }
}

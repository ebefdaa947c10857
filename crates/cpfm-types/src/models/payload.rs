//! Typed views of the `server_info` / `extra_details` payloads
//!
//! Every field is optional: senders of different ages report different
//! subsets, and a missing key is never an error.

use serde::{Deserialize, Serialize};

/// Host environment reported by a site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_software: Option<String>,
    pub mysql_version: Option<String>,
    pub php_version: Option<String>,
    pub wp_version: Option<String>,
    pub wp_debug: Option<String>,
    pub wp_memory_limit: Option<String>,
    pub wp_max_upload_size: Option<String>,
    pub wp_permalink_structure: Option<String>,
    pub wp_multisite: Option<String>,
    pub wp_language: Option<String>,
    pub wp_prefix: Option<String>,
    pub wp_theme: Option<ThemeInfo>,
}

/// Active theme of a site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub theme_uri: Option<String>,
}

/// One entry of the active plugin list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePlugin {
    pub name: Option<String>,
    pub version: Option<String>,
    pub plugin_uri: Option<String>,
}

/// Same shape as [`ServerInfo`] plus the active plugin list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDetails {
    pub server: ServerInfo,
    pub active_plugins: Vec<ActivePlugin>,
}

impl ServerInfo {
    /// Theme name, if reported and non-empty
    pub fn theme_name(&self) -> Option<&str> {
        self.wp_theme
            .as_ref()
            .and_then(|t| t.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

impl ExtraDetails {
    /// Names of active plugins, skipping entries without a name
    pub fn active_plugin_names(&self) -> impl Iterator<Item = &str> {
        self.active_plugins
            .iter()
            .filter_map(|p| p.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_name_skips_blank() {
        let info = ServerInfo {
            wp_theme: Some(ThemeInfo {
                name: Some("  ".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(info.theme_name(), None);
    }

    #[test]
    fn test_active_plugin_names_filters_missing() {
        let details = ExtraDetails {
            server: ServerInfo::default(),
            active_plugins: vec![
                ActivePlugin {
                    name: Some("Elementor".into()),
                    ..Default::default()
                },
                ActivePlugin::default(),
                ActivePlugin {
                    name: Some(String::new()),
                    ..Default::default()
                },
            ],
        };
        let names: Vec<_> = details.active_plugin_names().collect();
        assert_eq!(names, vec!["Elementor"]);
    }
}

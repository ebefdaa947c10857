//! Lenient decoding of the `server_info` / `extra_details` blobs
//!
//! Decoding never fails: a blob that cannot be read is reported as
//! [`PayloadStatus::Malformed`] and behaves like an empty map, so one bad
//! row never aborts a scan.

use super::php_serialize;
use cpfm_types::{ActivePlugin, ExtraDetails, ServerInfo, ThemeInfo};
use serde_json::{Map, Value};

/// Decoded blob before typed projection
pub type PayloadMap = Map<String, Value>;

/// How a blob was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStatus {
    /// NULL or blank column
    Empty,
    Json,
    PhpSerialized,
    /// Unreadable; treated as empty
    Malformed,
}

impl PayloadStatus {
    pub fn is_malformed(&self) -> bool {
        matches!(self, PayloadStatus::Malformed)
    }
}

/// Decode a raw column into a key/value map
pub fn decode_payload(raw: Option<&str>) -> (PayloadMap, PayloadStatus) {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return (PayloadMap::new(), PayloadStatus::Empty);
    };

    match decode_text(text, 0) {
        Some((Value::Object(map), status)) => (map, status),
        // A bare list or scalar at the top level carries no named fields
        Some((Value::Array(items), status)) if items.is_empty() => (PayloadMap::new(), status),
        Some((Value::Null, status)) => (PayloadMap::new(), status),
        _ => (PayloadMap::new(), PayloadStatus::Malformed),
    }
}

fn decode_text(text: &str, depth: u8) -> Option<(Value, PayloadStatus)> {
    let (value, status) = if text.starts_with('{') || text.starts_with('[') {
        let value = serde_json::from_str::<Value>(text)
            .ok()
            .or_else(|| serde_json::from_str::<Value>(&strip_slashes(text)).ok())?;
        (value, PayloadStatus::Json)
    } else if php_serialize::looks_serialized(text) {
        let value = php_serialize::unserialize(text)
            .ok()
            .or_else(|| php_serialize::unserialize(&strip_slashes(text)).ok())?;
        (value, PayloadStatus::PhpSerialized)
    } else {
        return None;
    };

    // Some senders encoded twice; unwrap one level
    match value {
        Value::String(inner) if depth == 0 => decode_text(inner.trim(), depth + 1),
        other => Some((other, status)),
    }
}

/// Undo `addslashes()` applied by older write paths
fn strip_slashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Project a decoded map onto [`ServerInfo`]
pub fn server_info_from_map(map: &PayloadMap) -> ServerInfo {
    ServerInfo {
        server_software: text(map.get("server_software")),
        mysql_version: text(map.get("mysql_version")),
        php_version: text(map.get("php_version")),
        wp_version: text(map.get("wp_version")),
        wp_debug: text(map.get("wp_debug")),
        wp_memory_limit: text(map.get("wp_memory_limit")),
        wp_max_upload_size: text(map.get("wp_max_upload_size")),
        wp_permalink_structure: text(map.get("wp_permalink_structure")),
        wp_multisite: text(map.get("wp_multisite")),
        wp_language: text(map.get("wp_language")),
        wp_prefix: text(map.get("wp_prefix")),
        wp_theme: map.get("wp_theme").and_then(theme),
    }
}

/// Project a decoded map onto [`ExtraDetails`]
pub fn extra_details_from_map(map: &PayloadMap) -> ExtraDetails {
    let active_plugins = map
        .get("active_plugins")
        .map(|v| items(v).filter_map(active_plugin).collect())
        .unwrap_or_default();

    ExtraDetails {
        server: server_info_from_map(map),
        active_plugins,
    }
}

/// Decode and project a `server_info` column
pub fn decode_server_info(raw: Option<&str>) -> (ServerInfo, PayloadStatus) {
    let (map, status) = decode_payload(raw);
    (server_info_from_map(&map), status)
}

/// Decode and project an `extra_details` column
pub fn decode_extra_details(raw: Option<&str>) -> (ExtraDetails, PayloadStatus) {
    let (map, status) = decode_payload(raw);
    (extra_details_from_map(&map), status)
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

/// Elements of a list, or values of a PHP array with non-sequential keys
fn items(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(list) => Box::new(list.iter()),
        Value::Object(map) => Box::new(map.values()),
        _ => Box::new(std::iter::empty()),
    }
}

fn theme(value: &Value) -> Option<ThemeInfo> {
    match value {
        Value::Object(map) => Some(ThemeInfo {
            name: text(map.get("name")),
            version: text(map.get("version")),
            theme_uri: text(map.get("theme_uri")),
        }),
        Value::String(_) => Some(ThemeInfo {
            name: text(Some(value)),
            ..Default::default()
        }),
        _ => None,
    }
}

fn active_plugin(value: &Value) -> Option<ActivePlugin> {
    match value {
        Value::Object(map) => Some(ActivePlugin {
            name: text(map.get("name")),
            version: text(map.get("version")),
            plugin_uri: text(map.get("plugin_uri")),
        }),
        Value::String(_) => Some(ActivePlugin {
            name: text(Some(value)),
            ..Default::default()
        }),
        _ => None,
    }
}

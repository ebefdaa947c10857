//! Activation status of a site and per-plugin status tallies

use serde::{Deserialize, Serialize};

/// Whether a site still runs the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Activated,
    Deactivated,
}

/// Accumulated classification outcomes for one plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatusCounts {
    pub activated: u64,
    pub deactivated: u64,
    pub total: u64,
}

impl PluginStatusCounts {
    /// Count one classified site
    pub fn record(&mut self, status: ActivationStatus) {
        match status {
            ActivationStatus::Activated => self.activated += 1,
            ActivationStatus::Deactivated => self.deactivated += 1,
        }
        self.total += 1;
    }

    /// Share of activated sites in percent, rounded to one decimal
    pub fn activation_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let rate = self.activated as f64 / self.total as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

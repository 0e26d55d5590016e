//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot username (without @) used to build deep links.
    pub bot_username: String,
    /// Forwarding inactivity required before a batch is processed.
    pub batch_quiet_period: Duration,
    /// Window within which a batch may be merged into an existing lead.
    pub same_lead_window: Duration,
    /// Leads per page in the /leads list.
    pub leads_per_page: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_username: "savefornow_bot".to_string(),
            batch_quiet_period: Duration::from_secs(1),
            same_lead_window: Duration::from_secs(30 * 60),
            leads_per_page: 15,
        }
    }
}

impl BotConfig {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bot_username = std::env::var("LEAD_ASSIST_BOT_USERNAME")
            .unwrap_or(defaults.bot_username);

        let batch_quiet_period = match std::env::var("LEAD_ASSIST_QUIET_PERIOD_MS") {
            Ok(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "LEAD_ASSIST_QUIET_PERIOD_MS".into(),
                    message: format!("expected milliseconds, got {raw:?}"),
                }
            })?),
            Err(_) => defaults.batch_quiet_period,
        };

        let same_lead_window = match std::env::var("LEAD_ASSIST_SAME_LEAD_WINDOW_MIN") {
            Ok(raw) => Duration::from_secs(
                raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "LEAD_ASSIST_SAME_LEAD_WINDOW_MIN".into(),
                    message: format!("expected minutes, got {raw:?}"),
                })? * 60,
            ),
            Err(_) => defaults.same_lead_window,
        };

        Ok(Self {
            bot_username,
            batch_quiet_period,
            same_lead_window,
            leads_per_page: defaults.leads_per_page,
        })
    }

    /// Same-lead window in whole minutes (as the store query expects).
    pub fn same_lead_window_minutes(&self) -> i64 {
        (self.same_lead_window.as_secs() / 60) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_product_settings() {
        let config = BotConfig::default();
        assert_eq!(config.batch_quiet_period, Duration::from_secs(1));
        assert_eq!(config.same_lead_window_minutes(), 30);
        assert_eq!(config.leads_per_page, 15);
    }
}

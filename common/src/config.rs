use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub long_press_ms: u64,
    pub cooldown_ms: u64,
    pub error_overlay_ms: u64,
    pub display_refresh_ms: u64,
    pub tick_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            long_press_ms: 2_000,
            cooldown_ms: 5_000,
            error_overlay_ms: 3_000,
            display_refresh_ms: 60_000,
            tick_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Accept any server certificate.
    Insecure,
    /// Verify the server chain against the platform's trusted roots.
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub token: String,
    pub secret: String,
    pub device_id: String,
    pub tls: TlsMode,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "api.switch-bot.com".to_string(),
            token: String::new(),
            secret: String::new(),
            device_id: String::new(),
            tls: TlsMode::Insecure,
            timeout_ms: 15_000,
        }
    }
}

impl ApiConfig {
    pub fn commands_url(&self) -> String {
        format!(
            "https://{}/v1.1/devices/{}/commands",
            self.host.trim_end_matches('/'),
            self.device_id
        )
    }

    pub fn has_credentials(&self) -> bool {
        !self.token.is_empty() && !self.secret.is_empty() && !self.device_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub utc_offset_hours: i32,
    pub timezone_label: String,
    pub brightness_pct: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            timezone_label: "JST".to_string(),
            brightness_pct: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ButtonConfig {
    pub unlock_pin: i32,
    pub lock_pin: i32,
    pub active_low: bool,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            unlock_pin: 37,
            lock_pin: 39,
            active_low: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSyncConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenerConfig {
    pub timing: TimingConfig,
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub display: DisplayConfig,
    #[serde(default)]
    pub buttons: ButtonConfig,
    #[serde(default)]
    pub time_sync: TimeSyncConfig,
}

impl OpenerConfig {
    pub fn sanitize(&mut self) {
        self.timing.sanitize();
        self.display.sanitize();

        if self.api.timeout_ms == 0 {
            self.api.timeout_ms = ApiConfig::default().timeout_ms;
        }
        if self.time_sync.attempts == 0 {
            self.time_sync.attempts = 1;
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        self.long_press_ms = self.long_press_ms.max(1);
        self.tick_ms = self.tick_ms.clamp(1, 100);
        self.display_refresh_ms = self.display_refresh_ms.max(1_000);
    }
}

impl DisplayConfig {
    pub fn sanitize(&mut self) {
        self.utc_offset_hours = self.utc_offset_hours.clamp(-12, 14);
        self.brightness_pct = self.brightness_pct.min(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_commands_url_from_host_and_device() {
        let api = ApiConfig {
            host: "api.switch-bot.com/".to_string(),
            device_id: "C0FFEE".to_string(),
            ..ApiConfig::default()
        };

        assert_eq!(
            api.commands_url(),
            "https://api.switch-bot.com/v1.1/devices/C0FFEE/commands"
        );
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut config = OpenerConfig::default();
        config.timing.long_press_ms = 0;
        config.timing.tick_ms = 0;
        config.display.utc_offset_hours = 40;
        config.display.brightness_pct = 250;
        config.api.timeout_ms = 0;

        config.sanitize();

        assert_eq!(config.timing.long_press_ms, 1);
        assert_eq!(config.timing.tick_ms, 1);
        assert_eq!(config.display.utc_offset_hours, 14);
        assert_eq!(config.display.brightness_pct, 100);
        assert_eq!(config.api.timeout_ms, 15_000);
    }

    #[test]
    fn defaults_match_handheld_behavior() {
        let config = OpenerConfig::default();

        assert_eq!(config.timing.long_press_ms, 2_000);
        assert_eq!(config.timing.cooldown_ms, 5_000);
        assert_eq!(config.api.tls, TlsMode::Insecure);
        assert!(config.buttons.active_low);
        assert!(!config.api.has_credentials());
    }
}

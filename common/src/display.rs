use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::clock::is_time_synced;

pub const LABEL_LOCKED: &str = "* Locked *";
pub const LABEL_UNLOCKED: &str = "* Unlocked *";
pub const ERROR_OVERLAY_TEXT: &str = "API ERROR";
pub const TIME_PLACEHOLDER: &str = "--:--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Red,
    Yellow,
    White,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDisplayState {
    pub label: &'static str,
    pub color: StatusColor,
    pub error_until_ms: Option<u64>,
}

impl Default for LockDisplayState {
    fn default() -> Self {
        Self::locked()
    }
}

impl LockDisplayState {
    pub fn locked() -> Self {
        Self {
            label: LABEL_LOCKED,
            color: StatusColor::Green,
            error_until_ms: None,
        }
    }

    pub fn set_locked(&mut self) {
        self.label = LABEL_LOCKED;
        self.color = StatusColor::Green;
    }

    pub fn set_unlocked(&mut self) {
        self.label = LABEL_UNLOCKED;
        self.color = StatusColor::Red;
    }

    pub fn show_error(&mut self, now_ms: u64, duration_ms: u64) {
        self.error_until_ms = Some(now_ms.saturating_add(duration_ms));
    }

    pub fn error_active(&self, now_ms: u64) -> bool {
        self.error_until_ms.is_some_and(|until| now_ms < until)
    }
}

/// Everything drawn in one screen refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusFrame {
    pub label: &'static str,
    pub color: StatusColor,
    #[serde(rename = "batteryText")]
    pub battery_text: String,
    #[serde(rename = "timeText")]
    pub time_text: String,
    #[serde(rename = "errorOverlay")]
    pub error_overlay: bool,
}

impl StatusFrame {
    pub fn build(
        state: &LockDisplayState,
        battery_volts: Option<f32>,
        time_text: String,
        now_ms: u64,
    ) -> Self {
        Self {
            label: state.label,
            color: state.color,
            battery_text: format_battery(battery_volts),
            time_text,
            error_overlay: state.error_active(now_ms),
        }
    }
}

/// Limits passive redraws to one per interval; forced redraws always pass.
#[derive(Debug, Clone)]
pub struct RedrawThrottle {
    interval_ms: u64,
    last_redraw_ms: Option<u64>,
    forced: bool,
    wake_at_ms: Option<u64>,
}

impl RedrawThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_redraw_ms: None,
            forced: false,
            wake_at_ms: None,
        }
    }

    pub fn force(&mut self) {
        self.forced = true;
    }

    /// Requests one extra redraw at `at_ms`, e.g. when an overlay expires.
    pub fn schedule(&mut self, at_ms: u64) {
        self.wake_at_ms = Some(match self.wake_at_ms {
            Some(existing) => existing.min(at_ms),
            None => at_ms,
        });
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.forced
            || self.wake_at_ms.is_some_and(|at| now_ms >= at)
            || match self.last_redraw_ms {
                Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
                None => true,
            }
    }

    /// Returns whether a redraw should happen now and, if so, records it.
    pub fn take(&mut self, now_ms: u64) -> bool {
        if !self.is_due(now_ms) {
            return false;
        }
        self.forced = false;
        if self.wake_at_ms.is_some_and(|at| now_ms >= at) {
            self.wake_at_ms = None;
        }
        self.last_redraw_ms = Some(now_ms);
        true
    }
}

pub fn format_local_time(epoch_secs: i64, utc_offset_hours: i32) -> String {
    if !is_time_synced(epoch_secs) {
        return TIME_PLACEHOLDER.to_string();
    }

    let Some(offset) = FixedOffset::east_opt(utc_offset_hours * 3600) else {
        return TIME_PLACEHOLDER.to_string();
    };
    let Some(utc) = DateTime::<Utc>::from_timestamp(epoch_secs, 0) else {
        return TIME_PLACEHOLDER.to_string();
    };

    utc.with_timezone(&offset).format("%H:%M").to_string()
}

pub fn format_time_line(timezone_label: &str, epoch_secs: i64, utc_offset_hours: i32) -> String {
    format!(
        "{} {}",
        timezone_label,
        format_local_time(epoch_secs, utc_offset_hours)
    )
}

pub fn format_battery(volts: Option<f32>) -> String {
    match volts {
        Some(v) => format!("Battery: {v:.2}v"),
        None => "Battery: --".to_string(),
    }
}

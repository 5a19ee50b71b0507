//! Filtered voltage with dwell-based hysteresis.
//!
//! ```text
//!   mV
//!    │  clear band (≥ low + margin): high dwell runs
//!    ├──────────────────────────────  low + margin
//!    │  dead band: both dwells reset
//!    ├──────────────────────────────  low
//!    │  low band (≤ low): low dwell runs
//! ```
//!
//! The warning flag flips on only after the low dwell has held for
//! `low_debounce_ms`, and off only after the high dwell has held for
//! `clear_debounce_ms`.

use log::{debug, info};

use crate::config::BatteryConfig;
use crate::timer::Millis;

#[derive(Debug, Clone, Default)]
pub struct BatteryTrend {
    filtered_mv: Option<f32>,
    low_since: Option<Millis>,
    high_since: Option<Millis>,
    last_sample_at: Option<Millis>,
    warning: bool,
}

impl BatteryTrend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw voltage sample into the filter and dwell timers.
    /// Returns the warning flag after the update.
    pub fn update(&mut self, voltage_mv: u16, now: Millis, config: &BatteryConfig) -> bool {
        if voltage_mv == 0 {
            // No reading; the filter and dwell timers stay as they were.
            return self.warning;
        }
        if let Some(last) = self.last_sample_at {
            if now.saturating_sub(last) > config.max_sample_gap_ms && self.dwelling() {
                debug!("battery: {} ms sample gap, restarting dwell", now - last);
                self.low_since = None;
                self.high_since = None;
            }
        }
        self.last_sample_at = Some(now);

        let raw = f32::from(voltage_mv);
        let filtered = match self.filtered_mv {
            None => raw,
            Some(prev) => prev + config.filter_alpha * (raw - prev),
        };
        self.filtered_mv = Some(filtered);

        let low = f32::from(config.low_voltage_mv);
        let clear = low + f32::from(config.clear_margin_mv);

        if filtered <= low {
            self.high_since = None;
            let since = *self.low_since.get_or_insert(now);
            if !self.warning && now - since >= config.low_debounce_ms {
                self.warning = true;
                info!("battery: low warning raised at {:.0} mV", filtered);
            }
        } else if filtered >= clear {
            self.low_since = None;
            let since = *self.high_since.get_or_insert(now);
            if self.warning && now - since >= config.clear_debounce_ms {
                self.warning = false;
                info!("battery: low warning cleared at {:.0} mV", filtered);
            }
        } else {
            self.low_since = None;
            self.high_since = None;
        }

        self.warning
    }

    pub fn warning(&self) -> bool {
        self.warning
    }

    /// Drop the warning after a charge-based recovery.
    pub fn clear_warning(&mut self) {
        self.warning = false;
        self.low_since = None;
        self.high_since = None;
    }

    pub fn filtered_mv(&self) -> Option<f32> {
        self.filtered_mv
    }

    /// Charge estimate from the filtered voltage, 0–100.
    pub fn percentage(&self, config: &BatteryConfig) -> u8 {
        let Some(v) = self.filtered_mv else {
            return 0;
        };
        let empty = f32::from(config.empty_voltage_mv);
        let full = f32::from(config.full_voltage_mv);
        let fraction = (v.clamp(empty, full) - empty) / (full - empty);
        (fraction * 100.0).round() as u8
    }

    fn dwelling(&self) -> bool {
        self.low_since.is_some() || self.high_since.is_some()
    }
}

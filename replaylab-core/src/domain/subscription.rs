//! Data subscriptions: the feeds a strategy consumes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar timeframe of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Bar length in milliseconds.
    pub fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Timeframe::M1 => MINUTE,
            Timeframe::M5 => 5 * MINUTE,
            Timeframe::M15 => 15 * MINUTE,
            Timeframe::H1 => 60 * MINUTE,
            Timeframe::H4 => 240 * MINUTE,
            Timeframe::D1 => 1_440 * MINUTE,
        }
    }

    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| format!("unknown timeframe '{s}' (expected 1m, 5m, 15m, 1h, 4h or 1d)"))
    }
}

/// One asset/timeframe feed.
///
/// Declaration order in a strategy's subscription list is significant: it is
/// the delivery order for bars sharing a timestamp. `exportable` marks whether
/// this feed's bar-like events may reach persistent or public sinks in the
/// restrictive export modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSubscription {
    pub asset: String,
    pub timeframe: Timeframe,
    #[serde(default = "default_exportable")]
    pub exportable: bool,
}

fn default_exportable() -> bool {
    true
}

impl DataSubscription {
    pub fn new(asset: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            asset: asset.into(),
            timeframe,
            exportable: true,
        }
    }

    /// A feed used for context only (e.g. a higher timeframe); its bars are
    /// withheld from exporting sinks in Backtest/Optimization modes.
    pub fn context_only(asset: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            asset: asset.into(),
            timeframe,
            exportable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_durations() {
        assert_eq!(Timeframe::M1.duration_ms(), 60_000);
        assert_eq!(Timeframe::H1.duration_ms(), 3_600_000);
        assert_eq!(Timeframe::D1.duration_ms(), 86_400_000);
    }

    #[test]
    fn timeframe_parses_its_display_form() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>(), Ok(tf));
        }
        assert!("2m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn subscription_exportable_defaults_to_true() {
        let sub: DataSubscription =
            serde_json::from_str(r#"{"asset":"BTC","timeframe":"5m"}"#).unwrap();
        assert!(sub.exportable);
        assert_eq!(sub.timeframe, Timeframe::M5);
    }

    #[test]
    fn context_only_is_not_exportable() {
        assert!(!DataSubscription::context_only("BTC", Timeframe::H4).exportable);
    }
}

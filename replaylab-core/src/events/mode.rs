//! Export modes and the per-mode category allow-lists.

use serde::{Deserialize, Serialize};

/// Broad grouping of event types for mode filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Bar,
    Indicator,
    Signal,
    Risk,
    Order,
    Position,
    Run,
    Error,
    Warning,
}

impl EventCategory {
    /// Categories whose events are additionally filtered on their
    /// subscription's exportable flag.
    pub fn is_subscription_filtered(self) -> bool {
        matches!(self, EventCategory::Bar | EventCategory::Indicator)
    }
}

/// Which consumer the event stream is being produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Full stream: every category.
    #[default]
    Backtest,
    /// Trial runs of a parameter search: orders, positions, lifecycle, diagnostics.
    Optimization,
    /// Live inspection: Optimization's set plus signals and risk decisions.
    Live,
}

impl ExportMode {
    /// The allow-list lookup.
    pub fn admits(self, category: EventCategory) -> bool {
        use EventCategory::*;
        match self {
            ExportMode::Backtest => true,
            ExportMode::Optimization => matches!(
                category,
                Order | Position | Run | Error | Warning
            ),
            ExportMode::Live => matches!(
                category,
                Order | Position | Run | Error | Warning | Signal | Risk
            ),
        }
    }

    /// Whether non-exportable subscriptions are withheld in this mode.
    pub fn filters_non_exportable(self) -> bool {
        matches!(self, ExportMode::Backtest | ExportMode::Optimization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_admits_everything() {
        for cat in [
            EventCategory::Bar,
            EventCategory::Indicator,
            EventCategory::Signal,
            EventCategory::Risk,
            EventCategory::Order,
        ] {
            assert!(ExportMode::Backtest.admits(cat));
        }
    }

    #[test]
    fn optimization_drops_market_and_signal_categories() {
        let mode = ExportMode::Optimization;
        assert!(!mode.admits(EventCategory::Bar));
        assert!(!mode.admits(EventCategory::Signal));
        assert!(!mode.admits(EventCategory::Risk));
        assert!(!mode.admits(EventCategory::Indicator));
        assert!(mode.admits(EventCategory::Order));
        assert!(mode.admits(EventCategory::Warning));
    }

    #[test]
    fn live_adds_signal_and_risk() {
        let mode = ExportMode::Live;
        assert!(mode.admits(EventCategory::Signal));
        assert!(mode.admits(EventCategory::Risk));
        assert!(!mode.admits(EventCategory::Bar));
        assert!(!mode.admits(EventCategory::Indicator));
    }

    #[test]
    fn mode_deserializes_snake_case() {
        let mode: ExportMode = serde_json::from_str("\"optimization\"").unwrap();
        assert_eq!(mode, ExportMode::Optimization);
    }
}

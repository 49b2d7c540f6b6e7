use serde::{Deserialize, Serialize};

/// Engine state captured after a bar was fully processed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    /// Last sequence number the bus assigned (0 when no bus is attached).
    pub sequence_number: u64,
    pub timestamp_ms: i64,
    pub subscription_index: usize,
    pub is_exportable_subscription: bool,
    pub fills_this_bar: usize,
    pub portfolio_equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let snap = DebugSnapshot {
            sequence_number: 7,
            timestamp_ms: 60_000,
            subscription_index: 1,
            is_exportable_subscription: true,
            fills_this_bar: 2,
            portfolio_equity: 100_000.0,
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["sequenceNumber"], 7);
        assert_eq!(json["timestampMs"], 60_000);
        assert_eq!(json["subscriptionIndex"], 1);
        assert_eq!(json["isExportableSubscription"], true);
        assert_eq!(json["fillsThisBar"], 2);
        assert_eq!(json["portfolioEquity"], 100_000.0);
    }
}

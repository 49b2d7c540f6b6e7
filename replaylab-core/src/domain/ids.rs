use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned order identifier.
///
/// Orders carry `OrderId::UNASSIGNED` from construction until the engine
/// assigns ids at the end of the strategy hook phase that submitted them.
/// Identity and uniqueness hold only after assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl OrderId {
    pub const UNASSIGNED: OrderId = OrderId(0);

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

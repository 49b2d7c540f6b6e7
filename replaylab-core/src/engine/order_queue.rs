//! Order queue: live orders awaiting a fill, plus id assignment.
//!
//! Strategies enqueue orders with id 0. After each hook phase the engine calls
//! [`OrderQueue::assign_ids`], which numbers every unassigned order from a
//! monotonically increasing counter in submission order.

use crate::domain::{Order, OrderId, OrderStatus};

#[derive(Debug)]
pub struct OrderQueue {
    orders: Vec<Order>,
    next_id: u64,
}

impl Default for OrderQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderQueue {
    pub fn new() -> Self {
        Self {
            orders: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue an order and return the id it will be assigned at the end of the
    /// current hook phase.
    pub fn enqueue(&mut self, mut order: Order) -> OrderId {
        order.id = OrderId::UNASSIGNED;
        order.status = OrderStatus::Pending;
        let unassigned = self.orders.iter().filter(|o| !o.id.is_assigned()).count() as u64;
        self.orders.push(order);
        OrderId(self.next_id + unassigned)
    }

    /// Number every unassigned order and stamp its submission time if unset.
    /// Returns the newly assigned ids in submission order.
    pub fn assign_ids(&mut self, timestamp_ms: i64) -> Vec<OrderId> {
        let mut assigned = Vec::new();
        for order in self.orders.iter_mut().filter(|o| !o.id.is_assigned()) {
            order.id = OrderId(self.next_id);
            self.next_id += 1;
            order.submitted_at_ms.get_or_insert(timestamp_ms);
            assigned.push(order.id);
        }
        assigned
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id && id.is_assigned())
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id && id.is_assigned())
    }

    /// Cancel an active, assigned order. Returns the cancelled order.
    pub fn cancel(&mut self, id: OrderId) -> Option<&Order> {
        let order = self.get_mut(id).filter(|o| o.is_active())?;
        order.status = OrderStatus::Cancelled;
        Some(order)
    }

    /// Ids of active assigned orders for `asset`, in submission order.
    pub fn active_ids_for(&self, asset: &str) -> Vec<OrderId> {
        self.orders
            .iter()
            .filter(|o| o.asset == asset && o.id.is_assigned() && o.is_active())
            .map(|o| o.id)
            .collect()
    }

    /// Orders still waiting to fill, including ones queued this phase.
    pub fn pending(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.is_active())
    }

    /// Drop orders that reached a terminal status.
    pub fn prune(&mut self) {
        self.orders.retain(|o| !o.status.is_terminal());
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

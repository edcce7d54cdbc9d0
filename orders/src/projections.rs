//! Order projections.
//!
//! - [`OrderAggregate`]: every order with its items and status, plus an
//!   index of each account's open order.
//! - [`CostAggregate`]: running cost per order.
//!
//! Both reject an `OrderCreated` for an id they already hold
//! (`DuplicateAggregate`) and any event naming an order they have never seen
//! (`OrphanEvent`). `OrderAggregate` also rejects removals of items it has
//! never seen; `CostAggregate` keeps no item lines and cannot. Neither error
//! is skipped: the history is inconsistent and the caller has to know.
//!
//! [`fold_named`] folds either projection by name, for callers that pick
//! the view at runtime.

use crate::events::{
    ItemAddedToOrder, ItemRemovedFromOrder, OrderCheckedOut, OrderClosed, OrderCreated,
    OrderEvent,
};
use crate::types::{AccountId, ItemId, OrderId};
use foldstream_core::event::RecordedEvent;
use foldstream_core::projection::{Projection, ProjectionError, Result, fold};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

fn orphan(event: &OrderEvent, aggregate_id: impl fmt::Display) -> ProjectionError {
    ProjectionError::OrphanEvent {
        event_type: event.kind().to_string(),
        aggregate_id: aggregate_id.to_string(),
    }
}

fn duplicate(event: &OrderEvent, aggregate_id: &OrderId) -> ProjectionError {
    ProjectionError::DuplicateAggregate {
        event_type: event.kind().to_string(),
        aggregate_id: aggregate_id.to_string(),
    }
}

/// Lifecycle of an order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepting items.
    Open,
    /// Abandoned.
    Closed,
    /// Paid for.
    CheckedOut,
}

/// One item line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Line id, if the producer assigned one.
    pub item_id: Option<ItemId>,
    /// Display name.
    pub name: String,
    /// Cost in the smallest currency unit.
    pub cost: i64,
}

/// An order as folded from its events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Owning account.
    pub account_id: AccountId,
    /// Items in the order they were added.
    pub items: Vec<Item>,
    /// Current status.
    pub status: OrderStatus,
}

impl Order {
    /// Sum of item costs.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.items
            .iter()
            .fold(0_i64, |total, item| total.saturating_add(item.cost))
    }

    /// Find an item line by id.
    #[must_use]
    pub fn item(&self, item_id: &ItemId) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.item_id.as_ref() == Some(item_id))
    }
}

/// State of [`OrderAggregate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    /// Every order ever created.
    pub orders: BTreeMap<OrderId, Order>,
    /// The open order of each account that has one.
    pub open_orders: BTreeMap<AccountId, OrderId>,
}

impl OrderState {
    /// Look up an order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// The account's open order, if any.
    #[must_use]
    pub fn open_order(&self, account_id: &AccountId) -> Option<(&OrderId, &Order)> {
        let order_id = self.open_orders.get(account_id)?;
        self.orders.get(order_id).map(|order| (order_id, order))
    }

    fn finish(mut self, event: &OrderEvent, status: OrderStatus) -> Result<Self> {
        let order_id = event.order_id();
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| orphan(event, order_id))?;
        order.status = status;
        let account_id = order.account_id.clone();

        if self.open_orders.get(&account_id) == Some(order_id) {
            self.open_orders.remove(&account_id);
        }
        Ok(self)
    }
}

/// Projection of every order with its items.
#[derive(Copy, Clone, Debug, Default)]
pub struct OrderAggregate;

impl Projection for OrderAggregate {
    type Event = OrderEvent;
    type State = OrderState;

    fn name(&self) -> &'static str {
        ProjectionName::OrderAggregate.as_str()
    }

    fn initial_state(&self) -> OrderState {
        OrderState::default()
    }

    fn apply(&self, mut state: OrderState, event: &OrderEvent) -> Result<OrderState> {
        match event {
            OrderEvent::OrderCreated(OrderCreated {
                order_id,
                account_id,
            }) => {
                if state.orders.contains_key(order_id) {
                    return Err(duplicate(event, order_id));
                }
                state.orders.insert(
                    order_id.clone(),
                    Order {
                        account_id: account_id.clone(),
                        items: Vec::new(),
                        status: OrderStatus::Open,
                    },
                );
                // A second OrderCreated for the account supersedes its open order.
                let replaced = state
                    .open_orders
                    .insert(account_id.clone(), order_id.clone());
                if let Some(order) = replaced.and_then(|id| state.orders.get_mut(&id)) {
                    order.status = OrderStatus::Closed;
                }
                Ok(state)
            }
            OrderEvent::ItemAddedToOrder(ItemAddedToOrder {
                order_id,
                item_id,
                name,
                cost,
            }) => {
                let order = state
                    .orders
                    .get_mut(order_id)
                    .ok_or_else(|| orphan(event, order_id))?;
                order.items.push(Item {
                    item_id: item_id.clone(),
                    name: name.clone(),
                    cost: *cost,
                });
                Ok(state)
            }
            OrderEvent::ItemRemovedFromOrder(ItemRemovedFromOrder {
                order_id, item_id, ..
            }) => {
                let order = state
                    .orders
                    .get_mut(order_id)
                    .ok_or_else(|| orphan(event, order_id))?;
                let position = order
                    .items
                    .iter()
                    .position(|item| item.item_id.as_ref() == Some(item_id))
                    .ok_or_else(|| orphan(event, format!("{order_id}/{item_id}")))?;
                order.items.remove(position);
                Ok(state)
            }
            OrderEvent::OrderClosed(OrderClosed { .. }) => state.finish(event, OrderStatus::Closed),
            OrderEvent::OrderCheckedOut(OrderCheckedOut { .. }) => {
                state.finish(event, OrderStatus::CheckedOut)
            }
        }
    }
}

/// State of [`CostAggregate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostState {
    /// Running cost of each order.
    pub order_costs: BTreeMap<OrderId, i64>,
}

impl CostState {
    /// Cost of one order.
    #[must_use]
    pub fn cost(&self, order_id: &OrderId) -> Option<i64> {
        self.order_costs.get(order_id).copied()
    }
}

/// Projection of the running cost of every order.
///
/// Only order ids are checked. A removal subtracts the cost carried by the
/// `ItemRemovedFromOrder` payload without matching it to an added item, so a
/// removal `OrderAggregate` rejects as an orphan still folds here. Producers
/// only emit removals for items present in the open order with their
/// recorded cost.
#[derive(Copy, Clone, Debug, Default)]
pub struct CostAggregate;

impl Projection for CostAggregate {
    type Event = OrderEvent;
    type State = CostState;

    fn name(&self) -> &'static str {
        ProjectionName::CostAggregate.as_str()
    }

    fn initial_state(&self) -> CostState {
        CostState::default()
    }

    fn apply(&self, mut state: CostState, event: &OrderEvent) -> Result<CostState> {
        let order_id = event.order_id();
        if let OrderEvent::OrderCreated(_) = event {
            if state.order_costs.contains_key(order_id) {
                return Err(duplicate(event, order_id));
            }
            state.order_costs.insert(order_id.clone(), 0);
            return Ok(state);
        }

        let total = state
            .order_costs
            .get_mut(order_id)
            .ok_or_else(|| orphan(event, order_id))?;
        match event {
            OrderEvent::ItemAddedToOrder(e) => *total = total.saturating_add(e.cost),
            OrderEvent::ItemRemovedFromOrder(e) => *total = total.saturating_sub(e.cost),
            OrderEvent::OrderCreated(_)
            | OrderEvent::OrderClosed(_)
            | OrderEvent::OrderCheckedOut(_) => {}
        }
        Ok(state)
    }
}

/// A projection name that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown projection: {0}")]
pub struct UnknownProjection(pub String);

/// Projections that can be folded by name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionName {
    /// [`OrderAggregate`]
    OrderAggregate,
    /// [`CostAggregate`]
    CostAggregate,
}

impl ProjectionName {
    /// Name used in logs, metrics and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderAggregate => "order_aggregate",
            Self::CostAggregate => "cost_aggregate",
        }
    }
}

impl fmt::Display for ProjectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectionName {
    type Err = UnknownProjection;

    /// Accepts `order_aggregate` / `OrderAggregate` and the cost equivalents.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "order_aggregate" | "OrderAggregate" => Ok(Self::OrderAggregate),
            "cost_aggregate" | "CostAggregate" => Ok(Self::CostAggregate),
            other => Err(UnknownProjection(other.to_string())),
        }
    }
}

/// State of a projection chosen by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "projection", content = "state", rename_all = "snake_case")]
pub enum ProjectionState {
    /// [`OrderAggregate`] state.
    OrderAggregate(OrderState),
    /// [`CostAggregate`] state.
    CostAggregate(CostState),
}

impl ProjectionState {
    /// Which projection this state belongs to.
    #[must_use]
    pub const fn name(&self) -> ProjectionName {
        match self {
            Self::OrderAggregate(_) => ProjectionName::OrderAggregate,
            Self::CostAggregate(_) => ProjectionName::CostAggregate,
        }
    }
}

/// Fold `events` with the projection called `name`.
///
/// `seed` resumes from a previously folded state; `None` starts from the
/// projection's initial state.
///
/// # Errors
///
/// - [`ProjectionError::StateMismatch`] if `seed` belongs to another projection
/// - any error the projection raises while folding
pub fn fold_named(
    name: ProjectionName,
    seed: Option<ProjectionState>,
    events: &[RecordedEvent],
) -> Result<ProjectionState> {
    match (name, seed) {
        (ProjectionName::OrderAggregate, None) => {
            fold(&OrderAggregate, OrderState::default(), events)
                .map(ProjectionState::OrderAggregate)
        }
        (ProjectionName::OrderAggregate, Some(ProjectionState::OrderAggregate(state))) => {
            fold(&OrderAggregate, state, events).map(ProjectionState::OrderAggregate)
        }
        (ProjectionName::CostAggregate, None) => {
            fold(&CostAggregate, CostState::default(), events).map(ProjectionState::CostAggregate)
        }
        (ProjectionName::CostAggregate, Some(ProjectionState::CostAggregate(state))) => {
            fold(&CostAggregate, state, events).map(ProjectionState::CostAggregate)
        }
        (expected, Some(other)) => Err(ProjectionError::StateMismatch {
            expected: expected.to_string(),
            found: other.name().to_string(),
        }),
    }
}

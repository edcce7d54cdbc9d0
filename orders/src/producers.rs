//! Order producers.
//!
//! Every account has one stream, `account-{account_id}`, holding all of its
//! orders. Producers fold that stream with [`OrderAggregate`] and decide
//! against the account's open order:
//!
//! | producer          | command               | emits                    |
//! |-------------------|-----------------------|--------------------------|
//! | [`AddItem`]       | [`AddItemCommand`]    | `[ItemAddedToOrder]`     |
//! | [`RemoveItem`]    | [`RemoveItemCommand`] | `[ItemRemovedFromOrder]` |
//! | [`CheckoutOrder`] | [`AccountId`]         | `[OrderCheckedOut]`      |
//! | [`CloseOrder`]    | [`AccountId`]         | `[OrderClosed]`          |
//!
//! `AddItem` prepends `OrderCreated` when the account has no open order.
//!
//! Run them through [`ProducerRunner`], which appends under the version the
//! decision was made against and retries on conflict.

use crate::events::{
    ItemAddedToOrder, ItemRemovedFromOrder, OrderCheckedOut, OrderClosed, OrderCreated,
    OrderEvent, OrderEventKind,
};
use crate::projections::{Order, OrderAggregate, OrderState};
use crate::types::{AccountId, ItemId, OrderId};
use foldstream_core::environment::{IdGenerator, UuidGenerator};
use foldstream_core::event::{EventError, EventInput};
use foldstream_core::event_store::EventStore;
use foldstream_core::producer::{Producer, ProducerError};
use foldstream_core::stream::StreamId;
use foldstream_runtime::ProducerRunner;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stream holding every order of `account_id`.
#[must_use]
pub fn account_stream(account_id: &AccountId) -> StreamId {
    StreamId::new(format!("account-{account_id}"))
}

fn require_open_order<'s>(
    state: &'s OrderState,
    account_id: &AccountId,
) -> Result<(&'s OrderId, &'s Order), ProducerError> {
    state
        .open_order(account_id)
        .ok_or_else(|| ProducerError::Rejected(format!("account {account_id} has no open order")))
}

/// Add an item to an account's open order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemCommand {
    /// Account placing the item.
    pub account_id: AccountId,
    /// Item display name; must not be blank.
    pub name: String,
    /// Item cost; must not be negative.
    pub cost: i64,
}

impl AddItemCommand {
    /// Build a command.
    #[must_use]
    pub fn new(account_id: impl Into<AccountId>, name: impl Into<String>, cost: i64) -> Self {
        Self {
            account_id: account_id.into(),
            name: name.into(),
            cost,
        }
    }

    fn validate(&self) -> Result<(), EventError> {
        let kind = OrderEventKind::ItemAddedToOrder.as_str();
        if self.name.trim().is_empty() {
            return Err(EventError::invalid_payload(kind, "name must not be blank"));
        }
        if self.cost < 0 {
            return Err(EventError::invalid_payload(kind, "cost must not be negative"));
        }
        Ok(())
    }
}

/// Adds items, opening an order first when the account has none.
///
/// Order and item ids come from the injected [`IdGenerator`]. A retried
/// command draws fresh ids, so nothing from a lost attempt leaks into the
/// stream.
#[derive(Clone)]
pub struct AddItem {
    ids: Arc<dyn IdGenerator>,
}

impl AddItem {
    /// Create a producer drawing ids from `ids`.
    #[must_use]
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }

    /// Decide the events for `command` against the current store, without
    /// appending them.
    ///
    /// # Errors
    ///
    /// See [`ProducerRunner::decide`].
    pub async fn call(
        &self,
        store: Arc<dyn EventStore>,
        command: &AddItemCommand,
    ) -> Result<Vec<EventInput>, ProducerError> {
        let decision = ProducerRunner::new(store).decide(self, command).await?;
        Ok(decision.events)
    }
}

impl Default for AddItem {
    fn default() -> Self {
        Self::new(Arc::new(UuidGenerator))
    }
}

impl std::fmt::Debug for AddItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddItem").finish_non_exhaustive()
    }
}

impl Producer for AddItem {
    type Projection = OrderAggregate;
    type Command = AddItemCommand;

    fn name(&self) -> &'static str {
        "add_item"
    }

    fn projection(&self) -> &OrderAggregate {
        &OrderAggregate
    }

    fn stream_id(&self, command: &AddItemCommand) -> StreamId {
        account_stream(&command.account_id)
    }

    fn decide(
        &self,
        state: &OrderState,
        command: &AddItemCommand,
    ) -> Result<Vec<EventInput>, ProducerError> {
        command.validate()?;

        let item_added = |order_id: OrderId| {
            OrderEvent::ItemAddedToOrder(ItemAddedToOrder {
                order_id,
                item_id: Some(ItemId::new(self.ids.next_id())),
                name: command.name.clone(),
                cost: command.cost,
            })
            .into_input()
        };

        if let Some((order_id, _)) = state.open_order(&command.account_id) {
            return Ok(vec![item_added(order_id.clone())?]);
        }

        let order_id = OrderId::new(self.ids.next_id());
        tracing::debug!(
            account_id = %command.account_id,
            order_id = %order_id,
            "No open order, creating one"
        );
        let created = OrderEvent::OrderCreated(OrderCreated {
            order_id: order_id.clone(),
            account_id: command.account_id.clone(),
        })
        .into_input()?;
        Ok(vec![created, item_added(order_id)?])
    }
}

/// Take an item back out of an account's open order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItemCommand {
    /// Account owning the order.
    pub account_id: AccountId,
    /// Item line to remove.
    pub item_id: ItemId,
}

/// Removes items from the open order.
#[derive(Copy, Clone, Debug, Default)]
pub struct RemoveItem;

impl Producer for RemoveItem {
    type Projection = OrderAggregate;
    type Command = RemoveItemCommand;

    fn name(&self) -> &'static str {
        "remove_item"
    }

    fn projection(&self) -> &OrderAggregate {
        &OrderAggregate
    }

    fn stream_id(&self, command: &RemoveItemCommand) -> StreamId {
        account_stream(&command.account_id)
    }

    fn requires_existing_stream(&self) -> bool {
        true
    }

    fn decide(
        &self,
        state: &OrderState,
        command: &RemoveItemCommand,
    ) -> Result<Vec<EventInput>, ProducerError> {
        let (order_id, order) = require_open_order(state, &command.account_id)?;
        let item = order.item(&command.item_id).ok_or_else(|| {
            ProducerError::Rejected(format!(
                "item {} is not in order {order_id}",
                command.item_id
            ))
        })?;

        let removed = OrderEvent::ItemRemovedFromOrder(ItemRemovedFromOrder {
            order_id: order_id.clone(),
            item_id: command.item_id.clone(),
            cost: item.cost,
        })
        .into_input()?;
        Ok(vec![removed])
    }
}

/// Pays for the open order. Empty orders cannot be checked out.
#[derive(Copy, Clone, Debug, Default)]
pub struct CheckoutOrder;

impl Producer for CheckoutOrder {
    type Projection = OrderAggregate;
    type Command = AccountId;

    fn name(&self) -> &'static str {
        "checkout_order"
    }

    fn projection(&self) -> &OrderAggregate {
        &OrderAggregate
    }

    fn stream_id(&self, account_id: &AccountId) -> StreamId {
        account_stream(account_id)
    }

    fn requires_existing_stream(&self) -> bool {
        true
    }

    fn decide(
        &self,
        state: &OrderState,
        account_id: &AccountId,
    ) -> Result<Vec<EventInput>, ProducerError> {
        let (order_id, order) = require_open_order(state, account_id)?;
        if order.items.is_empty() {
            return Err(ProducerError::Rejected(format!(
                "order {order_id} has no items"
            )));
        }
        let checked_out = OrderEvent::OrderCheckedOut(OrderCheckedOut {
            order_id: order_id.clone(),
        })
        .into_input()?;
        Ok(vec![checked_out])
    }
}

/// Abandons the open order.
#[derive(Copy, Clone, Debug, Default)]
pub struct CloseOrder;

impl Producer for CloseOrder {
    type Projection = OrderAggregate;
    type Command = AccountId;

    fn name(&self) -> &'static str {
        "close_order"
    }

    fn projection(&self) -> &OrderAggregate {
        &OrderAggregate
    }

    fn stream_id(&self, account_id: &AccountId) -> StreamId {
        account_stream(account_id)
    }

    fn requires_existing_stream(&self) -> bool {
        true
    }

    fn decide(
        &self,
        state: &OrderState,
        account_id: &AccountId,
    ) -> Result<Vec<EventInput>, ProducerError> {
        let (order_id, _) = require_open_order(state, account_id)?;
        let closed = OrderEvent::OrderClosed(OrderClosed {
            order_id: order_id.clone(),
        })
        .into_input()?;
        Ok(vec![closed])
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use foldstream_testing::SequentialIdGenerator;

    fn add_item() -> AddItem {
        AddItem::new(Arc::new(SequentialIdGenerator::new("id")))
    }

    fn open_state(items: &[(&str, i64)]) -> OrderState {
        let mut state = OrderState::default();
        state.orders.insert(
            OrderId::new("o1"),
            Order {
                account_id: AccountId::new("a"),
                items: items
                    .iter()
                    .map(|(id, cost)| crate::projections::Item {
                        item_id: Some(ItemId::new(*id)),
                        name: (*id).to_string(),
                        cost: *cost,
                    })
                    .collect(),
                status: crate::projections::OrderStatus::Open,
            },
        );
        state
            .open_orders
            .insert(AccountId::new("a"), OrderId::new("o1"));
        state
    }

    #[test]
    fn add_item_opens_an_order_when_none_is_open() {
        let events = add_item()
            .decide(&OrderState::default(), &AddItemCommand::new("a", "tea", 4))
            .unwrap();

        let types: Vec<&str> = events.iter().map(EventInput::event_type).collect();
        assert_eq!(types, vec!["OrderCreated", "ItemAddedToOrder"]);
        assert_eq!(events[0].payload()["order_id"], "id-1");
        assert_eq!(events[1].payload()["order_id"], "id-1");
        assert_eq!(events[1].payload()["item_id"], "id-2");
    }

    #[test]
    fn add_item_reuses_the_open_order() {
        let events = add_item()
            .decide(&open_state(&[]), &AddItemCommand::new("a", "tea", 4))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "ItemAddedToOrder");
        assert_eq!(events[0].payload()["order_id"], "o1");
    }

    #[test]
    fn add_item_rejects_bad_input_before_drawing_ids() {
        let ids = Arc::new(SequentialIdGenerator::new("id"));
        let producer = AddItem::new(ids.clone());

        for command in [
            AddItemCommand::new("a", "  ", 4),
            AddItemCommand::new("a", "tea", -1),
        ] {
            let err = producer
                .decide(&OrderState::default(), &command)
                .unwrap_err();
            assert!(matches!(err, ProducerError::InvalidPayload(_)));
        }
        assert_eq!(ids.next_id(), "id-1");
    }

    #[test]
    fn remove_item_uses_recorded_cost() {
        let command = RemoveItemCommand {
            account_id: AccountId::new("a"),
            item_id: ItemId::new("i2"),
        };
        let events = RemoveItem
            .decide(&open_state(&[("i1", 3), ("i2", 9)]), &command)
            .unwrap();

        assert_eq!(events[0].event_type(), "ItemRemovedFromOrder");
        assert_eq!(events[0].payload()["cost"], 9);
    }

    #[test]
    fn remove_item_rejects_unknown_items() {
        let command = RemoveItemCommand {
            account_id: AccountId::new("a"),
            item_id: ItemId::new("nope"),
        };
        let err = RemoveItem
            .decide(&open_state(&[("i1", 3)]), &command)
            .unwrap_err();
        assert!(matches!(err, ProducerError::Rejected(_)));
    }

    #[test]
    fn checkout_requires_items() {
        let account = AccountId::new("a");
        assert!(matches!(
            CheckoutOrder.decide(&open_state(&[]), &account),
            Err(ProducerError::Rejected(_))
        ));

        let events = CheckoutOrder
            .decide(&open_state(&[("i1", 3)]), &account)
            .unwrap();
        assert_eq!(events[0].event_type(), "OrderCheckedOut");
    }

    #[test]
    fn close_requires_an_open_order() {
        let err = CloseOrder
            .decide(&OrderState::default(), &AccountId::new("a"))
            .unwrap_err();
        assert_eq!(
            err,
            ProducerError::Rejected("account a has no open order".to_string())
        );
    }

    #[test]
    fn account_streams_are_prefixed() {
        assert_eq!(
            account_stream(&AccountId::new("42")).as_str(),
            "account-42"
        );
    }
}

//! Order domain events.
//!
//! [`OrderEvent`] is the typed form of everything an account stream can
//! hold. Payloads are JSON objects whose field names match the struct
//! fields below:
//!
//! | kind                   | fields                                          |
//! |------------------------|-------------------------------------------------|
//! | `OrderCreated`         | `order_id`, `account_id`                        |
//! | `ItemAddedToOrder`     | `order_id`, `cost`, optional `item_id`, `name`  |
//! | `ItemRemovedFromOrder` | `order_id`, `item_id`, `cost`                   |
//! | `OrderClosed`          | `order_id`                                      |
//! | `OrderCheckedOut`      | `order_id`                                      |
//!
//! Ids must be non-blank and costs non-negative. [`OrderEvent::into_input`]
//! checks both before an event can be handed to the store.

use crate::types::{AccountId, ItemId, OrderId};
use foldstream_core::event::{Event, EventError, EventInput, Payload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Event type names known to the order domain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrderEventKind {
    /// A new, empty order was opened for an account.
    OrderCreated,
    /// An item was added to an order.
    ItemAddedToOrder,
    /// An item was taken back out of an order.
    ItemRemovedFromOrder,
    /// The order was abandoned.
    OrderClosed,
    /// The order was paid for.
    OrderCheckedOut,
}

impl OrderEventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::OrderCreated,
        Self::ItemAddedToOrder,
        Self::ItemRemovedFromOrder,
        Self::OrderClosed,
        Self::OrderCheckedOut,
    ];

    /// The stored event type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreated => "OrderCreated",
            Self::ItemAddedToOrder => "ItemAddedToOrder",
            Self::ItemRemovedFromOrder => "ItemRemovedFromOrder",
            Self::OrderClosed => "OrderClosed",
            Self::OrderCheckedOut => "OrderCheckedOut",
        }
    }
}

impl fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderEventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventError::UnknownEventType(s.to_string()))
    }
}

/// Payload of [`OrderEventKind::OrderCreated`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// The new order.
    pub order_id: OrderId,
    /// Account the order belongs to.
    pub account_id: AccountId,
}

/// Payload of [`OrderEventKind::ItemAddedToOrder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAddedToOrder {
    /// Order receiving the item.
    pub order_id: OrderId,
    /// Item line id; absent on items that can never be removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Cost in the smallest currency unit.
    pub cost: i64,
}

/// Payload of [`OrderEventKind::ItemRemovedFromOrder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemovedFromOrder {
    /// Order losing the item.
    pub order_id: OrderId,
    /// Item line being removed.
    pub item_id: ItemId,
    /// Cost of the removed line.
    pub cost: i64,
}

/// Payload of [`OrderEventKind::OrderClosed`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClosed {
    /// The order.
    pub order_id: OrderId,
}

/// Payload of [`OrderEventKind::OrderCheckedOut`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCheckedOut {
    /// The order.
    pub order_id: OrderId,
}

/// Typed order event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEvent {
    /// See [`OrderCreated`].
    OrderCreated(OrderCreated),
    /// See [`ItemAddedToOrder`].
    ItemAddedToOrder(ItemAddedToOrder),
    /// See [`ItemRemovedFromOrder`].
    ItemRemovedFromOrder(ItemRemovedFromOrder),
    /// See [`OrderClosed`].
    OrderClosed(OrderClosed),
    /// See [`OrderCheckedOut`].
    OrderCheckedOut(OrderCheckedOut),
}

impl OrderEvent {
    /// The event's kind.
    #[must_use]
    pub const fn kind(&self) -> OrderEventKind {
        match self {
            Self::OrderCreated(_) => OrderEventKind::OrderCreated,
            Self::ItemAddedToOrder(_) => OrderEventKind::ItemAddedToOrder,
            Self::ItemRemovedFromOrder(_) => OrderEventKind::ItemRemovedFromOrder,
            Self::OrderClosed(_) => OrderEventKind::OrderClosed,
            Self::OrderCheckedOut(_) => OrderEventKind::OrderCheckedOut,
        }
    }

    /// The order every kind refers to.
    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        match self {
            Self::OrderCreated(e) => &e.order_id,
            Self::ItemAddedToOrder(e) => &e.order_id,
            Self::ItemRemovedFromOrder(e) => &e.order_id,
            Self::OrderClosed(e) => &e.order_id,
            Self::OrderCheckedOut(e) => &e.order_id,
        }
    }

    /// Check field-level rules.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidPayload`] for a blank id or a negative cost.
    pub fn validate(&self) -> Result<(), EventError> {
        let invalid = |reason: &str| Err(EventError::invalid_payload(self.kind().as_str(), reason));

        if self.order_id().is_blank() {
            return invalid("order_id must not be blank");
        }
        match self {
            Self::OrderCreated(e) if e.account_id.is_blank() => {
                invalid("account_id must not be blank")
            }
            Self::ItemAddedToOrder(e) if e.item_id.as_ref().is_some_and(ItemId::is_blank) => {
                invalid("item_id must not be blank")
            }
            Self::ItemRemovedFromOrder(e) if e.item_id.is_blank() => {
                invalid("item_id must not be blank")
            }
            Self::ItemAddedToOrder(ItemAddedToOrder { cost, .. })
            | Self::ItemRemovedFromOrder(ItemRemovedFromOrder { cost, .. })
                if *cost < 0 =>
            {
                invalid("cost must not be negative")
            }
            _ => Ok(()),
        }
    }

    /// Validate and convert into an appendable [`EventInput`].
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidPayload`] if [`OrderEvent::validate`]
    /// fails, or [`EventError::Serialization`] if encoding fails.
    pub fn into_input(self) -> Result<EventInput, EventError> {
        self.validate()?;
        EventInput::from_event(&self)
    }
}

fn encode<T: Serialize>(payload: &T) -> Result<Payload, EventError> {
    match serde_json::to_value(payload) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(EventError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(EventError::Serialization(e.to_string())),
    }
}

fn decode<T: DeserializeOwned>(kind: OrderEventKind, payload: &Payload) -> Result<T, EventError> {
    serde_json::from_value(serde_json::Value::Object(payload.clone()))
        .map_err(|e| EventError::invalid_payload(kind.as_str(), e.to_string()))
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        self.kind().as_str()
    }

    fn is_known_type(event_type: &str) -> bool {
        event_type.parse::<OrderEventKind>().is_ok()
    }

    fn to_payload(&self) -> Result<Payload, EventError> {
        match self {
            Self::OrderCreated(e) => encode(e),
            Self::ItemAddedToOrder(e) => encode(e),
            Self::ItemRemovedFromOrder(e) => encode(e),
            Self::OrderClosed(e) => encode(e),
            Self::OrderCheckedOut(e) => encode(e),
        }
    }

    fn from_payload(event_type: &str, payload: &Payload) -> Result<Self, EventError> {
        let kind: OrderEventKind = event_type.parse()?;
        let event = match kind {
            OrderEventKind::OrderCreated => Self::OrderCreated(decode(kind, payload)?),
            OrderEventKind::ItemAddedToOrder => Self::ItemAddedToOrder(decode(kind, payload)?),
            OrderEventKind::ItemRemovedFromOrder => {
                Self::ItemRemovedFromOrder(decode(kind, payload)?)
            }
            OrderEventKind::OrderClosed => Self::OrderClosed(decode(kind, payload)?),
            OrderEventKind::OrderCheckedOut => Self::OrderCheckedOut(decode(kind, payload)?),
        };
        event.validate()?;
        Ok(event)
    }
}

//! # Foldstream Orders
//!
//! The order domain on top of foldstream: accounts accumulate items in an
//! open order, then check it out or close it.
//!
//! ## Modules
//!
//! - [`types`]: `OrderId`, `AccountId`, `ItemId`
//! - [`events`]: the [`OrderEvent`] union and its payloads
//! - [`projections`]: [`OrderAggregate`], [`CostAggregate`], [`fold_named`]
//! - [`producers`]: [`AddItem`], [`RemoveItem`], [`CheckoutOrder`], [`CloseOrder`]
//!
//! ## Example
//!
//! ```
//! use foldstream_orders::{AddItem, AddItemCommand, CostAggregate, OrderEvent, account_stream};
//! use foldstream_runtime::{InMemoryEventStore, ProducerRunner, Projector};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryEventStore::new().validating::<OrderEvent>());
//! let runner = ProducerRunner::new(store.clone());
//! let add_item = AddItem::default();
//!
//! runner.execute(&add_item, &AddItemCommand::new("1", "tea", 10)).await.unwrap();
//! runner.execute(&add_item, &AddItemCommand::new("1", "cake", 17)).await.unwrap();
//!
//! let costs = Projector::new(CostAggregate, store)
//!     .project_stream(&account_stream(&"1".into()), None)
//!     .await
//!     .unwrap();
//! assert_eq!(costs.state.order_costs.values().sum::<i64>(), 27);
//! # });
//! ```

pub mod events;
pub mod producers;
pub mod projections;
pub mod types;

pub use events::{OrderEvent, OrderEventKind};
pub use producers::{
    AddItem, AddItemCommand, CheckoutOrder, CloseOrder, RemoveItem, RemoveItemCommand,
    account_stream,
};
pub use projections::{
    CostAggregate, CostState, OrderAggregate, OrderState, ProjectionName, ProjectionState,
    fold_named,
};
pub use types::{AccountId, ItemId, OrderId};

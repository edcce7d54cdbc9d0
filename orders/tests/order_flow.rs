//! End-to-end order flows against the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use foldstream_core::event::{EventError, EventInput, Payload};
use foldstream_core::event_store::{EventStore, EventStoreError};
use foldstream_core::producer::ProducerError;
use foldstream_core::stream::{GlobalOffset, StreamId, Version};
use foldstream_orders::projections::OrderStatus;
use foldstream_orders::{
    AccountId, AddItem, AddItemCommand, CheckoutOrder, CloseOrder, CostAggregate, ItemId,
    OrderAggregate, OrderEvent, OrderId, ProjectionName, ProjectionState, RemoveItem,
    RemoveItemCommand, account_stream, fold_named,
};
use foldstream_runtime::{InMemoryEventStore, ProducerRunner, Projector};
use foldstream_testing::{SequentialIdGenerator, init_tracing, test_clock};
use serde_json::json;
use std::sync::Arc;

fn store() -> Arc<InMemoryEventStore> {
    init_tracing();
    let store = InMemoryEventStore::with_clock(Arc::new(test_clock()))
        .validating::<OrderEvent>();
    Arc::new(store)
}

fn add_item() -> AddItem {
    AddItem::new(Arc::new(SequentialIdGenerator::new("id")))
}

fn raw(event_type: &str, payload: serde_json::Value) -> EventInput {
    let serde_json::Value::Object(map) = payload else {
        return EventInput::new(event_type, Payload::new()).unwrap();
    };
    EventInput::validated::<OrderEvent>(event_type, map).unwrap()
}

#[tokio::test]
async fn appended_costs_sum_per_order() -> anyhow::Result<()> {
    let store = store();
    let stream = StreamId::new("account-1");

    store
        .append_events(
            stream.clone(),
            Version::INITIAL,
            vec![
                raw("OrderCreated", json!({"order_id": 1, "account_id": 1})),
                raw("ItemAddedToOrder", json!({"order_id": 1, "cost": 10})),
                raw("ItemAddedToOrder", json!({"order_id": 1, "cost": 17})),
            ],
        )
        .await?;

    let events = store.load_events(stream, Version::INITIAL).await?;
    let ProjectionState::CostAggregate(costs) =
        fold_named(ProjectionName::CostAggregate, None, &events)?
    else {
        anyhow::bail!("wrong state kind");
    };
    assert_eq!(costs.cost(&OrderId::new("1")), Some(27));
    Ok(())
}

#[tokio::test]
async fn invalid_payloads_never_reach_the_store() {
    let mut payload = Payload::new();
    payload.insert("order_id".to_string(), json!(1));

    let err = EventInput::validated::<OrderEvent>("ItemAddedToOrder", payload).unwrap_err();
    assert!(matches!(err, EventError::InvalidPayload { .. }));
}

#[tokio::test]
async fn malformed_known_events_are_refused_by_the_store() -> anyhow::Result<()> {
    let store = store();
    let stream = account_stream(&AccountId::new("a"));
    let malformed = EventInput::new("ItemAddedToOrder", Payload::new())?;

    let err = store
        .append_events(stream.clone(), Version::INITIAL, vec![malformed])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EventStoreError::InvalidPayload(EventError::InvalidPayload { ref event_type, .. })
            if event_type == "ItemAddedToOrder"
    ));
    assert_eq!(store.stream_version(stream.clone()).await?, Version::INITIAL);
    assert!(store.is_empty().await);

    // The account stays usable.
    let committed = ProducerRunner::new(store.clone())
        .execute(&add_item(), &AddItemCommand::new("a", "tea", 4))
        .await?;
    assert_eq!(committed.version, Version::new(2));
    Ok(())
}

#[tokio::test]
async fn malformed_batches_are_refused_whole() {
    let store = store();
    let stream = account_stream(&AccountId::new("a"));
    let batch = vec![
        raw("OrderCreated", json!({"order_id": "o1", "account_id": "a"})),
        EventInput::new("ItemAddedToOrder", Payload::new()).unwrap(),
    ];

    let err = store
        .append_events(stream, Version::INITIAL, batch)
        .await
        .unwrap_err();
    assert!(matches!(err, EventStoreError::InvalidPayload(_)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn first_item_opens_an_order() -> anyhow::Result<()> {
    let store = store();
    let producer = add_item();
    let command = AddItemCommand::new("a", "tea", 4);

    let decided = producer.call(store.clone(), &command).await?;
    let types: Vec<&str> = decided.iter().map(EventInput::event_type).collect();
    assert_eq!(types, vec!["OrderCreated", "ItemAddedToOrder"]);
    assert_eq!(decided[0].payload()["order_id"], decided[1].payload()["order_id"]);
    assert!(store.is_empty().await, "call must not append");

    let committed = ProducerRunner::new(store.clone())
        .execute(&producer, &command)
        .await?;
    assert_eq!(committed.version, Version::new(2));

    let orders = Projector::new(OrderAggregate, store)
        .project_stream(&account_stream(&AccountId::new("a")), None)
        .await?;
    assert_eq!(orders.state.orders.len(), 1);
    let (_, order) = orders.state.open_order(&AccountId::new("a")).unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].name, "tea");
    assert_eq!(order.items[0].cost, 4);
    Ok(())
}

#[tokio::test]
async fn next_item_joins_the_open_order() -> anyhow::Result<()> {
    let store = store();
    let runner = ProducerRunner::new(store.clone());
    let producer = add_item();
    let stream = account_stream(&AccountId::new("a"));

    runner
        .execute(&producer, &AddItemCommand::new("a", "tea", 4))
        .await?;

    let projector = Projector::new(CostAggregate, store.clone());
    let before = projector.project_stream(&stream, None).await?;
    let order_id = before.state.order_costs.keys().next().cloned().unwrap();

    let committed = runner
        .execute(&producer, &AddItemCommand::new("a", "cake", 17))
        .await?;
    assert_eq!(committed.events.len(), 1);
    assert_eq!(committed.events[0].event_type(), "ItemAddedToOrder");
    assert_eq!(committed.events[0].payload()["order_id"], order_id.as_str());

    let after = projector.project_stream(&stream, Some(before.clone())).await?;
    assert_eq!(
        after.state.cost(&order_id),
        before.state.cost(&order_id).map(|c| c + 17)
    );
    Ok(())
}

#[tokio::test]
async fn order_lifecycle() -> anyhow::Result<()> {
    let store = store();
    let runner = ProducerRunner::new(store.clone());
    let producer = add_item();
    let account = AccountId::new("a");

    runner
        .execute(&producer, &AddItemCommand::new("a", "tea", 4))
        .await?;
    runner
        .execute(&producer, &AddItemCommand::new("a", "cake", 9))
        .await?;

    // Ids: id-1 order, id-2 tea, id-3 cake.
    runner
        .execute(
            &RemoveItem,
            &RemoveItemCommand {
                account_id: account.clone(),
                item_id: ItemId::new("id-2"),
            },
        )
        .await?;
    runner.execute(&CheckoutOrder, &account).await?;

    let projector = Projector::new(OrderAggregate, store.clone());
    let state = projector
        .project_stream(&account_stream(&account), None)
        .await?
        .state;
    let order = state.order(&OrderId::new("id-1")).unwrap();
    assert_eq!(order.status, OrderStatus::CheckedOut);
    assert_eq!(order.total(), 9);
    assert!(state.open_order(&account).is_none());

    // A checked-out order is finished; the next item opens a new one.
    let committed = runner
        .execute(&producer, &AddItemCommand::new("a", "jam", 2))
        .await?;
    assert_eq!(committed.events.len(), 2);

    runner.execute(&CloseOrder, &account).await?;
    let state = projector
        .project_stream(&account_stream(&account), None)
        .await?
        .state;
    assert_eq!(state.orders.len(), 2);
    assert!(state.open_orders.is_empty());
    Ok(())
}

#[tokio::test]
async fn producers_needing_history_fail_on_a_new_account() {
    let store = store();
    let runner = ProducerRunner::new(store.clone());

    let err = runner
        .execute(&CheckoutOrder, &AccountId::new("nobody"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProducerError::Store(EventStoreError::StreamNotFound(StreamId::new(
            "account-nobody"
        )))
    );
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn rejected_commands_append_nothing() {
    let store = store();
    let runner = ProducerRunner::new(store.clone());

    runner
        .execute(&add_item(), &AddItemCommand::new("a", "tea", 4))
        .await
        .unwrap();
    let err = runner
        .execute(
            &RemoveItem,
            &RemoveItemCommand {
                account_id: AccountId::new("a"),
                item_id: ItemId::new("missing"),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProducerError::Rejected(_)));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn store_wide_projection_spans_accounts() -> anyhow::Result<()> {
    let store = store();
    let runner = ProducerRunner::new(store.clone());
    let producer = add_item();

    for (account, cost) in [("a", 1), ("b", 2), ("a", 3), ("c", 4), ("b", 5)] {
        runner
            .execute(&producer, &AddItemCommand::new(account, "x", cost))
            .await?;
    }

    let all = store.load_all(GlobalOffset::START).await?;
    assert_eq!(all.len(), 8);
    assert!(all.windows(2).all(|w| w[0].global_offset < w[1].global_offset));
    assert_eq!(all.last().unwrap().global_offset, GlobalOffset::new(7));

    let projector = Projector::new(CostAggregate, store.clone());
    let full = projector.project_all(None).await?;
    let mut costs: Vec<i64> = full.state.order_costs.values().copied().collect();
    costs.sort_unstable();
    assert_eq!(costs, vec![4, 4, 7]);

    let tail = store.load_all(GlobalOffset::new(5)).await?;
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[0].global_offset, GlobalOffset::new(5));
    Ok(())
}

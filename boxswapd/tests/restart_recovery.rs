//! Restart and concurrency behaviour of the daemon runtime.
//!
//! A second daemon built on the same store must come back with the exact
//! exchange state the first one recorded, open boxes included.

use std::sync::Arc;

use boxswap_domain::{AccountId, AssetId, WindowId};
use boxswap_exec::ManualClock;
use boxswap_store::{EventRepository, MemoryStore};
use boxswapd::{Config, Daemon, ExchangeFactory, OutcomeRecorder};

fn account(name: &str) -> AccountId {
    AccountId::new(name).unwrap()
}

fn build(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> Daemon {
    let config = Config::test();
    let factory = Arc::new(ExchangeFactory::new(&config.exchange, clock).unwrap());
    let recorder = Arc::new(OutcomeRecorder::new(store));
    Daemon::new(config, factory, recorder)
}

#[tokio::test]
async fn test_restart_restores_open_boxes() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1));
    let tkn = AssetId::new("TKN")?;
    let recorder = OutcomeRecorder::new(store.clone());

    let first = build(store.clone(), clock.clone());
    let factory = first.factory().clone();
    factory.create_exchange(tkn.clone()).await?;
    factory.fund(&account("lp"), "BASE", 200_000).await?;
    factory.fund(&account("lp"), "TKN", 100_000).await?;
    factory.fund(&account("alice"), "BASE", 1_000).await?;
    factory.fund(&account("bob"), "TKN", 1_000).await?;

    let before = {
        let handle = factory.get(&tkn).await?;
        let exchange = handle.lock().await;
        let outcome = exchange.initialize_exchange(&account("lp"), 100_000, 200_000).await?;
        recorder.record(&tkn, &exchange, &outcome).await?;
        let outcome = exchange
            .order_base_to_settlement(&account("alice"), WindowId::new(9), 400, true)
            .await?;
        recorder.record(&tkn, &exchange, &outcome).await?;
        let outcome = exchange
            .order_settlement_to_base(&account("bob"), WindowId::new(9), 150, false)
            .await?;
        recorder.record(&tkn, &exchange, &outcome).await?;
        exchange.snapshot()?
    };
    let logged = store.find_by_exchange(&tkn).await?.len();
    drop(first);

    // "restart"
    let second = build(store.clone(), clock.clone());
    assert_eq!(second.restore_exchanges().await?, 1);

    let handle = second.factory().get(&tkn).await?;
    let exchange = handle.lock().await;
    assert_eq!(exchange.snapshot()?, before);
    assert_eq!(exchange.unsettled_boxes()?.len(), 1);
    let summary = exchange.box_summary(exchange.unsettled_boxes()?[0])?.unwrap();
    assert_eq!(summary.order_count, 2);
    assert_eq!(summary.aggregates.buy_limit, 400);
    assert_eq!(summary.aggregates.sell_non_limit, 150);

    // restoring does not touch the log
    assert_eq!(store.find_by_exchange(&tkn).await?.len(), logged);
    Ok(())
}

#[tokio::test]
async fn test_restore_twice_is_rejected() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1));
    let daemon = build(store.clone(), clock);

    daemon.factory().create_exchange(AssetId::new("TKN")?).await?;
    {
        let handle = daemon.factory().get(&AssetId::new("TKN")?).await?;
        let exchange = handle.lock().await;
        OutcomeRecorder::new(store.clone())
            .checkpoint(exchange.asset(), &exchange)
            .await?;
    }

    // the exchange is already listed in this process
    assert!(daemon.restore_exchanges().await.is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_queue_on_the_handle() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1));
    let daemon = build(store, clock.clone());
    let factory = daemon.factory().clone();
    let tkn = AssetId::new("TKN")?;

    factory.create_exchange(tkn.clone()).await?;
    factory.fund(&account("lp"), "BASE", 200_000).await?;
    factory.fund(&account("lp"), "TKN", 100_000).await?;
    factory
        .get(&tkn)
        .await?
        .lock()
        .await
        .initialize_exchange(&account("lp"), 100_000, 200_000)
        .await?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let trader = account(&format!("trader{}", i));
        factory.fund(&trader, "BASE", 100).await?;
        let factory = factory.clone();
        let tkn = tkn.clone();
        tasks.push(tokio::spawn(async move {
            let handle = factory.get(&tkn).await?;
            let exchange = handle.lock().await;
            exchange
                .order_base_to_settlement(&trader, WindowId::new(5), 10, false)
                .await?;
            Ok::<_, anyhow::Error>(())
        }));
    }
    for task in tasks {
        task.await??;
    }

    clock.advance();
    let mut paid = 0;
    while paid < 16 {
        let orders = daemon.keeper_pass().await;
        assert!(orders > 0);
        paid += orders;
    }
    assert_eq!(paid, 16);

    let handle = factory.get(&tkn).await?;
    assert!(handle.lock().await.unsettled_boxes()?.is_empty());
    Ok(())
}

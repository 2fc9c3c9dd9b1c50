//! 一旦到达 `Dead` 永不回退；关闭总耗时有界。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use logrelay_core::prelude::*;

#[tokio::test]
async fn state_never_leaves_dead_once_reached() {
    let registry = Arc::new(StreamRegistry::new());
    let processed = Arc::new(AtomicUsize::new(0));
    let processed_clone = processed.clone();
    let sink = Arc::new(BufferedSink::new(
        "buf-contract",
        StreamId::from_name("_DROPPED_"),
        ModulatorArray::new(),
        Duration::from_millis(100),
        registry,
        4,
        PushTimeout::Block,
        Arc::new(move |_msg: Message| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    ));

    sink.enqueue(Message::new(b"x".to_vec(), StreamId::from_name("A"), 0, None)).await.unwrap();

    let tx = sink.core().control_sender();
    let sink_for_loop = sink.clone();
    let control_handle = tokio::spawn(async move { sink_for_loop.core().control_loop(sink_for_loop.as_ref()).await });

    tx.send(logrelay_core::sink::SinkControlEvent::Stop).await.unwrap();
    tokio::time::timeout(Duration::from_millis(500), control_handle).await.unwrap().unwrap();

    assert_eq!(sink.core().state(), SinkState::Dead);
    assert_eq!(processed.load(Ordering::SeqCst), 1);

    // Polling the state again after Dead must never show a resurrection.
    for _ in 0..5 {
        assert_eq!(sink.core().state(), SinkState::Dead);
    }
}

#[tokio::test]
async fn shutdown_completes_within_the_documented_budget() {
    let registry = Arc::new(StreamRegistry::new());
    let shutdown_timeout = Duration::from_millis(20);
    let sink = Arc::new(BufferedSink::new(
        "buf-budget",
        StreamId::from_name("_DROPPED_"),
        ModulatorArray::new(),
        shutdown_timeout,
        registry,
        4,
        PushTimeout::Block,
        Arc::new(|_msg: Message| Ok(())),
    ));

    let tx = sink.core().control_sender();
    let sink_for_loop = sink.clone();

    let started = tokio::time::Instant::now();
    let control_handle = tokio::spawn(async move { sink_for_loop.core().control_loop(sink_for_loop.as_ref()).await });
    tx.send(logrelay_core::sink::SinkControlEvent::Stop).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), control_handle).await.unwrap().unwrap();
    let elapsed = started.elapsed();

    // at most 10x shutdown_timeout (two 5x budgets) + grace + epsilon.
    let budget = shutdown_timeout * 10 + Duration::from_millis(200);
    assert!(elapsed <= budget, "shutdown took {elapsed:?}, budget was {budget:?}");
    assert_eq!(sink.core().state(), SinkState::Dead);
}

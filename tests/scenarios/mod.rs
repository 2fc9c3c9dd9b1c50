//! 端到端场景：把 Message/Queue/Batch/Modulator/Router/Sink
//! 拼成完整的数据面管线，验证跨组件契约。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use logrelay_core::prelude::*;

fn sink_counting(id: &str) -> (Arc<dyn Sink>, Arc<Mutex<Vec<Vec<u8>>>>) {
    struct Recording {
        id: String,
        received: Arc<Mutex<Vec<Vec<u8>>>>,
    }
    #[async_trait]
    impl Sink for Recording {
        fn id(&self) -> &str {
            &self.id
        }
        async fn enqueue(&self, msg: Message) -> Result<(), CoreError> {
            self.received.lock().unwrap().push(msg.payload().to_vec());
            Ok(())
        }
    }
    let received = Arc::new(Mutex::new(Vec::new()));
    (Arc::new(Recording { id: id.to_string(), received: received.clone() }) as Arc<dyn Sink>, received)
}

/// Broadcast: a router for `"A"` with two sinks delivers the same
/// message to both.
#[tokio::test]
async fn broadcast_delivers_to_every_subscribed_sink() {
    let registry = StreamRegistry::new();
    let stream_a = registry.get_stream_id("A");
    let router = Arc::new(BroadcastRouter::new("router-a", stream_a, ModulatorArray::new(), Duration::from_secs(1)));

    let (sink1, received1) = sink_counting("sink-1");
    let (sink2, received2) = sink_counting("sink-2");
    router.add_sink(sink1);
    router.add_sink(sink2);
    registry.register_router(stream_a, router.clone() as Arc<dyn Router>);

    let source = Source::new("source-1", vec![stream_a]);
    source.emit(b"hello".to_vec(), 1, &registry).await.unwrap();

    assert_eq!(received1.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
    assert_eq!(received2.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
}

/// Drop-on-timeout: a buffered sink with `Channel=1`, a bounded
/// `ChannelTimeoutMs`, a consumer that never drains, and two enqueues of
/// `"x"` delivers exactly the second copy to the `_DROPPED_` fallback,
/// unmodified.
#[tokio::test]
async fn channel_overflow_routes_the_blocked_copy_to_fallback() {
    let registry = Arc::new(StreamRegistry::new());
    let dropped_stream = registry.get_stream_id("_DROPPED_");

    let (fallback_sink, fallback_received) = sink_counting("fallback");
    let fallback_router = Arc::new(BroadcastRouter::new("fallback-router", dropped_stream, ModulatorArray::new(), Duration::from_secs(1)));
    fallback_router.add_sink(fallback_sink);
    registry.register_router(dropped_stream, fallback_router as Arc<dyn Router>);

    // Consumer never runs (we never spawn consumer_loop), so the queue stays full after the first push.
    let sink = Arc::new(BufferedSink::new(
        "buf-s2",
        dropped_stream,
        ModulatorArray::new(),
        Duration::from_millis(200),
        registry.clone(),
        1,
        PushTimeout::Bounded(Duration::from_millis(50)),
        Arc::new(|_msg: Message| Ok(())),
    ));

    sink.enqueue(Message::new(b"x".to_vec(), StreamId::from_name("A"), 0, None)).await.unwrap();
    sink.enqueue(Message::new(b"x".to_vec(), StreamId::from_name("A"), 0, None)).await.unwrap();

    assert_eq!(fallback_received.lock().unwrap().as_slice(), &[b"x".to_vec()]);
}

/// Formatter chain: `[upper, append("!")]` turns `"hi"` into `"HI!"`
/// before the downstream sink ever sees it.
#[tokio::test]
async fn formatter_chain_transforms_payload_before_delivery() {
    use logrelay_core::modulator::formatter::{AppendSuffixFormatter, FieldSelector, FormatterModulator, UpperCaseFormatter};

    let registry = StreamRegistry::new();
    let stream = registry.get_stream_id("A");

    let mut modulators = ModulatorArray::new();
    modulators.push(Box::new(FormatterModulator::apply_to(UpperCaseFormatter, FieldSelector::Payload)));
    modulators.push(Box::new(FormatterModulator::apply_to(AppendSuffixFormatter { suffix: b"!".to_vec() }, FieldSelector::Payload)));

    let router = Arc::new(BroadcastRouter::new("router-a", stream, modulators, Duration::from_secs(1)));
    let (sink, received) = sink_counting("sink");
    router.add_sink(sink);
    registry.register_router(stream, router.clone() as Arc<dyn Router>);

    let msg = Message::new(b"hi".to_vec(), stream, 1, None);
    route(msg, Some(router as Arc<dyn Router>), &registry).await.unwrap();

    assert_eq!(received.lock().unwrap().as_slice(), &[b"HI!".to_vec()]);
}

/// Filter reroute: a filter rejecting toward `"errors"` causes `Route`
/// to deliver to the errors router instead of the original sink.
#[tokio::test]
async fn filter_reject_reroutes_to_the_target_stream() {
    struct RejectToErrors(StreamId);
    #[async_trait]
    impl Filter for RejectToErrors {
        async fn check(&self, _msg: &Message) -> FilterVerdict {
            FilterVerdict::Reject(self.0)
        }
    }

    let registry = StreamRegistry::new();
    let stream_a = registry.get_stream_id("A");
    let errors_stream = registry.get_stream_id("errors");

    let mut modulators = ModulatorArray::new();
    modulators.push(Box::new(FilterModulator(RejectToErrors(errors_stream))));
    let router_a = Arc::new(BroadcastRouter::new("router-a", stream_a, modulators, Duration::from_secs(1)));
    let (original_sink, original_received) = sink_counting("original");
    router_a.add_sink(original_sink);
    registry.register_router(stream_a, router_a.clone() as Arc<dyn Router>);

    let router_errors = Arc::new(BroadcastRouter::new("router-errors", errors_stream, ModulatorArray::new(), Duration::from_secs(1)));
    let (errors_sink, errors_received) = sink_counting("errors");
    router_errors.add_sink(errors_sink);
    registry.register_router(errors_stream, router_errors as Arc<dyn Router>);

    let msg = Message::new(b"oops".to_vec(), stream_a, 1, None);
    route(msg, Some(router_a as Arc<dyn Router>), &registry).await.unwrap();

    assert!(original_received.lock().unwrap().is_empty(), "the original sink must receive nothing");
    assert_eq!(errors_received.lock().unwrap().as_slice(), &[b"oops".to_vec()]);
}

/// Batch timeout: `MaxCount=10`, `FlushCount=5`, `TimeoutSec≈1`;
/// enqueueing 3 messages and waiting past the timeout fires exactly one
/// flush with all 3 messages in reservation order.
#[tokio::test(start_paused = true)]
async fn batch_flushes_once_on_the_time_threshold() {
    let registry = Arc::new(StreamRegistry::new());
    let flushed = Arc::new(Mutex::new(Vec::new()));
    let flush_calls = Arc::new(AtomicUsize::new(0));
    let flushed_clone = flushed.clone();
    let flush_calls_clone = flush_calls.clone();

    let sink = Arc::new(BatchedSink::new(
        "batch-s5",
        StreamId::from_name("_DROPPED_"),
        ModulatorArray::new(),
        Duration::from_millis(200),
        registry,
        10,
        5,
        Duration::from_millis(200),
        Arc::new(move |batch: Vec<Message>| {
            flush_calls_clone.fetch_add(1, Ordering::SeqCst);
            flushed_clone.lock().unwrap().extend(batch.into_iter().map(|m| m.payload().to_vec()));
        }),
    ));

    for tag in [b"m1".to_vec(), b"m2".to_vec(), b"m3".to_vec()] {
        sink.enqueue(Message::new(tag, StreamId::from_name("A"), 0, None)).await.unwrap();
    }

    let sink_for_ticker = sink.clone();
    let ticker = tokio::spawn(async move { sink_for_ticker.ticker_loop().await });

    tokio::time::advance(Duration::from_millis(250)).await;
    tokio::time::sleep(Duration::from_millis(1)).await;
    ticker.abort();

    assert_eq!(flush_calls.load(Ordering::SeqCst), 1);
    assert_eq!(flushed.lock().unwrap().as_slice(), &[b"m1".to_vec(), b"m2".to_vec(), b"m3".to_vec()]);
}

/// Graceful shutdown: a buffered sink (`Channel=8`) with three
/// in-flight messages processes all three on `Stop` before `Dead`, with no
/// fallback produced.
#[tokio::test]
async fn graceful_shutdown_drains_everything_with_no_fallback() {
    let registry = Arc::new(StreamRegistry::new());
    let dropped_stream = registry.get_stream_id("_DROPPED_");
    let (fallback_sink, fallback_received) = sink_counting("fallback");
    let fallback_router = Arc::new(BroadcastRouter::new("fallback-router", dropped_stream, ModulatorArray::new(), Duration::from_secs(1)));
    fallback_router.add_sink(fallback_sink);
    registry.register_router(dropped_stream, fallback_router as Arc<dyn Router>);

    let processed = Arc::new(Mutex::new(Vec::new()));
    let processed_clone = processed.clone();
    let sink = Arc::new(BufferedSink::new(
        "buf-s6",
        dropped_stream,
        ModulatorArray::new(),
        Duration::from_millis(200),
        registry,
        8,
        PushTimeout::Block,
        Arc::new(move |msg: Message| {
            processed_clone.lock().unwrap().push(msg.payload().to_vec());
            Ok(())
        }),
    ));

    for tag in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
        sink.enqueue(Message::new(tag, StreamId::from_name("A"), 0, None)).await.unwrap();
    }

    let tx = sink.core().control_sender();
    let sink_for_loop = sink.clone();
    let loop_handle = tokio::spawn(async move { sink_for_loop.message_control_loop().await });
    tx.send(logrelay_core::sink::SinkControlEvent::Stop).await.unwrap();
    tokio::time::timeout(Duration::from_millis(500), loop_handle).await.unwrap().unwrap();

    assert_eq!(sink.core().state(), SinkState::Dead);
    assert_eq!(processed.lock().unwrap().as_slice(), &[b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    assert!(fallback_received.lock().unwrap().is_empty(), "graceful drain must not fall back any message");
}

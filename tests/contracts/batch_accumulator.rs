//! 批次在容量内无损，溢出时按 `AppendOrFlush` 契约处理。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use logrelay_core::prelude::*;

fn msg(tag: &str) -> Message {
    Message::new(tag.as_bytes().to_vec(), StreamId::from_name("A"), 0, None)
}

#[tokio::test]
async fn flush_delivers_every_appended_message_exactly_once_in_order() {
    let batch = Arc::new(MessageBatch::new(16));
    let tags: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    for tag in &tags {
        assert!(batch.append(msg(tag)));
    }

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    batch
        .flush(move |items| {
            let received_clone = received_clone.clone();
            async move {
                received_clone.lock().unwrap().extend(items.into_iter().map(|m| m.payload().to_vec()));
            }
        })
        .await;
    batch.wait_for_flush(Duration::from_millis(200)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let got = received.lock().unwrap();
    let expected: Vec<Vec<u8>> = tags.iter().map(|t| t.as_bytes().to_vec()).collect();
    assert_eq!(*got, expected, "no loss, no duplicates, reservation order preserved");
}

#[tokio::test]
async fn append_or_flush_triggers_a_flush_and_then_succeeds_while_still_active() {
    let batch = Arc::new(MessageBatch::new(2));
    assert!(batch.append(msg("a")));
    assert!(batch.append(msg("b")));

    let flushed = Arc::new(Mutex::new(Vec::new()));
    let flushed_clone = flushed.clone();
    let batch_for_flush = batch.clone();

    batch
        .append_or_flush(
            msg("c"),
            move || {
                let batch_for_flush = batch_for_flush.clone();
                let flushed_clone = flushed_clone.clone();
                async move {
                    batch_for_flush
                        .flush(move |items| {
                            let flushed_clone = flushed_clone.clone();
                            async move {
                                flushed_clone.lock().unwrap().extend(items.into_iter().map(|m| m.payload().to_vec()));
                            }
                        })
                        .await;
                }
            },
            || true,
            |_| panic!("must not drop: still_active() returned true"),
        )
        .await;

    batch.wait_for_flush(Duration::from_millis(200)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(flushed.lock().unwrap().as_slice(), &[b"a".to_vec(), b"b".to_vec()]);
    assert!(batch.reached_size_threshold(1), "the retried append for `c` must have landed in the new active buffer");
}

#[tokio::test]
async fn append_or_flush_drops_the_message_when_the_sink_is_no_longer_active() {
    let batch = MessageBatch::new(1);
    assert!(batch.append(msg("a")));

    let dropped = Arc::new(Mutex::new(None));
    let dropped_clone = dropped.clone();
    batch
        .append_or_flush(
            msg("b"),
            || async { panic!("flush must not be attempted once inactive") },
            || false,
            move |m| *dropped_clone.lock().unwrap() = Some(m.payload().to_vec()),
        )
        .await;

    assert_eq!(dropped.lock().unwrap().as_deref(), Some(&b"b"[..]));
}

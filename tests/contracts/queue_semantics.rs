//! 有界队列在三种超时策略下的行为契约。

use std::sync::Arc;
use std::time::Duration;

use logrelay_core::prelude::*;

fn msg(tag: &str) -> Message {
    Message::new(tag.as_bytes().to_vec(), StreamId::from_name("A"), 0, None)
}

#[tokio::test]
async fn never_block_yields_ok_up_to_capacity_then_discard() {
    let capacity = 4;
    let q = MessageQueue::new(capacity);
    for i in 0..capacity {
        let outcome = q.push(msg(&i.to_string()), PushTimeout::NeverBlock).await;
        assert_eq!(outcome, PushOutcome::Ok, "push #{i} should succeed under capacity");
    }
    let overflow = q.push(msg("overflow"), PushTimeout::NeverBlock).await;
    assert_eq!(overflow, PushOutcome::Discard);
}

#[tokio::test]
async fn zero_timeout_blocks_until_a_pop_frees_space() {
    let q = Arc::new(MessageQueue::new(1));
    assert_eq!(q.push(msg("a"), PushTimeout::NeverBlock).await, PushOutcome::Ok);

    let q2 = q.clone();
    let blocked_push = tokio::spawn(async move { q2.push(msg("b"), PushTimeout::Block).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!blocked_push.is_finished(), "push should still be blocked with no space and no pop");

    q.pop().await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_millis(200), blocked_push)
        .await
        .expect("push should unblock after pop")
        .unwrap();
    assert_eq!(outcome, PushOutcome::Ok);
}

#[tokio::test]
async fn positive_timeout_returns_timeout_after_roughly_the_budget() {
    let q = MessageQueue::new(1);
    assert_eq!(q.push(msg("a"), PushTimeout::NeverBlock).await, PushOutcome::Ok);

    let budget = Duration::from_millis(80);
    let started = tokio::time::Instant::now();
    let outcome = q.push(msg("b"), PushTimeout::Bounded(budget)).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, PushOutcome::Timeout);
    assert!(elapsed >= budget, "timeout fired early: {elapsed:?} < {budget:?}");
    assert!(elapsed < budget * 3, "timeout fired far too late: {elapsed:?}");
}

#[tokio::test]
async fn pop_reports_no_more_once_closed_and_drained() {
    let q = MessageQueue::new(2);
    q.push(msg("a"), PushTimeout::NeverBlock).await;
    q.close();

    let first = q.pop().await;
    assert_eq!(first.as_ref().map(Message::payload), Some(&b"a"[..]));

    let second = q.pop().await;
    assert!(second.is_none(), "closed+empty queue must report no more items");
}

#[tokio::test]
async fn pushing_to_a_closed_queue_always_discards() {
    let q = MessageQueue::new(4);
    q.close();
    assert_eq!(q.push(msg("late"), PushTimeout::NeverBlock).await, PushOutcome::Discard);
    assert_eq!(q.push(msg("late"), PushTimeout::Block).await, PushOutcome::Discard);
    assert_eq!(q.push(msg("late"), PushTimeout::Bounded(Duration::from_millis(10))).await, PushOutcome::Discard);
}

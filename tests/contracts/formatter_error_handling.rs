//! 一个 Formatter 失败即整条消息被 Discard，并计入 `messages_discarded`。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logrelay_core::prelude::*;

/// A test-local formatter error, expressed the way the corpus expresses ad
/// hoc error types in test code: `thiserror::Error` rather than a hand-rolled
/// `Display`/`Error` impl.
#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),
}

struct StrictBase64Formatter;

#[async_trait]
impl Formatter for StrictBase64Formatter {
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, CoreError> {
        if input.iter().any(|b| !b.is_ascii_alphanumeric()) {
            let err = DecodeError::InvalidBase64(String::from_utf8_lossy(input).into_owned());
            return Err(CoreError::new(
                logrelay_core::error::codes::MODULATOR_FAILED,
                "formatter rejected payload",
            )
            .with_category(ErrorCategory::NonRetryable)
            .with_cause(err));
        }
        Ok(input.to_ascii_uppercase())
    }
}

#[tokio::test]
async fn formatter_failure_discards_the_message_and_is_counted() {
    let registry = StreamRegistry::new();
    let stream = registry.get_stream_id("A");

    let mut modulators = ModulatorArray::new();
    modulators.push(Box::new(FormatterModulator::apply_to(StrictBase64Formatter, FieldSelector::Payload)));
    let router: Arc<dyn Router> = Arc::new(BroadcastRouter::new("r-a", stream, modulators, Duration::from_secs(1)));
    registry.register_router(stream, router.clone());

    let msg = Message::new(b"not valid!!".to_vec(), stream, 0, None);
    route(msg, Some(router), &registry).await.unwrap();

    assert_eq!(registry.metrics().messages_discarded(), 1);
    assert_eq!(registry.metrics().messages_routed(), 0);
}

#[tokio::test]
async fn formatter_success_lets_the_message_continue_routing() {
    let registry = StreamRegistry::new();
    let stream = registry.get_stream_id("A");

    let mut modulators = ModulatorArray::new();
    modulators.push(Box::new(FormatterModulator::apply_to(StrictBase64Formatter, FieldSelector::Payload)));
    let router: Arc<dyn Router> = Arc::new(BroadcastRouter::new("r-a", stream, modulators, Duration::from_secs(1)));
    registry.register_router(stream, router.clone());

    let msg = Message::new(b"abc123".to_vec(), stream, 0, None);
    route(msg, Some(router), &registry).await.unwrap();

    assert_eq!(registry.metrics().messages_routed(), 1);
    assert_eq!(registry.metrics().messages_discarded(), 0);
}

//! 注册已占用的流会替换旧 Router 并记录一条告警日志。

use std::sync::Arc;
use std::time::Duration;

use logrelay_core::prelude::*;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn replacing_a_registered_router_logs_a_warning() {
    let registry = StreamRegistry::new();
    let stream = StreamId::from_name("A");

    let first: Arc<dyn Router> = Arc::new(BroadcastRouter::new("r-first", stream, ModulatorArray::new(), Duration::from_secs(1)));
    registry.register_router(stream, first);
    assert!(!logs_contain("replacing previously registered router"));

    let second: Arc<dyn Router> = Arc::new(BroadcastRouter::new("r-second", stream, ModulatorArray::new(), Duration::from_secs(1)));
    registry.register_router(stream, second.clone());
    assert!(logs_contain("replacing previously registered router"));

    assert!(Arc::ptr_eq(&registry.get_router(stream).unwrap(), &second));
}

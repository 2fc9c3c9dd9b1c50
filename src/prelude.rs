//! 常用类型的一站式导入，供下游调用方 `use logrelay_core::prelude::*;`。

pub use crate::batch::MessageBatch;
pub use crate::config::{ConfigReader, ConfigValue, MapConfigReader};
pub use crate::error::{CoreError, DomainError, ErrorCategory, ImplError, Result};
pub use crate::ids::StreamId;
pub use crate::message::{Message, MetadataMap, SourceRef};
pub use crate::modulator::{
    filter::{Filter, FilterModulator, FilterVerdict},
    formatter::{FieldSelector, Formatter, FormatterModulator},
    Modulator, ModulatorArray, ModulatorVerdict,
};
pub use crate::observability::{AtomicMetrics, ComponentHealthState, HealthCheckProvider};
pub use crate::queue::{MessageQueue, PushOutcome, PushTimeout};
pub use crate::registry::StreamRegistry;
pub use crate::router::{route, route_original, BroadcastRouter, Router, Sink};
pub use crate::sink::{BatchedSink, BufferedSink, DirectSink, SinkCore, SinkLifecycle, SinkState};
pub use crate::source::{ControlEvent, Fuse, Source, SourceCallbacks};

//! 类型化配置读取契约：配置加载器本身（YAML 解析、插件类型
//! 注册表）不在本 crate 范围内，只承诺调用方按名取值时看到的类型化视图。
//!
//! # 设计背景（Why）
//! - `ConfigValue` 采用标量 + 容器枚举的形状，但去掉了面向
//!   `no_std`/热更新场景的 `ConfigMetadata`、`Dictionary` 借用语义——本
//!   crate 只需要"按名取类型化值"这一个读路径，不需要完整的分层合并/
//!   订阅模型。
//! - `ModulatorArray`/`FilterArray`/`FormatterArray` 访问器直接返回已构造的
//!   运行时对象，而不是配置值：把"如何从配置描述构造一个 Modulator"的职责
//!   留给系统边界之外的插件注册表，这里只声明调用方期望能拿到这些类型化
//!   结果。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{codes, CoreError, ErrorCategory};
use crate::ids::StreamId;
use crate::modulator::filter::Filter;
use crate::modulator::formatter::Formatter;
use crate::modulator::ModulatorArray;
use crate::queue::PushTimeout;

/// 单个配置值，覆盖 §6 "Per-plugin recognized options" 表所需的标量与
/// 容器形状。
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
    StringArray(Vec<String>),
    Map(BTreeMap<String, ConfigValue>),
    /// An ordered list of nested plugin definitions, e.g. the `Modulators`
    /// key: each entry is itself a `{Type, ...}` map handed to the (out of
    /// scope) plugin registry.
    PluginArray(Vec<BTreeMap<String, ConfigValue>>),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            ConfigValue::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::Uint(v) => Some(*v),
            ConfigValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            ConfigValue::StringArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_plugin_array(&self) -> Option<&[BTreeMap<String, ConfigValue>]> {
        match self {
            ConfigValue::PluginArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

fn missing_key(key: &str) -> CoreError {
    CoreError::new(codes::CONFIG_MISSING_KEY, format!("missing config key: {key}"))
        .with_category(ErrorCategory::NonRetryable)
}

fn type_mismatch(key: &str, expected: &'static str) -> CoreError {
    CoreError::new(codes::CONFIG_TYPE_MISMATCH, format!("config key `{key}` is not a {expected}"))
        .with_category(ErrorCategory::NonRetryable)
}

/// 插件构造期按名取值的只读视图。`get_modulator_array` 等回调
/// 返回已组装好的运行时对象，由调用方（插件注册表）负责根据配置值构造
/// 具体的 `Filter`/`Formatter` 实例——本 trait 不规定它们如何被构造。
pub trait ConfigReader: Send + Sync {
    fn get_string(&self, key: &str) -> Result<String, CoreError>;
    fn get_int(&self, key: &str) -> Result<i64, CoreError>;
    fn get_uint(&self, key: &str) -> Result<u64, CoreError>;
    fn get_bool(&self, key: &str) -> Result<bool, CoreError>;
    fn get_string_array(&self, key: &str) -> Result<Vec<String>, CoreError>;
    fn get_stream_id(&self, key: &str) -> Result<StreamId, CoreError> {
        Ok(StreamId::from_name(&self.get_string(key)?))
    }
    fn get_stream_array(&self, key: &str) -> Result<Vec<StreamId>, CoreError> {
        Ok(self.get_string_array(key)?.iter().map(|name| StreamId::from_name(name)).collect())
    }

    /// 原样取出一个嵌套 Map（`Batch`、`Modulators` 等容器键的底层形状）。
    fn get_map(&self, key: &str) -> Result<BTreeMap<String, ConfigValue>, CoreError>;

    /// An ordered list of nested plugin definitions (e.g. `Modulators`): each
    /// entry is a `{Type, ...}` map, re-exposed as a nested `ConfigValue` so
    /// a (still out of scope) plugin registry can recurse into it.
    fn get_plugin_array_raw(&self, key: &str) -> Result<Vec<BTreeMap<String, ConfigValue>>, CoreError>;

    /// `Stream-Map`：名称→StreamID 的映射，值必须是字符串流名称。
    fn get_stream_map(&self, key: &str) -> Result<BTreeMap<String, StreamId>, CoreError> {
        let map = self.get_map(key)?;
        map.iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|name| (k.clone(), StreamId::from_name(name)))
                    .ok_or_else(|| type_mismatch(key, "map of stream names"))
            })
            .collect()
    }

    /// `Stream-Routes`: a named-route table (source stream name → target
    /// stream name) for a routed-style router; the broadcast router in scope
    /// here (§4.7) does not consume it, but the accessor is part of the
    /// typed-reader contract §6 names.
    fn get_routes(&self, key: &str) -> Result<Vec<(StreamId, StreamId)>, CoreError> {
        let map = self.get_map(key)?;
        map.iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|target| (StreamId::from_name(k), StreamId::from_name(target)))
                    .ok_or_else(|| type_mismatch(key, "map of stream routes"))
            })
            .collect()
    }

    /// A single nested plugin definition (`{Type, ...}`), re-exposed as its
    /// own `MapConfigReader` so a (still out of scope) plugin registry can
    /// recurse into it without this crate knowing about plugin types.
    fn get_plugin(&self, key: &str) -> Result<MapConfigReader, CoreError> {
        Ok(MapConfigReader { values: self.get_map(key)? })
    }

    /// An ordered list of nested plugin definitions (e.g. `Modulators`):
    /// each entry re-exposed the same way as [`ConfigReader::get_plugin`].
    fn get_plugin_array(&self, key: &str) -> Result<Vec<MapConfigReader>, CoreError> {
        Ok(self
            .get_plugin_array_raw(key)?
            .into_iter()
            .map(|values| MapConfigReader { values })
            .collect())
    }

    /// 便捷方法：字符串键不存在时返回 `default`。常用于 §6 表中标注了
    /// 默认值的选项（`ShutdownTimeoutMs`、`Channel` 等）。
    fn get_uint_or(&self, key: &str, default: u64) -> u64 {
        self.get_uint(key).unwrap_or(default)
    }

    fn get_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.get_uint_or("ShutdownTimeoutMs", 1000))
    }

    fn get_channel_capacity(&self) -> usize {
        self.get_uint_or("Channel", 8192) as usize
    }

    fn get_batch_max_count(&self) -> usize {
        self.get_uint_or("Batch/MaxCount", 8192) as usize
    }

    /// `Batch/FlushCount`，默认为 4096，按 §6 表的要求不得超过 `MaxCount`。
    fn get_batch_flush_count(&self) -> usize {
        let max = self.get_batch_max_count();
        (self.get_uint_or("Batch/FlushCount", 4096) as usize).min(max)
    }

    fn get_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.get_uint_or("Batch/TimeoutSec", 5))
    }

    /// `Batch/FlushTimeoutSec`: cap on the duration of the final `Flush` run
    /// by `MessageBatch::close`. Falls back to `Batch/TimeoutSec`'s own
    /// default when absent, since neither has an independent default in §6.
    fn get_batch_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.get_uint_or("Batch/FlushTimeoutSec", 5))
    }

    /// `ChannelTimeoutMs` (§4.1/§6): a signed millisecond count that selects
    /// one of the three `Push` policies — negative never blocks, zero blocks
    /// indefinitely, positive bounds the busy-yield wait.
    fn get_channel_timeout(&self) -> PushTimeout {
        match self.get_int("ChannelTimeoutMs") {
            Ok(ms) if ms < 0 => PushTimeout::NeverBlock,
            Ok(0) => PushTimeout::Block,
            Ok(ms) => PushTimeout::Bounded(Duration::from_millis(ms as u64)),
            Err(_) => PushTimeout::Block,
        }
    }
}

/// 进程内 `BTreeMap` 支持的 `ConfigReader`，供测试与程序化装配
/// 使用——替代明确划出范围之外的 YAML 加载器。
#[derive(Clone, Debug, Default)]
pub struct MapConfigReader {
    values: BTreeMap<String, ConfigValue>,
}

impl MapConfigReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    fn get(&self, key: &str) -> Result<&ConfigValue, CoreError> {
        self.values.get(key).ok_or_else(|| missing_key(key))
    }
}

impl ConfigReader for MapConfigReader {
    fn get_string(&self, key: &str) -> Result<String, CoreError> {
        self.get(key)?.as_str().map(str::to_string).ok_or_else(|| type_mismatch(key, "string"))
    }

    fn get_int(&self, key: &str) -> Result<i64, CoreError> {
        self.get(key)?.as_i64().ok_or_else(|| type_mismatch(key, "int"))
    }

    fn get_uint(&self, key: &str) -> Result<u64, CoreError> {
        self.get(key)?.as_u64().ok_or_else(|| type_mismatch(key, "uint"))
    }

    fn get_bool(&self, key: &str) -> Result<bool, CoreError> {
        self.get(key)?.as_bool().ok_or_else(|| type_mismatch(key, "bool"))
    }

    fn get_string_array(&self, key: &str) -> Result<Vec<String>, CoreError> {
        self.get(key)?.as_string_array().map(<[String]>::to_vec).ok_or_else(|| type_mismatch(key, "string array"))
    }

    fn get_map(&self, key: &str) -> Result<BTreeMap<String, ConfigValue>, CoreError> {
        self.get(key)?.as_map().cloned().ok_or_else(|| type_mismatch(key, "map"))
    }

    fn get_plugin_array_raw(&self, key: &str) -> Result<Vec<BTreeMap<String, ConfigValue>>, CoreError> {
        self.get(key)?.as_plugin_array().map(<[_]>::to_vec).ok_or_else(|| type_mismatch(key, "plugin array"))
    }
}

/// A fully-assembled modulator chain handed to a sink/router by the plugin
/// registry (out of scope here); kept as a thin alias so call sites that only
/// have a `ConfigReader` can still express "give me the chain for this key".
pub type ModulatorArrayFactory = Arc<dyn Fn(&dyn ConfigReader, &str) -> Result<ModulatorArray, CoreError> + Send + Sync>;

/// Same shape as [`ModulatorArrayFactory`], for `FilterArray`.
pub type FilterArrayFactory = Arc<dyn Fn(&dyn ConfigReader, &str) -> Result<Vec<Box<dyn Filter>>, CoreError> + Send + Sync>;

/// Same shape as [`ModulatorArrayFactory`], for `FormatterArray`.
pub type FormatterArrayFactory = Arc<dyn Fn(&dyn ConfigReader, &str) -> Result<Vec<Box<dyn Formatter>>, CoreError> + Send + Sync>;

/// §6's `ModulatorArray`/`FilterArray`/`FormatterArray` accessors: the
/// `ConfigReader` only carries typed values, so turning a `{Type, ...}`
/// plugin entry into a concrete `Filter`/`Formatter` is delegated to
/// `factory` — that construction step is the plugin registry's job (§1
/// Non-goals), not this crate's.
pub fn get_modulator_array(reader: &dyn ConfigReader, key: &str, factory: &ModulatorArrayFactory) -> Result<ModulatorArray, CoreError> {
    factory(reader, key)
}

pub fn get_filter_array(reader: &dyn ConfigReader, key: &str, factory: &FilterArrayFactory) -> Result<Vec<Box<dyn Filter>>, CoreError> {
    factory(reader, key)
}

pub fn get_formatter_array(reader: &dyn ConfigReader, key: &str, factory: &FormatterArrayFactory) -> Result<Vec<Box<dyn Formatter>>, CoreError> {
    factory(reader, key)
}

/// `Aggregate` 元类型展开：把一个父配置项展开为 N 个共享设置的
/// 子插件，子插件 id 为 `"<parentID>-<childKey>"`。本 crate 不解析配置文件，
/// 只提供这个命名约定供（范围外的）配置加载器调用。
pub fn expand_aggregate(parent_id: &str, child_keys: &[String]) -> Vec<String> {
    child_keys.iter().map(|child| format!("{parent_id}-{child}")).collect()
}

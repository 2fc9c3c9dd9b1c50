//! `Formatter`：变换载荷或具名元数据字段。

use async_trait::async_trait;

use crate::error::CoreError;
use crate::message::Message;

use super::{Modulator, ModulatorVerdict};

/// Formatter 读写的字段：空名称指向载荷，其余名称指向元数据字段。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSelector {
    Payload,
    Metadata(String),
}

impl FieldSelector {
    pub fn named(name: &str) -> Self {
        if name.is_empty() {
            FieldSelector::Payload
        } else {
            FieldSelector::Metadata(name.to_string())
        }
    }

    fn read(&self, msg: &Message) -> Vec<u8> {
        match self {
            FieldSelector::Payload => msg.payload().to_vec(),
            FieldSelector::Metadata(key) => msg.metadata().get(key).unwrap_or(&[]).to_vec(),
        }
    }

    fn write(&self, msg: &mut Message, value: Vec<u8>) {
        match self {
            FieldSelector::Payload => msg.store_payload(value),
            FieldSelector::Metadata(key) => msg.metadata_mut().set(key.clone(), value),
        }
    }
}

/// 实际做字节变换的逻辑，配合 [`FieldSelector`] 的读写宿主使用。
#[async_trait]
pub trait Formatter: Send + Sync {
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, CoreError>;
}

/// 把 `Formatter` 逻辑与字段选择组合为 `Modulator`。
///
/// `Source`（读取）与 `Target`（写入）可分别配置；`ApplyTo` 是两者相同时的
/// 简写构造器。`skip_if_empty` 时，若源字段为空则跳过变换直接 `Continue`，
/// 保持消息不变。
pub struct FormatterModulator<F> {
    logic: F,
    source: FieldSelector,
    target: FieldSelector,
    skip_if_empty: bool,
}

impl<F: Formatter> FormatterModulator<F> {
    pub fn new(logic: F, source: FieldSelector, target: FieldSelector) -> Self {
        Self { logic, source, target, skip_if_empty: false }
    }

    /// `ApplyTo` 简写：源与目标为同一字段。
    pub fn apply_to(logic: F, field: FieldSelector) -> Self {
        Self { logic, source: field.clone(), target: field, skip_if_empty: false }
    }

    pub fn with_skip_if_empty(mut self, skip: bool) -> Self {
        self.skip_if_empty = skip;
        self
    }
}

#[async_trait]
impl<F: Formatter + Send + Sync> Modulator for FormatterModulator<F> {
    async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict {
        let input = self.source.read(msg);
        if self.skip_if_empty && input.is_empty() {
            return ModulatorVerdict::Continue;
        }
        match self.logic.transform(&input).await {
            Ok(output) => {
                self.target.write(msg, output);
                ModulatorVerdict::Continue
            }
            Err(_) => ModulatorVerdict::Discard,
        }
    }
}

/// 将输入转为大写 ASCII。
pub struct UpperCaseFormatter;

#[async_trait]
impl Formatter for UpperCaseFormatter {
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(input.to_ascii_uppercase())
    }
}

/// 在输入末尾追加固定后缀。
pub struct AppendSuffixFormatter {
    pub suffix: Vec<u8>,
}

#[async_trait]
impl Formatter for AppendSuffixFormatter {
    async fn transform(&self, input: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut out = input.to_vec();
        out.extend_from_slice(&self.suffix);
        Ok(out)
    }
}

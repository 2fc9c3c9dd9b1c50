//! `Filter`：接受/拒绝裁决，不改变载荷。

use async_trait::async_trait;

use crate::ids::StreamId;
use crate::message::Message;

use super::{Modulator, ModulatorVerdict};

/// Filter 的原始裁决。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// 拒绝并指定改道目标；`target == StreamId::INVALID` 表示直接丢弃。
    Reject(StreamId),
}

/// 只读判定消息是否放行的 Modulator 特化。
#[async_trait]
pub trait Filter: Send + Sync {
    async fn check(&self, msg: &Message) -> FilterVerdict;
}

/// 把任意 `Filter` 包装为 `Modulator`：
/// `Accept → Continue`；`Reject(Invalid) → Discard`；
/// `Reject(target)` 其他情况下设置 `streamID` 并返回 `Fallback`。
pub struct FilterModulator<F>(pub F);

#[async_trait]
impl<F: Filter> Modulator for FilterModulator<F> {
    async fn modulate(&self, msg: &mut Message) -> ModulatorVerdict {
        match self.0.check(msg).await {
            FilterVerdict::Accept => ModulatorVerdict::Continue,
            FilterVerdict::Reject(target) if target.is_invalid() => ModulatorVerdict::Discard,
            FilterVerdict::Reject(target) => {
                msg.set_stream_id(target);
                ModulatorVerdict::Fallback
            }
        }
    }
}

/// 示例 Filter：按元数据字段的字节值前缀匹配拒绝消息。
pub struct PrefixRejectFilter {
    pub field: &'static str,
    pub prefix: Vec<u8>,
    pub reroute_to: StreamId,
}

#[async_trait]
impl Filter for PrefixRejectFilter {
    async fn check(&self, msg: &Message) -> FilterVerdict {
        let value = if self.field.is_empty() {
            msg.payload()
        } else {
            msg.metadata().get(self.field).unwrap_or(&[])
        };
        if value.starts_with(&self.prefix) {
            FilterVerdict::Reject(self.reroute_to)
        } else {
            FilterVerdict::Accept
        }
    }
}

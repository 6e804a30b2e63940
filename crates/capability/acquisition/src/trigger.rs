//! 触发标签的上升沿检测。
//!
//! 配置了触发标签时，只有该标签由 false 变为 true 的那个批次落库；
//! 其余批次仍然广播给订阅者。

use domain::{SampleBatch, SampleValue};

/// 单个触发标签的边沿状态。
#[derive(Debug, Clone)]
pub(crate) struct Trigger {
    tag: String,
    previous: bool,
}

impl Trigger {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            previous: false,
        }
    }

    pub(crate) fn tag(&self) -> &str {
        &self.tag
    }

    /// 返回本批次是否为上升沿。
    ///
    /// 标签缺失或坏质量时不改变上一电平。
    pub(crate) fn observe(&mut self, batch: &SampleBatch) -> bool {
        let Some(current) = batch
            .samples
            .iter()
            .find(|sample| sample.tag == self.tag && sample.quality)
            .and_then(|sample| sample.value.as_ref())
            .and_then(level)
        else {
            return false;
        };
        let fired = !self.previous && current;
        self.previous = current;
        fired
    }
}

fn level(value: &SampleValue) -> Option<bool> {
    match value {
        SampleValue::Bool(v) => Some(*v),
        other => other.as_f64().map(|v| v != 0.0),
    }
}

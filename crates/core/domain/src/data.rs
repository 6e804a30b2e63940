use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// 样本值的数据类型。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl SampleValue {
    /// 存储层使用的类型标记。
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::I64(_) => "i64",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::I64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::String(v) => v.parse::<f64>().ok(),
        }
    }
}

impl std::fmt::Display for SampleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::I64(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
        }
    }
}

/// 单个标签的一次读数。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub tag: String,
    /// 质量为 false 时为空
    pub value: Option<SampleValue>,
    pub quality: bool,
    /// 质量降级原因（不落库）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Sample {
    pub fn good(tag: impl Into<String>, value: SampleValue) -> Self {
        Self {
            tag: tag.into(),
            value: Some(value),
            quality: true,
            error: None,
        }
    }

    pub fn bad(tag: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: None,
            quality: false,
            error: Some(error.into()),
        }
    }
}

/// 一个成功周期产生的样本批次。
///
/// 由单个适配器一次性创建，之后不可变；存储层消费一次。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBatch {
    pub timestamp: DateTime<Utc>,
    /// 与请求的标签顺序一致
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(timestamp: DateTime<Utc>, samples: Vec<Sample>) -> Self {
        Self { timestamp, samples }
    }

    pub fn ts_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// 批次所属的 UTC 日期（决定分区）。
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn good_count(&self) -> usize {
        self.samples.iter().filter(|sample| sample.quality).count()
    }

    pub fn bad_samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|sample| !sample.quality)
    }
}

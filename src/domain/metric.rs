// Live metric values and the frames that carry them to clients
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observation from a provider. The payload is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl MetricValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self::at(value, Utc::now())
    }

    pub fn at(value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameErrorCode {
    UnknownBinding,
    ProviderExhausted,
    BadRequest,
}

/// Server to client message on a live channel. `binding` is the id the
/// subscription was attached under (a widget id, or the topic itself for
/// ad-hoc subscriptions); `topic` is the provider source it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamFrame {
    Subscribed {
        binding: String,
        topic: String,
        interval: u64,
    },
    Value {
        binding: String,
        topic: String,
        /// Tick number within the subscription; gaps mean dropped values.
        seq: u64,
        #[serde(flatten)]
        metric: MetricValue,
    },
    Unsubscribed {
        binding: String,
        topic: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        binding: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        code: FrameErrorCode,
        message: String,
    },
}

impl StreamFrame {
    pub fn error(
        binding: Option<&str>,
        topic: Option<&str>,
        code: FrameErrorCode,
        message: impl Into<String>,
    ) -> Self {
        StreamFrame::Error {
            binding: binding.map(str::to_string),
            topic: topic.map(str::to_string),
            code,
            message: message.into(),
        }
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            StreamFrame::Subscribed { topic, .. }
            | StreamFrame::Value { topic, .. }
            | StreamFrame::Unsubscribed { topic, .. } => Some(topic),
            StreamFrame::Error { topic, .. } => topic.as_deref(),
        }
    }

    pub fn binding(&self) -> Option<&str> {
        match self {
            StreamFrame::Subscribed { binding, .. }
            | StreamFrame::Value { binding, .. }
            | StreamFrame::Unsubscribed { binding, .. } => Some(binding),
            StreamFrame::Error { binding, .. } => binding.as_deref(),
        }
    }
}

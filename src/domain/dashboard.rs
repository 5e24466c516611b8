// Dashboard domain model
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Opaque key/value document owned by rendering clients.
pub type Bag = Map<String, Value>;

/// A named, coded collection of widgets.
///
/// `code` is the natural key used for lookup and never changes once the
/// document is created. `id` is assigned by the store on first save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_config: Option<Bag>,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Bag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Bag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_binding: Option<DataBinding>,
}

/// How a widget obtains live data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingMode {
    /// Client polls the data endpoint at its own cadence.
    #[serde(rename = "http", alias = "poll")]
    Poll,
    /// Server pushes values over a live channel.
    #[serde(rename = "websocket", alias = "stream")]
    Stream,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBinding {
    pub mode: BindingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Milliseconds. Polling hint for `Poll`, emission period for `Stream`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("dashboard code must not be empty")]
    EmptyCode,
    #[error("duplicate widget id `{0}`")]
    DuplicateWidget(String),
    #[error("widget `{0}` binds data without naming a source")]
    MissingSource(String),
    #[error("widget `{0}` declares a zero interval")]
    ZeroInterval(String),
}

impl DashboardSchema {
    /// Structural checks applied before a document is persisted.
    ///
    /// Whether a binding's source resolves is deliberately not checked here:
    /// a dashboard with an unknown source still saves, only that widget
    /// fails to stream.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.code.trim().is_empty() {
            return Err(SchemaError::EmptyCode);
        }

        let mut seen = HashSet::new();
        for widget in &self.widgets {
            if !seen.insert(widget.id.as_str()) {
                return Err(SchemaError::DuplicateWidget(widget.id.clone()));
            }
            if let Some(binding) = &widget.data_binding {
                if binding.source().is_none() {
                    return Err(SchemaError::MissingSource(widget.id.clone()));
                }
                if binding.interval == Some(0) {
                    return Err(SchemaError::ZeroInterval(widget.id.clone()));
                }
            }
        }

        Ok(())
    }

    /// Widgets whose binding asks for server push, in display order.
    pub fn stream_bindings(&self) -> impl Iterator<Item = (&str, &DataBinding)> {
        self.widgets.iter().filter_map(|w| match &w.data_binding {
            Some(b) if b.mode == BindingMode::Stream => Some((w.id.as_str(), b)),
            _ => None,
        })
    }
}

impl DataBinding {
    pub fn stream(topic: impl Into<String>, interval: Option<u64>) -> Self {
        Self {
            mode: BindingMode::Stream,
            api: None,
            topic: Some(topic.into()),
            interval,
        }
    }

    #[cfg(test)]
    pub fn poll(api: impl Into<String>) -> Self {
        Self {
            mode: BindingMode::Poll,
            api: Some(api.into()),
            topic: None,
            interval: None,
        }
    }

    /// The key the provider registry resolves.
    ///
    /// Stream bindings prefer `topic`, poll bindings prefer `api`. Endpoint
    /// paths such as `/api/data/online-users` or `/ws/data/online-users`
    /// reduce to their trailing key.
    pub fn source(&self) -> Option<&str> {
        let raw = match self.mode {
            BindingMode::Stream => self.topic.as_deref().or(self.api.as_deref()),
            BindingMode::Poll => self.api.as_deref().or(self.topic.as_deref()),
        }?;

        let key = raw
            .strip_prefix("/api/data/")
            .or_else(|| raw.strip_prefix("/ws/data/"))
            .unwrap_or(raw)
            .trim_matches('/');

        (!key.is_empty()).then_some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overview() -> Value {
        json!({
            "code": "index-overview",
            "name": "Overview",
            "canvasConfig": {"width": 1920, "height": 1080, "background": "#0b1120"},
            "widgets": [
                {
                    "id": "w1",
                    "type": "stat-card",
                    "props": {"title": "Online", "unit": "", "color": "#38bdf8"},
                    "position": {"x": 10, "y": 20, "w": 260, "h": 120},
                    "dataBinding": {"mode": "websocket", "topic": "online-users", "interval": 1000}
                },
                {
                    "id": "w2",
                    "type": "line-chart",
                    "props": {},
                    "position": {"x": 300, "y": 20, "w": 400, "h": 240},
                    "dataBinding": {"mode": "http", "api": "/api/data/online-users", "interval": 5000}
                },
                {
                    "id": "w3",
                    "type": "table",
                    "props": {"rows": [[1, 2], [3, 4]]},
                    "position": {"x": 0, "y": 300, "w": 700, "h": 200}
                }
            ]
        })
    }

    #[test]
    fn test_wire_format_survives_unmodified() {
        let doc = overview();
        let schema: DashboardSchema = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(schema.widgets.len(), 3);
        assert_eq!(schema.widgets[0].kind, "stat-card");
        assert_eq!(serde_json::to_value(&schema).unwrap(), doc);
    }

    #[test]
    fn test_absent_and_empty_bags_round_trip_as_sent() {
        let doc = json!({
            "code": "bare",
            "widgets": [
                {"id": "w1", "type": "table"},
                {"id": "w2", "type": "table", "props": {}, "position": {}}
            ]
        });
        let schema: DashboardSchema = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(schema.widgets[0].props, None);
        assert_eq!(schema.widgets[1].props, Some(Bag::new()));
        let mut encoded = serde_json::to_value(&schema).unwrap();
        assert_eq!(encoded.as_object_mut().unwrap().remove("name"), Some(json!("")));
        assert_eq!(encoded, doc);
    }

    #[test]
    fn test_mode_aliases() {
        let binding: DataBinding =
            serde_json::from_value(json!({"mode": "stream", "topic": "cpu"})).unwrap();
        assert_eq!(binding.mode, BindingMode::Stream);
        let binding: DataBinding =
            serde_json::from_value(json!({"mode": "poll", "api": "cpu"})).unwrap();
        assert_eq!(binding.mode, BindingMode::Poll);
        assert_eq!(serde_json::to_value(&binding).unwrap()["mode"], "http");
    }

    #[test]
    fn test_source_normalisation() {
        assert_eq!(DataBinding::poll("/api/data/online-users").source(), Some("online-users"));
        assert_eq!(DataBinding::stream("/ws/data/cpu", None).source(), Some("cpu"));
        assert_eq!(DataBinding::stream("memory", None).source(), Some("memory"));
        assert_eq!(DataBinding::stream("/api/data/", None).source(), None);

        let both = DataBinding {
            mode: BindingMode::Stream,
            api: Some("/api/data/a".into()),
            topic: Some("b".into()),
            interval: None,
        };
        assert_eq!(both.source(), Some("b"));
        assert_eq!(DataBinding { mode: BindingMode::Poll, ..both }.source(), Some("a"));
    }

    #[test]
    fn test_validate() {
        let schema: DashboardSchema = serde_json::from_value(overview()).unwrap();
        assert_eq!(schema.validate(), Ok(()));

        let mut dup = schema.clone();
        dup.widgets[1].id = "w1".into();
        assert_eq!(dup.validate(), Err(SchemaError::DuplicateWidget("w1".into())));

        let mut blank = schema.clone();
        blank.code = "  ".into();
        assert_eq!(blank.validate(), Err(SchemaError::EmptyCode));

        let mut zero = schema.clone();
        zero.widgets[0].data_binding.as_mut().unwrap().interval = Some(0);
        assert_eq!(zero.validate(), Err(SchemaError::ZeroInterval("w1".into())));

        let mut sourceless = schema;
        sourceless.widgets[0].data_binding.as_mut().unwrap().topic = None;
        assert_eq!(sourceless.validate(), Err(SchemaError::MissingSource("w1".into())));
    }

    #[test]
    fn test_stream_bindings_skip_poll_and_unbound() {
        let schema: DashboardSchema = serde_json::from_value(overview()).unwrap();
        let ids: Vec<&str> = schema.stream_bindings().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["w1"]);
    }
}

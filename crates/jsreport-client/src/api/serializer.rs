//! Canonical JSON body for `POST /api/report`.
//!
//! Every way of asking for a render (typed request, shortid + data, name +
//! data, arbitrary object) first becomes a [`RenderPayload`]. Serialization
//! happens in one place, [`RenderPayload::to_json`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ReportError, Result};
use crate::request::RenderRequest;

/// Input data attached to a stored-template render.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RenderData {
    /// No `data` property is sent.
    #[default]
    None,
    /// Pre-serialized JSON text, embedded as a JSON value.
    Json(String),
    Value(Value),
}

impl RenderData {
    /// Serialize any value into render data.
    pub fn from_serialize(data: &impl Serialize) -> Result<Self> {
        serde_json::to_value(data)
            .map(RenderData::Value)
            .map_err(ReportError::Serialization)
    }

    fn into_value(self) -> Result<Option<Value>> {
        match self {
            RenderData::None => Ok(None),
            RenderData::Json(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(ReportError::Serialization),
            RenderData::Value(value) => Ok(Some(value)),
        }
    }
}

/// Normalized render request, whatever shape the caller started from.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderPayload {
    Typed(RenderRequest),
    ByShortid { shortid: String, data: RenderData },
    ByName { name: String, data: RenderData },
    /// Caller-built object sent as-is; matching the server schema is the
    /// caller's job.
    Raw(Value),
}

impl RenderPayload {
    /// Stored template by short id, with data serialized from `data`.
    pub fn by_shortid(shortid: impl Into<String>, data: &impl Serialize) -> Result<Self> {
        Ok(RenderPayload::ByShortid {
            shortid: shortid.into(),
            data: RenderData::from_serialize(data)?,
        })
    }

    /// Stored template by short id, with data given as JSON text.
    pub fn by_shortid_json(shortid: impl Into<String>, json: impl Into<String>) -> Self {
        RenderPayload::ByShortid {
            shortid: shortid.into(),
            data: RenderData::Json(json.into()),
        }
    }

    pub fn by_name(name: impl Into<String>, data: &impl Serialize) -> Result<Self> {
        Ok(RenderPayload::ByName {
            name: name.into(),
            data: RenderData::from_serialize(data)?,
        })
    }

    pub fn by_name_json(name: impl Into<String>, json: impl Into<String>) -> Self {
        RenderPayload::ByName {
            name: name.into(),
            data: RenderData::Json(json.into()),
        }
    }

    /// Any serializable object matching the render request shape.
    pub fn from_value(request: &impl Serialize) -> Result<Self> {
        serde_json::to_value(request)
            .map(RenderPayload::Raw)
            .map_err(ReportError::Serialization)
    }

    /// Build the JSON document sent to the server.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            RenderPayload::Typed(request) => {
                request.validate()?;
                serde_json::to_value(request).map_err(ReportError::Serialization)
            }
            RenderPayload::ByShortid { shortid, data } => {
                stored_template("shortid", shortid, data.clone())
            }
            RenderPayload::ByName { name, data } => stored_template("name", name, data.clone()),
            RenderPayload::Raw(value) => Ok(value.clone()),
        }
    }

    /// Serialize to the request body text.
    pub fn to_json(&self) -> Result<String> {
        let value = self.to_value()?;
        serde_json::to_string(&value).map_err(ReportError::Serialization)
    }
}

fn stored_template(key: &str, id: &str, data: RenderData) -> Result<Value> {
    let mut template = Map::new();
    template.insert(key.to_string(), Value::String(id.to_string()));
    let mut body = Map::new();
    body.insert("template".to_string(), Value::Object(template));
    if let Some(data) = data.into_value()? {
        body.insert("data".to_string(), data);
    }
    Ok(Value::Object(body))
}

impl From<RenderRequest> for RenderPayload {
    fn from(request: RenderRequest) -> Self {
        RenderPayload::Typed(request)
    }
}

impl From<Value> for RenderPayload {
    fn from(value: Value) -> Self {
        RenderPayload::Raw(value)
    }
}

//! Render request model.
//!
//! A [`RenderRequest`] mirrors the JSON document accepted by
//! `POST /api/report`: a [`Template`], optional input `data`, and optional
//! [`RenderOptions`]. Engines and recipes are open sets validated by the
//! server, so [`Engine`] and [`Recipe`] keep unknown names verbatim.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ReportError, Result};

/// Declares a string enum with a catch-all `Other` variant that round-trips
/// unknown names untouched.
macro_rules! open_string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A name this client does not know. Forwarded as-is.
            Other(String),
        }

        impl $name {
            /// The name sent on the wire.
            pub fn as_str(&self) -> &str {
                match self {
                    $( $name::$variant => $wire, )+
                    $name::Other(name) => name,
                }
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                match name {
                    $( $wire => $name::$variant, )+
                    other => $name::Other(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                $name::from(name.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                String::deserialize(deserializer).map($name::from)
            }
        }
    };
}

open_string_enum! {
    /// Templating engine that evaluates the template content.
    Engine {
        /// Content is passed through untouched.
        None => "none",
        Jsrender => "jsrender",
        Handlebars => "handlebars",
    }
}

open_string_enum! {
    /// Recipe that turns the evaluated content into the output document.
    Recipe {
        Html => "html",
        Text => "text",
        PhantomPdf => "phantom-pdf",
        ChromePdf => "chrome-pdf",
        HtmlToXlsx => "html-to-xlsx",
        Xlsx => "xlsx",
        Docx => "docx",
    }
}

/// How a template is addressed on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateAddress {
    /// A stored template looked up by its short id.
    Shortid,
    /// A stored template looked up by name.
    Name,
    /// Anonymous template sent with its content.
    Content,
}

/// Template section of a render request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Template {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Recipe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JavaScript helper functions available to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpers: Option<String>,
    /// Recipe-specific properties (`chrome`, `phantom`, ...) forwarded verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Template {
    /// Anonymous template rendered from the given content.
    pub fn inline(
        content: impl Into<String>,
        engine: impl Into<Engine>,
        recipe: impl Into<Recipe>,
    ) -> Self {
        Self {
            content: Some(content.into()),
            engine: Some(engine.into()),
            recipe: Some(recipe.into()),
            ..Default::default()
        }
    }

    /// Stored template identified by short id.
    pub fn by_shortid(shortid: impl Into<String>) -> Self {
        Self {
            shortid: Some(shortid.into()),
            ..Default::default()
        }
    }

    /// Stored template identified by name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_helpers(mut self, helpers: impl Into<String>) -> Self {
        self.helpers = Some(helpers.into());
        self
    }

    /// Add a template property this client does not model.
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The addressing mode, or `None` unless exactly one of shortid, name,
    /// and content is present.
    pub fn addressing(&self) -> Option<TemplateAddress> {
        match (&self.shortid, &self.name, &self.content) {
            (Some(_), None, None) => Some(TemplateAddress::Shortid),
            (None, Some(_), None) => Some(TemplateAddress::Name),
            (None, None, Some(_)) => Some(TemplateAddress::Content),
            _ => None,
        }
    }
}

/// Options section of a render request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Ask the server for a browser-friendly preview (e.g. xlsx in an iframe).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
    /// Server-side render timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A complete, typed render request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RenderRequest {
    pub template: Template,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RenderOptions>,
}

impl RenderRequest {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            data: None,
            options: None,
        }
    }

    /// Attach input data, serializing it to JSON.
    pub fn with_data(mut self, data: &impl Serialize) -> Result<Self> {
        self.data = Some(serde_json::to_value(data).map_err(ReportError::Serialization)?);
        Ok(self)
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Check that the template uses exactly one addressing mode.
    pub fn validate(&self) -> Result<TemplateAddress> {
        self.template.addressing().ok_or_else(|| {
            ReportError::InvalidRequest(
                "template must set exactly one of `shortid`, `name` or `content`".to_string(),
            )
        })
    }
}

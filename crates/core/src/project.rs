//! Site-definition document submitted for a build.
//!
//! Field names follow the camelCase JSON produced by the site editor. Most
//! fields default when absent so partially filled documents still decode;
//! components are the exception, see [`Component`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Page id reserved for the layout used to render blog posts.
pub const BLOG_POST_LAYOUT_PAGE_ID: &str = "blog-post";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub global_config: GlobalConfig,
    pub pages: Vec<Page>,
    pub blog_posts: Vec<BlogPost>,
}

impl Project {
    /// The page whose layout renders blog posts, if any.
    pub fn blog_post_layout(&self) -> Option<&Page> {
        self.pages
            .iter()
            .find(|p| p.id == BLOG_POST_LAYOUT_PAGE_ID)
    }

    /// Regular pages, i.e. everything except the blog post layout page.
    pub fn site_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages
            .iter()
            .filter(|p| p.id != BLOG_POST_LAYOUT_PAGE_ID)
    }
}

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub theme: Theme,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub colors: Colors,
    pub typography: Typography,
    pub spacing: Spacing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Colors {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Typography {
    pub font_family: String,
    pub font_sizes: FontSizes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSizes {
    #[serde(rename = "sm")]
    pub small: String,
    pub base: String,
    #[serde(rename = "lg")]
    pub large: String,
    #[serde(rename = "xl")]
    pub xlarge: String,
    #[serde(rename = "2xl")]
    pub xxlarge: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Spacing {
    #[serde(rename = "sm")]
    pub small: String,
    #[serde(rename = "md")]
    pub medium: String,
    #[serde(rename = "lg")]
    pub large: String,
    #[serde(rename = "xl")]
    pub xlarge: String,
}

// ---------------------------------------------------------------------------
// Pages and posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub id: String,
    pub name: String,
    pub path: String,
    pub layout: String,
    pub config: PageConfig,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub header: SectionConfig,
    pub main: SectionConfig,
    pub footer: SectionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionConfig {
    pub class_names: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub created_date: String,
    pub author: String,
    pub read_time: String,
    pub preview: String,
    pub content: Vec<Component>,
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// A page or post building block, selected by its `type` tag.
///
/// Decoding goes through [`COMPONENT_DECODERS`]; a missing or unknown tag is
/// an error rather than a fallback variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Component {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    Link { url: String, label: String },
    Button { url: String, label: String },
    Image {
        url: String,
        #[serde(rename = "label")]
        alt: String,
    },
    List { items: Vec<String> },
    Quote {
        text: String,
        #[serde(rename = "label")]
        cite: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    #[error("component must be a JSON object")]
    NotAnObject,

    #[error("component is missing its \"type\" tag")]
    MissingTag,

    #[error("unknown component type \"{0}\"")]
    UnknownTag(String),

    #[error("{tag} component requires field \"{field}\"")]
    MissingField {
        tag: &'static str,
        field: &'static str,
    },

    #[error("{tag} component has an invalid \"{field}\" field")]
    InvalidField {
        tag: &'static str,
        field: &'static str,
    },
}

type Decoder = fn(&Map<String, Value>) -> Result<Component, ComponentError>;

/// Tag → decoder lookup table for [`Component`].
pub const COMPONENT_DECODERS: &[(&str, Decoder)] = &[
    ("heading", decode_heading),
    ("paragraph", decode_paragraph),
    ("link", decode_link),
    ("button", decode_button),
    ("image", decode_image),
    ("list", decode_list),
    ("quote", decode_quote),
];

impl Component {
    pub fn from_value(value: &Value) -> Result<Self, ComponentError> {
        let obj = value.as_object().ok_or(ComponentError::NotAnObject)?;
        let tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ComponentError::MissingTag)?;
        let (_, decode) = COMPONENT_DECODERS
            .iter()
            .find(|(name, _)| *name == tag)
            .ok_or_else(|| ComponentError::UnknownTag(tag.to_string()))?;
        decode(obj)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Component::Heading { .. } => "heading",
            Component::Paragraph { .. } => "paragraph",
            Component::Link { .. } => "link",
            Component::Button { .. } => "button",
            Component::Image { .. } => "image",
            Component::List { .. } => "list",
            Component::Quote { .. } => "quote",
        }
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Component::from_value(&value).map_err(D::Error::custom)
    }
}

fn required_str(
    obj: &Map<String, Value>,
    tag: &'static str,
    field: &'static str,
) -> Result<String, ComponentError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ComponentError::InvalidField { tag, field }),
        None => Err(ComponentError::MissingField { tag, field }),
    }
}

fn optional_str(
    obj: &Map<String, Value>,
    tag: &'static str,
    field: &'static str,
) -> Result<Option<String>, ComponentError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ComponentError::InvalidField { tag, field }),
    }
}

fn decode_heading(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    let level = match obj.get("level") {
        None | Some(Value::Null) => 2,
        Some(v) => v
            .as_u64()
            .filter(|l| (1..=6).contains(l))
            .ok_or(ComponentError::InvalidField {
                tag: "heading",
                field: "level",
            })? as u8,
    };
    Ok(Component::Heading {
        level,
        text: required_str(obj, "heading", "text")?,
    })
}

fn decode_paragraph(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    Ok(Component::Paragraph {
        text: required_str(obj, "paragraph", "text")?,
    })
}

fn decode_link(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    Ok(Component::Link {
        url: required_str(obj, "link", "url")?,
        label: required_str(obj, "link", "label")?,
    })
}

fn decode_button(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    Ok(Component::Button {
        url: required_str(obj, "button", "url")?,
        label: required_str(obj, "button", "label")?,
    })
}

fn decode_image(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    Ok(Component::Image {
        url: required_str(obj, "image", "url")?,
        alt: optional_str(obj, "image", "label")?.unwrap_or_default(),
    })
}

fn decode_list(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    let invalid = ComponentError::InvalidField {
        tag: "list",
        field: "items",
    };
    let items = match obj.get("items") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or(invalid.clone()))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(invalid),
        None => {
            return Err(ComponentError::MissingField {
                tag: "list",
                field: "items",
            })
        }
    };
    Ok(Component::List { items })
}

fn decode_quote(obj: &Map<String, Value>) -> Result<Component, ComponentError> {
    Ok(Component::Quote {
        text: required_str(obj, "quote", "text")?,
        cite: optional_str(obj, "quote", "label")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

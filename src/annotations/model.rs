// Raw per-page annotation payload as written by the annotation tool
use serde::Deserialize;
use serde_json::Value;

pub const FIGURE_TAG: &str = "Figure";
pub const CAPTION_TAG: &str = "Caption";
const PARENT_PURPOSE: &str = "parent";

/// Annotation set for one page. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnnotationSet {
    #[serde(default)]
    pub canvas_width: Option<f64>,
    #[serde(default)]
    pub canvas_height: Option<f64>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// A single annotation.
///
/// `body` and `target` stay loosely typed: the tool emits bodies that are
/// sometimes objects instead of lists, and selectors in more than one shape.
/// Anything that does not fit the expected layout makes the annotation inert
/// rather than failing the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub target: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyTag<'a> {
    /// Classification label such as `Figure` or `Caption`.
    Category(&'a str),
    /// Edge to another annotation by id.
    Parent(&'a str),
}

impl Annotation {
    pub fn tags(&self) -> impl Iterator<Item = BodyTag<'_>> {
        self.body
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let value = item.get("value")?.as_str()?;
                match item.get("purpose").and_then(Value::as_str) {
                    Some(PARENT_PURPOSE) => Some(BodyTag::Parent(value)),
                    _ => Some(BodyTag::Category(value)),
                }
            })
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.tags().any(|tag| tag == BodyTag::Category(name))
    }

    /// The parent this annotation points at. With several parent tags the last one wins.
    pub fn parent_id(&self) -> Option<&str> {
        self.tags()
            .filter_map(|tag| match tag {
                BodyTag::Parent(id) => Some(id),
                BodyTag::Category(_) => None,
            })
            .last()
    }

    pub fn selector(&self) -> Option<&str> {
        self.target.pointer("/selector/value").and_then(Value::as_str)
    }
}

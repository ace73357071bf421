// Caption -> figure association for one page's annotation graph
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use super::model::{PageAnnotationSet, CAPTION_TAG, FIGURE_TAG};
use super::selector::parse_pixel_selector;
use crate::transform::CanvasTransform;
use crate::types::{CanvasRect, NativeRect};

/// What to do when more than one caption names the same figure as its parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptionConflictPolicy {
    /// Later captions in annotation order replace earlier ones.
    #[default]
    LastWins,
    /// The first caption claiming a figure is kept.
    FirstWins,
    /// A contested figure gets no caption at all.
    Reject,
}

/// A figure annotation with its rectangles mapped to native page space.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFigure {
    pub annotation_id: Option<String>,
    pub figure_rect: NativeRect,
    pub caption_rect: Option<NativeRect>,
}

struct CaptionIndex {
    policy: CaptionConflictPolicy,
    // None marks a parent whose captions were rejected as conflicting
    by_parent: HashMap<String, Option<CanvasRect>>,
}

impl CaptionIndex {
    fn new(policy: CaptionConflictPolicy) -> Self {
        Self {
            policy,
            by_parent: HashMap::new(),
        }
    }

    fn insert(&mut self, parent: &str, rect: CanvasRect) {
        match self.by_parent.entry(parent.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Some(rect));
            }
            Entry::Occupied(mut slot) => {
                debug!(parent, policy = ?self.policy, "Multiple captions claim the same figure");
                match self.policy {
                    CaptionConflictPolicy::LastWins => *slot.get_mut() = Some(rect),
                    CaptionConflictPolicy::FirstWins => {}
                    CaptionConflictPolicy::Reject => *slot.get_mut() = None,
                }
            }
        }
    }

    fn get(&self, parent: &str) -> Option<CanvasRect> {
        self.by_parent.get(parent).copied().flatten()
    }
}

/// Resolves every `Figure` annotation on the page, in input order, pairing it
/// with the caption that names it as parent.
///
/// Annotations with malformed selectors are skipped individually; the page
/// itself never fails here.
pub fn resolve_figures(
    page: &PageAnnotationSet,
    transform: &CanvasTransform,
    policy: CaptionConflictPolicy,
) -> Vec<ResolvedFigure> {
    let mut captions = CaptionIndex::new(policy);
    for annotation in &page.annotations {
        if !annotation.has_category(CAPTION_TAG) {
            continue;
        }
        let Some(parent) = annotation.parent_id() else {
            continue;
        };
        match annotation.selector().and_then(parse_pixel_selector) {
            Some(rect) => captions.insert(parent, rect),
            None => debug!(
                annotation = annotation.id.as_deref().unwrap_or("<none>"),
                "Dropping caption with malformed selector"
            ),
        }
    }

    let mut figures = Vec::new();
    for annotation in &page.annotations {
        if !annotation.has_category(FIGURE_TAG) {
            continue;
        }
        let Some(rect) = annotation.selector().and_then(parse_pixel_selector) else {
            debug!(
                annotation = annotation.id.as_deref().unwrap_or("<none>"),
                "Skipping figure with malformed selector"
            );
            continue;
        };
        let caption = annotation.id.as_deref().and_then(|id| captions.get(id));
        figures.push(ResolvedFigure {
            annotation_id: annotation.id.clone(),
            figure_rect: transform.apply(&rect),
            caption_rect: caption.map(|rect| transform.apply(&rect)),
        });
    }
    figures
}

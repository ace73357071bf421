// Canvas space -> native page space rescaling
use crate::types::{CanvasRect, NativeRect, PageSize};

/// Independent horizontal and vertical scale factors from the annotation
/// canvas to the document's native page units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasTransform {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl CanvasTransform {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// A canvas dimension that is absent, zero or non-finite leaves its axis unscaled.
    pub fn new(canvas_width: Option<f64>, canvas_height: Option<f64>, page: PageSize) -> Self {
        Self {
            scale_x: axis_scale(page.width, canvas_width),
            scale_y: axis_scale(page.height, canvas_height),
        }
    }

    pub fn apply(&self, rect: &CanvasRect) -> NativeRect {
        NativeRect::new(
            rect.x * self.scale_x,
            rect.y * self.scale_y,
            (rect.x + rect.width) * self.scale_x,
            (rect.y + rect.height) * self.scale_y,
        )
    }
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self::identity()
    }
}

fn axis_scale(native: f64, canvas: Option<f64>) -> f64 {
    match canvas {
        Some(canvas) if canvas != 0.0 && canvas.is_finite() => native / canvas,
        _ => 1.0,
    }
}

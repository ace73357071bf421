// Pixel selector parsing ("xywh=pixel:x,y,w,h")
use crate::types::CanvasRect;

const PIXEL_MARKER: &str = "pixel:";

/// Parses the rectangle after the `pixel:` marker.
///
/// Returns `None` when the marker is missing, the field count is not exactly
/// four, or any field is not a finite number.
pub fn parse_pixel_selector(selector: &str) -> Option<CanvasRect> {
    let (_, coords) = selector.split_once(PIXEL_MARKER)?;
    let mut fields = [0.0f64; 4];
    let mut parts = coords.split(',');
    for slot in fields.iter_mut() {
        let value: f64 = parts.next()?.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        *slot = value;
    }
    if parts.next().is_some() {
        return None;
    }
    let [x, y, width, height] = fields;
    Some(CanvasRect::new(x, y, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parses_pixel_selector() {
        assert_eq!(
            parse_pixel_selector("xywh=pixel:10.5,20,300,40.25"),
            Some(CanvasRect::new(10.5, 20.0, 300.0, 40.25))
        );
        assert_eq!(
            parse_pixel_selector("pixel: 1, 2, 3, 4"),
            Some(CanvasRect::new(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[rstest]
    #[case("xywh=10,20,30,40")]
    #[case("xywh=pixel:10,20,30")]
    #[case("xywh=pixel:10,20,30,40,50")]
    #[case("xywh=pixel:10,abc,30,40")]
    #[case("xywh=pixel:10,20,inf,40")]
    #[case("xywh=pixel:")]
    #[case("")]
    fn test_rejects_malformed_selector(#[case] selector: &str) {
        assert_eq!(parse_pixel_selector(selector), None);
    }
}

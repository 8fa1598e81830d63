//! Property tests for corner clipping and filter-graph sizing.

use proptest::prelude::*;
use zoomreel_edit_model::{CropRect, EditModel, OutputSize};
use zoomreel_processing_core::RectF;
use zoomreel_render_engine::compositor::{effective_corner_radius, rounded_rect_coverage};
use zoomreel_render_engine::{FilterGraph, SourceInfo};

proptest! {
    #[test]
    fn corner_radius_never_exceeds_half_side(
        radius in 0.0f64..5000.0,
        w in 1.0f64..4000.0,
        h in 1.0f64..4000.0,
    ) {
        let display = RectF::new(0.0, 0.0, w, h);
        let r = effective_corner_radius(radius, &display);
        prop_assert!(r >= 0.0);
        prop_assert!(r <= w.min(h) / 2.0 + 1e-9);
    }

    #[test]
    fn coverage_is_a_fraction(
        px in -50.0f64..250.0,
        py in -50.0f64..250.0,
        radius in 0.0f64..50.0,
    ) {
        let rect = RectF::new(0.0, 0.0, 200.0, 100.0);
        let c = rounded_rect_coverage(px, py, &rect, radius);
        prop_assert!((0.0..=1.0).contains(&c));
        if px < -1.0 || py < -1.0 || px > 201.0 || py > 101.0 {
            prop_assert_eq!(c, 0.0);
        }
        if (px - 100.0).abs() < 40.0 && (py - 50.0).abs() < 20.0 {
            prop_assert_eq!(c, 1.0);
        }
    }

    #[test]
    fn scaled_layer_has_even_size(
        x in 0.0f64..50.0,
        y in 0.0f64..50.0,
        w in 10.0f64..50.0,
        h in 10.0f64..50.0,
        padding in 0.0f64..40.0,
    ) {
        let mut model = EditModel::new(10.0);
        model.crop = CropRect::new(x, y, w, h);
        model.padding = padding;
        model.output_size = OutputSize::new(1280, 720, 30);
        let graph = FilterGraph::compile(&model, &SourceInfo::new(1920, 1080, 10.0));

        let scale = graph.stages.iter().find(|s| s.output == "scaled");
        prop_assert!(scale.is_some());
        let filter = &scale.map(|s| s.filter.clone()).unwrap_or_default();
        let dims = filter
            .trim_start_matches("scale=")
            .split(':')
            .take(2)
            .map(|d| d.parse::<u32>().unwrap_or(1))
            .collect::<Vec<_>>();
        prop_assert_eq!(dims.len(), 2);
        prop_assert!(dims.iter().all(|d| d % 2 == 0 && *d >= 2));
        prop_assert!(dims[0] <= 1280 && dims[1] <= 720);
    }
}

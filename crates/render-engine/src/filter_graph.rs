//! Filter-graph compiler: the edit model as an ffmpeg `filter_complex`.
//!
//! Instead of rendering pixels, this backend emits a chain of labeled stages
//! that an external engine executes:
//!
//! ```text
//! [0:v] ─ crop ─ zoompan ─ scale ─ corner mask ─┐
//!                                               ├─ overlay ─ [vout]
//!        background (color source or [1:v]) ────┘
//! ```
//!
//! Stages that would be no-ops are omitted. An edit with no crop, no zoom,
//! no padding, no corners, and a color background compiles to a single
//! letterbox stage.
//!
//! Zoom timing is expressed with zoompan's input timestamp `it`. The engine
//! seeks the source to the trim start, so every effect time is rebased by
//! `trim_start`. Effects are nested so the first effect in list order is the
//! outermost conditional and wins when windows overlap, matching the frame
//! compositor.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use zoomreel_edit_model::{Background, BackgroundFit, EditModel, ZoomEffect};
use zoomreel_processing_core::coords::{crop_to_pixels, display_rect};
use zoomreel_processing_core::easing::CubicEase;
use zoomreel_processing_core::ZoomEnvelope;

use crate::compositor::{effective_corner_radius, flattened_color};
use crate::io::SourceInfo;

/// Label of the final video stream.
pub const OUTPUT_LABEL: &str = "vout";

/// An input stream the graph reads, in `-i` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GraphInput {
    /// The source video (always input 0).
    Source,
    /// A still image looped for the whole export.
    Image { path: PathBuf },
}

/// One labeled stage: `[in]...filter[out]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStage {
    pub inputs: Vec<String>,
    pub filter: String,
    pub output: String,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        write!(f, "{}[{}]", self.filter, self.output)
    }
}

/// A compiled filter graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterGraph {
    pub inputs: Vec<GraphInput>,
    pub stages: Vec<FilterStage>,
    pub output_label: String,
    /// Ways this graph differs from the frame compositor's output.
    pub limitations: Vec<String>,
}

impl FilterGraph {
    /// Compile `model` for a source of the given size.
    pub fn compile(model: &EditModel, source: &SourceInfo) -> FilterGraph {
        GraphBuilder::new(model, source).build()
    }

    /// The `-filter_complex` argument.
    pub fn to_filter_complex(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

struct GraphBuilder {
    model: EditModel,
    source_w: u32,
    source_h: u32,
    stages: Vec<FilterStage>,
    inputs: Vec<GraphInput>,
    limitations: Vec<String>,
}

impl GraphBuilder {
    fn new(model: &EditModel, source: &SourceInfo) -> Self {
        Self {
            model: model.sanitized(),
            source_w: source.width.max(1),
            source_h: source.height.max(1),
            stages: Vec::new(),
            inputs: vec![GraphInput::Source],
            limitations: Vec::new(),
        }
    }

    fn push(&mut self, inputs: &[&str], filter: String, output: &str) {
        self.stages.push(FilterStage {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            filter,
            output: output.to_string(),
        });
    }

    /// Effects that overlap the trim window, in list order.
    fn active_effects(&self) -> Vec<ZoomEffect> {
        let (start, end) = (self.model.trim_start, self.model.trim_end);
        self.model
            .zoom_effects
            .iter()
            .filter(|e| e.end_time >= start && e.start_time <= end)
            .cloned()
            .collect()
    }

    fn build(mut self) -> FilterGraph {
        let out = self.model.output_size;
        let effects = self.active_effects();
        let passthrough = self.model.crop.is_full()
            && effects.is_empty()
            && self.model.padding <= 0.0
            && self.model.corner_radius_px <= 0.0
            && matches!(self.model.background, Background::Color { .. });

        if passthrough {
            let color = self.background_hex();
            self.push(
                &["0:v"],
                format!(
                    "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={color},setsar=1,fps={fps},format=yuv420p",
                    w = out.width,
                    h = out.height,
                    fps = out.fps,
                ),
                OUTPUT_LABEL,
            );
            return self.finish();
        }

        let mut current = "0:v".to_string();
        let crop = crop_to_pixels(&self.model.crop, self.source_w, self.source_h);

        if !self.model.crop.is_full() {
            self.push(
                &[&current],
                format!("crop={}:{}:{}:{}", crop.width, crop.height, crop.x, crop.y),
                "cropped",
            );
            current = "cropped".to_string();
        }

        if !effects.is_empty() {
            let filter =
                zoompan_filter(&effects, self.model.trim_start, crop.width, crop.height, out.fps);
            self.push(&[&current], filter, "zoomed");
            current = "zoomed".to_string();
            if !self.model.crop.is_full() {
                self.limitations.push(
                    "zoom origin is relative to the cropped stream, not the display box".into(),
                );
            }
            if self.model.padding > 0.0 {
                self.limitations.push(
                    "zoomed content stays inside the video layer instead of filling the padded box"
                        .into(),
                );
            }
        }

        // Same scale the compositor uses: the source fitted into the display
        // rect, applied to the cropped region.
        let display = display_rect(out.width, out.height, self.model.padding);
        let fit = (display.w / self.source_w as f64).min(display.h / self.source_h as f64);
        let layer_w = even(crop.width as f64 * fit);
        let layer_h = even(crop.height as f64 * fit);
        self.push(
            &[&current],
            format!("scale={layer_w}:{layer_h}:flags=lanczos,setsar=1"),
            "scaled",
        );
        current = "scaled".to_string();

        let radius = effective_corner_radius(self.model.corner_radius_px, &display)
            .min(layer_w.min(layer_h) as f64 / 2.0);
        if radius > 0.0 {
            self.push(&[&current], corner_mask_filter(radius), "rounded");
            current = "rounded".to_string();
            self.limitations
                .push("corner rounding is a hard-edged alpha mask without anti-aliasing".into());
        }

        let background = self.background_stage();
        self.push(
            &[&background, &current],
            "overlay=x=(W-w)/2:y=(H-h)/2:shortest=1,format=yuv420p".to_string(),
            OUTPUT_LABEL,
        );

        self.finish()
    }

    fn background_hex(&self) -> String {
        let hex = match &self.model.background {
            Background::Color { hex } => hex.as_str(),
            Background::Image { .. } => "#000000",
        };
        let [r, g, b] = flattened_color(hex);
        format!("0x{r:02x}{g:02x}{b:02x}")
    }

    /// Push the background stage and return its label.
    fn background_stage(&mut self) -> String {
        let out = self.model.output_size;
        let (w, h, fps) = (out.width, out.height, out.fps);
        match self.model.background.clone() {
            Background::Color { .. } => {
                let color = self.background_hex();
                self.push(&[], format!("color=c={color}:s={w}x{h}:r={fps}"), "bg");
            }
            Background::Image { source, fit } => {
                let index = self.inputs.len();
                self.inputs.push(GraphInput::Image { path: source });
                let sizing = match fit {
                    BackgroundFit::Cover => {
                        format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
                    }
                    BackgroundFit::Contain => format!(
                        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black"
                    ),
                    BackgroundFit::Fill => format!("scale={w}:{h}"),
                };
                let input = format!("{index}:v");
                self.push(&[&input], format!("{sizing},setsar=1,fps={fps}"), "bg");
            }
        }
        "bg".to_string()
    }

    fn finish(self) -> FilterGraph {
        FilterGraph {
            inputs: self.inputs,
            stages: self.stages,
            output_label: OUTPUT_LABEL.to_string(),
            limitations: self.limitations,
        }
    }
}

/// Round to an even pixel count, at least 2.
fn even(value: f64) -> u32 {
    let v = (value / 2.0).round() as u32 * 2;
    v.max(2)
}

/// `zoompan` stage driving zoom and pan from nested per-effect conditionals.
///
/// zoompan emits one frame per input frame stamped at `fps`, so the input is
/// resampled to the output rate first.
fn zoompan_filter(
    effects: &[ZoomEffect],
    trim_start: f64,
    width: u32,
    height: u32,
    fps: u32,
) -> String {
    let envelopes: Vec<ZoomEnvelope> = effects.iter().map(ZoomEnvelope::from_effect).collect();

    let z = nest(&envelopes, trim_start, "1", |env| amount_expr(env, trim_start));
    let x = nest(&envelopes, trim_start, "0", |env| {
        format!("(iw-iw/zoom)*{:.6}", env.origin_x)
    });
    let y = nest(&envelopes, trim_start, "0", |env| {
        format!("(ih-ih/zoom)*{:.6}", env.origin_y)
    });

    format!("fps={fps},zoompan=z='{z}':x='{x}':y='{y}':d=1:s={width}x{height}:fps={fps}")
}

/// `if(between(it,s0,e0),E0,if(between(it,s1,e1),E1,...fallback))`.
///
/// Built from the last effect outwards so the first effect ends up outermost.
fn nest(
    envelopes: &[ZoomEnvelope],
    trim_start: f64,
    fallback: &str,
    branch: impl Fn(&ZoomEnvelope) -> String,
) -> String {
    envelopes.iter().rev().fold(fallback.to_string(), |inner, env| {
        format!(
            "if(between(it,{:.6},{:.6}),{},{})",
            env.start - trim_start,
            env.end - trim_start,
            branch(env),
            inner
        )
    })
}

/// Enter/hold/exit amount for one effect, mirroring `ZoomEnvelope::amount_at`.
fn amount_expr(env: &ZoomEnvelope, trim_start: f64) -> String {
    let amount = env.amount;
    let hold_start = env.hold_start() - trim_start;
    let exit_start = env.exit_start() - trim_start;
    let start = env.start - trim_start;

    let mut expr = format!("{amount:.6}");
    if env.zoom_out > 0.0 {
        let p = format!("(it-{exit_start:.6})/{:.6}", env.zoom_out);
        expr = format!(
            "if(gt(it,{exit_start:.6}),{amount:.6}+({:.6})*{},{expr})",
            1.0 - amount,
            ease_expr(&p)
        );
    }
    if env.zoom_in > 0.0 {
        let p = format!("(it-{start:.6})/{:.6}", env.zoom_in);
        expr = format!(
            "if(lt(it,{hold_start:.6}),1+({:.6})*{},{expr})",
            amount - 1.0,
            ease_expr(&p)
        );
    }
    expr
}

/// The zoom easing cubic applied to expression `p`, in Horner form.
fn ease_expr(p: &str) -> String {
    let curve = CubicEase::zoom();
    format!(
        "(({a:.6}*({p})+({b:.6}))*({p})+{c:.6})*({p})",
        a = curve.a,
        b = curve.b,
        c = curve.c
    )
}

fn corner_mask_filter(radius: f64) -> String {
    let r = format!("{radius:.3}");
    format!(
        "format=rgba,geq=r='r(X,Y)':g='g(X,Y)':b='b(X,Y)':a='if(lte(hypot(max(0,max({r}-X,X-(W-1-{r}))),max(0,max({r}-Y,Y-(H-1-{r})))),{r}),255,0)'"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoomreel_edit_model::CropRect;

    fn source() -> SourceInfo {
        SourceInfo::new(1920, 1080, 10.0)
    }

    fn plain_model() -> EditModel {
        let mut model = EditModel::new(10.0);
        model.background = Background::color("#102030");
        model
    }

    #[test]
    fn test_plain_edit_is_single_stage() {
        let graph = FilterGraph::compile(&plain_model(), &source());
        assert_eq!(graph.stage_count(), 1);
        assert_eq!(graph.inputs, vec![GraphInput::Source]);
        assert_eq!(graph.output_label, "vout");
        let stage = &graph.stages[0];
        assert_eq!(stage.inputs, vec!["0:v".to_string()]);
        assert!(stage.filter.contains("color=0x102030"));
        assert!(graph.to_filter_complex().ends_with("[vout]"));
        assert!(graph.limitations.is_empty());
    }

    #[test]
    fn test_effects_outside_trim_keep_single_stage() {
        let mut model = plain_model();
        model.trim_start = 5.0;
        model.zoom_effects = vec![ZoomEffect::new("early", 1.0, 2.0, 2.0, 0.3, (4, 4))];
        assert_eq!(FilterGraph::compile(&model, &source()).stage_count(), 1);
    }

    #[test]
    fn test_full_chain_order_and_labels() {
        let mut model = plain_model();
        model.crop = CropRect::new(10.0, 10.0, 50.0, 50.0);
        model.padding = 10.0;
        model.corner_radius_px = 24.0;
        model.zoom_effects = vec![ZoomEffect::new("z", 3.0, 5.0, 2.0, 1.0, (3, 3))];

        let graph = FilterGraph::compile(&model, &source());
        let outputs: Vec<&str> = graph.stages.iter().map(|s| s.output.as_str()).collect();
        assert_eq!(outputs, vec!["cropped", "zoomed", "scaled", "rounded", "bg", "vout"]);

        // Each stage consumes the previous label.
        assert_eq!(graph.stages[1].inputs, vec!["cropped".to_string()]);
        assert_eq!(graph.stages[2].inputs, vec!["zoomed".to_string()]);
        assert_eq!(graph.stages[3].inputs, vec!["scaled".to_string()]);
        assert_eq!(
            graph.stages[5].inputs,
            vec!["bg".to_string(), "rounded".to_string()]
        );
        assert!(graph.stages[0].filter.starts_with("crop=960:540:192:108"));
        assert!(graph.stages[4].inputs.is_empty());
        assert_eq!(graph.limitations.len(), 3);
    }

    #[test]
    fn test_scale_matches_compositor_fit() {
        let mut model = plain_model();
        model.padding = 10.0;
        model.crop = CropRect::new(0.0, 0.0, 50.0, 100.0);
        let graph = FilterGraph::compile(&model, &source());
        let scale = graph.stages.iter().find(|s| s.output == "scaled").unwrap();
        assert!(scale.filter.starts_with("scale=864:972"));
    }

    #[test]
    fn test_zoom_times_are_rebased_by_trim() {
        let mut model = plain_model();
        model.trim_start = 2.0;
        model.trim_end = 6.0;
        model.zoom_effects = vec![ZoomEffect::new("z", 3.0, 5.0, 2.0, 1.0, (3, 3))];
        let graph = FilterGraph::compile(&model, &source());
        let zoom = &graph.stages[0];
        assert!(zoom
            .filter
            .starts_with("fps=30,zoompan=z='if(between(it,1.000000,3.000000),"));
    }

    #[test]
    fn test_frame_rate_is_normalized_before_zoom() {
        let mut model = plain_model();
        model.trim_start = 2.0;
        model.trim_end = 6.0;
        model.output_size.fps = 30;
        model.zoom_effects = vec![ZoomEffect::new("z", 3.0, 5.0, 2.0, 1.0, (3, 3))];
        model.crop = CropRect::new(0.0, 0.0, 50.0, 50.0);

        let fc = FilterGraph::compile(&model, &SourceInfo::new(1920, 1080, 10.0))
            .to_filter_complex();
        let zoompan = fc.find("zoompan").unwrap();
        let head = &fc[..zoompan];
        assert!(head.contains("fps=30"), "no frame rate normalization in {head:?}");
        assert!(head.find("crop=").unwrap() < head.find("fps=30").unwrap());
    }

    #[test]
    fn test_first_effect_is_outermost() {
        let mut model = plain_model();
        model.zoom_effects = vec![
            ZoomEffect::new("first", 2.0, 6.0, 1.5, 0.5, (0, 0)),
            ZoomEffect::new("second", 1.0, 8.0, 3.0, 0.5, (7, 7)),
        ];
        let graph = FilterGraph::compile(&model, &source());
        let z = &graph.stages[0].filter;
        let first = z.find("between(it,2.000000,6.000000)").unwrap();
        let second = z.find("between(it,1.000000,8.000000)").unwrap();
        assert!(first < second);
        assert!(z.starts_with("fps=30,zoompan=z='if(between(it,2.000000,6.000000)"));
    }

    #[test]
    fn test_image_background_adds_input() {
        let mut model = plain_model();
        model.background = Background::image("/tmp/wall.png", BackgroundFit::Cover);
        let graph = FilterGraph::compile(&model, &source());
        assert_eq!(graph.inputs.len(), 2);
        let bg = graph.stages.iter().find(|s| s.output == "bg").unwrap();
        assert_eq!(bg.inputs, vec!["1:v".to_string()]);
        assert!(bg.filter.contains("force_original_aspect_ratio=increase"));
    }

    #[test]
    fn test_ease_expr_uses_curve_coefficients() {
        let expr = ease_expr("P");
        assert_eq!(expr, "((1.600000*(P)+(-1.800000))*(P)+1.200000)*(P)");
    }

    #[test]
    fn test_instant_zoom_has_no_transitions() {
        let env = ZoomEnvelope::from_effect(&ZoomEffect::new("i", 0.0, 4.0, 2.0, 0.0, (4, 4)));
        assert_eq!(amount_expr(&env, 0.0), "2.000000");
    }

    #[test]
    fn test_stage_display() {
        let stage = FilterStage {
            inputs: vec!["a".into(), "b".into()],
            filter: "overlay".into(),
            output: "c".into(),
        };
        assert_eq!(stage.to_string(), "[a][b]overlay[c]");
    }
}

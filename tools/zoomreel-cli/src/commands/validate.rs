//! Validate an edit document.

use std::path::PathBuf;

use zoomreel_edit_model::EditDocument;

pub fn run(path: PathBuf, source_duration: Option<f64>) -> anyhow::Result<()> {
    println!("Validating edit at: {}", path.display());

    let document =
        EditDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit: {e}"))?;
    let model = &document.model;

    println!("  Version: {}", document.version);
    println!(
        "  Trim: {:.3}s - {:.3}s ({:.3}s)",
        model.trim_start,
        model.trim_end,
        model.trimmed_duration()
    );
    println!(
        "  Crop: x={} y={} w={} h={}",
        model.crop.x, model.crop.y, model.crop.width, model.crop.height
    );
    println!("  Padding: {}%", model.padding);
    println!("  Corner radius: {}px", model.corner_radius_px);
    println!("  Zoom effects: {}", model.zoom_effects.len());
    println!(
        "  Output: {}x{} @ {}fps, {} frames",
        model.output_size.width,
        model.output_size.height,
        model.output_size.fps,
        model.total_frames()
    );

    if let Some(source) = document.resolved_source(&path) {
        if source.exists() {
            println!("  Source: {}", source.display());
        } else {
            println!("  Source: {} (missing)", source.display());
        }
    }

    match model.validate(source_duration) {
        Ok(()) => {
            println!("\nEdit is valid.");
            Ok(())
        }
        Err(e) => {
            println!("\nValidation failed:");
            println!("  - {e}");
            anyhow::bail!("edit document is invalid")
        }
    }
}

//! Create a default edit document.

use std::path::PathBuf;

use zoomreel_common::config::ExportDefaults;
use zoomreel_edit_model::{EditDocument, EditModel, OutputSize};

pub fn run(
    path: PathBuf,
    source: Option<PathBuf>,
    duration: f64,
    defaults: &ExportDefaults,
) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    let mut model = EditModel::new(duration);
    model.output_size = OutputSize::new(defaults.width, defaults.height, defaults.fps);
    if let Ok(quality) = defaults.quality.parse() {
        model.quality = quality;
    }
    model
        .validate(None)
        .map_err(|e| anyhow::anyhow!("Configured defaults produce an invalid edit: {e}"))?;

    let mut document = EditDocument::new(model, source);
    document
        .save(&path)
        .map_err(|e| anyhow::anyhow!("Failed to write edit document: {e}"))?;

    println!("Created edit document at {}", path.display());
    println!("  Id: {}", document.id);
    println!("  Trim: 0.000s - {duration:.3}s");
    println!(
        "  Output: {}x{} @ {}fps ({})",
        document.model.output_size.width,
        document.model.output_size.height,
        document.model.output_size.fps,
        document.model.quality.as_str()
    );
    match &document.source {
        Some(source) => println!("  Source: {}", source.display()),
        None => println!("  Source: (not set, pass --source to export)"),
    }

    Ok(())
}

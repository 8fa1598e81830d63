//! Print the filter graph an edit compiles to.

use std::path::PathBuf;

use zoomreel_edit_model::EditDocument;
use zoomreel_render_engine::{FilterGraph, GraphInput, SourceInfo};

pub fn run(path: PathBuf, source_width: u32, source_height: u32) -> anyhow::Result<()> {
    let document =
        EditDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit: {e}"))?;
    document
        .model
        .validate(None)
        .map_err(|e| anyhow::anyhow!("Invalid edit: {e}"))?;

    let source = SourceInfo::new(source_width, source_height, document.model.trim_end);
    let graph = FilterGraph::compile(&document.model, &source);

    println!("Inputs:");
    for (index, input) in graph.inputs.iter().enumerate() {
        match input {
            GraphInput::Source => println!("  [{index}] source video"),
            GraphInput::Image { path } => println!("  [{index}] {}", path.display()),
        }
    }

    println!("\nStages ({}):", graph.stage_count());
    for stage in &graph.stages {
        println!("  {stage}");
    }

    if !graph.limitations.is_empty() {
        println!("\nDiffers from the frame backend:");
        for limitation in &graph.limitations {
            println!("  - {limitation}");
        }
    }

    println!("\n-filter_complex \"{}\"", graph.to_filter_complex());
    Ok(())
}

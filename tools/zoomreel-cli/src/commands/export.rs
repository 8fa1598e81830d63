//! Export an edit to video.

use std::io::Write;
use std::path::PathBuf;

use zoomreel_common::config::{ExportBackend, ExportDefaults};
use zoomreel_edit_model::{EditDocument, Quality};
use zoomreel_render_engine::{
    export_project, CancellationToken, ExportOutcome, ExportProgress, ExportRequest,
    ProgressCallback,
};

pub async fn run(
    path: PathBuf,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    backend: Option<String>,
    quality: Option<String>,
    defaults: ExportDefaults,
) -> anyhow::Result<()> {
    println!("Exporting edit at: {}", path.display());

    let document =
        EditDocument::load(&path).map_err(|e| anyhow::anyhow!("Failed to load edit: {e}"))?;
    let source = source
        .or_else(|| document.resolved_source(&path))
        .ok_or_else(|| anyhow::anyhow!("No source video: pass --source or set it in the edit"))?;
    let output = output.unwrap_or_else(|| path.with_extension("mp4"));

    let backend = match backend {
        Some(raw) => ExportBackend::parse(&raw)
            .ok_or_else(|| anyhow::anyhow!("Unknown backend: {raw}. Use: frames, filter-graph"))?,
        None => defaults.backend,
    };

    let mut model = document.model;
    if let Some(raw) = quality {
        model.quality = raw
            .parse::<Quality>()
            .map_err(|e| anyhow::anyhow!("Unknown quality: {e}. Use: low, medium, high"))?;
    }

    println!("  Source: {}", source.display());
    println!("  Output: {}", output.display());
    println!("  Backend: {}", backend.as_str());
    println!(
        "  Resolution: {}x{} @ {}fps ({})",
        model.output_size.width,
        model.output_size.height,
        model.output_size.fps,
        model.quality.as_str()
    );

    let request = ExportRequest {
        model,
        source,
        output: output.clone(),
        backend,
    };

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n  Cancelling, finishing the frames already encoded...");
            ctrl_c_token.cancel();
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.percent, p.frames_rendered, p.total_frames, p.eta_secs,
        );
        let _ = std::io::stdout().flush();
    });

    let result = tokio::task::spawn_blocking(move || {
        export_project(&request, &defaults, &cancel, Some(progress_cb))
    })
    .await?;

    match result {
        Ok(ExportOutcome::Completed { artifact, report }) => {
            println!("\nExport complete: {}", output.display());
            println!(
                "  {} frames in {:.1}s ({:.1} fps), {} bytes",
                report.frames_rendered,
                report.elapsed_secs,
                report.average_fps,
                artifact.len()
            );
            if report.frames_skipped > 0 {
                println!("  {} frame(s) filled in after seek misses", report.frames_skipped);
            }
        }
        Ok(ExportOutcome::Cancelled {
            artifact,
            frames_rendered,
            ..
        }) => match artifact.and_then(|a| a.path().map(|p| p.to_path_buf())) {
            Some(path) => println!(
                "\nExport cancelled after {frames_rendered} frames; truncated output at {}",
                path.display()
            ),
            None => println!("\nExport cancelled before any frame was encoded."),
        },
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

//! Check for the external media tools.

use zoomreel_common::config::ExportDefaults;
use zoomreel_render_engine::ffmpeg::command_exists;

pub fn run(defaults: &ExportDefaults) -> anyhow::Result<()> {
    println!("Zoomreel System Check");
    println!("{}", "=".repeat(50));

    let tools = [
        (defaults.ffmpeg_binary.as_str(), "encoding and the filter-graph backend"),
        (defaults.ffprobe_binary.as_str(), "reading source size and duration"),
    ];

    let mut all_ok = true;
    for (binary, purpose) in tools {
        if command_exists(binary) {
            println!("[OK]   {binary} ({purpose})");
        } else {
            all_ok = false;
            println!("[MISS] {binary} ({purpose})");
        }
    }

    println!();
    println!("Default backend: {}", defaults.backend.as_str());
    println!();
    if all_ok {
        println!("All required tools are available. Zoomreel is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg or set ffmpeg_binary/ffprobe_binary in the config.");
    }

    Ok(())
}

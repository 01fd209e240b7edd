use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AcquireResult, NormalizeResult, ProgressEvent, ProgressSink, StepAction};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_acquire(result: &AcquireResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_normalize(result: &NormalizeResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr and a colored summary on stdout.
pub struct TextOutput;

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

impl TextOutput {
    pub fn print_acquire(result: &AcquireResult) {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!("{cyan}wsprep summary: {}{reset}", result.base_path);
        println!(
            "{green}regions: {}  downloads: {}{reset}",
            result.regions.len(),
            result.downloads
        );
        for region in &result.regions {
            println!("{cyan}region {}{reset}", region.code);
            for step in &region.steps {
                let (label, color) = match step.action {
                    StepAction::Present => ("present", green),
                    StepAction::Downloaded => ("downloaded", cyan),
                    StepAction::Planned => ("planned", yellow),
                };
                println!("{color}  {:<30} {label:<10} {}{reset}", step.kind, step.path);
                if !step.unmatched.is_empty() {
                    println!(
                        "{yellow}  {} unmatched archive member(s) discarded{reset}",
                        step.unmatched.len()
                    );
                }
            }
        }
    }

    pub fn print_normalize(result: &NormalizeResult) {
        println!(
            "wrote {} outlet(s) to {} [{}]",
            result.outlets,
            result.output,
            result.columns.join(",")
        );
        if let Some(crs) = result.source_crs.as_deref().filter(|crs| *crs != "EPSG:4326") {
            println!("reprojected from {crs} to EPSG:4326");
        }
        if !result.duplicate_ids.is_empty() {
            println!("duplicate ids: {}", result.duplicate_ids.join(", "));
        }
    }
}

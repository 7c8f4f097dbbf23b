//! Output formatting for CLI

use playkit_core::{PlayerEvent, SessionTelemetry};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Pretty JSON, or `{}` if the value cannot be serialized
pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// One line per lifecycle event
pub fn print_event(event: &PlayerEvent, at: f64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = serde_json::json!({ "at": at, "name": event.name(), "event": event });
            println!("{line}");
        }
        OutputFormat::Text => match event {
            PlayerEvent::Error { code, message, fatal } => {
                let severity = if *fatal { "fatal" } else { "recoverable" };
                println!("[{at:>7.1}s] {} {code} ({severity}): {message}", event.name());
            }
            PlayerEvent::PhaseChanged { from, to } => {
                println!("[{at:>7.1}s] {} {from} -> {to}", event.name());
            }
            PlayerEvent::QualityChanged { quality } => {
                println!("[{at:>7.1}s] {} {quality}", event.name());
            }
            PlayerEvent::AdStart { kind } => println!("[{at:>7.1}s] {} {kind}", event.name()),
            PlayerEvent::AdEnd { kind, skipped } => {
                println!("[{at:>7.1}s] {} {kind} skipped={skipped}", event.name());
            }
            PlayerEvent::SourceChanged { url } => println!("[{at:>7.1}s] {} {url}", event.name()),
            _ => println!("[{at:>7.1}s] {}", event.name()),
        },
    }
}

/// Session summary printed when a run finishes
pub fn print_telemetry(telemetry: &SessionTelemetry, media_time: f64, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json(telemetry)),
        OutputFormat::Text => {
            println!("\nSession {}:", telemetry.session_id);
            println!("  Started: {}", telemetry.start_time.to_rfc3339());
            println!("  Media time reached: {media_time:.1}s");
            println!("  Max progress: {:.0}%", telemetry.max_progress * 100.0);
            println!("  Seeks: {}", telemetry.seek_count);
            println!("  Quality changes: {}", telemetry.quality_changes);
            println!("  Tracked events: {}", telemetry.events.len());
        }
    }
}

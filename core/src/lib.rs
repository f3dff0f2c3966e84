pub mod config;
pub mod core;
pub mod error;
pub mod render;
pub mod utils;

use std::sync::Arc;

pub use crate::config::{is_config_path, parse_key_values, AssessmentConfig};
pub use crate::core::assessment::{AssessmentMode, XssMap};
pub use crate::core::result_aggregator::{
    default_output_filename, AssessmentReport, ResultAggregator, ScanFinding,
};
pub use crate::core::{Certainty, ContextKind, Delivery, RequestType};
pub use crate::error::{RenderServiceError, Result, XssMapError};
pub use crate::render::{PhantomRenderClient, RenderService, RenderedPage};
pub use crate::utils::payloads::PayloadCatalog;

/// Output abstraction for the assessment pipeline.
pub trait AssessmentEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_finding(&self, finding: &ScanFinding);
    fn on_progress(&self, phase: &str, current: usize, total: usize);
}

pub type SinkRef = Arc<dyn AssessmentEventSink>;

/// Terminal output sink for CLI usage.
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl AssessmentEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error" => message.red().to_string(),
            "warn" => message.yellow().to_string(),
            "phase" => message.bright_cyan().bold().to_string(),
            _ => message.to_string(),
        };
        println!("{}", colored);
    }

    fn on_finding(&self, finding: &ScanFinding) {
        use colored::*;
        let certainty = match finding.certainty {
            Certainty::Certain => finding.certainty.to_string().red().bold(),
            Certainty::Probable => finding.certainty.to_string().yellow().bold(),
        };
        println!("\n{} {} XSS in '{}'", "[+]".green().bold(), certainty, finding.parameter.white());
        println!("    Delivery: {}", finding.delivery.to_string().cyan());
        println!("    Attack:   {}", finding.attack.bright_yellow());
        println!("    Evidence: {}", finding.message.dimmed());
    }

    fn on_progress(&self, phase: &str, current: usize, total: usize) {
        use colored::*;
        if total > 0 {
            println!("{}", format!("[*] {} ({}/{})", phase, current, total).bright_cyan());
        } else {
            println!("{}", format!("[*] {}", phase).bright_cyan());
        }
    }
}

/// Discards every event; for library callers and tests.
pub struct SilentSink;

impl SilentSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl AssessmentEventSink for SilentSink {
    fn on_log(&self, _level: &str, _message: &str) {}
    fn on_finding(&self, _finding: &ScanFinding) {}
    fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}
}

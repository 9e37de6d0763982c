// ABOUTME: User-facing narration of pipeline progress.
// ABOUTME: Supports normal (dokku arrows), quiet, and JSON-lines output modes.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Arrow-prefixed progress lines
    Normal,
    /// Only results and errors
    Quiet,
    /// JSON lines for scripting
    Json,
}

const PROGRESS_PREFIX: &str = "-----> ";
const SUCCESS_PREFIX: &str = "=====> ";
const DETAIL_PREFIX: &str = "       ";

/// Handles CLI output based on the configured mode.
#[derive(Debug)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// A stage starting, e.g. `-----> Building foo ...`.
    pub fn progress(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{PROGRESS_PREFIX}{message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit("progress", message),
        }
    }

    /// Indented detail under the last progress line.
    pub fn detail(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{DETAIL_PREFIX}{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) if elapsed > 0.0 => {
                    println!("{SUCCESS_PREFIX}{message} ({elapsed:.1}s)")
                }
                _ => println!("{SUCCESS_PREFIX}{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("success", message),
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!(" !     {message}"),
            OutputMode::Json => self.emit_err("warning", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_err("error", message),
        }
    }

    /// The value a success line announces, indented under it.
    pub fn result(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{DETAIL_PREFIX}{message}"),
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("result", message),
        }
    }

    /// Plain result line, printed in every mode (URLs, listings).
    pub fn line(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("result", message),
        }
    }

    fn emit(&self, event: &str, message: &str) {
        if let Some(json) = self.json(event, message) {
            println!("{json}");
        }
    }

    fn emit_err(&self, event: &str, message: &str) {
        if let Some(json) = self.json(event, message) {
            eprintln!("{json}");
        }
    }

    fn json(&self, event: &str, message: &str) -> Option<String> {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        };
        serde_json::to_string(&event).ok()
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

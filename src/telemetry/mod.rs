//! Telemetry for lexflow
//!
//! Tracing subscriber setup plus a collector that aggregates turn events
//! into per-run statistics for terminal display.

use crate::agent::TurnEvent;
use crate::cli::Verbosity;
use colored::Colorize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the verbosity level
pub fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_level()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Counters accumulated from turn events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryStats {
    pub executions_started: usize,
    pub executions_completed: usize,
    pub executions_failed: usize,
    pub provider_rounds: usize,
    pub tools_executed: usize,
    pub tools_succeeded: usize,
    pub tools_failed: usize,
    pub sources_retrieved: usize,
    pub tokens_used: u64,
}

#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TurnEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, event: &TurnEvent) {
        {
            let mut stats = lock(&self.stats);
            match event {
                TurnEvent::ExecutionStarted { .. } => stats.executions_started += 1,
                TurnEvent::RetrievalFinished { sources } => stats.sources_retrieved += sources,
                TurnEvent::ProviderRound { .. } => stats.provider_rounds += 1,
                TurnEvent::ToolCallStarted { .. } => stats.tools_executed += 1,
                TurnEvent::ToolCallFinished { success, .. } => {
                    if *success {
                        stats.tools_succeeded += 1;
                    } else {
                        stats.tools_failed += 1;
                    }
                }
                TurnEvent::Completed { tokens_used, .. } => {
                    stats.executions_completed += 1;
                    stats.tokens_used += tokens_used;
                }
                TurnEvent::Failed { .. } => stats.executions_failed += 1,
            }
        }
        lock(&self.events).push(event.clone());
    }

    pub fn stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Last `n` events, oldest first
    pub fn recent_events(&self, n: usize) -> Vec<TurnEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    pub fn tool_success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let finished = stats.tools_succeeded + stats.tools_failed;
        if finished == 0 {
            1.0
        } else {
            stats.tools_succeeded as f64 / finished as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders collected telemetry on the terminal
pub struct TelemetryDisplay {
    collector: TelemetryCollector,
    verbosity: Verbosity,
}

impl TelemetryDisplay {
    pub fn new(collector: TelemetryCollector, verbosity: Verbosity) -> Self {
        Self {
            collector,
            verbosity,
        }
    }

    /// One line per live event, shown in verbose modes
    pub fn show_event(&self, event: &TurnEvent) {
        if !self.verbosity.show_events() {
            return;
        }
        let line = match event {
            TurnEvent::ExecutionStarted { agent_slug, step_index, .. } => match step_index {
                Some(step) => format!("▶ {} (step {})", agent_slug, step + 1),
                None => format!("▶ {}", agent_slug),
            },
            TurnEvent::RetrievalFinished { sources } => format!("  retrieved {} sources", sources),
            TurnEvent::ProviderRound { round, max_rounds } => {
                format!("  provider round {}/{}", round, max_rounds)
            }
            TurnEvent::ToolCallStarted { tool_slug, .. } => format!("  → {}", tool_slug),
            TurnEvent::ToolCallFinished {
                tool_slug,
                success,
                duration_ms,
                ..
            } => {
                let mark = if *success { "✓".green() } else { "✗".red() };
                format!("  {} {} ({}ms)", mark, tool_slug, duration_ms)
            }
            TurnEvent::Completed { tokens_used, .. } => {
                format!("  {} {} tokens", "done".green(), tokens_used)
            }
            TurnEvent::Failed { kind, message, .. } => {
                format!("  {} [{}] {}", "failed".red(), kind, message)
            }
        };
        eprintln!("{}", line.dimmed());
    }

    pub fn display_summary(&self) {
        if !self.verbosity.show_progress() {
            return;
        }
        let stats = self.collector.stats();
        eprintln!();
        eprintln!("{}", "Summary".bold());
        eprintln!("  Elapsed:         {:.1}s", self.collector.elapsed().as_secs_f64());
        eprintln!(
            "  Executions:      {} completed, {} failed",
            stats.executions_completed, stats.executions_failed
        );
        eprintln!("  Provider rounds: {}", stats.provider_rounds);
        eprintln!(
            "  Tool calls:      {} ({:.0}% ok)",
            stats.tools_executed,
            self.collector.tool_success_rate() * 100.0
        );
        eprintln!("  Sources:         {}", stats.sources_retrieved);
        eprintln!("  Tokens:          {}", stats.tokens_used);
    }
}

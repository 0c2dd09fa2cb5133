//! `autoblog run`: a single-session batch in the terminal.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;

use autoblog_autopilot::{Autopilot, SessionRunner};
use autoblog_config::AutoBlogConfig;
use autoblog_genai::GeminiClient;
use autoblog_storage::BlogStorage;
use autoblog_types::{GenerationSettings, JobState, LogEntry, LogKind, RunState};

pub async fn run_session(config: AutoBlogConfig, settings: GenerationSettings) -> Result<()> {
    if settings.niche.trim().is_empty() {
        bail!("A niche is required: pass --niche or set defaults.niche in the config");
    }

    let generator = GeminiClient::new(&config.gemini)?;
    if !generator.has_api_key() {
        bail!("No Gemini API key: set GEMINI_API_KEY or gemini.api_key in the config");
    }

    let db_path = config.db_path()?;
    let storage = BlogStorage::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let runner = SessionRunner::new(
        Arc::new(generator),
        Arc::new(storage),
        config.autopilot.clone(),
    );

    let tail = Arc::new(LogTail::default());
    let printer = tail.clone();
    let _subscription = runner.subscribe(Arc::new(move |state: &JobState| {
        for entry in printer.fresh(&state.log_entries) {
            println!("{}", format_entry(&entry));
        }
    }));

    runner.start(settings).await?;

    tokio::select! {
        _ = runner.join() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping after the current article...");
            runner.stop().await?;
            while matches!(runner.status().await?.run_state, RunState::Working(_)) {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }

    let state = runner.status().await?;
    println!(
        "Done: {} article(s) written, saved to {}",
        state.articles_generated_today,
        db_path.display()
    );
    Ok(())
}

/// Remembers the last printed entry so each state change prints only what
/// is new, even after old entries were trimmed from the front of the log.
#[derive(Default)]
struct LogTail {
    last: Mutex<Option<LogEntry>>,
}

impl LogTail {
    fn fresh(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let start = match last.as_ref() {
            Some(seen) => entries
                .iter()
                .rposition(|e| e == seen)
                .map_or(0, |index| index + 1),
            None => 0,
        };
        let fresh = entries[start..].to_vec();
        if let Some(newest) = fresh.last() {
            *last = Some(newest.clone());
        }
        fresh
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let tag = match entry.kind {
        LogKind::Info => "INFO",
        LogKind::Success => " OK ",
        LogKind::Warning => "WARN",
        LogKind::Error => "FAIL",
        LogKind::System => " >> ",
    };
    format!(
        "[{}] {tag} {}",
        entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        entry.message
    )
}

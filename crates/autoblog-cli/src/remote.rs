//! `autoblog start|stop|status`: control a running server over HTTP.

use std::fmt::Write;

use anyhow::{Context, Result, bail};
use chrono::Local;
use serde_json::Value;

use autoblog_types::{GenerationSettings, JobState, RunState};

pub struct RemoteClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

pub fn client(url: String, token: Option<String>) -> Result<RemoteClient> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    Ok(RemoteClient {
        base_url: url.trim_end_matches('/').to_string(),
        token,
        client,
    })
}

impl RemoteClient {
    pub async fn start(&self, settings: &GenerationSettings) -> Result<()> {
        let request = self.request(reqwest::Method::POST, "/autopilot/start").json(settings);
        let state = self.send(request).await?;
        print!("{}", format_status(&state));
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let state = self
            .send(self.request(reqwest::Method::POST, "/autopilot/stop"))
            .await?;
        print!("{}", format_status(&state));
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        let state = self
            .send(self.request(reqwest::Method::GET, "/autopilot/status"))
            .await?;
        print!("{}", format_status(&state));
        Ok(())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<JobState> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            bail!("Server returned {status}: {message}");
        }
        resp.json().await.context("Server sent an unreadable autopilot state")
    }
}

fn format_status(state: &JobState) -> String {
    let mut out = String::new();
    let run_state = match state.run_state {
        RunState::Idle => "idle".to_string(),
        RunState::Working(stage) => format!("working ({stage})"),
        RunState::Waiting => "waiting".to_string(),
        RunState::Complete => "complete".to_string(),
        RunState::Error => "error".to_string(),
    };
    let _ = writeln!(
        out,
        "autopilot: {} ({run_state})",
        if state.running { "running" } else { "stopped" }
    );
    let _ = writeln!(
        out,
        "  today: {}/{} articles",
        state.articles_generated_today, state.articles_per_day
    );
    if let Some(next) = state.next_run_at {
        let _ = writeln!(
            out,
            "  next run: {}",
            next.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    if !state.settings.niche.is_empty() {
        let _ = writeln!(out, "  niche: {}", state.settings.niche);
    }
    let recent = state.log_entries.len().saturating_sub(5);
    for entry in &state.log_entries[recent..] {
        let _ = writeln!(out, "  - {}", entry.message);
    }
    out
}

//! # Lint Observability Module
//!
//! Provides structured events and metrics for lint runs.
//!
//! ## Event Flow
//!
//! ```text
//! fkguard → FKGUARD_EVENT lines on stderr → CI log collector
//!         ↘ Pushgateway → Prometheus
//! ```
//!
//! ## Components
//!
//! 1. **Structured Events**: JSON lines prefixed with `FKGUARD_EVENT:`,
//!    emitted only when enabled (`--emit-events` or `emit_events: true`).
//!    They go to stderr so a JSON report on stdout stays parseable.
//! 2. **Prometheus Metrics**: pushed to Pushgateway when `PUSHGATEWAY_URL`
//!    is set.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::analysis::ReconcileStats;

/// Event prefix for log collectors to identify structured events
const EVENT_PREFIX: &str = "FKGUARD_EVENT:";

/// Lint event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum LintEvent {
    /// Lint run started
    LintStarted(LintStartedEvent),
    /// Lint run produced a verdict
    LintCompleted(LintCompletedEvent),
    /// Lint run could not produce a verdict
    LintFailed(LintFailedEvent),
}

/// Common fields for all events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Timestamp in RFC3339 format
    pub timestamp: String,
    /// Identifies every event of one run
    pub run_id: String,
    /// Repository being linted
    pub repository: String,
    /// Git SHA being linted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
    /// Hostname of the machine running the lint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// CI job ID if running in CI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_job_id: Option<String>,
}

impl EventMetadata {
    pub fn new(repository: impl Into<String>, git_sha: Option<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            run_id: Uuid::new_v4().to_string(),
            repository: repository.into(),
            git_sha,
            hostname: std::env::var("HOSTNAME").ok(),
            ci_job_id: std::env::var("GITHUB_RUN_ID")
                .ok()
                .or_else(|| std::env::var("CI_JOB_ID").ok()),
        }
    }

    /// Same run, fresh timestamp
    fn touch(&self) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintStartedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Schema snapshot path
    pub schema: String,
    /// Number of change-set files
    pub files: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintCompletedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Total duration in seconds
    pub duration_secs: f64,
    pub violations: usize,
    pub diagnostics: usize,
    pub foreign_keys: usize,
    pub indexes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintFailedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// Duration until failure
    pub duration_secs: f64,
    /// Error message
    pub error: String,
}

/// Emits a structured event as JSON to stderr
///
/// Events are prefixed with `FKGUARD_EVENT:` for log collectors to parse.
pub fn emit_event(event: &LintEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            eprintln!("{}{}", EVENT_PREFIX, json);
        }
        Err(e) => {
            tracing::error!("Failed to serialize event: {}", e);
        }
    }
}

/// Lint run tracker
///
/// Emits the started event on creation, and exactly one completed or failed
/// event when consumed.
pub struct LintTracker {
    metadata: EventMetadata,
    start: Instant,
    emit: bool,
}

impl LintTracker {
    pub fn start(metadata: EventMetadata, schema: impl Into<String>, files: usize, emit: bool) -> Self {
        if emit {
            emit_event(&LintEvent::LintStarted(LintStartedEvent {
                metadata: metadata.clone(),
                schema: schema.into(),
                files,
            }));
        }
        Self {
            metadata,
            start: Instant::now(),
            emit,
        }
    }

    /// Emit completion and push metrics (if configured)
    pub async fn complete(self, violations: usize, diagnostics: usize, stats: &ReconcileStats) {
        let duration_secs = self.elapsed_secs();

        if self.emit {
            emit_event(&LintEvent::LintCompleted(LintCompletedEvent {
                metadata: self.metadata.touch(),
                duration_secs,
                violations,
                diagnostics,
                foreign_keys: stats.foreign_keys,
                indexes: stats.indexes,
            }));
        }

        metrics::push_lint_metrics(&self.metadata, duration_secs, Some(violations)).await;
    }

    /// Emit failure and push metrics (if configured)
    pub async fn fail(self, error: String) {
        let duration_secs = self.elapsed_secs();

        if self.emit {
            emit_event(&LintEvent::LintFailed(LintFailedEvent {
                metadata: self.metadata.touch(),
                duration_secs,
                error,
            }));
        }

        metrics::push_lint_metrics(&self.metadata, duration_secs, None).await;
    }

    /// Get elapsed time
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

// =============================================================================
// PROMETHEUS METRICS - Pushgateway Integration
// =============================================================================

/// Prometheus metrics for lint runs
///
/// Metrics are pushed to Pushgateway if PUSHGATEWAY_URL is set.
pub mod metrics {
    use super::*;

    /// Get Pushgateway URL from environment
    pub fn pushgateway_url() -> Option<String> {
        std::env::var("PUSHGATEWAY_URL").ok()
    }

    /// Build Prometheus text format metrics for a lint run.
    ///
    /// `violations` is `None` when the run failed without a verdict.
    pub fn build_lint_metrics(
        metadata: &EventMetadata,
        duration_secs: f64,
        violations: Option<usize>,
    ) -> String {
        let mut output = String::new();

        output.push_str("# HELP fkguard_run_duration_seconds Duration of lint runs\n");
        output.push_str("# TYPE fkguard_run_duration_seconds gauge\n");
        output.push_str(&format!(
            "fkguard_run_duration_seconds{{repository=\"{}\"}} {:.3}\n",
            metadata.repository, duration_secs
        ));

        if let Some(count) = violations {
            output.push_str("# HELP fkguard_violations Unindexed foreign keys found by the last run\n");
            output.push_str("# TYPE fkguard_violations gauge\n");
            output.push_str(&format!(
                "fkguard_violations{{repository=\"{}\"}} {}\n",
                metadata.repository, count
            ));
        }

        let status = match violations {
            Some(0) => "clean",
            Some(_) => "violations",
            None => "error",
        };
        output.push_str("# HELP fkguard_runs_total Total lint runs\n");
        output.push_str("# TYPE fkguard_runs_total counter\n");
        output.push_str(&format!(
            "fkguard_runs_total{{repository=\"{}\",status=\"{}\"}} 1\n",
            metadata.repository, status
        ));

        output
    }

    /// Push metrics to Pushgateway
    ///
    /// Uses the job/instance grouping for proper metric isolation:
    /// - job: "fkguard"
    /// - instance: "{repository}"
    pub async fn push_metrics(metrics: &str, repository: &str) -> Result<(), String> {
        let base_url = match pushgateway_url() {
            Some(url) => url,
            None => {
                tracing::debug!("PUSHGATEWAY_URL not set, skipping metrics push");
                return Ok(());
            }
        };

        // Pushgateway expects: /metrics/job/<job>/instance/<instance>
        let url = format!(
            "{}/metrics/job/{}/instance/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode("fkguard"),
            urlencoding::encode(repository)
        );

        tracing::info!(url = %url, "Pushing metrics to Pushgateway");

        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(metrics.to_string())
            .send()
            .await
            .map_err(|e| format!("Failed to push metrics: {}", e))?;

        if response.status().is_success() {
            tracing::info!("Metrics pushed successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(format!("Pushgateway returned {}: {}", status, body))
        }
    }

    /// Push lint metrics to Pushgateway
    pub async fn push_lint_metrics(
        metadata: &EventMetadata,
        duration_secs: f64,
        violations: Option<usize>,
    ) {
        let metrics = build_lint_metrics(metadata, duration_secs, violations);
        if let Err(e) = push_metrics(&metrics, &metadata.repository).await {
            tracing::warn!("Failed to push lint metrics: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let metadata = EventMetadata::new("pleme/albums", Some("abc123".to_string()));

        let event = LintEvent::LintStarted(LintStartedEvent {
            metadata,
            schema: "db/schema.rb".into(),
            files: 3,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"LintStarted\""));
        assert!(json.contains("pleme/albums"));
        assert!(json.contains("abc123"));
        assert!(json.contains("run_id"));
    }

    #[test]
    fn test_metadata_touch_keeps_run_id() {
        let metadata = EventMetadata::new("repo", None);
        let later = metadata.touch();
        assert_eq!(metadata.run_id, later.run_id);
        assert!(!serde_json::to_string(&later).unwrap().contains("git_sha"));
    }

    #[test]
    fn test_lint_metrics_format() {
        let metadata = EventMetadata::new("pleme/albums", None);

        let output = metrics::build_lint_metrics(&metadata, 1.25, Some(2));

        assert!(output.contains("fkguard_run_duration_seconds{repository=\"pleme/albums\"} 1.250"));
        assert!(output.contains("fkguard_violations{repository=\"pleme/albums\"} 2"));
        assert!(output.contains("fkguard_runs_total"));
        assert!(output.contains("status=\"violations\""));
    }

    #[test]
    fn test_failed_run_metrics() {
        let metadata = EventMetadata::new("repo", None);

        let output = metrics::build_lint_metrics(&metadata, 0.5, None);

        assert!(!output.contains("fkguard_violations{"));
        assert!(output.contains("status=\"error\""));
    }

    #[tokio::test]
    async fn test_push_without_gateway_is_noop() {
        if metrics::pushgateway_url().is_none() {
            assert!(metrics::push_metrics("", "repo").await.is_ok());
        }
    }
}

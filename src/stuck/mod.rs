//! Stuck detection.
//!
//! Three independent heuristics run concurrently against the session memory
//! and the project tree:
//!
//! - **repeated blocker**: the same blocker recorded again and again
//! - **no progress**: no file under the project root modified recently
//! - **error loop**: many near-identical error notes
//!
//! Each yields a [`StuckPattern`]; the detector combines them into a
//! [`StuckAnalysis`] and keeps the last alert time for an advisory cooldown.
//! The heuristics never fail: dependency errors are logged and reported as
//! "not detected".

pub mod progress;
pub mod similarity;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::memory::store::SessionMemory;
use crate::memory::types::{NoteType, SearchResult};
use similarity::{group_similar, JaccardSimilarity, TextSimilarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StuckPatternType {
    RepeatedBlocker,
    NoProgress,
    ErrorLoop,
}

impl StuckPatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatedBlocker => "repeated_blocker",
            Self::NoProgress => "no_progress",
            Self::ErrorLoop => "error_loop",
        }
    }
}

impl std::fmt::Display for StuckPatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternDetails {
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_since_first_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_count: Option<usize>,
}

/// Outcome of one heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StuckPattern {
    #[serde(rename = "type")]
    pub pattern_type: StuckPatternType,
    pub detected: bool,
    /// In `[0, 1]`; `0.0` when not detected.
    pub confidence: f64,
    pub details: PatternDetails,
}

impl StuckPattern {
    fn not_detected(pattern_type: StuckPatternType, description: impl Into<String>) -> Self {
        Self {
            pattern_type,
            detected: false,
            confidence: 0.0,
            details: PatternDetails {
                description: description.into(),
                ..PatternDetails::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckAnalysis {
    pub stuck: bool,
    pub repeated_blocker: StuckPattern,
    pub no_progress: StuckPattern,
    pub error_loop: StuckPattern,
    pub overall_confidence: f64,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub cooldown_active: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl StuckAnalysis {
    pub fn patterns(&self) -> [&StuckPattern; 3] {
        [&self.repeated_blocker, &self.no_progress, &self.error_loop]
    }

    /// Detected patterns, highest confidence first.
    pub fn detected(&self) -> Vec<&StuckPattern> {
        let mut detected: Vec<&StuckPattern> =
            self.patterns().into_iter().filter(|p| p.detected).collect();
        detected.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        detected
    }
}

fn minutes_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 60_000.0
}

fn evidence_line(result: &SearchResult) -> String {
    format!("[{}] {}", result.timestamp().to_rfc3339(), result.content())
}

/// Largest group with at least `min` members; the earliest such group wins ties.
fn largest_group<'a>(
    results: &'a [SearchResult],
    similarity: &dyn TextSimilarity,
    threshold: f64,
    min: usize,
) -> Option<Vec<&'a SearchResult>> {
    let mut best: Option<Vec<&SearchResult>> = None;
    for group in group_similar(results, |r| r.content(), similarity, threshold) {
        if group.len() >= min && best.as_ref().map_or(true, |b| group.len() > b.len()) {
            best = Some(group);
        }
    }
    best
}

/// Repeated-blocker heuristic over the session's blocker notes.
pub fn evaluate_repeated_blocker(
    blockers: &[SearchResult],
    similarity: &dyn TextSimilarity,
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> StuckPattern {
    let Some(group) = largest_group(
        blockers,
        similarity,
        config.similarity_threshold,
        config.blocker_min_repetitions,
    ) else {
        return StuckPattern::not_detected(
            StuckPatternType::RepeatedBlocker,
            "No repeated blockers detected",
        );
    };

    let earliest = group.iter().map(|r| r.timestamp()).min().unwrap_or(now);
    let latest = group.iter().map(|r| r.timestamp()).max().unwrap_or(now);
    let count = group.len();
    let span = minutes_between(earliest, latest);
    let confidence = (0.5 + count as f64 / 10.0 + span / 60.0).min(1.0);

    StuckPattern {
        pattern_type: StuckPatternType::RepeatedBlocker,
        detected: true,
        confidence,
        details: PatternDetails {
            description: format!(
                "Same blocker recorded {count} times over {span:.0} minutes"
            ),
            evidence: group.iter().map(|r| evidence_line(r)).collect(),
            time_since_first_minutes: Some(minutes_between(earliest, now).max(0.0)),
            idle_minutes: None,
            repetition_count: Some(count),
        },
    }
}

/// No-progress heuristic from the latest file modification time.
pub fn evaluate_no_progress(
    latest: Option<DateTime<Utc>>,
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> StuckPattern {
    let Some(latest) = latest else {
        return StuckPattern::not_detected(
            StuckPatternType::NoProgress,
            "No files found to measure progress",
        );
    };

    let idle = minutes_between(latest, now).max(0.0);
    let threshold = config.idle_threshold_minutes;
    if idle < threshold {
        let mut pattern = StuckPattern::not_detected(
            StuckPatternType::NoProgress,
            format!("Last file change {idle:.0} minutes ago"),
        );
        pattern.details.idle_minutes = Some(idle);
        return pattern;
    }

    StuckPattern {
        pattern_type: StuckPatternType::NoProgress,
        detected: true,
        confidence: (0.5 + (idle - threshold) / 80.0).min(1.0),
        details: PatternDetails {
            description: format!("No file changes for {idle:.0} minutes"),
            evidence: vec![format!("Last modification: {}", latest.to_rfc3339())],
            time_since_first_minutes: None,
            idle_minutes: Some(idle),
            repetition_count: None,
        },
    }
}

/// Error-loop heuristic over error-like search results.
pub fn evaluate_error_loop(
    results: &[SearchResult],
    similarity: &dyn TextSimilarity,
    config: &DetectionConfig,
) -> StuckPattern {
    let Some(group) = largest_group(
        results,
        similarity,
        config.similarity_threshold,
        config.error_min_repetitions,
    ) else {
        return StuckPattern::not_detected(StuckPatternType::ErrorLoop, "No error loop detected");
    };

    let count = group.len();
    StuckPattern {
        pattern_type: StuckPatternType::ErrorLoop,
        detected: true,
        confidence: (0.5 + count as f64 / 15.0).min(1.0),
        details: PatternDetails {
            description: format!("Same error encountered {count} times"),
            evidence: group.iter().map(|r| evidence_line(r)).collect(),
            time_since_first_minutes: None,
            idle_minutes: None,
            repetition_count: Some(count),
        },
    }
}

/// Mean confidence of detected patterns (0 if none) and the stuck verdict.
pub fn combine(patterns: &[&StuckPattern]) -> (bool, f64) {
    let detected: Vec<f64> = patterns
        .iter()
        .filter(|p| p.detected)
        .map(|p| p.confidence)
        .collect();
    if detected.is_empty() {
        return (false, 0.0);
    }
    let overall = detected.iter().sum::<f64>() / detected.len() as f64;
    (overall >= 0.5, overall)
}

/// Runs the heuristics for one session and tracks the last alert.
pub struct StuckDetector {
    memory: Arc<SessionMemory>,
    project_root: PathBuf,
    config: DetectionConfig,
    similarity: Box<dyn TextSimilarity>,
    last_alert: Mutex<Option<DateTime<Utc>>>,
}

impl StuckDetector {
    pub fn new(memory: Arc<SessionMemory>, project_root: PathBuf, config: DetectionConfig) -> Self {
        Self::with_similarity(memory, project_root, config, Box::new(JaccardSimilarity))
    }

    pub fn with_similarity(
        memory: Arc<SessionMemory>,
        project_root: PathBuf,
        config: DetectionConfig,
        similarity: Box<dyn TextSimilarity>,
    ) -> Self {
        Self {
            memory,
            project_root,
            config,
            similarity,
            last_alert: Mutex::new(None),
        }
    }

    pub fn last_alert_time(&self) -> Option<DateTime<Utc>> {
        *self.last_alert.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run all three heuristics. `project_root` overrides the session's root
    /// for the no-progress scan.
    pub async fn analyze(&self, project_root: Option<&Path>) -> StuckAnalysis {
        let root = project_root.unwrap_or(&self.project_root).to_path_buf();
        let (repeated_blocker, no_progress, error_loop) = tokio::join!(
            self.detect_repeated_blocker(),
            self.detect_no_progress(root),
            self.detect_error_loop(),
        );

        let now = Utc::now();
        let (stuck, overall_confidence) =
            combine(&[&repeated_blocker, &no_progress, &error_loop]);
        let (cooldown_active, last_alert_time) = self.record_alert(stuck, now);

        if stuck {
            tracing::info!(
                session_id = %self.memory.session_id(),
                overall_confidence,
                cooldown_active,
                "stuck pattern detected"
            );
        }

        StuckAnalysis {
            stuck,
            repeated_blocker,
            no_progress,
            error_loop,
            overall_confidence,
            last_alert_time,
            cooldown_active,
            analyzed_at: now,
        }
    }

    /// Report whether the previous alert is within the cooldown window, and
    /// stamp a new alert when stuck outside it.
    fn record_alert(&self, stuck: bool, now: DateTime<Utc>) -> (bool, Option<DateTime<Utc>>) {
        let mut last = self.last_alert.lock().unwrap_or_else(|e| e.into_inner());
        // Out-of-range values saturate instead of overflowing.
        let cooldown =
            Duration::try_minutes(self.config.cooldown_minutes.max(0)).unwrap_or(Duration::MAX);
        let cooldown_active = last.is_some_and(|t| now - t < cooldown);
        if stuck && !cooldown_active {
            *last = Some(now);
        }
        (cooldown_active, *last)
    }

    async fn detect_repeated_blocker(&self) -> StuckPattern {
        match self.memory.get_notes_by_type(NoteType::Blocker).await {
            Ok(blockers) => evaluate_repeated_blocker(
                &blockers,
                self.similarity.as_ref(),
                &self.config,
                Utc::now(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "repeated blocker check failed");
                StuckPattern::not_detected(
                    StuckPatternType::RepeatedBlocker,
                    "Blocker notes unavailable",
                )
            }
        }
    }

    async fn detect_no_progress(&self, root: PathBuf) -> StuckPattern {
        let latest =
            progress::scan_latest_modification(root, self.config.ignored_dirs.clone()).await;
        evaluate_no_progress(latest, &self.config, Utc::now())
    }

    async fn detect_error_loop(&self) -> StuckPattern {
        let results = self
            .memory
            .search(&self.config.error_query, self.config.error_search_limit)
            .await;
        evaluate_error_loop(&results, self.similarity.as_ref(), &self.config)
    }
}

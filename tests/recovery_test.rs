mod helpers;

use serde_json::{json, Map};
use vigil::memory::types::{NoteType, SessionNote};
use vigil::recovery::SuggestionSource;
use vigil::stuck::StuckPatternType;

const BLOCKER: &str = "Linker fails with undefined symbol in the ffi module";

async fn seed_blockers(session: &vigil::Session) {
    for _ in 0..3 {
        session
            .save_note(SessionNote::new(NoteType::Blocker, BLOCKER))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_suggestions_come_from_valuable_notes() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    seed_blockers(&session).await;
    session
        .save_note(SessionNote::new(
            NoteType::Learning,
            "Fix the undefined symbol linker error by adding the ffi module to build.rs. \
             1. Add cargo:rustc-link-lib 2. Rebuild the crate",
        ))
        .await
        .unwrap();
    session
        .save_note(SessionNote::new(
            NoteType::Hypothesis,
            "The linker symbol is missing because of the ffi feature flag",
        ))
        .await
        .unwrap();

    let analysis = session.check_stuck_pattern(None).await;
    let pattern = analysis.repeated_blocker.clone();
    assert!(pattern.detected);

    let recovery = session
        .get_recovery_suggestions(pattern, Some(project.path()), None)
        .await;

    assert!(recovery.query.starts_with("solution fix resolve "));
    assert!(recovery.query.ends_with(BLOCKER));
    assert_eq!(recovery.sources_searched, vec![SuggestionSource::CurrentSession]);
    assert_eq!(
        recovery.project_root.as_deref(),
        Some(project.path().display().to_string().as_str())
    );

    // Only the learning qualifies: blockers and hypotheses are never suggested.
    assert_eq!(recovery.suggestions.len(), 1);
    let suggestion = &recovery.suggestions[0];
    assert_eq!(
        suggestion.title,
        "Fix the undefined symbol linker error by adding the ffi module to build.rs"
    );
    assert_eq!(suggestion.source, SuggestionSource::CurrentSession);
    assert_eq!(suggestion.metadata.session_id.as_deref(), Some("r"));
    assert!(!suggestion.implementation.steps.is_empty());
    assert!(suggestion.relevance_score > 0.0 && suggestion.relevance_score <= 1.0);
}

#[tokio::test]
async fn test_suggestions_are_ranked_and_limited() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    seed_blockers(&session).await;
    for i in 0..5 {
        session
            .save_note(SessionNote::new(
                NoteType::Decision,
                format!("Resolve linker failure variant {i} by pinning the toolchain"),
            ))
            .await
            .unwrap();
    }

    let analysis = session.check_stuck_pattern(None).await;
    let recovery = session
        .get_recovery_suggestions(analysis.repeated_blocker, None, Some(3))
        .await;

    assert_eq!(recovery.suggestions.len(), 3);
    for pair in recovery.suggestions.windows(2) {
        assert!(pair[0].composite_score >= pair[1].composite_score);
    }
    assert!(recovery.project_root.is_none());
}

#[tokio::test]
async fn test_success_rate_lifts_ranking() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    seed_blockers(&session).await;
    let text = "Solution: clean the target directory and rebuild the ffi module";

    let mut proven = Map::new();
    proven.insert("success_rate".into(), json!(1.0));
    session
        .save_note(SessionNote::new(NoteType::Pattern, text).with_metadata(proven))
        .await
        .unwrap();

    let mut doubtful = Map::new();
    doubtful.insert("success_rate".into(), json!(0.0));
    session
        .save_note(SessionNote::new(NoteType::Pattern, text).with_metadata(doubtful))
        .await
        .unwrap();

    let analysis = session.check_stuck_pattern(None).await;
    let recovery = session
        .get_recovery_suggestions(analysis.repeated_blocker, None, Some(2))
        .await;

    assert_eq!(recovery.suggestions.len(), 2);
    assert_eq!(recovery.suggestions[0].metadata.success_rate, Some(1.0));
    assert_eq!(recovery.suggestions[1].metadata.success_rate, Some(0.0));
    // Same relevance and recency: the gap is the success weight (0.2).
    let gap = recovery.suggestions[0].composite_score - recovery.suggestions[1].composite_score;
    assert!((gap - 0.2).abs() < 1e-6);
    // The raw similarity is reported unchanged.
    assert!(
        (recovery.suggestions[0].relevance_score - recovery.suggestions[1].relevance_score).abs()
            < 1e-6
    );
}

#[tokio::test]
async fn test_valuable_notes_survive_many_blockers() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    // Blockers repeating the stuck text outrank everything in an unfiltered search.
    for _ in 0..25 {
        session
            .save_note(SessionNote::new(NoteType::Blocker, BLOCKER))
            .await
            .unwrap();
    }
    session
        .save_note(SessionNote::new(
            NoteType::Learning,
            "Regenerate bindings before linking",
        ))
        .await
        .unwrap();

    let analysis = session.check_stuck_pattern(None).await;
    assert!(analysis.repeated_blocker.detected);

    let recovery = session
        .get_recovery_suggestions(analysis.repeated_blocker, None, Some(5))
        .await;
    assert_eq!(recovery.suggestions.len(), 1);
    assert_eq!(
        recovery.suggestions[0].description,
        "Regenerate bindings before linking"
    );
}

#[tokio::test]
async fn test_no_progress_uses_generic_query() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(90);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    session
        .save_note(SessionNote::new(
            NoteType::Decision,
            "Next step: split the plan into smaller progress milestones",
        ))
        .await
        .unwrap();

    let analysis = session.check_stuck_pattern(None).await;
    assert_eq!(analysis.no_progress.pattern_type, StuckPatternType::NoProgress);
    assert!(analysis.no_progress.detected);

    let recovery = session
        .get_recovery_suggestions(analysis.no_progress, None, None)
        .await;
    assert_eq!(
        recovery.query,
        "next step approach plan breakthrough progress solution"
    );
    assert_eq!(recovery.suggestions.len(), 1);
}

#[tokio::test]
async fn test_empty_session_yields_no_suggestions() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(90);
    let session = helpers::start(&coordinator, "r", project.path()).await;

    let analysis = session.check_stuck_pattern(None).await;
    let recovery = session
        .get_recovery_suggestions(analysis.no_progress, None, Some(5))
        .await;
    assert!(recovery.suggestions.is_empty());

    let zero = session
        .get_recovery_suggestions(recovery.stuck_pattern, None, Some(0))
        .await;
    assert!(zero.suggestions.is_empty());
}

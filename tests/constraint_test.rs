mod helpers;

use vigil::memory::constraints::Severity;
use vigil::memory::types::{
    ConstraintScope, ConstraintStatus, DetectedFrom, NoteType, SessionNote,
};
use vigil::VigilError;

#[tokio::test]
async fn test_track_constraint_extracts_keywords() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let constraint = session
        .track_constraint(
            "Do not modify the database schema",
            DetectedFrom::Explicit,
            ConstraintScope::Session,
        )
        .await
        .unwrap();

    assert_eq!(constraint.status, ConstraintStatus::Active);
    assert_eq!(constraint.violated_count, 0);
    assert_eq!(
        constraint.keywords,
        vec!["not", "modify", "the", "database"]
    );

    let active = session.get_active_constraints().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, constraint.id);
}

#[tokio::test]
async fn test_keyword_match_is_a_violation() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let constraint = session
        .track_constraint(
            "Do not modify the database schema",
            DetectedFrom::Explicit,
            ConstraintScope::Session,
        )
        .await
        .unwrap();

    let check = session
        .check_violation("Modify the database to add an index column")
        .await
        .unwrap();
    assert!(check.violated);
    assert_eq!(check.violations.len(), 1);
    let violation = &check.violations[0];
    assert_eq!(violation.constraint_id, constraint.id);
    assert_eq!(violation.severity, Severity::High);
    assert!(violation.matched_keywords.contains(&"database".to_string()));
    assert!(violation.matched_keywords.contains(&"modify".to_string()));
    assert!(violation.reason.contains("keywords"));
}

#[tokio::test]
async fn test_unrelated_action_is_clean() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    session
        .track_constraint(
            "Do not modify the database schema",
            DetectedFrom::Explicit,
            ConstraintScope::Task,
        )
        .await
        .unwrap();

    let check = session
        .check_violation("Add logging to parser")
        .await
        .unwrap();
    assert!(!check.violated);
    assert!(check.violations.is_empty());
}

#[tokio::test]
async fn test_no_constraints_means_no_violation() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let check = session
        .check_violation("Drop every table in production")
        .await
        .unwrap();
    assert!(!check.violated);
}

#[tokio::test]
async fn test_task_scope_is_medium_severity() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    session
        .track_constraint(
            "Never push directly to main",
            DetectedFrom::Auto,
            ConstraintScope::Task,
        )
        .await
        .unwrap();

    let check = session
        .check_violation("push the hotfix directly to main")
        .await
        .unwrap();
    assert!(check.violated);
    assert_eq!(check.violations[0].severity, Severity::Medium);
}

#[tokio::test]
async fn test_lifted_constraint_is_no_longer_active() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let keep = session
        .track_constraint(
            "Only use stable Rust features",
            DetectedFrom::Explicit,
            ConstraintScope::Session,
        )
        .await
        .unwrap();
    let lift = session
        .track_constraint(
            "Do not modify the database schema",
            DetectedFrom::Explicit,
            ConstraintScope::Session,
        )
        .await
        .unwrap();

    let lifted = session.lift_constraint(&lift.id).await.unwrap();
    assert_eq!(lifted.id, lift.id);
    assert_eq!(lifted.status, ConstraintStatus::Lifted);
    assert!(lifted.content.starts_with("[LIFTED] "));

    let active = session.get_active_constraints().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);

    // The lifted constraint no longer produces violations.
    let check = session
        .check_violation("modify the database schema now")
        .await
        .unwrap();
    assert!(check
        .violations
        .iter()
        .all(|v| v.constraint_id != lift.id));
}

#[tokio::test]
async fn test_lifting_twice_writes_once() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let constraint = session
        .track_constraint(
            "Avoid unsafe blocks",
            DetectedFrom::Explicit,
            ConstraintScope::File,
        )
        .await
        .unwrap();

    session.lift_constraint(&constraint.id).await.unwrap();
    let again = session.lift_constraint(&constraint.id).await.unwrap();
    assert_eq!(again.status, ConstraintStatus::Lifted);

    let stats = session.get_stats().await.unwrap();
    assert_eq!(stats.by_type["constraint"], 2);
}

#[tokio::test]
async fn test_lift_unknown_constraint_fails() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let err = session.lift_constraint("no-such-id").await.err().unwrap();
    assert!(matches!(err, VigilError::ConstraintNotFound(ref id) if id == "no-such-id"));
    assert_eq!(err.kind(), "constraint_not_found");
}

#[tokio::test]
async fn test_constraint_note_is_tracked_as_constraint() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let id = session
        .save_note(SessionNote::new(
            NoteType::Constraint,
            "Must keep the CLI output stable",
        ))
        .await
        .unwrap();

    let active = session.get_active_constraints().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, id);
    assert_eq!(active[0].scope, ConstraintScope::Session);
    assert_eq!(active[0].detected_from, DetectedFrom::Explicit);

    // Constraints stay out of the valuable-memory export.
    assert!(session.extract_valuable_memories().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_rejects_constraint_notes_directly() {
    let (coordinator, _index) = helpers::test_coordinator();
    let project = helpers::project_dir(0);
    let session = helpers::start(&coordinator, "c", project.path()).await;

    let err = session
        .memory()
        .save_note(&SessionNote::new(NoteType::Constraint, "Never log secrets"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, VigilError::Validation(_)));
}

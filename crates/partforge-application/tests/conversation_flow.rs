//! End-to-end conversation flows over stubbed model and kernel.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{RoutedModel, ScriptedExecutor, VALID_SCRIPT, init_tracing};
use partforge_application::{ConversationService, InMemoryVersionRepository, VersionService};
use partforge_core::config::ForgeConfig;
use partforge_core::geometry::BoundingBox;
use partforge_core::session::ConversationPhase;
use partforge_core::version::VersionSource;

const READY_REPLY: &str = r#"{"updates": {"description": "a pen holder box",
"use_case": "holding pens", "dimensions": {"length": 50, "width": 30, "height": 20}},
"ready": true, "question": null}"#;

const NOT_READY_REPLY: &str = r#"{"updates": {"description": "something"},
"ready": false, "question": "What size should it be?"}"#;

fn fenced(script: &str) -> String {
    format!("```python\n{script}```")
}

fn service(model: RoutedModel, executor: ScriptedExecutor) -> ConversationService {
    init_tracing();
    ConversationService::new(
        Arc::new(model),
        Arc::new(executor),
        ForgeConfig::default(),
    )
}

#[tokio::test]
async fn test_full_design_flow_reaches_complete() {
    let model = RoutedModel::new(vec![READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(50.2, 30.1, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service.start(&session.id).await.unwrap();

    let view = service
        .handle_user_message(&session.id, "I want a 50x30x20 mm box for holding pens")
        .await
        .unwrap();

    assert_eq!(view.phase, ConversationPhase::Finalizing);
    let script = view.current_script.as_deref().unwrap();
    assert!(script.contains("result"));

    let geometry = view.current_geometry.as_ref().unwrap();
    assert!(geometry.bounding_box.approx_eq(50.0, 30.0, 20.0, 1.0));
    assert!(!geometry.parameters.is_empty());

    // Transcript carries every role's contribution
    let roles: Vec<String> = view
        .messages
        .iter()
        .filter_map(|m| m.agent_role.map(|r| r.to_string()))
        .collect();
    for expected in ["coordinator", "designer", "engineer", "physics", "manufacturing", "validator"]
    {
        assert!(roles.iter().any(|r| r == expected), "missing role {expected}");
    }

    let accepted = service.accept(&session.id).await.unwrap();
    assert_eq!(accepted.phase, ConversationPhase::Complete);
    assert!(accepted.complete);
}

#[tokio::test]
async fn test_premature_accept_is_a_state_error() {
    let model = RoutedModel::new(vec![NOT_READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(1.0, 1.0, 1.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    let err = service.accept(&session.id).await.unwrap_err();
    assert!(err.is_state());
}

#[tokio::test]
async fn test_gathering_asks_questions_until_ready() {
    let model = RoutedModel::new(vec![NOT_READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(1.0, 1.0, 1.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    let view = service
        .handle_user_message(&session.id, "I want something")
        .await
        .unwrap();

    assert_eq!(view.phase, ConversationPhase::Gathering);
    assert!(view.current_script.is_none());
    assert!(
        view.messages
            .iter()
            .any(|m| m.content.contains("What size should it be?"))
    );
}

#[tokio::test]
async fn test_generate_now_skips_to_designing() {
    let model = RoutedModel::new(vec![NOT_READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service
        .handle_user_message(&session.id, "a rough box, you pick the details")
        .await
        .unwrap();

    let view = service.generate_now(&session.id).await.unwrap();
    assert_eq!(view.phase, ConversationPhase::Finalizing);
    assert!(view.current_script.is_some());
}

#[tokio::test]
async fn test_dimension_change_discards_script_and_regenerates() {
    let changed_reply = r#"{"updates": {"dimensions": {"length": 80}}, "ready": true}"#;
    let model = RoutedModel::new(
        vec![READY_REPLY, changed_reply],
        vec![&fenced(VALID_SCRIPT)],
    );
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service
        .handle_user_message(&session.id, "a 50x30x20 pen holder")
        .await
        .unwrap();

    let view = service
        .handle_user_message(&session.id, "actually make it 80 long")
        .await
        .unwrap();

    // The stale script was discarded and a new one generated in the same turn
    assert!(
        view.messages
            .iter()
            .any(|m| m.content.contains("previous script was discarded"))
    );
    assert_eq!(view.phase, ConversationPhase::Finalizing);
    assert!(view.current_script.is_some());
    assert_eq!(view.requirements.dimensions.length, Some(80.0));
}

#[tokio::test]
async fn test_feature_request_discards_script_and_regenerates() {
    // A new feature invalidates the script the same way a dimension
    // change does; merging it without regenerating would leave a stale
    // design on screen.
    let feature_reply = r#"{"updates": {"features": ["mounting hole"]}, "ready": true}"#;
    let model = RoutedModel::new(
        vec![READY_REPLY, feature_reply],
        vec![&fenced(VALID_SCRIPT)],
    );
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service
        .handle_user_message(&session.id, "a 50x30x20 pen holder")
        .await
        .unwrap();

    let view = service
        .handle_user_message(&session.id, "add a mounting hole in the base")
        .await
        .unwrap();

    assert!(
        view.messages
            .iter()
            .any(|m| m.content.contains("previous script was discarded"))
    );
    assert_eq!(view.phase, ConversationPhase::Finalizing);
    assert!(view.current_script.is_some());
    assert!(
        view.requirements
            .features
            .contains(&"mounting hole".to_string())
    );
}

#[tokio::test]
async fn test_update_parameters_patches_and_reexecutes() {
    let model = RoutedModel::new(vec![READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(75.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service
        .handle_user_message(&session.id, "a 50x30x20 pen holder")
        .await
        .unwrap();

    let mut updates = BTreeMap::new();
    updates.insert("length".to_string(), 75.0);
    let view = service
        .update_parameters(&session.id, updates)
        .await
        .unwrap();

    let script = view.current_script.as_deref().unwrap();
    assert!(script.contains("length = 75"));
    let params = &view.current_geometry.as_ref().unwrap().parameters;
    assert_eq!(
        params.iter().find(|p| p.name == "length").unwrap().value,
        75.0
    );
}

#[tokio::test]
async fn test_update_parameters_rejects_invalid_values() {
    let model = RoutedModel::new(vec![READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    let mut updates = BTreeMap::new();
    updates.insert("length".to_string(), 0.0);
    let err = service
        .update_parameters(&session.id, updates)
        .await
        .unwrap_err();
    assert!(err.is_input());
}

#[tokio::test]
async fn test_generation_records_version_for_linked_part() {
    let model = RoutedModel::new(vec![READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let versions = Arc::new(VersionService::new(Arc::new(
        InMemoryVersionRepository::new(),
    )));
    let service = service(model, executor).with_versions(Arc::clone(&versions));

    let session = service.create_session(Some("part-1".to_string())).await;
    service
        .handle_user_message(&session.id, "a 50x30x20 pen holder")
        .await
        .unwrap();

    let history = versions.history("part-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, VersionSource::AiGenerate);
    assert!(history[0].bounding_box.is_some());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let model = RoutedModel::new(vec![], vec![]);
    let executor = ScriptedExecutor::always(BoundingBox::new(1.0, 1.0, 1.0));
    let service = service(model, executor);

    let err = service.session_view("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(service.cancel("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_complete_session_rejects_further_messages() {
    let model = RoutedModel::new(vec![READY_REPLY], vec![&fenced(VALID_SCRIPT)]);
    let executor = ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0));
    let service = service(model, executor);

    let session = service.create_session(None).await;
    service
        .handle_user_message(&session.id, "a 50x30x20 pen holder")
        .await
        .unwrap();
    service.accept(&session.id).await.unwrap();

    let err = service
        .handle_user_message(&session.id, "one more change")
        .await
        .unwrap_err();
    assert!(err.is_state());
}

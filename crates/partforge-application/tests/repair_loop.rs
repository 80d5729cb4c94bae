//! Repair-loop behavior against stubbed generation and kernel execution.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{RoutedModel, ScriptedExecutor, VALID_SCRIPT, init_tracing};
use partforge_application::{RepairLoop, Validator};
use partforge_core::config::{ForgeConfig, PrinterSettings};
use partforge_core::geometry::BoundingBox;
use partforge_interaction::{GenerationRequest, ScriptGenerator};
use partforge_kernel::ExecutionError;

fn fenced(script: &str) -> String {
    format!("```python\n{script}```")
}

fn repair_loop(
    model: Arc<RoutedModel>,
    executor: Arc<ScriptedExecutor>,
    max_attempts: u32,
) -> RepairLoop {
    init_tracing();
    let config = ForgeConfig::default();
    let generator = ScriptGenerator::new(model, &config);
    let validator = Validator::new(executor, PrinterSettings::default());
    RepairLoop::new(generator, validator, max_attempts)
}

#[tokio::test]
async fn test_budget_bound_on_always_invalid_scripts() {
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(VALID_SCRIPT)]));
    let executor = Arc::new(ScriptedExecutor::new(vec![Err(ExecutionError::Geometry(
        "BRep_API: command not done".to_string(),
    ))]));

    let report = repair_loop(Arc::clone(&model), Arc::clone(&executor), 3)
        .run(GenerationRequest::new("a cursed part"))
        .await;

    assert!(!report.success);
    assert_eq!(report.attempt_count(), 3);
    assert_eq!(executor.call_count(), 3);
    assert_eq!(model.generation_calls.load(Ordering::SeqCst), 3);
    // Best-effort failure still carries a script and its diagnostics
    assert!(report.script.is_some());
    assert!(report.errors.iter().any(|e| e.contains("GeometryError")));
    assert_eq!(report.attempts.len(), 3);
}

#[tokio::test]
async fn test_second_attempt_succeeds_after_geometry_error() {
    // First execution fails, second succeeds: the retry is seeded with
    // the first failure's diagnostics.
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(VALID_SCRIPT)]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Err(ExecutionError::Geometry("no suitable edges".to_string())),
        Ok(BoundingBox::new(50.0, 30.0, 20.0)),
    ]));

    let report = repair_loop(model, Arc::clone(&executor), 3)
        .run(GenerationRequest::new("a box with fillets"))
        .await;

    assert!(report.success);
    assert_eq!(report.attempt_count(), 2);
    assert_eq!(executor.call_count(), 2);
    assert_eq!(report.bounding_box, Some(BoundingBox::new(50.0, 30.0, 20.0)));
    // The failed first attempt is preserved in the history
    assert!(!report.attempts[0].errors.is_empty());
    assert!(report.attempts[1].errors.is_empty());
}

#[tokio::test]
async fn test_retry_prompt_carries_failed_script() {
    // The second prompt must show the model the script it is fixing, not
    // just the failure diagnostics.
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(VALID_SCRIPT)]));
    let executor = Arc::new(ScriptedExecutor::new(vec![
        Err(ExecutionError::Geometry("no suitable edges".to_string())),
        Ok(BoundingBox::new(50.0, 30.0, 20.0)),
    ]));

    let report = repair_loop(Arc::clone(&model), executor, 3)
        .run(GenerationRequest::new("a box with fillets"))
        .await;
    assert!(report.success);

    let prompts = model.generation_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("ERRORS TO FIX"));
    assert!(prompts[1].contains("Previous attempt"));
    assert!(prompts[1].contains("import cadquery"));
    assert!(prompts[1].contains("ERRORS TO FIX"));
    assert!(prompts[1].contains("GeometryError"));
}

#[tokio::test]
async fn test_auto_corrected_script_is_kept() {
    // The loop stores the corrected text, not the model's original reply.
    let script = "\
import cadquery as cq
length = 50
base = cq.Workplane(\"XY\").box(length, 30, 20)
result = base.add(cq.Workplane(\"XY\").box(10, 10, 10))
";
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(script)]));
    let executor = Arc::new(ScriptedExecutor::always(BoundingBox::new(50.0, 30.0, 20.0)));

    let report = repair_loop(model, executor, 3)
        .run(GenerationRequest::new("a box with a bump"))
        .await;

    assert!(report.success);
    let kept = report.script.unwrap();
    assert!(kept.contains(".union("));
    assert!(!kept.contains(".add("));
    assert!(report.warnings.iter().any(|w| w.starts_with("Auto-corrected:")));
}

#[tokio::test]
async fn test_zero_wall_warns_but_does_not_reject() {
    let script = "\
import cadquery as cq
wall_thickness = 0
result = cq.Workplane(\"XY\").box(10, 10, 10)
";
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(script)]));
    let executor = Arc::new(ScriptedExecutor::always(BoundingBox::new(10.0, 10.0, 10.0)));

    let report = repair_loop(model, executor, 3)
        .run(GenerationRequest::new("a thin box"))
        .await;

    assert!(report.success);
    assert_eq!(report.attempt_count(), 1);
    assert!(report.warnings.iter().any(|w| w.contains("wall_thickness")));
}

#[tokio::test]
async fn test_generation_failure_consumes_an_attempt() {
    // An empty reply is a generation failure; it burns budget like a
    // kernel failure and the loop still terminates.
    let model = Arc::new(RoutedModel::new(vec![], vec![""]));
    let executor = Arc::new(ScriptedExecutor::always(BoundingBox::new(1.0, 1.0, 1.0)));

    let report = repair_loop(model, Arc::clone(&executor), 2)
        .run(GenerationRequest::new("anything"))
        .await;

    assert!(!report.success);
    assert_eq!(report.attempt_count(), 2);
    // Generation never produced a script, so the kernel never ran
    assert_eq!(executor.call_count(), 0);
    assert!(report.attempts.iter().all(|a| a.script.is_none()));
}

#[tokio::test]
async fn test_static_rejection_never_reaches_kernel() {
    // Script missing the result binding is rejected statically on every
    // attempt; the kernel is never consulted.
    let script = "import cadquery as cq\nbox = cq.Workplane(\"XY\").box(1, 1, 1)\n";
    let model = Arc::new(RoutedModel::new(vec![], vec![&fenced(script)]));
    let executor = Arc::new(ScriptedExecutor::always(BoundingBox::new(1.0, 1.0, 1.0)));

    let report = repair_loop(model, Arc::clone(&executor), 2)
        .run(GenerationRequest::new("a box"))
        .await;

    assert!(!report.success);
    assert_eq!(executor.call_count(), 0);
    assert!(report.errors.iter().any(|e| e.contains("result")));
}

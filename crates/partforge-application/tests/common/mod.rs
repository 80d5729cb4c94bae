//! Shared stubs for deterministic pipeline tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use partforge_core::geometry::BoundingBox;
use partforge_interaction::{CapabilityError, CompletionRequest, LanguageModel};
use partforge_kernel::{ExecutionError, GeometryResult, ScriptExecutor};

/// Installs a test-writer subscriber once per process; later calls are
/// no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A CadQuery script that passes every static check.
pub const VALID_SCRIPT: &str = "\
import cadquery as cq

length = 50
width = 30
height = 20
fillet_radius = 2

result = (
    cq.Workplane(\"XY\")
    .box(length, width, height)
    .edges(\"|Z\").fillet(fillet_radius)
)
";

/// Routes on the system prompt so each agent role gets its own scripted
/// reply. Generation replies are consumed in order; the last one repeats.
pub struct RoutedModel {
    pub requirements_replies: Mutex<VecDeque<String>>,
    pub generation_replies: Mutex<VecDeque<String>>,
    pub generation_calls: AtomicUsize,
    /// Every generation user prompt, in call order, for assertions on
    /// what the model was shown.
    pub generation_prompts: Mutex<Vec<String>>,
}

impl RoutedModel {
    pub fn new(
        requirements_replies: Vec<&str>,
        generation_replies: Vec<&str>,
    ) -> Self {
        Self {
            requirements_replies: Mutex::new(
                requirements_replies.into_iter().map(String::from).collect(),
            ),
            generation_replies: Mutex::new(
                generation_replies.into_iter().map(String::from).collect(),
            ),
            generation_calls: AtomicUsize::new(0),
            generation_prompts: Mutex::new(Vec::new()),
        }
    }

    fn next(queue: &Mutex<VecDeque<String>>) -> String {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl LanguageModel for RoutedModel {
    fn expertise(&self) -> &str {
        "scripted test model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        let system = &request.system;
        if system.contains("Requirements Agent") {
            Ok(Self::next(&self.requirements_replies))
        } else if system.contains("Designer Agent") {
            Ok("Rounded corners and a slight chamfer at the base would suit this part.".into())
        } else if system.contains("Physics Agent") {
            Ok("The walls are adequate for the stated load.".into())
        } else if system.contains("Manufacturing Agent") {
            Ok("Prints flat without supports.".into())
        } else if system.contains("Coordinator") || system.contains("Validator Agent") {
            Ok("Understood.".into())
        } else {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            self.generation_prompts
                .lock()
                .unwrap()
                .push(request.prompt.clone());
            Ok(Self::next(&self.generation_replies))
        }
    }
}

/// Returns scripted kernel results in order; the last one repeats. Counts
/// executions so tests can assert the attempt budget.
pub struct ScriptedExecutor {
    results: Mutex<VecDeque<Result<BoundingBox, ExecutionError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<BoundingBox, ExecutionError>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(bounding_box: BoundingBox) -> Self {
        Self::new(vec![Ok(bounding_box)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn execute(&self, _script: &str) -> Result<GeometryResult, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.results.lock().unwrap();
        let result = if results.len() > 1 {
            results.pop_front().unwrap()
        } else {
            results
                .front()
                .cloned()
                .unwrap_or(Err(ExecutionError::Internal("no scripted result".into())))
        };
        result.map(|bounding_box| GeometryResult { bounding_box })
    }
}

//! The turn-loop orchestrator.
//!
//! Drives the request/dispatch/merge cycle: ask the model for the next
//! step, dispatch any requested tool calls (independent calls concurrently
//! under a semaphore cap, dependent chains serially), merge results back
//! into the transcript in emission order, and repeat until the model
//! produces a final answer, the budget runs out, or the run is cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stringer_core::budget::TurnBudget;
use stringer_core::error::{Error, ModelError, Result};
use stringer_core::event::{DomainEvent, EventBus};
use stringer_core::model::{ModelClient, ModelRequest, ModelStep, StreamEvent, ToolSchema};
use stringer_core::tool::{ToolCall, ToolOutcome, ToolRegistry, ToolResult};
use stringer_core::transcript::{Entry, Session};

/// Instruction injected for the forced final call once the budget is spent.
const SUMMARIZE_NUDGE: &str =
    "The tool-call budget for this conversation has been reached. Do not request any further \
     tool calls. Provide the best partial answer you can from the information gathered so far, \
     and propose a narrowed follow-up the user could ask next.";

/// Fallback answer when even the summarization call yields nothing.
const EXHAUSTED_FALLBACK: &str =
    "I reached the tool-call budget before completing the research. Please narrow the request \
     and try again.";

/// Why a turn-loop run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The model produced a final answer with no further tool calls.
    Completed,
    /// The budget ran out; the text is a forced best-effort summary.
    BudgetExhausted,
    /// The run was cancelled; the text is the best partial output.
    Cancelled,
}

/// The result of a turn-loop run.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text: String,
    pub reason: TerminationReason,
}

/// Cooperative cancellation flag, observed at dispatch boundaries.
///
/// No handler is interrupted mid-flight: cancelling takes effect before the
/// next model call or dispatch round, not preemptively.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The turn-loop orchestration engine.
pub struct TurnLoop {
    model: Arc<dyn ModelClient>,
    model_name: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    concurrency: usize,
    event_bus: Arc<EventBus>,
    cancel: CancelHandle,
    stream: Option<mpsc::Sender<StreamEvent>>,
}

impl TurnLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        model_name: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature,
            max_tokens: None,
            tools,
            concurrency: 4,
            event_bus,
            cancel: CancelHandle::new(),
            stream: None,
        }
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the concurrency cap for independent tool calls (min 1).
    pub fn with_concurrency(mut self, cap: usize) -> Self {
        self.concurrency = cap.max(1);
        self
    }

    /// Attach a stream event channel; the run then uses the model's
    /// streaming call and emits engine events as it goes.
    pub fn with_stream(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.stream = Some(tx);
        self
    }

    /// A handle that cancels this loop at the next dispatch boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    async fn emit(&self, event: StreamEvent) {
        if let Some(tx) = &self.stream {
            let _ = tx.send(event).await;
        }
    }

    /// Run the loop until completion, budget exhaustion, or cancellation.
    ///
    /// Mutates only the session (transcript + continuation token) and the
    /// shared budget counter.
    pub async fn run(&self, session: &mut Session, budget: &TurnBudget) -> Result<TurnOutcome> {
        if !session.transcript.is_seeded() {
            return Err(Error::InvalidInput(
                "transcript must contain a system briefing and a user message".into(),
            ));
        }
        if self.tools.is_empty() {
            return Err(Error::InvalidInput("tool registry is empty".into()));
        }
        if budget.max_turns() == 0 {
            return Err(Error::InvalidInput("budget max_turns must be > 0".into()));
        }

        info!(
            session_id = %session.transcript.id,
            entries = session.transcript.entries.len(),
            max_turns = budget.max_turns(),
            "Starting turn loop"
        );

        let tool_schemas = self.tools.schemas();

        loop {
            if self.cancel.is_cancelled() {
                info!(session_id = %session.transcript.id, "Turn loop cancelled");
                let text = session
                    .transcript
                    .last_assistant_text()
                    .unwrap_or_default()
                    .to_string();
                return Ok(TurnOutcome {
                    text,
                    reason: TerminationReason::Cancelled,
                });
            }

            if budget.is_exhausted() {
                let text = self.summarize(session).await?;
                return Ok(TurnOutcome {
                    text,
                    reason: TerminationReason::BudgetExhausted,
                });
            }

            let step = self
                .model_step(session, tool_schemas.clone())
                .await
                .map_err(Error::Model)?;

            if let Some(continuation) = &step.continuation {
                session.continuation = Some(continuation.clone());
            }

            self.event_bus.publish(DomainEvent::StepGenerated {
                session_id: session.transcript.id.to_string(),
                model: self.model_name.clone(),
                tool_calls: step.tool_calls.len(),
                timestamp: Utc::now(),
            });

            if let Some(agent) = &step.handoff {
                self.emit(StreamEvent::AgentHandoff {
                    agent: agent.clone(),
                })
                .await;
            }

            if step.is_final() {
                let text = step.message.unwrap_or_default();
                session.transcript.push(Entry::Assistant { text: text.clone() });
                self.emit(StreamEvent::FinalMessage { text: text.clone() })
                    .await;
                return Ok(TurnOutcome {
                    text,
                    reason: TerminationReason::Completed,
                });
            }

            // The step requested tools; any accompanying text is context
            if let Some(message) = &step.message {
                session.transcript.push(Entry::Assistant {
                    text: message.clone(),
                });
            }
            for call in &step.tool_calls {
                session.transcript.push(Entry::ToolCall(call.clone()));
            }

            debug!(
                count = step.tool_calls.len(),
                "Dispatching tool calls for this turn"
            );
            let results = self.dispatch(step.tool_calls, budget).await;

            // Merge back in emission (call-id) order, whatever the
            // completion order was
            for result in results {
                session
                    .transcript
                    .push_result(result)
                    .map_err(Error::Transcript)?;
            }
        }
    }

    /// Ask the model for the next step, streaming deltas when attached.
    async fn model_step(
        &self,
        session: &Session,
        tools: Vec<ToolSchema>,
    ) -> std::result::Result<ModelStep, ModelError> {
        let request = ModelRequest {
            model: self.model_name.clone(),
            entries: session.transcript.entries.clone(),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            continuation: session.continuation.clone(),
        };

        let Some(tx) = &self.stream else {
            return self.model.next_step(request).await;
        };

        let mut rx = self.model.stream(request).await?;
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut handoff = None;

        while let Some(chunk) = rx.recv().await {
            match chunk {
                Ok(chunk) => {
                    if let Some(delta) = chunk.content {
                        content.push_str(&delta);
                        let _ = tx.send(StreamEvent::TokenDelta { text: delta }).await;
                    }
                    if chunk.handoff.is_some() {
                        handoff = chunk.handoff;
                    }
                    if !chunk.tool_calls.is_empty() {
                        tool_calls = chunk.tool_calls;
                    }
                    if chunk.done {
                        break;
                    }
                }
                // An interrupted stream with partial text degrades to a
                // best-effort step instead of failing the turn
                Err(ModelError::StreamInterrupted(reason)) if !content.is_empty() => {
                    warn!(reason = %reason, "Model stream interrupted, keeping partial text");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ModelStep {
            message: (!content.is_empty()).then_some(content),
            tool_calls,
            handoff,
            continuation: None,
        })
    }

    /// Dispatch one turn's tool calls.
    ///
    /// Independent calls run concurrently, capped by the semaphore; calls
    /// whose tools share a serial group run in emission order because each
    /// tighten-and-retry attempt depends on the previous one. Calls beyond
    /// the budget are refused with an error result instead of running.
    ///
    /// Returns results in emission order.
    async fn dispatch(&self, calls: Vec<ToolCall>, budget: &TurnBudget) -> Vec<ToolResult> {
        let mut results: Vec<Option<ToolResult>> = (0..calls.len()).map(|_| None).collect();

        // Partition: serial groups keep first-appearance order
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut independent: Vec<usize> = Vec::new();
        for (idx, call) in calls.iter().enumerate() {
            match self.tools.serial_group(&call.name) {
                Some(group) => match groups.iter_mut().find(|(name, _)| name.as_str() == group) {
                    Some((_, idxs)) => idxs.push(idx),
                    None => groups.push((group.to_string(), vec![idx])),
                },
                None => independent.push(idx),
            }
        }

        // Budget gate in emission order, so the counter and the started
        // events stay deterministic
        let mut runnable = vec![false; calls.len()];
        for (idx, call) in calls.iter().enumerate() {
            if budget.is_exhausted() {
                warn!(tool = %call.name, call_id = %call.id, "Refusing call: budget exhausted");
                results[idx] = Some(ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    outcome: ToolOutcome::Error("turn budget exhausted".into()),
                });
                continue;
            }
            let used = budget.record();
            runnable[idx] = true;

            self.emit(StreamEvent::ToolCallStarted {
                id: call.id.clone(),
                name: call.name.clone(),
            })
            .await;
            self.event_bus.publish(DomainEvent::ToolDispatched {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                timestamp: Utc::now(),
            });
            if budget.mark_for(used).is_some() {
                self.event_bus.publish(DomainEvent::BudgetWarning {
                    used,
                    max_turns: budget.max_turns(),
                    timestamp: Utc::now(),
                });
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<Vec<(usize, ToolResult, u64)>> = JoinSet::new();

        for idx in independent {
            if !runnable[idx] {
                continue;
            }
            let call = calls[idx].clone();
            let tools = self.tools.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if the runtime is shutting down
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let result = tools.dispatch(&call).await;
                vec![(idx, result, started.elapsed().as_millis() as u64)]
            });
        }

        for (_, idxs) in groups {
            let chain: Vec<(usize, ToolCall)> = idxs
                .into_iter()
                .filter(|idx| runnable[*idx])
                .map(|idx| (idx, calls[idx].clone()))
                .collect();
            if chain.is_empty() {
                continue;
            }
            let tools = self.tools.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let mut out = Vec::with_capacity(chain.len());
                for (idx, call) in chain {
                    let _permit = semaphore.clone().acquire_owned().await.ok();
                    let started = Instant::now();
                    let result = tools.dispatch(&call).await;
                    out.push((idx, result, started.elapsed().as_millis() as u64));
                }
                out
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let batch = match joined {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Tool task failed to join");
                    continue;
                }
            };
            for (idx, result, duration_ms) in batch {
                self.event_bus.publish(DomainEvent::ToolCompleted {
                    call_id: result.call_id.clone(),
                    tool_name: result.name.clone(),
                    success: !result.outcome.is_error(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                self.emit(StreamEvent::ToolCallFinished {
                    id: result.call_id.clone(),
                    name: result.name.clone(),
                    preview: result.outcome.to_model_text(),
                })
                .await;
                results[idx] = Some(result);
            }
        }

        // A panicked task leaves a hole; fill it so every recorded call
        // still gets a result
        results
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| ToolResult {
                    call_id: calls[idx].id.clone(),
                    name: calls[idx].name.clone(),
                    outcome: ToolOutcome::Error("tool task failed".into()),
                })
            })
            .collect()
    }

    /// Budget is spent: request one final tool-free summarization step.
    async fn summarize(&self, session: &mut Session) -> Result<String> {
        info!(
            session_id = %session.transcript.id,
            "Turn budget exhausted, requesting best-effort summary"
        );
        session.transcript.push(Entry::System {
            text: SUMMARIZE_NUDGE.into(),
        });

        let step = self
            .model_step(session, Vec::new())
            .await
            .map_err(Error::Model)?;

        let text = match step.message {
            Some(message) if !message.is_empty() => message,
            _ => EXHAUSTED_FALLBACK.to_string(),
        };
        session.transcript.push(Entry::Assistant { text: text.clone() });
        self.emit(StreamEvent::FinalMessage { text: text.clone() })
            .await;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use stringer_core::error::ToolError;
    use stringer_core::tool::Tool;
    use stringer_core::transcript::Transcript;
    use stringer_providers::ScriptedModel;

    /// Echo tool: returns its arguments.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(arguments)
        }
    }

    /// Records the number of simultaneously running executions.
    struct SlowTool {
        name: &'static str,
        group: Option<&'static str>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl SlowTool {
        fn new(name: &'static str, group: Option<&'static str>) -> Self {
            Self {
                name,
                group,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                order: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Sleeps, tracking concurrency"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn serial_group(&self) -> Option<&str> {
            self.group
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            // Earlier calls sleep longer so completion order inverts
            let millis = arguments["sleep_ms"].as_u64().unwrap_or(10);
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;

            self.order
                .lock()
                .unwrap()
                .push(arguments["tag"].as_str().unwrap_or("?").to_string());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(arguments)
        }
    }

    fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn seeded_session() -> Session {
        Session {
            transcript: Transcript::seeded("You are a research assistant.", "Chennai news"),
            continuation: None,
        }
    }

    fn turn_loop(model: Arc<dyn ModelClient>, registry: ToolRegistry) -> TurnLoop {
        TurnLoop::new(
            model,
            "scripted",
            0.0,
            Arc::new(registry),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn completes_after_tool_round() {
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: vec![call("call_1", "echo", serde_json::json!({"x": 1}))],
                ..Default::default()
            },
            ModelStep {
                message: Some("All done".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = seeded_session();
        let budget = TurnBudget::new(10);
        let outcome = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap();

        assert_eq!(outcome.reason, TerminationReason::Completed);
        assert_eq!(outcome.text, "All done");
        assert_eq!(budget.used(), 1);
        session.transcript.verify_integrity().unwrap();
        assert_eq!(
            session.transcript.last_assistant_text(),
            Some("All done")
        );
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_and_continues() {
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: vec![call("call_1", "fetch_stock_price", serde_json::json!({}))],
                ..Default::default()
            },
            ModelStep {
                message: Some("Recovered".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = seeded_session();
        let budget = TurnBudget::new(10);
        let outcome = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap();

        assert_eq!(outcome.reason, TerminationReason::Completed);
        let error_result = session
            .transcript
            .entries
            .iter()
            .find_map(|e| match e {
                Entry::ToolResult(r) if r.call_id == "call_1" => Some(r.clone()),
                _ => None,
            })
            .expect("tool result recorded");
        match error_result.outcome {
            ToolOutcome::Error(message) => assert_eq!(message, "unknown tool"),
            ToolOutcome::Payload(_) => panic!("expected an error outcome"),
        }
    }

    #[tokio::test]
    async fn budget_exhaustion_forces_summary() {
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: vec![
                    call("call_1", "echo", serde_json::json!({})),
                    call("call_2", "echo", serde_json::json!({})),
                ],
                ..Default::default()
            },
            ModelStep {
                message: Some("Partial findings so far".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = seeded_session();
        let budget = TurnBudget::new(2);
        let outcome = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap();

        assert_eq!(outcome.reason, TerminationReason::BudgetExhausted);
        assert_eq!(outcome.text, "Partial findings so far");
        assert!(!outcome.text.is_empty());
        assert_eq!(budget.used(), 2);
        // The summarization nudge went in before the final answer
        assert!(session.transcript.entries.iter().any(
            |e| matches!(e, Entry::System { text } if text.contains("budget"))
        ));
    }

    #[tokio::test]
    async fn calls_beyond_budget_are_refused_not_dispatched() {
        let model = Arc::new(ScriptedModel::new([ModelStep {
            tool_calls: vec![
                call("call_1", "echo", serde_json::json!({})),
                call("call_2", "echo", serde_json::json!({})),
                call("call_3", "echo", serde_json::json!({})),
            ],
            ..Default::default()
        }]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = seeded_session();
        let budget = TurnBudget::new(1);
        let outcome = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap();

        // Only one call was actually dispatched
        assert_eq!(budget.used(), 1);
        assert_eq!(outcome.reason, TerminationReason::BudgetExhausted);

        let refused: Vec<_> = session
            .transcript
            .entries
            .iter()
            .filter_map(|e| match e {
                Entry::ToolResult(r) => match &r.outcome {
                    ToolOutcome::Error(msg) if msg.contains("budget") => Some(r.call_id.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(refused, vec!["call_2".to_string(), "call_3".to_string()]);
        session.transcript.verify_integrity().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_cap_bounds_in_flight_calls() {
        let slow = SlowTool::new("slow", None);
        let max_in_flight = slow.max_in_flight.clone();

        let calls: Vec<ToolCall> = (1..=7)
            .map(|i| {
                call(
                    &format!("call_{i}"),
                    "slow",
                    serde_json::json!({"tag": format!("t{i}"), "sleep_ms": 50}),
                )
            })
            .collect();
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: calls,
                ..Default::default()
            },
            ModelStep {
                message: Some("done".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(slow));

        let mut session = seeded_session();
        let budget = TurnBudget::new(20);
        let outcome = turn_loop(model, registry)
            .with_concurrency(3)
            .run(&mut session, &budget)
            .await
            .unwrap();

        assert_eq!(outcome.reason, TerminationReason::Completed);
        assert!(
            max_in_flight.load(Ordering::SeqCst) <= 3,
            "at most 3 calls in flight, saw {}",
            max_in_flight.load(Ordering::SeqCst)
        );

        // All 7 merged, in emission order, regardless of completion order
        let result_ids: Vec<&str> = session
            .transcript
            .entries
            .iter()
            .filter_map(|e| match e {
                Entry::ToolResult(r) => Some(r.call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            result_ids,
            vec!["call_1", "call_2", "call_3", "call_4", "call_5", "call_6", "call_7"]
        );
        session.transcript.verify_integrity().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn results_merge_in_emission_order_despite_completion_order() {
        let slow = SlowTool::new("slow", None);
        let order = slow.order.clone();

        // Earlier calls sleep longer, so they complete last
        let calls: Vec<ToolCall> = (1..=3)
            .map(|i| {
                call(
                    &format!("call_{i}"),
                    "slow",
                    serde_json::json!({"tag": format!("t{i}"), "sleep_ms": (4 - i) * 40}),
                )
            })
            .collect();
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: calls,
                ..Default::default()
            },
            ModelStep {
                message: Some("done".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(slow));

        let mut session = seeded_session();
        let budget = TurnBudget::new(20);
        turn_loop(model, registry)
            .with_concurrency(3)
            .run(&mut session, &budget)
            .await
            .unwrap();

        // Completion order was inverted...
        assert_eq!(
            order.lock().unwrap().clone(),
            vec!["t3".to_string(), "t2".to_string(), "t1".to_string()]
        );
        // ...but the transcript is in emission order
        let result_ids: Vec<&str> = session
            .transcript
            .entries
            .iter()
            .filter_map(|e| match e {
                Entry::ToolResult(r) => Some(r.call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(result_ids, vec!["call_1", "call_2", "call_3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn serial_group_calls_never_overlap() {
        let chained = SlowTool::new("chained_search", Some("source-filter"));
        let max_in_flight = chained.max_in_flight.clone();
        let order = chained.order.clone();

        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: vec![
                    call("call_1", "chained_search", serde_json::json!({"tag": "a", "sleep_ms": 80})),
                    call("call_2", "chained_search", serde_json::json!({"tag": "b", "sleep_ms": 10})),
                ],
                ..Default::default()
            },
            ModelStep {
                message: Some("done".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(chained));

        let mut session = seeded_session();
        let budget = TurnBudget::new(20);
        turn_loop(model, registry)
            .with_concurrency(4)
            .run(&mut session, &budget)
            .await
            .unwrap();

        // Dependent attempts were serialized in emission order even though
        // the first was much slower
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            order.lock().unwrap().clone(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn cancelled_run_returns_partial() {
        let model = Arc::new(ScriptedModel::new([ModelStep {
            message: Some("never reached".into()),
            ..Default::default()
        }]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let agent = turn_loop(model, registry);
        agent.cancel_handle().cancel();

        let mut session = seeded_session();
        session.transcript.push(Entry::Assistant {
            text: "partial so far".into(),
        });
        let budget = TurnBudget::new(10);
        let outcome = agent.run(&mut session, &budget).await.unwrap();

        assert_eq!(outcome.reason, TerminationReason::Cancelled);
        assert_eq!(outcome.text, "partial so far");
    }

    #[tokio::test]
    async fn unseeded_transcript_rejected() {
        let model = Arc::new(ScriptedModel::new([]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = Session::new();
        let budget = TurnBudget::new(10);
        let err = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_registry_rejected() {
        let model = Arc::new(ScriptedModel::new([]));
        let mut session = seeded_session();
        let budget = TurnBudget::new(10);
        let err = turn_loop(model, ToolRegistry::new())
            .run(&mut session, &budget)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn zero_budget_rejected() {
        let model = Arc::new(ScriptedModel::new([]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let mut session = seeded_session();
        let budget = TurnBudget::new(0);
        let err = turn_loop(model, registry)
            .run(&mut session, &budget)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn streaming_emits_events_in_order() {
        let model = Arc::new(ScriptedModel::new([
            ModelStep {
                tool_calls: vec![call("call_1", "echo", serde_json::json!({"x": 1}))],
                handoff: Some("Citations Agent".into()),
                ..Default::default()
            },
            ModelStep {
                message: Some("Hello".into()),
                ..Default::default()
            },
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let (tx, mut rx) = mpsc::channel(64);
        let agent = turn_loop(model, registry).with_stream(tx);

        let mut session = seeded_session();
        let budget = TurnBudget::new(10);
        let outcome = agent.run(&mut session, &budget).await.unwrap();
        assert_eq!(outcome.text, "Hello");
        // Drop the loop so the sender closes and the drain below finishes
        drop(agent);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.event_type().to_string());
        }
        assert_eq!(
            events,
            vec![
                "agent_handoff",
                "tool_call_started",
                "tool_call_finished",
                "token_delta",
                "final_message",
            ]
        );
    }
}

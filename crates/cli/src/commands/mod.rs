//! Command implementations and the shared runtime wiring.

pub mod chat;
pub mod research;

use std::io::Write as _;
use std::sync::Arc;

use stringer_agent::{BriefingOptions, CancelHandle, Notice, TurnLoop, TurnOutcome};
use stringer_config::AppConfig;
use stringer_core::budget::TurnBudget;
use stringer_core::event::EventBus;
use stringer_core::model::ModelClient;
use stringer_core::search::Depth;
use stringer_core::tool::ToolRegistry;
use stringer_core::transcript::Session;

/// Language/depth options carried from the CLI flags into a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub depth: Option<String>,
    pub source_lang: Option<String>,
    pub output_lang: Option<String>,
}

/// Everything a command needs to drive sessions.
pub struct Runtime {
    pub config: AppConfig,
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub event_bus: Arc<EventBus>,
}

impl Runtime {
    /// Load config and wire the backends, failing early with a clear,
    /// user-facing message when a required credential is missing.
    pub fn build() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

        if config.api_key.is_none() {
            eprintln!();
            eprintln!("  ERROR: No model API key configured!");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    OPENAI_API_KEY    (OpenAI direct)");
            eprintln!("    STRINGER_API_KEY  (generic)");
            eprintln!();
            eprintln!("  Or add api_key to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            return Err("No model API key found. See above for setup instructions.".into());
        }

        let event_bus = Arc::new(EventBus::default());
        let tools = stringer_tools::registry_from_config(&config, event_bus.clone())
            .map_err(|e| {
                eprintln!();
                eprintln!("  ERROR: {e}");
                eprintln!();
                eprintln!("  Web search requires a Linkup key:");
                eprintln!("    LINKUP_API_KEY");
                eprintln!();
                format!("{e}")
            })?;

        let router = stringer_providers::build_from_config(&config)?;
        let model = router.default().ok_or("No model backend configured")?;

        tracing::debug!(
            model = %config.default_model,
            max_turns = config.turn_loop.max_turns,
            concurrency = config.turn_loop.concurrency,
            "Runtime wired"
        );

        Ok(Self {
            config,
            model,
            tools: Arc::new(tools),
            event_bus,
        })
    }

    /// The effective search depth for a session.
    pub fn depth(&self, options: &SessionOptions) -> Depth {
        options
            .depth
            .as_deref()
            .unwrap_or(&self.config.search.depth)
            .parse()
            .unwrap_or(Depth::Standard)
    }

    /// The system briefing for a session.
    pub fn briefing(&self, options: &SessionOptions) -> String {
        stringer_agent::research_briefing(&BriefingOptions {
            depth: self.depth(options),
            source_lang: options.source_lang.clone(),
            output_lang: options.output_lang.clone(),
            max_turns: self.config.turn_loop.max_turns,
            concurrency: self.config.turn_loop.concurrency,
            filter_attempts: self.config.filter.max_attempts,
        })
    }

    /// Build a turn loop wired to a stream event channel.
    pub fn turn_loop(
        &self,
        stream: tokio::sync::mpsc::Sender<stringer_core::model::StreamEvent>,
    ) -> TurnLoop {
        TurnLoop::new(
            self.model.clone(),
            &self.config.default_model,
            self.config.default_temperature,
            self.tools.clone(),
            self.event_bus.clone(),
        )
        .with_max_tokens(self.config.default_max_tokens)
        .with_concurrency(self.config.turn_loop.concurrency)
        .with_stream(stream)
    }
}

/// Render progress notices as they arrive.
pub async fn render_notices(mut rx: tokio::sync::mpsc::UnboundedReceiver<Notice>) {
    let mut streaming = false;
    while let Some(notice) = rx.recv().await {
        match notice {
            Notice::ResponseStarted => {
                streaming = true;
                println!();
            }
            Notice::Token(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            Notice::ToolStarted { seq, name } => {
                println!("  [{seq}] Calling tool: {name}");
            }
            Notice::ToolFinished { name, preview } => {
                println!("  Tool completed: {name}: {preview}");
            }
            Notice::Handoff { agent } => {
                println!("  Agent updated: {agent}");
            }
            Notice::BudgetApproaching { used, max_turns } => {
                println!("  ! Approaching turn limit: {used}/{max_turns}. Consider narrowing scope.");
            }
            Notice::BudgetFinal { used, max_turns } => {
                println!("  ! Almost at turn limit: {used}/{max_turns}.");
            }
            Notice::BudgetReached { used, max_turns } => {
                println!("  ! Turn limit reached: {used}/{max_turns}. Summarizing partial results.");
            }
        }
    }
    if streaming {
        println!();
    }
}

/// Drive a run to completion, cancelling cleanly on Ctrl+C.
///
/// Cancellation takes effect at the loop's next dispatch boundary, so an
/// interrupt yields a well-defined partial result instead of an abort.
pub async fn run_with_interrupt(
    agent: &TurnLoop,
    session: &mut Session,
    budget: &TurnBudget,
) -> stringer_core::error::Result<TurnOutcome> {
    let cancel: CancelHandle = agent.cancel_handle();
    let run = agent.run(session, budget);
    tokio::pin!(run);
    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    eprintln!("  (interrupted — wrapping up with partial results)");
                    cancel.cancel();
                }
            }
        }
    }
}

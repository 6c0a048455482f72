//! One-shot research mode: answer a single topic and exit.

use std::sync::Arc;

use stringer_agent::{StreamProcessor, TerminationReason};
use stringer_core::budget::TurnBudget;
use stringer_core::transcript::{Session, Transcript};
use tokio::sync::mpsc;

use super::{Runtime, SessionOptions, render_notices, run_with_interrupt};

pub async fn run(
    topic: &str,
    options: SessionOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build()?;

    let budget = Arc::new(TurnBudget::new(runtime.config.turn_loop.max_turns));
    let (event_tx, event_rx) = mpsc::channel(256);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();

    let processor = StreamProcessor::new(budget.clone(), runtime.config.turn_loop.preview_chars)
        .with_notices(notice_tx);
    let render_task = tokio::spawn(render_notices(notice_rx));
    let process_task = tokio::spawn(async move { processor.process(event_rx).await });

    let agent = runtime.turn_loop(event_tx);
    let mut session = Session {
        transcript: Transcript::seeded(runtime.briefing(&options), topic),
        continuation: None,
    };

    eprintln!("  Researching: {topic}");
    let outcome = run_with_interrupt(&agent, &mut session, &budget).await;

    // Close the stream so the processor and renderer drain and finish
    drop(agent);
    let summary = process_task.await?;
    render_task.await?;

    match outcome {
        Ok(outcome) => {
            println!();
            println!("{}", outcome.text);
            match outcome.reason {
                TerminationReason::BudgetExhausted => {
                    eprintln!();
                    eprintln!(
                        "  (tool budget reached after {} calls — answer is a partial synthesis)",
                        budget.used()
                    );
                }
                TerminationReason::Cancelled => {
                    eprintln!();
                    eprintln!("  (interrupted — answer reflects partial research)");
                }
                TerminationReason::Completed => {}
            }
            Ok(())
        }
        Err(e) => {
            // Never exit silently: show any partial text before the error
            if !summary.final_text.is_empty() {
                println!();
                println!("{}", summary.final_text);
            }
            Err(format!("Research failed: {e}").into())
        }
    }
}

//! Interactive chat mode.
//!
//! The session object owns the transcript, continuation token, and turn
//! budget for the whole conversation; `/reset` replaces all three.

use std::io::Write as _;
use std::sync::Arc;

use stringer_agent::{StreamProcessor, TerminationReason};
use stringer_core::budget::TurnBudget;
use stringer_core::transcript::{Entry, Session, Transcript};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::{Runtime, SessionOptions, render_notices, run_with_interrupt};

pub async fn run(mut options: SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build()?;

    println!();
    println!("  Stringer — Research Chat");
    println!();
    println!("  Model:  {}", runtime.config.default_model);
    println!("  Tools:  {}", {
        let mut names = runtime.tools.names();
        names.sort();
        names.join(", ")
    });
    println!("  Budget: {} tool calls per conversation", runtime.config.turn_loop.max_turns);
    println!();
    println!("  Commands: /quit, /reset, /depth standard|deep, /srclang CODE, /outlang CODE");
    println!();

    let mut session = Session::new();
    let mut budget = Arc::new(TurnBudget::new(runtime.config.turn_loop.max_turns));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim().to_string();
        if prompt.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        match prompt.to_lowercase().as_str() {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                budget = Arc::new(TurnBudget::new(runtime.config.turn_loop.max_turns));
                println!("  (history cleared; new conversation: {})", session.transcript.id);
                print!("  You > ");
                std::io::stdout().flush()?;
                continue;
            }
            _ => {}
        }

        if let Some(rest) = prompt.strip_prefix("/depth") {
            let value = rest.trim();
            if matches!(value, "standard" | "deep") {
                options.depth = Some(value.into());
                println!("  Depth set to {value}");
            } else {
                println!("  Usage: /depth standard|deep");
            }
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if let Some(rest) = prompt.strip_prefix("/srclang") {
            let value = rest.trim();
            options.source_lang = (!value.is_empty()).then(|| value.to_uppercase());
            println!("  Source translation language: {:?}", options.source_lang);
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }
        if let Some(rest) = prompt.strip_prefix("/outlang") {
            let value = rest.trim();
            options.output_lang = (!value.is_empty()).then(|| value.to_uppercase());
            println!("  Output translation language: {:?}", options.output_lang);
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        // Seed the transcript on the first message; append afterwards.
        // Language/depth commands apply from the next fresh session.
        if session.transcript.entries.is_empty() {
            session.transcript = Transcript::seeded(runtime.briefing(&options), &prompt);
        } else {
            session.transcript.push(Entry::User { text: prompt });
        }

        let (event_tx, event_rx) = mpsc::channel(256);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let processor =
            StreamProcessor::new(budget.clone(), runtime.config.turn_loop.preview_chars)
                .with_notices(notice_tx);
        let render_task = tokio::spawn(render_notices(notice_rx));
        let process_task = tokio::spawn(async move { processor.process(event_rx).await });

        let agent = runtime.turn_loop(event_tx);
        let result = run_with_interrupt(&agent, &mut session, &budget).await;
        drop(agent);
        let summary = process_task.await?;
        render_task.await?;

        match result {
            Ok(outcome) => {
                // Streamed tokens already rendered the text; repeat it only
                // when nothing streamed
                if summary.streamed.is_empty() && !outcome.text.is_empty() {
                    println!();
                    for line in outcome.text.lines() {
                        println!("  Assistant > {line}");
                    }
                }
                if outcome.reason == TerminationReason::BudgetExhausted {
                    println!();
                    println!(
                        "  (conversation tool budget spent: {}/{} — /reset to start fresh)",
                        budget.used(),
                        budget.max_turns()
                    );
                }
                println!();
            }
            Err(e) => {
                println!();
                println!("  [Error] {e}");
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

//! Research briefing — the system instructions seeding each session.
//!
//! Every figure the briefing quotes (turn budget, concurrency, retry
//! attempts) is interpolated from the live configuration, so the prompt
//! can never disagree with what the engine actually enforces.

use stringer_core::search::Depth;

/// Options shaping the briefing text.
#[derive(Debug, Clone)]
pub struct BriefingOptions {
    pub depth: Depth,
    pub source_lang: Option<String>,
    pub output_lang: Option<String>,
    pub max_turns: u32,
    pub concurrency: usize,
    pub filter_attempts: u32,
}

/// Build the system briefing for a research session.
pub fn research_briefing(options: &BriefingOptions) -> String {
    let mut parts: Vec<String> = vec![
        "You are a research assistant. Use tools to gather sources and synthesize a concise, \
         cited answer. Prefer authoritative and recent sources; include inline citations."
            .into(),
        "If the query concerns a place, city, region, or 'local news', determine the place's \
         native language first (e.g. Tamil for Chennai, Marathi for Mumbai, Hindi for Delhi). \
         When the native language is not English, ONLY use sources in that language and \
         EXCLUDE English sources: call find_local_sources, then search_local_news with the \
         discovered sites, and issue a complementary web_search with native_language set. \
         Merge and deduplicate results before synthesis."
            .into(),
        format!(
            "Execution strategy: prefer calling independent tools in parallel rather than \
             serially; batch independent translate_text calls. Up to {} calls run \
             concurrently. Only the tighten-and-retry search flow is serialized, because each \
             attempt depends on the previous one's result.",
            options.concurrency
        ),
        format!(
            "Source filtering: when results drift global or English-heavy, the search tools \
             tighten include/exclude domain filters and retry, at most {} times, then report \
             policy_satisfied=false. Treat flagged results as best-effort and say so.",
            options.filter_attempts
        ),
        format!(
            "Tool budget: you have {} tool calls for this conversation. Scale usage with \
             complexity — a simple lookup needs 2-4 calls, a regional news synthesis 8-12. \
             You will be warned as the limit nears; at the limit, provide the best partial \
             synthesis and propose a narrowed follow-up.",
            options.max_turns
        ),
        format!("Default search depth is '{}'.", options.depth.as_str()),
        "For each news item, write a short 2-4 sentence blurb rather than just a link.".into(),
        "Translation policy: when a source or excerpt is not in English, call translate_text \
         for every quoted snippet and per-item blurb. If translate_text returns an error, you \
         may translate inline, annotated '[translated inline]'. Reused non-English sentences \
         must be annotated '[translated from <Language>]'."
            .into(),
    ];

    if let Some(lang) = &options.source_lang {
        parts.push(format!(
            "If source content is hard to read, translate short quoted snippets to {lang} \
             using translate_text."
        ));
    }
    match &options.output_lang {
        Some(lang) => parts.push(format!(
            "Deliver the final answer in {lang}; you may call translate_text to produce it."
        )),
        None => parts.push("Deliver the final synthesized answer in English.".into()),
    }

    parts.join(" ")
}

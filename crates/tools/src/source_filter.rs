//! Source-filter retry policy — the tighten-and-retry loop.
//!
//! Layered on top of the search capability: when a search returns sources
//! that violate the language/domain policy, the violating hosts are added
//! to the exclusion set, the inclusion set narrows toward hosts that have
//! complied, and the search is reissued. The loop is bounded by
//! `max_attempts` and always returns a result set — flagged when the
//! policy could not be fully satisfied.
//!
//! State machine:
//! `Initial -> Searched -> { Compliant | Tightening -> Searched | AttemptsExhausted }`

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use stringer_core::error::SearchError;
use stringer_core::event::{DomainEvent, EventBus};
use stringer_core::search::{SearchClient, SearchItem, SearchQuery};

use crate::lang;

/// Caller-supplied compliance predicate.
pub trait SourcePolicy: Send + Sync {
    /// Returns the violating host if the item breaks policy, `None` if the
    /// item complies.
    fn violation(&self, item: &SearchItem) -> Option<String>;
}

/// The shipped policy: a host complies when it is not on the blocklist and,
/// if ccTLD suffixes are known for the target language, carries one of them.
pub struct DomainPolicy {
    allowed_suffixes: Vec<String>,
    blocked_hosts: BTreeSet<String>,
}

impl DomainPolicy {
    pub fn new(
        allowed_suffixes: impl IntoIterator<Item = String>,
        blocked_hosts: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            allowed_suffixes: allowed_suffixes.into_iter().collect(),
            blocked_hosts: blocked_hosts.into_iter().collect(),
        }
    }

    /// Policy for a native language: its ccTLDs plus a generic-host
    /// blocklist. English (or an unknown language) disables the suffix
    /// check and keeps only the blocklist.
    pub fn for_language(native_language: &str, blocked_hosts: &[String]) -> Self {
        let suffixes = if lang::is_english(native_language) {
            vec![]
        } else {
            lang::cctlds_for(native_language)
                .into_iter()
                .map(|tld| format!(".{tld}"))
                .collect()
        };
        Self::new(suffixes, blocked_hosts.iter().cloned())
    }
}

impl SourcePolicy for DomainPolicy {
    fn violation(&self, item: &SearchItem) -> Option<String> {
        let host = item.host()?;
        if self
            .blocked_hosts
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
        {
            return Some(host);
        }
        if !self.allowed_suffixes.is_empty()
            && !self.allowed_suffixes.iter().any(|s| host.ends_with(s))
        {
            return Some(host);
        }
        None
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Every returned item complied with the policy.
    Compliant,
    /// Attempts ran out with violations still present.
    AttemptsExhausted,
}

/// The result of a filtered search sub-flow.
#[derive(Debug)]
pub struct FilterOutcome {
    /// Deduplicated items in first-seen order, capped at `top_n`.
    pub items: Vec<SearchItem>,

    /// False when the policy was not fully satisfied.
    pub policy_satisfied: bool,

    /// Searches performed (1..=max_attempts).
    pub attempts: u32,

    /// The final exclusion set, sorted.
    pub exclude_domains: Vec<String>,
}

/// Per-sub-flow retry state. Created for one "find sources then search"
/// flow and discarded when it completes.
struct RetryState {
    attempt: u32,
    include_domains: BTreeSet<String>,
    exclude_domains: BTreeSet<String>,
}

/// The bounded tighten-and-retry search loop.
pub struct FilteredSearch {
    max_attempts: u32,
    top_n: usize,
    events: Option<Arc<EventBus>>,
}

impl FilteredSearch {
    pub fn new(max_attempts: u32, top_n: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            top_n,
            events: None,
        }
    }

    /// Publish tightening events to the given bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run the loop. Dependent attempts are strictly sequential: each
    /// observes the previous attempt's result before deciding to retry.
    pub async fn run(
        &self,
        client: &dyn SearchClient,
        base: SearchQuery,
        policy: &dyn SourcePolicy,
    ) -> Result<FilterOutcome, SearchError> {
        let mut state = RetryState {
            attempt: 0,
            include_domains: base.include_domains.iter().cloned().collect(),
            exclude_domains: base.exclude_domains.iter().cloned().collect(),
        };

        // First-seen dedup across all attempts
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut collected: Vec<(SearchItem, bool)> = Vec::new();
        let mut compliant_hosts: BTreeSet<String> = BTreeSet::new();

        let verdict = loop {
            state.attempt += 1;
            let query = SearchQuery {
                query: base.query.clone(),
                depth: base.depth,
                include_domains: state.include_domains.iter().cloned().collect(),
                exclude_domains: state.exclude_domains.iter().cloned().collect(),
            };

            debug!(
                attempt = state.attempt,
                excluded = state.exclude_domains.len(),
                "Source-filter search attempt"
            );
            let items = client.search(query).await?;

            let mut violating_hosts: BTreeSet<String> = BTreeSet::new();
            for item in items {
                let violation = policy.violation(&item);
                match &violation {
                    Some(host) => {
                        violating_hosts.insert(host.clone());
                    }
                    None => {
                        if let Some(host) = item.host() {
                            compliant_hosts.insert(host);
                        }
                    }
                }
                if seen_urls.insert(item.url.clone()) {
                    collected.push((item, violation.is_none()));
                }
            }

            if violating_hosts.is_empty() {
                break FilterVerdict::Compliant;
            }
            if state.attempt >= self.max_attempts {
                break FilterVerdict::AttemptsExhausted;
            }

            // Tightening: exclusions only ever grow; inclusions narrow
            // toward hosts that have complied so far
            state.exclude_domains.extend(violating_hosts.iter().cloned());
            if !compliant_hosts.is_empty() {
                state.include_domains = compliant_hosts.clone();
            }

            info!(
                attempt = state.attempt,
                newly_excluded = violating_hosts.len(),
                "Results violate source policy, tightening filters"
            );
            if let Some(bus) = &self.events {
                bus.publish(DomainEvent::FilterTightened {
                    attempt: state.attempt,
                    excluded_hosts: violating_hosts.iter().cloned().collect(),
                    timestamp: Utc::now(),
                });
            }
        };

        let policy_satisfied = verdict == FilterVerdict::Compliant;

        // Compliant items first (stable order), violators only pad an
        // exhausted run
        let mut items: Vec<SearchItem> = collected
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(item, _)| item.clone())
            .collect();
        if !policy_satisfied {
            items.extend(
                collected
                    .iter()
                    .filter(|(_, ok)| !*ok)
                    .map(|(item, _)| item.clone()),
            );
        }
        items.truncate(self.top_n);

        Ok(FilterOutcome {
            items,
            policy_satisfied,
            attempts: state.attempt,
            exclude_domains: state.exclude_domains.into_iter().collect(),
        })
    }
}

/// Drop exact URL duplicates, keeping first-seen order.
pub fn dedupe_by_url(items: Vec<SearchItem>) -> Vec<SearchItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.url.clone()))
        .collect()
}

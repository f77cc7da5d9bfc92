use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::dataset::catalog::ProductRecord;
use crate::dataset::categories::CategoryRegistry;
use crate::dataset::session::{QueryEvent, RephraseSpan, Session, SessionSet};
use crate::error::{DataError, DataResult};

/// Per-session memo from literal query text to the first product that
/// resolved it. A `None` value means the text was seen without a product.
type QueryMemo = HashMap<String, Option<Arc<ProductRecord>>>;

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct NormalizeStats {
    pub sessions: usize,
    pub sessions_with_rephrase: usize,
    pub rephrase_spans: usize,
    pub unresolved_sessions: usize,
    pub resolved_sessions: usize,
    pub out_of_order_sessions: usize,
}

pub struct RephraseNormalizer<'a> {
    registry: &'a CategoryRegistry,
}

impl<'a> RephraseNormalizer<'a> {
    pub fn new(registry: &'a CategoryRegistry) -> Self {
        Self { registry }
    }

    /// Normalizes every session in parallel. Sessions stay in first-seen order.
    pub fn normalize_all(&self, sessions: &mut SessionSet) -> DataResult<NormalizeStats> {
        if sessions.is_empty() {
            return Ok(NormalizeStats::default());
        }

        sessions
            .as_mut_slice()
            .par_iter_mut()
            .try_for_each(|session| self.normalize(session))?;

        let mut stats = NormalizeStats {
            sessions: sessions.len(),
            ..NormalizeStats::default()
        };
        for session in sessions.iter() {
            stats.rephrase_spans += session.rephrase_spans.len();
            if session.has_rephrase() {
                stats.sessions_with_rephrase += 1;
            }
            if session.has_unresolved {
                stats.unresolved_sessions += 1;
            } else {
                stats.resolved_sessions += 1;
            }
            if !session.is_chronological() {
                debug!(session_id = session.session_id, "session events are not in timestamp order");
                stats.out_of_order_sessions += 1;
            }
        }

        Ok(stats)
    }

    /// Runs detect → backfill → propagate on one session, then assigns
    /// category ids when every event ended up with a product.
    pub fn normalize(&self, session: &mut Session) -> DataResult<()> {
        let (spans, memo) = detect_rephrases(&session.events);
        backfill_spans(&mut session.events, &spans);
        propagate_repeats(&mut session.events, &memo);
        session.rephrase_spans = spans;

        session.has_unresolved = session
            .events
            .iter()
            .any(|event| event.product_info.is_none());
        if session.has_unresolved {
            let missing = session
                .events
                .iter()
                .filter(|event| event.clicked && event.product_info.is_none())
                .find_map(|event| event.product_id);
            if let Some(product_id) = missing {
                debug!(
                    session_id = session.session_id,
                    product_id, "clicked product missing from catalog"
                );
            }
            return Ok(());
        }

        for event in &mut session.events {
            let Some(product) = event.product_info.as_ref() else {
                continue;
            };
            let key = product.category_key();
            let id = self
                .registry
                .resolve(&key)
                .ok_or_else(|| DataError::UnregisteredCategory {
                    key: key.to_string(),
                })?;
            event.category_id = Some(id);
        }

        Ok(())
    }
}

/// Single forward scan recording closed rephrase spans.
///
/// A repeat of an already-seen literal query drops any open chain without
/// recording it. A chain left open at the end of the session is discarded.
fn detect_rephrases(events: &[QueryEvent]) -> (Vec<RephraseSpan>, QueryMemo) {
    let mut spans = Vec::new();
    let mut memo = QueryMemo::new();
    let mut open_start: Option<usize> = None;

    for (index, event) in events.iter().enumerate() {
        let seen_before = memo.contains_key(&event.query_text);

        if seen_before {
            open_start = None;
        } else if !event.clicked && open_start.is_none() {
            open_start = Some(index);
        } else if event.clicked {
            if let Some(start) = open_start.take() {
                spans.push(RephraseSpan { start, end: index });
            }
        }

        match memo.get_mut(&event.query_text) {
            Some(slot) => {
                if slot.is_none() {
                    *slot = event.product_info.clone();
                }
            }
            None => {
                memo.insert(event.query_text.clone(), event.product_info.clone());
            }
        }
    }

    (spans, memo)
}

/// Copies each span's terminal product onto the events before it.
fn backfill_spans(events: &mut [QueryEvent], spans: &[RephraseSpan]) {
    for span in spans {
        let Some(terminal) = events[span.end].product_info.clone() else {
            continue;
        };
        for event in &mut events[span.start..span.end] {
            event.product_info = Some(Arc::clone(&terminal));
        }
    }
}

/// Gives every occurrence of a literal query the product that resolved it.
fn propagate_repeats(events: &mut [QueryEvent], memo: &QueryMemo) {
    for event in events {
        if let Some(Some(product)) = memo.get(&event.query_text) {
            event.product_info = Some(Arc::clone(product));
        }
    }
}

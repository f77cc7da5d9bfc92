use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::dataset::catalog::{ProductLookup, ProductRecord};
use crate::dataset::queries::QueryRow;

#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub session_id: u64,
    pub query_text: String,
    pub clicked: bool,
    pub product_id: Option<u64>,
    pub timestamp: NaiveDateTime,
    pub product_info: Option<Arc<ProductRecord>>,
    pub category_id: Option<usize>,
}

/// Inclusive `[start, end]` run of events ending at the clicked query that
/// resolved it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RephraseSpan {
    pub start: usize,
    pub end: usize,
}

/// Events of one search session in arrival order.
///
/// `has_unresolved` stays `true` until the rephrase normalizer proves every
/// event has a product.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: u64,
    pub events: Vec<QueryEvent>,
    pub rephrase_spans: Vec<RephraseSpan>,
    pub has_unresolved: bool,
}

impl Session {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            events: Vec::new(),
            rephrase_spans: Vec::new(),
            has_unresolved: true,
        }
    }

    pub fn add_interaction(&mut self, event: QueryEvent) {
        debug_assert_eq!(event.session_id, self.session_id);
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_rephrase(&self) -> bool {
        !self.rephrase_spans.is_empty()
    }

    /// True when every event is at or after its predecessor.
    pub fn is_chronological(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AssemblyStats {
    pub rows: usize,
    pub clicked_rows: usize,
    pub missing_product_clicks: usize,
}

/// Sessions keyed by id, iterated in first-seen order.
#[derive(Debug, Default)]
pub struct SessionSet {
    sessions: Vec<Session>,
    index: HashMap<u64, usize>,
}

impl SessionSet {
    #[cfg(test)]
    pub fn get(&self, session_id: u64) -> Option<&Session> {
        self.index.get(&session_id).map(|slot| &self.sessions[*slot])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Session> {
        self.sessions.iter()
    }

    pub fn as_mut_slice(&mut self) -> &mut [Session] {
        &mut self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn entry(&mut self, session_id: u64) -> &mut Session {
        let slot = match self.index.get(&session_id) {
            Some(slot) => *slot,
            None => {
                let slot = self.sessions.len();
                self.sessions.push(Session::new(session_id));
                self.index.insert(session_id, slot);
                slot
            }
        };
        &mut self.sessions[slot]
    }
}

impl<'a> IntoIterator for &'a SessionSet {
    type Item = &'a Session;
    type IntoIter = std::slice::Iter<'a, Session>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}

pub struct SessionAssembler<'a> {
    lookup: &'a ProductLookup,
}

impl<'a> SessionAssembler<'a> {
    pub fn new(lookup: &'a ProductLookup) -> Self {
        Self { lookup }
    }

    /// Groups rows by session id in arrival order. Clicked rows get their
    /// product attached when the catalog knows it.
    pub fn assemble(&self, rows: impl IntoIterator<Item = QueryRow>) -> (SessionSet, AssemblyStats) {
        let mut sessions = SessionSet::default();
        let mut stats = AssemblyStats::default();

        for row in rows {
            stats.rows += 1;

            let product_info = if row.clicked {
                stats.clicked_rows += 1;
                let found = row.product_id.and_then(|id| self.lookup.lookup(id));
                if found.is_none() {
                    stats.missing_product_clicks += 1;
                }
                found
            } else {
                None
            };

            sessions.entry(row.session_id).add_interaction(QueryEvent {
                session_id: row.session_id,
                query_text: row.query_text,
                clicked: row.clicked,
                product_id: row.product_id,
                timestamp: row.timestamp,
                product_info,
                category_id: None,
            });
        }

        (sessions, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::catalog::parse_catalog_line;
    use crate::dataset::queries::parse_query_line;

    fn rows(lines: &[&str]) -> Vec<QueryRow> {
        lines
            .iter()
            .enumerate()
            .map(|(index, line)| parse_query_line("queries", index + 2, line).unwrap())
            .collect()
    }

    #[test]
    fn assemble_groups_by_session_in_first_seen_order() {
        let lookup = ProductLookup::from_records(&[
            parse_catalog_line("catalog", 2, "5,WOMEN,A,Shoes,Sneakers").unwrap()
        ]);
        let (sessions, stats) = SessionAssembler::new(&lookup).assemble(rows(&[
            "2019-08-01 10:00:00,20,u,a,False,",
            "2019-08-01 10:00:01,10,u,b,True,5",
            "2019-08-01 10:00:02,20,u,c,True,5",
        ]));

        let order: Vec<u64> = sessions.iter().map(|session| session.session_id).collect();
        assert_eq!(order, vec![20, 10]);
        assert_eq!(sessions.get(20).unwrap().len(), 2);
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.clicked_rows, 2);
        assert_eq!(stats.missing_product_clicks, 0);
    }

    #[test]
    fn click_on_unknown_product_leaves_info_empty() {
        let lookup = ProductLookup::default();
        let (sessions, stats) = SessionAssembler::new(&lookup)
            .assemble(rows(&["2019-08-01 10:00:01,1,u,b,True,99"]));

        let event = &sessions.get(1).unwrap().events[0];
        assert_eq!(event.product_id, Some(99));
        assert!(event.product_info.is_none());
        assert_eq!(stats.missing_product_clicks, 1);
    }

    #[test]
    fn chronology_check_flags_out_of_order_events() {
        let lookup = ProductLookup::default();
        let (sessions, _) = SessionAssembler::new(&lookup).assemble(rows(&[
            "2019-08-01 10:00:05,1,u,a,False,",
            "2019-08-01 10:00:01,1,u,b,False,",
            "2019-08-01 10:00:00,2,u,a,False,",
            "2019-08-01 10:00:00,2,u,b,False,",
        ]));

        assert!(!sessions.get(1).unwrap().is_chronological());
        assert!(sessions.get(2).unwrap().is_chronological());
    }
}

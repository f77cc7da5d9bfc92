use std::io::{self, Write};

use chrono::NaiveDateTime;

use crate::dataset::session::{Session, SessionSet};

/// Writes one session as its query trace followed by its rephrase chains.
///
/// Trace entries read `query (Clicked Δt)` where Δt is the number of seconds
/// since the previous query, `-1` for the first one.
pub fn write_session<W: Write>(writer: &mut W, session: &Session) -> io::Result<()> {
    writeln!(writer, "session {}", session.session_id)?;

    let mut previous: Option<NaiveDateTime> = None;
    for event in &session.events {
        let delta = match previous {
            None => "-1".to_string(),
            Some(earlier) => {
                let millis = (event.timestamp - earlier).num_milliseconds();
                format!("{:.1}", millis as f64 / 1000.0)
            }
        };
        let clicked = if event.clicked { "True" } else { "False" };
        write!(writer, "{} ({} {})| ", event.query_text, clicked, delta)?;
        previous = Some(event.timestamp);
    }
    writeln!(writer)?;

    for span in &session.rephrase_spans {
        let chain: Vec<String> = session.events[span.start..=span.end]
            .iter()
            .map(|event| match &event.product_info {
                Some(product) => product.to_string(),
                None => "none".to_string(),
            })
            .collect();
        write!(writer, "{}| ", chain.join(" -> "))?;
    }
    writeln!(writer)?;

    writeln!(writer, "unresolved: {}", session.has_unresolved)
}

/// Writes every session holding at least one rephrase span. Returns how many
/// sessions were written.
pub fn write_rephrase_log<W: Write>(writer: &mut W, sessions: &SessionSet) -> io::Result<usize> {
    let mut written = 0;
    for session in sessions.iter().filter(|session| session.has_rephrase()) {
        write_session(writer, session)?;
        writeln!(writer)?;
        written += 1;
    }
    Ok(written)
}

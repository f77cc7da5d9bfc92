use std::io::BufRead;

use chrono::NaiveDateTime;

use crate::error::{DataError, DataResult};

const FIELD_COUNT: usize = 6;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One parsed query-log row, before it is attached to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub timestamp: NaiveDateTime,
    pub session_id: u64,
    #[allow(dead_code)]
    pub user_id: String,
    pub query_text: String,
    pub clicked: bool,
    pub product_id: Option<u64>,
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let whole_seconds = raw.trim().split('.').next().unwrap_or_default();
    NaiveDateTime::parse_from_str(whole_seconds, TIMESTAMP_FORMAT).ok()
}

fn parse_clicked(raw: &str) -> Option<bool> {
    match raw.trim() {
        value if value.eq_ignore_ascii_case("true") => Some(true),
        value if value.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

pub fn parse_query_line(source_name: &str, line_no: usize, line: &str) -> DataResult<QueryRow> {
    let fields: Vec<&str> = line.split(',').collect();
    let &[timestamp, session_id, user_id, query_text, clicked, product_id] = fields.as_slice()
    else {
        return Err(DataError::malformed(
            source_name,
            line_no,
            format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
        ));
    };

    let timestamp = parse_timestamp(timestamp).ok_or_else(|| {
        DataError::malformed(source_name, line_no, format!("invalid timestamp {timestamp:?}"))
    })?;
    let session_id = session_id.trim().parse::<u64>().map_err(|_| {
        DataError::malformed(source_name, line_no, format!("invalid session id {session_id:?}"))
    })?;
    let clicked = parse_clicked(clicked).ok_or_else(|| {
        DataError::malformed(source_name, line_no, format!("invalid clicked flag {clicked:?}"))
    })?;

    let parsed_product = product_id.trim().parse::<u64>().ok();
    if clicked && parsed_product.is_none() {
        return Err(DataError::malformed(
            source_name,
            line_no,
            format!("clicked row has invalid product id {product_id:?}"),
        ));
    }

    Ok(QueryRow {
        timestamp,
        session_id,
        user_id: user_id.to_string(),
        query_text: query_text.to_string(),
        clicked,
        product_id: parsed_product,
    })
}

/// Reads query rows after the header, stopping after `max_samples` rows when set.
pub fn read_queries<R: BufRead>(
    reader: R,
    source_name: &str,
    max_samples: Option<usize>,
) -> DataResult<Vec<QueryRow>> {
    let limit = max_samples.unwrap_or(usize::MAX);
    let mut rows = Vec::new();

    for (index, line) in reader.lines().enumerate().skip(1) {
        if rows.len() >= limit {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_query_line(source_name, index + 1, &line)?);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "timestamp,session_id,user_id,search_query,product_clicked,product_id";

    #[test]
    fn parse_query_line_drops_fractional_seconds() {
        let row = parse_query_line("queries", 2, "2019-08-01 10:00:05.123,7,u1,red shoes,True,42")
            .unwrap();
        assert_eq!(row.session_id, 7);
        assert_eq!(row.query_text, "red shoes");
        assert!(row.clicked);
        assert_eq!(row.product_id, Some(42));
        assert_eq!(row.timestamp.to_string(), "2019-08-01 10:00:05");
    }

    #[test]
    fn unclicked_rows_tolerate_missing_product_id() {
        let row = parse_query_line("queries", 2, "2019-08-01 10:00:05,7,u1,red shoes,False,").unwrap();
        assert!(!row.clicked);
        assert_eq!(row.product_id, None);
    }

    #[test]
    fn field_count_mismatch_is_malformed() {
        let err = parse_query_line("queries", 4, "2019-08-01 10:00:05,7,u1,red, shoes,True,42")
            .unwrap_err();
        assert!(matches!(err, DataError::MalformedRecord { line: 4, .. }));
    }

    #[test]
    fn clicked_row_without_product_is_malformed() {
        let err = parse_query_line("queries", 2, "2019-08-01 10:00:05,7,u1,shoes,True,").unwrap_err();
        assert!(matches!(err, DataError::MalformedRecord { .. }));
    }

    #[test]
    fn unknown_clicked_literal_is_malformed() {
        let err = parse_query_line("queries", 2, "2019-08-01 10:00:05,7,u1,shoes,yes,1").unwrap_err();
        assert!(matches!(err, DataError::MalformedRecord { .. }));
    }

    #[test]
    fn read_queries_honours_max_samples() {
        let input = format!(
            "{HEADER}\n\
             2019-08-01 10:00:00,1,u,a,False,\n\
             2019-08-01 10:00:01,1,u,b,True,5\n\
             2019-08-01 10:00:02,2,u,c,False,\n"
        );
        let rows = read_queries(input.as_bytes(), "queries", Some(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].query_text, "b");

        let rows = read_queries(input.as_bytes(), "queries", None).unwrap();
        assert_eq!(rows.len(), 3);
    }
}

use bytes::{Bytes, BytesMut};
use csv::ReaderBuilder;
use futures_util::StreamExt;
use reqwest::{Client, Url};

use crate::error::AppError;
use crate::models::{CsvAnalysis, Record, SAMPLE_ROWS};
use crate::services::summarizer::summarize;

/// Parses comma-delimited text with a header row into records.
///
/// Blank lines are skipped. Rows whose field count differs from the header,
/// invalid UTF-8 and malformed quoting are all parse errors.
pub fn parse_csv_buffer(data: &[u8]) -> Result<Vec<Record>, AppError> {
    check_quoting(data)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(false)
        .from_reader(data);

    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = result.map_err(|e| {
            AppError::Parse(format!("Failed to parse CSV row {}: {}", index + 1, e))
        })?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        records.push(record);
    }

    tracing::debug!("Parsed {} CSV records with {} columns", records.len(), headers.len());
    Ok(records)
}

#[derive(Clone, Copy)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    // A quote seen inside a quoted field: either an escape or the closing quote.
    QuoteInQuoted,
}

/// Rejects quoting the `csv` reader would otherwise accept leniently: a quote
/// inside an unquoted field, text after a closing quote, or a quoted field
/// left open at end of input.
fn check_quoting(data: &[u8]) -> Result<(), AppError> {
    let mut state = QuoteState::FieldStart;
    let mut line = 1;
    for &byte in data {
        state = match (state, byte) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
            (QuoteState::QuoteInQuoted, b',' | b'\n' | b'\r') => QuoteState::FieldStart,
            (QuoteState::QuoteInQuoted, _) => {
                return Err(AppError::Parse(format!(
                    "unexpected character after closing quote on line {}",
                    line
                )))
            }
            (QuoteState::FieldStart, b'"') => QuoteState::Quoted,
            (QuoteState::Unquoted, b'"') => {
                return Err(AppError::Parse(format!(
                    "quote inside unquoted field on line {}",
                    line
                )))
            }
            (_, b',' | b'\n' | b'\r') => QuoteState::FieldStart,
            _ => QuoteState::Unquoted,
        };
        if byte == b'\n' {
            line += 1;
        }
    }

    if matches!(state, QuoteState::Quoted) {
        return Err(AppError::Parse("unterminated quoted field".to_string()));
    }
    Ok(())
}

pub fn analyze_csv(data: &[u8]) -> Result<CsvAnalysis, AppError> {
    let start = std::time::Instant::now();
    let records = parse_csv_buffer(data)?;
    let summary = summarize(&records);
    let sample = records.into_iter().take(SAMPLE_ROWS).collect();

    tracing::info!(
        "CSV summarized in {:?}: {} rows, {} columns",
        start.elapsed(),
        summary.row_count,
        summary.columns.len()
    );
    Ok(CsvAnalysis { summary, sample })
}

/// Downloads a CSV over http(s), refusing bodies larger than `max_bytes`.
pub async fn fetch_csv(client: &Client, url: &str, max_bytes: usize) -> Result<Bytes, AppError> {
    let url = Url::parse(url).map_err(|e| AppError::Fetch(format!("Invalid URL '{}': {}", url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Fetch(format!("Unsupported URL scheme: {}", url.scheme())));
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Fetch(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::Fetch(format!(
            "Failed to fetch file. Status: {}",
            response.status()
        )));
    }

    if let Some(length) = response.content_length() {
        if length > max_bytes as u64 {
            return Err(AppError::Fetch(format!(
                "Remote file is {} bytes, limit is {}",
                length, max_bytes
            )));
        }
    }

    let mut buffer = BytesMut::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::Fetch(format!("Failed to read response bytes: {}", e)))?;
        if buffer.len() + chunk.len() > max_bytes {
            return Err(AppError::Fetch(format!("Remote file exceeds {} bytes", max_bytes)));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio_test::assert_ok;

    #[test]
    fn parses_header_and_rows_in_order() {
        let records = parse_csv_buffer(b"a,b\n1,\n2,x\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], "1");
        assert_eq!(records[0]["b"], "");
        assert_eq!(records[1]["a"], "2");
        assert_eq!(records[1]["b"], "x");
        let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn end_to_end_summary_matches_expected_values() {
        let analysis = analyze_csv(b"a,b\n1,\n2,x\n").unwrap();
        let summary = &analysis.summary;
        assert_eq!(summary.row_count, 2);
        assert_eq!(summary.missing_by_column["a"], 0);
        assert_eq!(summary.missing_by_column["b"], 1);
        let a = &summary.numeric_stats["a"];
        assert_eq!((a.count, a.min, a.max, a.mean, a.median), (2, 1.0, 2.0, 1.5, 2.0));
        assert!(!summary.numeric_stats.contains_key("b"));
        assert_eq!(summary.column_with_most_missing.as_deref(), Some("b"));
    }

    #[test]
    fn quoted_fields_follow_rfc_4180() {
        let data = b"name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",ok\n";
        let records = parse_csv_buffer(data).unwrap();
        assert_eq!(records[0]["name"], "Smith, J");
        assert_eq!(records[0]["note"], "said \"hi\"");
        assert_eq!(records[1]["name"], "multi\nline");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let records = parse_csv_buffer(b"a,b\n\n1,2\n\n3,4\n").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn header_only_input_has_no_records() {
        let analysis = analyze_csv(b"a,b\n").unwrap();
        assert_eq!(analysis.summary.row_count, 0);
        assert!(analysis.summary.columns.is_empty());
        assert!(analysis.sample.is_empty());
    }

    #[test]
    fn unbalanced_quote_is_a_parse_error() {
        let err = parse_csv_buffer(b"a,b\n\"1,2\n3,4\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        assert!(analyze_csv(b"a\n\"open\n").is_err());
    }

    #[test]
    fn text_after_closing_quote_is_a_parse_error() {
        let err = parse_csv_buffer(b"a,b\n\"x\"y,1\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(ref msg) if msg.contains("line 2")));
        assert!(parse_csv_buffer(b"a,b\n\"x\" ,1\n").is_err());
    }

    #[test]
    fn quote_inside_unquoted_field_is_a_parse_error() {
        let err = parse_csv_buffer(b"a,b\nab\"c,1\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn quoted_fields_may_end_rows_and_input() {
        let records = parse_csv_buffer(b"a,b\r\n1,\"x\"\r\n\"\",\"y\"").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["b"], "x");
        assert_eq!(records[1]["a"], "");
        assert_eq!(records[1]["b"], "y");
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let err = parse_csv_buffer(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse_csv_buffer(b"a,b\n\xff\xfe,1\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn sample_is_capped_at_five_records() {
        let mut data = String::from("n\n");
        for i in 0..12 {
            data.push_str(&format!("{}\n", i));
        }
        let analysis = analyze_csv(data.as_bytes()).unwrap();
        assert_eq!(analysis.summary.row_count, 12);
        assert_eq!(analysis.sample.len(), SAMPLE_ROWS);
        assert_eq!(analysis.sample[4]["n"], "4");
    }

    async fn serve_fixture() -> String {
        let app = Router::new()
            .route("/data.csv", get(|| async { "a,b\n1,2\n" }))
            .route("/big.csv", get(|| async { "x\n".repeat(1000) }))
            .route("/missing.csv", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetch_returns_body_for_success_status() {
        let base = serve_fixture().await;
        let bytes = assert_ok!(fetch_csv(&Client::new(), &format!("{}/data.csv", base), 1024).await);
        assert_eq!(&bytes[..], b"a,b\n1,2\n");
        assert_eq!(parse_csv_buffer(&bytes).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_rejects_non_success_status() {
        let base = serve_fixture().await;
        let err = fetch_csv(&Client::new(), &format!("{}/missing.csv", base), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_bodies() {
        let base = serve_fixture().await;
        let err = fetch_csv(&Client::new(), &format!("{}/big.csv", base), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_unsupported_schemes() {
        let client = Client::new();
        assert!(matches!(
            fetch_csv(&client, "file:///etc/passwd", 1024).await,
            Err(AppError::Fetch(_))
        ));
        assert!(matches!(
            fetch_csv(&client, "not a url", 1024).await,
            Err(AppError::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn fetch_reports_unreachable_hosts() {
        // Port 9 on localhost is discard; nothing listens there in test environments.
        let err = fetch_csv(&Client::new(), "http://127.0.0.1:9/data.csv", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }
}

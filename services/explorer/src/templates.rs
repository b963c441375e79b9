//! HTML fragment rendering and SSE framing
//!
//! Fragments pushed over the event stream must stay on a single line: a
//! newline inside the `data:` field would terminate the SSE record early.
//! The broadcaster and ring buffer treat the rendered frames as opaque
//! bytes; everything HTML-shaped lives here.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{self, Write};
use types::event::Event;
use types::stats::{Stats, StatsRange};

/// Wire names of the event types the stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseEvent {
    /// A single transaction row update.
    TxRow,
    /// The refreshed stats block.
    Stats,
}

impl SseEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SseEvent::TxRow => "tx-row",
            SseEvent::Stats => "stats",
        }
    }
}

/// Wrap a rendered fragment into one server-sent-event record.
pub fn sse_frame(kind: SseEvent, fragment: &str) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", kind.as_str(), fragment))
}

/// Render a transaction event into a complete `tx-row` SSE frame.
pub fn tx_row_frame(event: &Event) -> Result<Bytes, fmt::Error> {
    Ok(sse_frame(SseEvent::TxRow, &row(event)?))
}

/// Render the stats block into a complete `stats` SSE frame.
pub fn stats_frame(stats: &Stats) -> Result<Bytes, fmt::Error> {
    Ok(sse_frame(SseEvent::Stats, &stats_block(stats)?))
}

/// One table row for a transaction event.
pub fn row(event: &Event) -> Result<String, fmt::Error> {
    let mut out = String::with_capacity(256);
    write!(
        out,
        "<tr class=\"tx-row state-{state}\">\
         <td class=\"state\">{label}</td>\
         <td class=\"tx-id\">{tx_id}</td>\
         <td class=\"prover-id\">{prover_id}</td>\
         <td class=\"tag\">{tag}</td>\
         <td class=\"timestamp\">{ts}</td>\
         </tr>",
        state = event.state.as_str(),
        label = event.state.label(),
        tx_id = escape(&event.tx_id),
        prover_id = escape(&event.prover_id),
        tag = escape(&event.tag),
        ts = event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?;
    Ok(out)
}

/// The dashboard stats block.
pub fn stats_block(stats: &Stats) -> Result<String, fmt::Error> {
    let mut out = String::with_capacity(512);
    out.push_str("<div id=\"stats\" class=\"stats\">");
    stat_cell(&mut out, "registered-users", "Registered users",
        stats.registered_users, stats.registered_users_delta)?;
    stat_cell(&mut out, "proofs-generated", "Proofs generated",
        stats.proofs_generated, stats.proofs_generated_delta)?;
    stat_cell(&mut out, "provers-deployed", "Provers deployed",
        stats.provers_deployed, stats.provers_deployed_delta)?;
    stat_cell(&mut out, "proofs-verified", "Proofs verified",
        stats.proofs_verified, stats.proofs_verified_delta)?;
    out.push_str("</div>");
    Ok(out)
}

fn stat_cell(
    out: &mut String,
    id: &str,
    title: &str,
    value: u64,
    delta: f64,
) -> fmt::Result {
    write!(
        out,
        "<div id=\"{id}\" class=\"stat\">\
         <span class=\"value\">{value}</span>\
         <span class=\"delta\">{delta}</span>\
         <span class=\"title\">{title}</span>\
         </div>",
        value = format_count(value),
        delta = format_percentage(delta),
    )
}

/// The search results table. When `query` is present the table body also
/// opens a filtered live-tail stream so new matches keep appearing.
pub fn table(
    events: &[Event],
    query: Option<(&str, Option<DateTime<Utc>>)>,
) -> Result<String, fmt::Error> {
    let mut out = String::with_capacity(1024);
    out.push_str("<table id=\"tx-table\">");
    out.push_str(
        "<thead><tr><th>State</th><th>Transaction</th>\
         <th>Prover</th><th>Tag</th><th>Time</th></tr></thead>",
    );
    match query {
        Some((q, since)) => {
            let mut url = format!("/api/v1/stream?q={}", urlencode(q));
            if let Some(since) = since {
                write!(
                    url,
                    "&since={}",
                    urlencode(&since.to_rfc3339_opts(SecondsFormat::Secs, true))
                )?;
            }
            write!(
                out,
                "<tbody hx-ext=\"sse\" sse-connect=\"{url}\" \
                 sse-swap=\"tx-row\" hx-swap=\"afterbegin\">",
            )?;
        }
        None => out.push_str("<tbody>"),
    }
    for event in events {
        out.push_str(&row(event)?);
    }
    out.push_str("</tbody></table>");
    Ok(out)
}

/// The dashboard index page.
pub fn index() -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Devnet Explorer</title>
<script src="https://unpkg.com/htmx.org@1.9.12"></script>
<script src="https://unpkg.com/htmx.org@1.9.12/dist/ext/sse.js"></script>
</head>
<body hx-ext="sse" sse-connect="/api/v1/stream">
<header>
<h1>Devnet Explorer</h1>
<div class="ranges">{ranges}</div>
</header>
<div id="stats" hx-get="/api/v1/stats" hx-trigger="load" sse-swap="stats"></div>
<form><input id="search" name="q" type="search" placeholder="Search by transaction, prover or tag"
 hx-get="/api/v1/events" hx-target="#table" hx-trigger="input changed delay:500ms"></form>
<div id="table" hx-get="/api/v1/events" hx-trigger="load">
<table id="tx-table"><tbody sse-swap="tx-row" hx-swap="afterbegin"></tbody></table>
</div>
</body>
</html>
"##,
        ranges = StatsRange::ALL
            .iter()
            .map(|r| {
                format!(
                    "<button hx-get=\"/api/v1/stats?range={r}\" hx-target=\"#stats\">{r}</button>"
                )
            })
            .collect::<String>(),
    )
}

/// Escape a user-controlled string for inclusion in HTML text or
/// double-quoted attribute values.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode everything outside the URL-unreserved set.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

/// Compact counter formatting: 1234 -> "1.2k", 12345678 -> "12.3M".
fn format_count(n: u64) -> String {
    const SCALES: [(f64, &str); 3] = [(1e9, "G"), (1e6, "M"), (1e3, "k")];
    for (scale, suffix) in SCALES {
        if n as f64 >= scale {
            let scaled = ((n as f64 / scale) * 10.0).floor() / 10.0;
            return format!("{scaled:.1}{suffix}");
        }
    }
    n.to_string()
}

/// Signed two-decimal percentage: 0.123 -> "+0.12%".
fn format_percentage(v: f64) -> String {
    format!("{v:+.2}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::event::TxState;

    fn event() -> Event {
        Event {
            state: TxState::Proving,
            tx_id: "abc123".into(),
            prover_id: "prover-7".into(),
            tag: "starknet".into(),
            timestamp: "2024-03-01T12:30:45Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_tx_row_frame_format() {
        let frame = tx_row_frame(&event()).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: tx-row\ndata: <tr"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("abc123"));
        assert!(text.contains("2024-03-01T12:30:45Z"));
    }

    #[test]
    fn test_row_is_single_line() {
        let html = row(&event()).unwrap();
        assert!(!html.contains('\n'));
    }

    #[test]
    fn test_stats_block_is_single_line() {
        let html = stats_block(&Stats::default()).unwrap();
        assert!(!html.contains('\n'));
        assert!(html.contains("+0.00%"));
    }

    #[test]
    fn test_row_escapes_fields() {
        let mut e = event();
        e.tag = "<img src=x>".into();
        let html = row(&e).unwrap();
        assert!(!html.contains("<img"));
        assert!(html.contains("&lt;img src=x&gt;"));
    }

    #[test]
    fn test_table_with_query_opens_filtered_stream() {
        let since = "2024-03-01T12:30:45Z".parse().unwrap();
        let html = table(&[event()], Some(("abc", Some(since)))).unwrap();
        assert!(html.contains("sse-connect=\"/api/v1/stream?q=abc&since=2024-03-01T12%3A30%3A45Z\""));
        assert!(html.contains("abc123"));
    }

    #[test]
    fn test_table_without_query_has_no_stream() {
        let html = table(&[], None).unwrap();
        assert!(!html.contains("sse-connect"));
    }

    #[test]
    fn test_format_count() {
        let cases: [(u64, &str); 11] = [
            (0, "0"),
            (1, "1"),
            (12, "12"),
            (123, "123"),
            (1_234, "1.2k"),
            (12_345, "12.3k"),
            (123_456, "123.4k"),
            (1_234_567, "1.2M"),
            (12_345_678, "12.3M"),
            (123_456_789, "123.4M"),
            (1_234_567_890, "1.2G"),
        ];
        for (input, want) in cases {
            assert_eq!(format_count(input), want, "input {input}");
        }
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.123), "+0.12%");
        assert_eq!(format_percentage(-0.123), "-0.12%");
        assert_eq!(format_percentage(0.0), "+0.00%");
        assert_eq!(format_percentage(1.0), "+1.00%");
        assert_eq!(format_percentage(100.0), "+100.00%");
    }

    #[test]
    fn test_index_page_mentions_stream() {
        let html = index();
        assert!(html.contains("sse-connect=\"/api/v1/stream\""));
        assert!(html.contains("/api/v1/stats"));
    }
}

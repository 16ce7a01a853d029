#[cfg(test)]
use crate::filter::{FilterPattern, MetricFilter, MetricTransformation};
#[cfg(test)]
use crate::log_group::{LogGroup, LogRecord, LogSink};
#[cfg(test)]
use crate::metric_stream::MetricStream;
#[cfg(test)]
use crate::size_line::{format_size_line, SIZE_LINE_PATTERN};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use tokio_util::sync::CancellationToken;

#[cfg(test)]
fn record(message: &str) -> LogRecord {
    LogRecord {
        sequence: 0,
        stream: "log-worker".to_string(),
        message: message.to_string(),
        timestamp: 42,
    }
}

#[cfg(test)]
fn size_filter() -> MetricFilter {
    MetricFilter::new(
        "total-size",
        SIZE_LINE_PATTERN,
        MetricTransformation {
            namespace: "ObjectsSNS".to_string(),
            name: "TotalSizeSNS".to_string(),
            value: "$size_value".to_string(),
        },
    )
    .unwrap()
}

/// The size pattern extracts the byte count from size lines, including keys
/// with spaces, and ignores everything else
#[test]
fn test_size_line_extraction() {
    let filter = size_filter();

    let sample = filter
        .apply(&record(&format_size_line("temp.txt", 4096)))
        .expect("sample");
    assert_eq!(sample.namespace, "ObjectsSNS");
    assert_eq!(sample.name, "TotalSizeSNS");
    assert_eq!(sample.value, 4096.0);
    assert_eq!(sample.timestamp, 42);

    let spaced = filter
        .apply(&record(&format_size_line("my temp file.txt", 100)))
        .expect("sample");
    assert_eq!(spaced.value, 100.0);

    assert!(filter.apply(&record("copied temp.txt")).is_none());
    assert!(filter.apply(&record("Total size of a: 12 kilobytes")).is_none());
    assert!(filter.apply(&record("Total size of a: twelve bytes")).is_none());
    assert!(filter.apply(&record("")).is_none());
}

/// Keys opening a quote or bracket they never close still yield a sample
#[test]
fn test_size_line_with_unbalanced_key() {
    let filter = size_filter();

    for key in ["[draft.txt", "\"draft.txt", "notes [v2.txt", "a\"b.txt"] {
        let sample = filter
            .apply(&record(&format_size_line(key, 4096)))
            .unwrap_or_else(|| panic!("no sample for key {key}"));
        assert_eq!(sample.value, 4096.0, "key {key}");
    }

    // a balanced group is still one token
    let bound = FilterPattern::parse("[a, b, c]")
        .unwrap()
        .matches(r#"[x y] "p q" z"#)
        .expect("match");
    assert_eq!(bound.get("a").map(String::as_str), Some("x y"));
    assert_eq!(bound.get("b").map(String::as_str), Some("p q"));
}

#[test]
fn test_pattern_constraints() {
    let pattern = FilterPattern::parse(r#"[level="ERROR", code>=500, ..., path=/api/*]"#).unwrap();
    let bound = pattern
        .matches(r#""ERROR" 503 upstream timeout /api/items"#)
        .expect("match");
    assert_eq!(bound.get("code").map(String::as_str), Some("503"));
    assert_eq!(bound.get("path").map(String::as_str), Some("/api/items"));

    assert!(pattern.matches("ERROR 404 /api/items").is_none());
    assert!(pattern.matches("WARN 503 /api/items").is_none());
    assert!(pattern.matches("ERROR 503 /health").is_none());

    let terms = FilterPattern::parse("Total bytes").unwrap();
    assert!(terms.matches("Total size of a: 1 bytes").is_some());
    assert!(terms.matches("Total size").is_none());
    assert!(FilterPattern::parse("").unwrap().matches("anything").is_some());

    let bracketed = FilterPattern::parse("[ts, msg]").unwrap();
    let bound = bracketed.matches("[2024-01-01 10:00] done").expect("match");
    assert_eq!(bound.get("ts").map(String::as_str), Some("2024-01-01 10:00"));
}

#[test]
fn test_invalid_patterns() {
    assert!(FilterPattern::parse("[a, b").is_err());
    assert!(FilterPattern::parse("[a, , b]").is_err());
    assert!(FilterPattern::parse("[=x]").is_err());
    assert!(FilterPattern::parse("[a>big]").is_err());

    let unknown_field = MetricFilter::new(
        "bad",
        "[a, b]",
        MetricTransformation {
            namespace: "ns".to_string(),
            name: "m".to_string(),
            value: "$c".to_string(),
        },
    );
    assert!(unknown_field.is_err());

    let literal = MetricFilter::new(
        "count",
        "ERROR",
        MetricTransformation {
            namespace: "ns".to_string(),
            name: "errors".to_string(),
            value: "1".to_string(),
        },
    )
    .unwrap();
    assert_eq!(literal.apply(&record("ERROR boom")).unwrap().value, 1.0);
}

/// A running filter replays records written before it started and follows
/// new writes
#[tokio::test]
async fn test_filter_tails_log_group() {
    let log_group = Arc::new(LogGroup::new("size-logs"));
    let stream = Arc::new(MetricStream::new("ObjectsSNS", "TotalSizeSNS"));
    log_group
        .write("log-worker", format_size_line("early.txt", 1024))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(size_filter().run(log_group.clone(), stream.clone(), cancel.clone()));

    log_group
        .write("log-worker", "unrelated line".to_string())
        .await
        .unwrap();
    log_group
        .write("log-worker", format_size_line("late.txt", 4096))
        .await
        .unwrap();

    let mut values = Vec::new();
    for _ in 0..100 {
        let (samples, _) = stream.read_from(0).await;
        if samples.len() == 2 {
            values = samples.into_iter().map(|s| s.value).collect();
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(values, vec![1024.0, 4096.0]);

    cancel.cancel();
    handle.await.unwrap();
}

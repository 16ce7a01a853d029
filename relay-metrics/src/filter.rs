use futures::StreamExt;
use metrics::counter;
use relay_core::MetricSample;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{MetricsError, Result};
use crate::log_group::{LogGroup, LogRecord};
use crate::metric_stream::MetricStream;
use crate::telemetry_metrics::{FILTER_SAMPLES_TOTAL, FILTER_UNMATCHED_RECORDS_TOTAL};

#[derive(Debug, Clone, PartialEq)]
enum Constraint {
    Equals(String),
    NotEquals(String),
    Greater(f64),
    GreaterOrEqual(f64),
    Less(f64),
    LessOrEqual(f64),
}

impl Constraint {
    fn accepts(&self, token: &str) -> bool {
        match self {
            Constraint::Equals(expected) => wildcard_match(expected, token),
            Constraint::NotEquals(expected) => !wildcard_match(expected, token),
            numeric => {
                let Ok(value) = token.parse::<f64>() else {
                    return false;
                };
                match numeric {
                    Constraint::Greater(bound) => value > *bound,
                    Constraint::GreaterOrEqual(bound) => value >= *bound,
                    Constraint::Less(bound) => value < *bound,
                    Constraint::LessOrEqual(bound) => value <= *bound,
                    Constraint::Equals(_) | Constraint::NotEquals(_) => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Field {
    // "..." matches any number of tokens
    Ellipsis,
    Named {
        name: String,
        constraint: Option<Constraint>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum PatternKind {
    // bare words, every one must occur in the line
    Terms(Vec<String>),
    // bracketed, space-delimited fields
    Fields(Vec<Field>),
}

/// Log filter pattern.
///
/// Two forms are accepted:
/// - term patterns, `ERROR timeout`, match lines containing every term;
///   an empty pattern matches every line;
/// - space-delimited patterns, `[info=Total, ..., size_value, unit="bytes"]`,
///   match lines whose whitespace separated tokens line up with the fields.
///   A field is a name, optionally constrained with `=`, `!=`, `>`, `>=`, `<`
///   or `<=`; `...` stands for any number of tokens. Equality values may be
///   double quoted and may use `*` as a wildcard. Double quoted and bracketed
///   parts of the line count as one token.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPattern {
    source: String,
    kind: PatternKind,
}

impl FilterPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        let kind = match trimmed.strip_prefix('[') {
            Some(rest) => {
                let body = rest.strip_suffix(']').ok_or_else(|| {
                    MetricsError::Pattern(format!("unterminated field list in '{}'", pattern))
                })?;
                PatternKind::Fields(parse_fields(body)?)
            }
            None => PatternKind::Terms(trimmed.split_whitespace().map(str::to_string).collect()),
        };
        Ok(FilterPattern {
            source: pattern.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn field_names(&self) -> Vec<&str> {
        match &self.kind {
            PatternKind::Terms(_) => Vec::new(),
            PatternKind::Fields(fields) => fields
                .iter()
                .filter_map(|f| match f {
                    Field::Named { name, .. } => Some(name.as_str()),
                    Field::Ellipsis => None,
                })
                .collect(),
        }
    }

    /// Match a line, returns the value bound to every named field.
    pub fn matches(&self, line: &str) -> Option<HashMap<String, String>> {
        match &self.kind {
            PatternKind::Terms(terms) => terms
                .iter()
                .all(|term| line.contains(term.as_str()))
                .then(HashMap::new),
            PatternKind::Fields(fields) => {
                let tokens = tokenize(line);
                let mut bindings = Vec::new();
                match_from(fields, &tokens, &mut bindings)
                    .then(|| bindings.into_iter().collect())
            }
        }
    }
}

fn parse_fields(body: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    for raw in split_outside_quotes(body, ',') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MetricsError::Pattern(format!("empty field in '[{}]'", body)));
        }
        if raw == "..." {
            fields.push(Field::Ellipsis);
            continue;
        }
        let Some(op_start) = raw.find(['=', '!', '<', '>']) else {
            fields.push(Field::Named {
                name: raw.to_string(),
                constraint: None,
            });
            continue;
        };
        let name = raw[..op_start].trim();
        if name.is_empty() {
            return Err(MetricsError::Pattern(format!("field without a name: '{}'", raw)));
        }
        let rest = &raw[op_start..];
        let (op, value) = ["!=", ">=", "<=", "=", ">", "<"]
            .iter()
            .find_map(|op| rest.strip_prefix(op).map(|v| (*op, v.trim())))
            .ok_or_else(|| MetricsError::Pattern(format!("unknown operator in '{}'", raw)))?;
        let constraint = match op {
            "=" => Constraint::Equals(unquote(value).to_string()),
            "!=" => Constraint::NotEquals(unquote(value).to_string()),
            _ => {
                let bound: f64 = value.parse().map_err(|_| {
                    MetricsError::Pattern(format!("'{}' needs a numeric bound", raw))
                })?;
                match op {
                    ">" => Constraint::Greater(bound),
                    ">=" => Constraint::GreaterOrEqual(bound),
                    "<" => Constraint::Less(bound),
                    _ => Constraint::LessOrEqual(bound),
                }
            }
        };
        fields.push(Field::Named {
            name: name.to_string(),
            constraint: Some(constraint),
        });
    }
    Ok(fields)
}

fn split_outside_quotes(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// An opening quote or bracket without its closing character is a literal.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while let Some(c) = rest.chars().next() {
        let closing = match c {
            '"' => Some('"'),
            '[' => Some(']'),
            _ => None,
        };
        let group = closing.and_then(|close| {
            let body = &rest[c.len_utf8()..];
            body.find(close)
                .map(|end| (&body[..end], &body[end + close.len_utf8()..]))
        });
        let (token, remaining) = match group {
            Some(split) => split,
            None => rest.split_at(rest.find(char::is_whitespace).unwrap_or(rest.len())),
        };
        tokens.push(token.to_string());
        rest = remaining.trim_start();
    }
    tokens
}

fn match_from(fields: &[Field], tokens: &[String], bindings: &mut Vec<(String, String)>) -> bool {
    match fields.split_first() {
        None => tokens.is_empty(),
        Some((Field::Ellipsis, rest)) => (0..=tokens.len()).any(|skip| {
            let mark = bindings.len();
            if match_from(rest, &tokens[skip..], bindings) {
                return true;
            }
            bindings.truncate(mark);
            false
        }),
        Some((Field::Named { name, constraint }, rest)) => {
            let Some((token, remaining)) = tokens.split_first() else {
                return false;
            };
            if constraint.as_ref().is_some_and(|c| !c.accepts(token)) {
                return false;
            }
            bindings.push((name.clone(), token.clone()));
            if match_from(rest, remaining, bindings) {
                return true;
            }
            bindings.pop();
            false
        }
    }
}

// '*' matches any run of characters
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (i, part) in parts.iter().copied().enumerate() {
        if i == 0 {
            let Some(r) = rest.strip_prefix(part) else {
                return false;
            };
            rest = r;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// How a matching record becomes a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTransformation {
    pub namespace: String,
    pub name: String,
    /// `$field` takes the number bound to a pattern field, anything else is
    /// parsed as a literal number.
    pub value: String,
}

/// Turns log records into metric samples.
#[derive(Debug, Clone)]
pub struct MetricFilter {
    name: String,
    pattern: FilterPattern,
    transformation: MetricTransformation,
}

impl MetricFilter {
    pub fn new(name: &str, pattern: &str, transformation: MetricTransformation) -> Result<Self> {
        let pattern = FilterPattern::parse(pattern)?;
        match transformation.value.strip_prefix('$') {
            Some(field) => {
                if !pattern.field_names().contains(&field) {
                    return Err(MetricsError::Pattern(format!(
                        "metric value refers to unknown field '{}' in '{}'",
                        field,
                        pattern.as_str()
                    )));
                }
            }
            None => {
                transformation.value.parse::<f64>().map_err(|_| {
                    MetricsError::Pattern(format!(
                        "metric value '{}' is neither a field nor a number",
                        transformation.value
                    ))
                })?;
            }
        }
        Ok(MetricFilter {
            name: name.to_string(),
            pattern,
            transformation,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transformation(&self) -> &MetricTransformation {
        &self.transformation
    }

    /// Map one record to a sample. Records that do not match, or whose value
    /// field is not numeric, yield `None`.
    pub fn apply(&self, record: &LogRecord) -> Option<MetricSample> {
        let bindings = self.pattern.matches(&record.message)?;
        let value = match self.transformation.value.strip_prefix('$') {
            Some(field) => bindings.get(field)?.parse::<f64>().ok()?,
            None => self.transformation.value.parse::<f64>().ok()?,
        };
        Some(MetricSample {
            namespace: self.transformation.namespace.clone(),
            name: self.transformation.name.clone(),
            value,
            timestamp: record.timestamp,
        })
    }

    /// Tail `log_group` from its first record and append every extracted
    /// sample to `stream` until `cancel` fires.
    pub async fn run(
        self,
        log_group: Arc<LogGroup>,
        stream: Arc<MetricStream>,
        cancel: CancellationToken,
    ) {
        info!(
            filter = %self.name,
            log_group = log_group.name(),
            pattern = self.pattern.as_str(),
            "metric filter started"
        );
        let mut next_sequence = 0u64;
        'tail: loop {
            let mut records = log_group.tail(next_sequence).await;
            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => break 'tail,
                    item = records.next() => item,
                };
                match item {
                    Some(Ok(record)) => {
                        next_sequence = record.sequence + 1;
                        self.handle(&record, &stream).await;
                    }
                    Some(Err(MetricsError::Lagged(n))) => {
                        warn!(filter = %self.name, skipped = n, "filter fell behind, replaying from {}", next_sequence);
                        continue 'tail;
                    }
                    Some(Err(e)) => {
                        warn!(filter = %self.name, "log tail failed: {}", e);
                        continue 'tail;
                    }
                    None => break 'tail,
                }
            }
        }
        info!(filter = %self.name, "metric filter stopped");
    }

    async fn handle(&self, record: &LogRecord, stream: &MetricStream) {
        match self.apply(record) {
            Some(sample) => {
                debug!(
                    filter = %self.name,
                    sequence = record.sequence,
                    value = sample.value,
                    "sample extracted"
                );
                counter!(FILTER_SAMPLES_TOTAL.name, "filter" => self.name.clone()).increment(1);
                stream.append(sample).await;
            }
            None => {
                counter!(FILTER_UNMATCHED_RECORDS_TOTAL.name, "filter" => self.name.clone())
                    .increment(1);
            }
        }
    }
}

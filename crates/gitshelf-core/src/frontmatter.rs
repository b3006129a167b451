//! Frontmatter serializer.
//!
//! A stored document is a YAML header fenced by `---` lines, followed by the
//! markdown body:
//!
//! ```text
//! ---
//! title: Renew TLS certs
//! createdAt: 2024-03-09T08:15:00.000Z
//! priority: 2
//! isArchived: false
//! ---
//! Body text…
//! ```
//!
//! Known keys are lifted into typed fields of [`Frontmatter`]. Every other key
//! (and any known key whose value has an unexpected shape) is kept in
//! [`Frontmatter::extra`] in its original order, so an update that touches one
//! field writes the others back unchanged.
//!
//! A blob without a leading `---` line has no header at all: [`parse`]
//! returns `frontmatter: None` and the whole blob as content. Files created
//! outside gitshelf are common, so this is not an error.
//!
//! A leading UTF-8 byte order mark is skipped when looking for the opening
//! delimiter and written back in front of it.
//!
//! # Round trip
//!
//! For any `(frontmatter, content)` produced by [`parse`],
//! `parse(&stringify(frontmatter.as_ref(), &content)?)` yields the same pair.
//!
//! A parsed header remembers its source text split into top-level key spans.
//! [`stringify`] copies the span of every key whose value did not change,
//! comments and quoting included, re-renders only the changed keys and
//! appends new keys at the end. Line endings follow the opening delimiter.
//! Headers that cannot be split that way (multi-line flow collections,
//! aliases) and headers built from scratch are rendered whole, with keys in a
//! stable order: `title`, `createdAt`, `priority`, `isArchived`,
//! `chatHistory`, then extension keys.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};

use crate::error::{Result, StoreError};

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

const KEY_TITLE: &str = "title";
const KEY_CREATED_AT: &str = "createdAt";
const KEY_PRIORITY: &str = "priority";
const KEY_IS_ARCHIVED: &str = "isArchived";
const KEY_CHAT_HISTORY: &str = "chatHistory";
const KNOWN_KEYS: [&str; 5] = [
    KEY_TITLE,
    KEY_CREATED_AT,
    KEY_PRIORITY,
    KEY_IS_ARCHIVED,
    KEY_CHAT_HISTORY,
];

/// One entry of a document's chat history.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Any other keys of the entry, in original order.
    pub extra: Mapping,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Mapping::new(),
        }
    }
}

/// Structured header of a document.
///
/// Equality compares the header fields only, not the source layout.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    pub title: Option<String>,
    /// ISO-8601 timestamp, kept verbatim.
    pub created_at: Option<String>,
    pub priority: Option<u8>,
    pub is_archived: Option<bool>,
    /// Insertion order is significant.
    pub chat_history: Option<Vec<ChatMessage>>,
    /// Extension keys preserved across rewrites.
    pub extra: Mapping,
    pub(crate) source: Option<Source>,
}

impl PartialEq for Frontmatter {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.created_at == other.created_at
            && self.priority == other.priority
            && self.is_archived == other.is_archived
            && self.chat_history == other.chat_history
            && self.extra == other.extra
    }
}

/// How a parsed header was written.
#[derive(Debug, Clone)]
struct Source {
    bom: bool,
    newline: &'static str,
    /// Terminator of the closing delimiter line, empty at end of blob.
    closing: &'static str,
    /// `None` when the header does not split into top-level key spans.
    layout: Option<Layout>,
}

#[derive(Debug, Clone)]
struct Layout {
    /// Blank and comment lines before the first key.
    prefix: String,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    key: Value,
    original: Value,
    /// Key line plus continuation lines, verbatim.
    text: String,
    /// Blank and column-0 comment lines after the entry.
    trailer: String,
}

impl Layout {
    fn scan(header: &str, mapping: &Mapping) -> Option<Layout> {
        let mut layout = Layout {
            prefix: String::new(),
            entries: Vec::new(),
        };

        for line in header.split_inclusive('\n') {
            if let Some(key) = top_level_key(line) {
                let original = mapping.get(&key)?.clone();
                layout.entries.push(Entry {
                    key,
                    original,
                    text: line.to_string(),
                    trailer: String::new(),
                });
                continue;
            }
            match layout.entries.last_mut() {
                Some(entry) => entry.push_line(line),
                None if is_filler(line) => layout.prefix.push_str(line),
                None => return None,
            }
        }

        let consistent = layout.entries.len() == mapping.len()
            && layout
                .entries
                .iter()
                .zip(mapping.keys())
                .all(|(entry, key)| entry.key == *key && entry.reparses());
        consistent.then_some(layout)
    }

    fn render(&self, mapping: &Mapping, newline: &str) -> Result<String> {
        let mut out = self.prefix.clone();
        for entry in &self.entries {
            match mapping.get(&entry.key) {
                Some(value) if *value == entry.original => out.push_str(&entry.text),
                Some(value) => out.push_str(&render_entry(&entry.key, value, newline)?),
                None => {}
            }
            out.push_str(&entry.trailer);
        }
        for (key, value) in mapping {
            if !self.entries.iter().any(|entry| entry.key == *key) {
                out.push_str(&render_entry(key, value, newline)?);
            }
        }
        Ok(out)
    }
}

impl Entry {
    fn push_line(&mut self, line: &str) {
        if is_filler(line) {
            self.trailer.push_str(line);
        } else {
            let trailer = std::mem::take(&mut self.trailer);
            self.text.push_str(&trailer);
            self.text.push_str(line);
        }
    }

    /// Whether the span on its own still reads as `key: original`.
    fn reparses(&self) -> bool {
        serde_yaml::from_str::<Mapping>(&self.text).is_ok_and(|span| {
            span.len() == 1 && span.get(&self.key) == Some(&self.original)
        })
    }
}

impl Frontmatter {
    /// Header for a freshly created task.
    pub fn new_task(title: &str, priority: u8, created_at: DateTime<Utc>) -> Self {
        Self {
            title: Some(title.to_string()),
            created_at: Some(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            priority: Some(priority),
            is_archived: Some(false),
            chat_history: None,
            extra: Mapping::new(),
            source: None,
        }
    }

    pub fn archived(&self) -> bool {
        self.is_archived.unwrap_or(false)
    }

    /// Calendar date of `createdAt`, if it parses as RFC 3339 or a bare date.
    pub fn created_date(&self) -> Option<NaiveDate> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc).date_naive())
            .ok()
            .or_else(|| NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok())
    }

    /// Append a chat message, creating the history if absent.
    ///
    /// Fails when an unrecognized `chatHistory` value is held in `extra`,
    /// since appending would overwrite it.
    pub fn push_chat_message(&mut self, message: ChatMessage) -> Result<()> {
        if self.chat_history.is_none() && self.extra.contains_key(KEY_CHAT_HISTORY) {
            return Err(StoreError::parse(
                "chatHistory has an unexpected shape; refusing to overwrite it",
            ));
        }
        self.chat_history.get_or_insert_with(Vec::new).push(message);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.created_at.is_none()
            && self.priority.is_none()
            && self.is_archived.is_none()
            && self.chat_history.is_none()
            && self.extra.is_empty()
    }

    fn from_mapping(mapping: Mapping) -> Self {
        let mut fm = Frontmatter::default();

        for (key, value) in mapping {
            let leftover = match key.as_str() {
                Some(KEY_TITLE) => match value {
                    Value::String(s) => {
                        fm.title = Some(s);
                        None
                    }
                    other => Some(other),
                },
                Some(KEY_CREATED_AT) => match value {
                    Value::String(s) => {
                        fm.created_at = Some(s);
                        None
                    }
                    other => Some(other),
                },
                Some(KEY_PRIORITY) => match value.as_u64().and_then(|n| u8::try_from(n).ok()) {
                    Some(p) => {
                        fm.priority = Some(p);
                        None
                    }
                    None => Some(value),
                },
                Some(KEY_IS_ARCHIVED) => match value {
                    Value::Bool(b) => {
                        fm.is_archived = Some(b);
                        None
                    }
                    other => Some(other),
                },
                Some(KEY_CHAT_HISTORY) => match chat_history_from_value(&value) {
                    Some(history) => {
                        fm.chat_history = Some(history);
                        None
                    }
                    None => Some(value),
                },
                _ => Some(value),
            };

            if let Some(value) = leftover {
                fm.extra.insert(key, value);
            }
        }

        fm
    }

    fn to_mapping(&self) -> Mapping {
        let mut mapping = Mapping::new();
        if let Some(title) = &self.title {
            mapping.insert(KEY_TITLE.into(), Value::String(title.clone()));
        }
        if let Some(created_at) = &self.created_at {
            mapping.insert(KEY_CREATED_AT.into(), Value::String(created_at.clone()));
        }
        if let Some(priority) = self.priority {
            mapping.insert(KEY_PRIORITY.into(), Value::from(priority));
        }
        if let Some(archived) = self.is_archived {
            mapping.insert(KEY_IS_ARCHIVED.into(), Value::Bool(archived));
        }
        if let Some(history) = &self.chat_history {
            let entries = history.iter().map(chat_message_to_value).collect();
            mapping.insert(KEY_CHAT_HISTORY.into(), Value::Sequence(entries));
        }

        for (key, value) in &self.extra {
            // A typed field that is set wins over a same-named extension key.
            if mapping.contains_key(key) {
                continue;
            }
            mapping.insert(key.clone(), value.clone());
        }
        mapping
    }
}

/// Result of [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// `None` when the blob has no header block.
    pub frontmatter: Option<Frontmatter>,
    pub content: String,
}

/// Split a raw blob into header and body.
///
/// # Errors
///
/// [`StoreError::Parse`] when the opening `---` line has no closing partner,
/// or when the header is not a YAML mapping.
pub fn parse(blob: &str) -> Result<Parsed> {
    let (bom, text) = match blob.strip_prefix(BOM) {
        Some(rest) => (true, rest),
        None => (false, blob),
    };
    let (first_line, mut rest) = split_line(text);
    if first_line != DELIMITER {
        return Ok(Parsed {
            frontmatter: None,
            content: blob.to_string(),
        });
    }

    let header_start = text.len() - rest.len();
    let newline = terminator(&text[..header_start]);
    loop {
        if rest.is_empty() {
            return Err(StoreError::parse("missing closing '---' delimiter"));
        }
        let line_start = text.len() - rest.len();
        let (line, after) = split_line(rest);
        if line == DELIMITER {
            let header = &text[header_start..line_start];
            let (mut frontmatter, mapping) = parse_header(header)?;
            frontmatter.source = Some(Source {
                bom,
                newline,
                closing: terminator(&rest[..rest.len() - after.len()]),
                layout: Layout::scan(header, &mapping),
            });
            return Ok(Parsed {
                frontmatter: Some(frontmatter),
                content: after.to_string(),
            });
        }
        rest = after;
    }
}

/// Render header and body into a single blob.
///
/// With `frontmatter: None` the content is returned unchanged.
pub fn stringify(frontmatter: Option<&Frontmatter>, content: &str) -> Result<String> {
    let Some(frontmatter) = frontmatter else {
        return Ok(content.to_string());
    };

    let mapping = frontmatter.to_mapping();
    let source = frontmatter.source.as_ref();
    let newline = source.map_or("\n", |s| s.newline);
    let header = match source.and_then(|s| s.layout.as_ref()) {
        Some(layout) => layout.render(&mapping, newline)?,
        None => render_yaml(&mapping, newline)?,
    };

    // A header added to a headerless blob goes after its byte order mark.
    let (bom, content) = match (source, content.strip_prefix(BOM)) {
        (None, Some(rest)) => (true, rest),
        (source, _) => (source.is_some_and(|s| s.bom), content),
    };
    let closing = match source {
        Some(s) if s.closing.is_empty() && content.is_empty() => "",
        _ => newline,
    };

    let mut blob = String::with_capacity(header.len() + content.len() + 12);
    if bom {
        blob.push(BOM);
    }
    blob.push_str(DELIMITER);
    blob.push_str(newline);
    blob.push_str(&header);
    blob.push_str(DELIMITER);
    blob.push_str(closing);
    blob.push_str(content);
    Ok(blob)
}

/// Split off the first line, returning it without its terminator.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(idx) => (s[..idx].trim_end_matches('\r'), &s[idx + 1..]),
        None => (s.trim_end_matches('\r'), ""),
    }
}

fn terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn is_filler(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

/// Key of a line that opens a top-level `key: value` entry.
fn top_level_key(line: &str) -> Option<Value> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if line.is_empty() || line.starts_with(|c: char| c.is_whitespace() || c == '#' || c == '-') {
        return None;
    }
    match serde_yaml::from_str::<Value>(line).ok()? {
        Value::Mapping(mapping) if mapping.len() == 1 => {
            mapping.into_iter().next().map(|(key, _)| key)
        }
        _ => None,
    }
}

fn render_yaml(mapping: &Mapping, newline: &str) -> Result<String> {
    if mapping.is_empty() {
        return Ok(String::new());
    }
    let text = serde_yaml::to_string(mapping)
        .map_err(|e| StoreError::parse(format!("cannot render frontmatter: {e}")))?;
    Ok(if newline == "\n" {
        text
    } else {
        text.replace('\n', newline)
    })
}

fn render_entry(key: &Value, value: &Value, newline: &str) -> Result<String> {
    let mut single = Mapping::new();
    single.insert(key.clone(), value.clone());
    render_yaml(&single, newline)
}

fn parse_header(header: &str) -> Result<(Frontmatter, Mapping)> {
    let value: Value = serde_yaml::from_str(header)
        .map_err(|e| StoreError::parse(format!("header is not valid YAML: {e}")))?;
    match value {
        Value::Null => Ok((Frontmatter::default(), Mapping::new())),
        Value::Mapping(mapping) => Ok((Frontmatter::from_mapping(mapping.clone()), mapping)),
        _ => Err(StoreError::parse("header must be a key/value mapping")),
    }
}

fn chat_history_from_value(value: &Value) -> Option<Vec<ChatMessage>> {
    value
        .as_sequence()?
        .iter()
        .map(|entry| {
            let entry = entry.as_mapping()?;
            let mut message = ChatMessage::default();
            let mut has_role = false;
            let mut has_content = false;
            for (key, value) in entry {
                match (key.as_str(), value) {
                    (Some("role"), Value::String(s)) => {
                        message.role = s.clone();
                        has_role = true;
                    }
                    (Some("content"), Value::String(s)) => {
                        message.content = s.clone();
                        has_content = true;
                    }
                    _ => {
                        message.extra.insert(key.clone(), value.clone());
                    }
                }
            }
            (has_role && has_content).then_some(message)
        })
        .collect()
}

fn chat_message_to_value(message: &ChatMessage) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert("role".into(), Value::String(message.role.clone()));
    mapping.insert("content".into(), Value::String(message.content.clone()));
    for (key, value) in &message.extra {
        if !mapping.contains_key(key) {
            mapping.insert(key.clone(), value.clone());
        }
    }
    Value::Mapping(mapping)
}

/// Whether `key` is lifted into a typed [`Frontmatter`] field.
pub fn is_known_key(key: &str) -> bool {
    KNOWN_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = "---\n\
title: Renew certs\n\
createdAt: 2024-01-05T10:00:00.000Z\n\
priority: 2\n\
isArchived: false\n\
assignee: sam\n\
labels:\n\
- ops\n\
- security\n\
---\n\
Rotate before **March**.\n";

    fn roundtrip(blob: &str) {
        let parsed = parse(blob).unwrap();
        let rendered = stringify(parsed.frontmatter.as_ref(), &parsed.content).unwrap();
        assert_eq!(parse(&rendered).unwrap(), parsed, "rendered:\n{rendered}");
    }

    #[test]
    fn test_parse_known_and_extra_keys() {
        let parsed = parse(SAMPLE).unwrap();
        let fm = parsed.frontmatter.unwrap();
        assert_eq!(fm.title.as_deref(), Some("Renew certs"));
        assert_eq!(fm.created_at.as_deref(), Some("2024-01-05T10:00:00.000Z"));
        assert_eq!(fm.priority, Some(2));
        assert_eq!(fm.is_archived, Some(false));
        assert_eq!(fm.extra.len(), 2);
        assert!(fm.extra.contains_key("assignee"));
        assert_eq!(parsed.content, "Rotate before **March**.\n");
    }

    #[test]
    fn test_no_header_is_not_an_error() {
        let parsed = parse("# Just markdown\n\nbody").unwrap();
        assert!(parsed.frontmatter.is_none());
        assert_eq!(parsed.content, "# Just markdown\n\nbody");
        assert_eq!(stringify(None, &parsed.content).unwrap(), parsed.content);
    }

    #[test]
    fn test_missing_closing_delimiter_fails() {
        let err = parse("---\ntitle: x\nbody without end").unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(parse("---").is_err());
    }

    #[test]
    fn test_non_mapping_header_fails() {
        assert!(matches!(
            parse("---\n- a\n- b\n---\nbody"),
            Err(StoreError::Parse { .. })
        ));
        assert!(matches!(
            parse("---\ntitle: [unclosed\n---\n"),
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_header() {
        let parsed = parse("---\n---\nbody").unwrap();
        assert_eq!(parsed.frontmatter, Some(Frontmatter::default()));
        assert_eq!(parsed.content, "body");
        assert_eq!(stringify(parsed.frontmatter.as_ref(), "body").unwrap(), "---\n---\nbody");
    }

    #[test]
    fn test_crlf_delimiters() {
        let parsed = parse("---\r\ntitle: Win\r\n---\r\nbody\r\n").unwrap();
        assert_eq!(parsed.frontmatter.unwrap().title.as_deref(), Some("Win"));
        assert_eq!(parsed.content, "body\r\n");
    }

    #[test]
    fn test_roundtrip_law() {
        roundtrip(SAMPLE);
        roundtrip("no header at all");
        roundtrip("---\n---\n");
        roundtrip("---\ntitle: '123'\npriority: high\nisArchived: 'no'\n---\n\n---\nrule\n");
        roundtrip(
            "---\nchatHistory:\n- role: user\n  content: hi\n- role: assistant\n  content: hello\n  model: x\n---\nbody",
        );
        roundtrip("---\nchatHistory: nope\nnested:\n  a: 1\n  b: [1, 2]\n---\n");
    }

    #[test]
    fn test_wrong_typed_known_keys_stay_in_extra() {
        let fm = parse("---\npriority: urgent\ntitle: 42\n---\n")
            .unwrap()
            .frontmatter
            .unwrap();
        assert_eq!(fm.priority, None);
        assert_eq!(fm.title, None);
        assert!(fm.extra.contains_key("priority"));
        assert!(fm.extra.contains_key("title"));
    }

    #[test]
    fn test_stringify_uses_stable_key_order() {
        let mut fm = Frontmatter::default();
        fm.extra.insert("zeta".into(), Value::from(1));
        fm.is_archived = Some(true);
        fm.title = Some("T".into());
        let blob = stringify(Some(&fm), "b").unwrap();
        assert_eq!(blob, "---\ntitle: T\nisArchived: true\nzeta: 1\n---\nb");
    }

    #[test]
    fn test_title_change_leaves_other_lines_identical() {
        let parsed = parse(SAMPLE).unwrap();
        let before = stringify(parsed.frontmatter.as_ref(), &parsed.content).unwrap();

        let mut fm = parsed.frontmatter.clone().unwrap();
        fm.title = Some("Renew all certificates".into());
        let after = stringify(Some(&fm), &parsed.content).unwrap();

        let changed: Vec<_> = before
            .lines()
            .zip(after.lines())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(changed.len(), 1);
        assert!(changed[0].1.starts_with("title:"));
        assert_eq!(before.lines().count(), after.lines().count());
    }

    #[test]
    fn test_chat_history_order_and_append() {
        let mut fm = parse("---\nchatHistory:\n- role: user\n  content: a\n---\n")
            .unwrap()
            .frontmatter
            .unwrap();
        fm.push_chat_message(ChatMessage::new("assistant", "b")).unwrap();
        let history = fm.chat_history.as_ref().unwrap();
        assert_eq!(history[0].content, "a");
        assert_eq!(history[1].role, "assistant");
    }

    #[test]
    fn test_append_refuses_to_clobber_unknown_history() {
        let mut fm = parse("---\nchatHistory: 7\n---\n").unwrap().frontmatter.unwrap();
        assert!(fm.push_chat_message(ChatMessage::new("user", "x")).is_err());
    }

    #[test]
    fn test_new_task_header() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let fm = Frontmatter::new_task("Ship it", 1, now);
        assert_eq!(fm.created_at.as_deref(), Some("2024-01-05T10:00:00.000Z"));
        assert_eq!(fm.created_date(), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert!(!fm.archived());
    }

    const HAND_WRITTEN: &str = "---\n\
# reviewed weekly\n\
title: 'Rotate keys'\n\
createdAt: \"2024-01-05T09:30:00.000Z\"\n\
priority: 2   # bumped after incident\n\
\n\
tags: [ops, security]\n\
notes: |\n\
  line one\n\
\n\
  line two\n\
---\n\
body\n";

    #[test]
    fn test_unchanged_header_is_written_verbatim() {
        let parsed = parse(HAND_WRITTEN).unwrap();
        let rendered = stringify(parsed.frontmatter.as_ref(), &parsed.content).unwrap();
        assert_eq!(rendered, HAND_WRITTEN);
    }

    #[test]
    fn test_changed_key_rewrites_only_its_line() {
        let parsed = parse(HAND_WRITTEN).unwrap();
        let mut fm = parsed.frontmatter.unwrap();
        fm.title = Some("Rotate all keys".into());
        let rendered = stringify(Some(&fm), &parsed.content).unwrap();
        assert_eq!(
            rendered,
            HAND_WRITTEN.replace("title: 'Rotate keys'\n", "title: Rotate all keys\n")
        );
    }

    #[test]
    fn test_removed_key_is_dropped_and_new_key_appended() {
        let parsed = parse("---\ntitle: a\ntags: [x]\n# end\n---\n").unwrap();
        let mut fm = parsed.frontmatter.unwrap();
        fm.extra.remove("tags");
        fm.is_archived = Some(true);
        let rendered = stringify(Some(&fm), &parsed.content).unwrap();
        assert_eq!(rendered, "---\ntitle: a\n# end\nisArchived: true\n---\n");
    }

    #[test]
    fn test_multiline_flow_header_is_rendered_whole() {
        let blob = "---\ntags: [a,\n  b]\ntitle: x\n---\nbody";
        let parsed = parse(blob).unwrap();
        let rendered = stringify(parsed.frontmatter.as_ref(), &parsed.content).unwrap();
        assert_eq!(rendered, "---\ntitle: x\ntags:\n- a\n- b\n---\nbody");
        assert_eq!(parse(&rendered).unwrap(), parsed);
    }

    #[test]
    fn test_crlf_header_keeps_crlf() {
        let parsed = parse("---\r\ntitle: Old\r\npriority: 2\r\n---\r\nbody\r\n").unwrap();
        let mut fm = parsed.frontmatter.unwrap();
        fm.title = Some("New".into());
        fm.is_archived = Some(false);
        assert_eq!(
            stringify(Some(&fm), &parsed.content).unwrap(),
            "---\r\ntitle: New\r\npriority: 2\r\nisArchived: false\r\n---\r\nbody\r\n"
        );
    }

    #[test]
    fn test_closing_delimiter_at_end_of_blob() {
        let blob = "---\ntitle: a\n---";
        let parsed = parse(blob).unwrap();
        assert_eq!(parsed.content, "");
        assert_eq!(stringify(parsed.frontmatter.as_ref(), "").unwrap(), blob);
    }

    #[test]
    fn test_byte_order_mark_before_header() {
        let blob = "\u{feff}---\ntitle: Old\npriority: 2\n---\nbody\n";
        let parsed = parse(blob).unwrap();
        let mut fm = parsed.frontmatter.unwrap();
        assert_eq!(fm.title.as_deref(), Some("Old"));
        assert_eq!(parsed.content, "body\n");

        fm.title = Some("New".into());
        let rendered = stringify(Some(&fm), &parsed.content).unwrap();
        assert_eq!(rendered, "\u{feff}---\ntitle: New\npriority: 2\n---\nbody\n");
    }

    #[test]
    fn test_byte_order_mark_stays_in_front_of_new_header() {
        let parsed = parse("\u{feff}# Notes\n").unwrap();
        assert!(parsed.frontmatter.is_none());
        assert_eq!(stringify(None, &parsed.content).unwrap(), "\u{feff}# Notes\n");

        let fm = Frontmatter {
            title: Some("Notes".into()),
            ..Default::default()
        };
        assert_eq!(
            stringify(Some(&fm), &parsed.content).unwrap(),
            "\u{feff}---\ntitle: Notes\n---\n# Notes\n"
        );
    }

    #[test]
    fn test_known_keys() {
        assert!(is_known_key("createdAt"));
        assert!(!is_known_key("assignee"));
    }
}

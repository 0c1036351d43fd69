//! Pulls tags, a text preview, a feature image and frontmatter metadata out
//! of a markdown note.
//!
//! Frontmatter is parsed by hand: `key: value`, inline lists (`[a, b]`) and
//! block lists (`- a`). Nested YAML maps are out of reach and are kept as
//! plain strings.

use crate::config::ContentConfig;
use crate::models::FileRecord;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static INLINE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(,])#([\p{L}\p{N}_/\-]+)").unwrap());
static WIKI_EMBED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[\[([^\]|#]+)(?:[|#][^\]]*)?\]\]").unwrap());
static MD_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(\s*<?([^)\s>]+)>?[^)]*\)").unwrap());
static MD_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(?:[^\]|]*\|)?([^\]]+)\]\]").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];
const FEATURE_IMAGE_KEYS: &[&str] = &["image", "cover", "banner", "thumbnail", "feature"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedNote {
    pub tags: Vec<String>,
    pub preview: Option<String>,
    pub feature_image: Option<String>,
    pub metadata: Option<Value>,
}

impl ExtractedNote {
    /// Scanned record honoring the display switches; `tags` is always set.
    pub fn into_record(self, mtime: i64, content: &ContentConfig) -> FileRecord {
        FileRecord {
            mtime,
            preview: self.preview.filter(|_| content.show_previews),
            feature_image: self.feature_image.filter(|_| content.show_feature_images),
            tags: Some(self.tags),
            metadata: self.metadata.filter(|_| content.keep_metadata),
        }
    }
}

pub fn extract_note(content: &str, preview_length: usize) -> ExtractedNote {
    let (frontmatter, body) = split_frontmatter(content);
    let fields = frontmatter.map(parse_frontmatter).unwrap_or_default();
    let body = strip_code_blocks(body);

    let mut tags: Vec<String> = Vec::new();
    for key in ["tags", "tag"] {
        if let Some(value) = fields.get(key) {
            push_unique(&mut tags, frontmatter_tags(value));
        }
    }
    push_unique(&mut tags, extract_inline_tags(&body));

    let feature_image = FEATURE_IMAGE_KEYS
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(clean_link_target)
        .filter(|s| !s.is_empty())
        .or_else(|| first_embedded_image(&body));

    ExtractedNote {
        tags,
        preview: build_preview(&body, preview_length),
        feature_image,
        metadata: (!fields.is_empty()).then(|| Value::Object(fields)),
    }
}

/// Splits off a leading `---` fenced block.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, content)
}

fn parse_frontmatter(yaml: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut list_key: Option<String> = None;

    for line in yaml.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(item) = trimmed.strip_prefix("- ").or((trimmed == "-").then_some("")) {
            if let Some(key) = &list_key {
                if let Some(Value::Array(items)) = fields.get_mut(key) {
                    let item = unquote(item);
                    if !item.is_empty() {
                        items.push(Value::String(item));
                    }
                }
            }
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            // nested mapping content; not modelled
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();
        if value.is_empty() {
            fields.insert(key.clone(), Value::Array(Vec::new()));
            list_key = Some(key);
        } else if value.starts_with('[') && value.ends_with(']') {
            let items = parse_inline_list(value).into_iter().map(Value::String).collect();
            fields.insert(key, Value::Array(items));
            list_key = None;
        } else {
            fields.insert(key, Value::String(unquote(value)));
            list_key = None;
        }
    }
    fields
}

fn frontmatter_tags(value: &Value) -> Vec<String> {
    let raw: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(s) => s.split([',', ' ']).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').trim_end_matches('/'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// `#tags` in body text. Purely numeric tags are not tags.
pub fn extract_inline_tags(text: &str) -> Vec<String> {
    INLINE_TAG_RE
        .captures_iter(text)
        .map(|cap| cap[1].trim_end_matches('/').to_string())
        .filter(|t| !t.is_empty() && !t.chars().all(|c| c.is_ascii_digit() || c == '/'))
        .collect()
}

fn push_unique(tags: &mut Vec<String>, incoming: Vec<String>) {
    for tag in incoming {
        let lower = tag.to_lowercase();
        if !tags.iter().any(|t| t.to_lowercase() == lower) {
            tags.push(tag);
        }
    }
}

fn strip_code_blocks(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn first_embedded_image(body: &str) -> Option<String> {
    let wiki = WIKI_EMBED_RE
        .captures_iter(body)
        .filter_map(|cap| {
            let m = cap.get(1)?;
            is_image(m.as_str()).then(|| (m.start(), m.as_str().trim().to_string()))
        })
        .next();
    let markdown = MD_IMAGE_RE
        .captures_iter(body)
        .filter_map(|cap| {
            let m = cap.get(1)?;
            let target = m.as_str();
            (is_image(target) || target.starts_with("http"))
                .then(|| (m.start(), target.to_string()))
        })
        .next();
    match (wiki, markdown) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (a, b) => a.or(b).map(|(_, target)| target),
    }
}

fn is_image(target: &str) -> bool {
    target
        .trim()
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn clean_link_target(value: &str) -> String {
    let value = value.trim();
    let value = value
        .strip_prefix("[[")
        .and_then(|v| v.strip_suffix("]]"))
        .unwrap_or(value);
    value.split('|').next().unwrap_or(value).trim().to_string()
}

fn build_preview(body: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let mut words: Vec<String> = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') && !INLINE_TAG_RE.is_match(line) {
            continue;
        }
        let line = line.trim_start_matches(|c: char| c == '>' || c.is_whitespace());
        let line = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .unwrap_or(line);
        let line = WIKI_EMBED_RE.replace_all(line, "");
        let line = MD_IMAGE_RE.replace_all(&line, "");
        let line = MD_LINK_RE.replace_all(&line, "$1");
        let line = WIKI_LINK_RE.replace_all(&line, "$1");
        let cleaned: String = line
            .chars()
            .filter(|c| !matches!(c, '*' | '_' | '`' | '~' | '='))
            .collect();
        words.extend(cleaned.split_whitespace().map(str::to_string));
    }
    let text = words.join(" ");
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= max_chars {
        return Some(text);
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.truncate(preview.trim_end().len());
    preview.push('…');
    Some(preview)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn parse_inline_list(s: &str) -> Vec<String> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(s);
    inner
        .split(',')
        .map(unquote)
        .filter(|item| !item.is_empty())
        .collect()
}

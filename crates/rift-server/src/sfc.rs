//! Structural parser for single-file components (`.vue`).
//!
//! Only the block structure is parsed: top-level `<template>`, `<script>`,
//! `<style>` and custom blocks, plus element balance inside the template.
//! Errors carry the same numeric codes the component compiler uses, so the
//! validity gate can tell an in-progress edit from a broken file.

use indexmap::IndexMap;
use memchr::{memchr, memmem};

/// Structural error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SfcErrorCode {
    EofInComment,
    EofInTag,
    InvalidEndTag,
    MissingEndTag,
    MissingInterpolationEnd,
    DuplicateBlock,
}

impl SfcErrorCode {
    pub fn code(self) -> u32 {
        match self {
            SfcErrorCode::EofInComment => 7,
            SfcErrorCode::EofInTag => 9,
            SfcErrorCode::InvalidEndTag => 23,
            SfcErrorCode::MissingEndTag => 24,
            SfcErrorCode::MissingInterpolationEnd => 25,
            SfcErrorCode::DuplicateBlock => 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfcError {
    pub code: SfcErrorCode,
    /// Byte offset in the source.
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfcBlock {
    /// Tag name: `template`, `script`, `style` or a custom block name.
    pub kind: String,
    pub attrs: IndexMap<String, String>,
    pub content: String,
    /// Byte range of `content` in the source.
    pub start: usize,
    pub end: usize,
}

impl SfcBlock {
    pub fn lang(&self) -> Option<&str> {
        self.attrs.get("lang").map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfcDescriptor {
    pub template: Option<SfcBlock>,
    pub script: Option<SfcBlock>,
    pub styles: Vec<SfcBlock>,
    pub custom_blocks: Vec<SfcBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct SfcParseResult {
    pub descriptor: SfcDescriptor,
    pub errors: Vec<SfcError>,
}

impl SfcParseResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn parse(source: &str) -> SfcParseResult {
    let mut parser = SfcParser {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        result: SfcParseResult::default(),
    };
    parser.parse_top_level();
    parser.result
}

struct SfcParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    result: SfcParseResult,
}

/// A parsed tag opening: `<name attrs>` or `<name attrs/>`.
struct OpenTag {
    name: String,
    attrs: IndexMap<String, String>,
    self_closing: bool,
    /// Offset just past the closing `>`.
    end: usize,
}

impl<'a> SfcParser<'a> {
    fn error(&mut self, code: SfcErrorCode, offset: usize, message: impl Into<String>) {
        self.result.errors.push(SfcError {
            code,
            offset,
            message: message.into(),
        });
    }

    fn parse_top_level(&mut self) {
        while let Some(rel) = memchr(b'<', &self.bytes[self.pos..]) {
            let start = self.pos + rel;
            let rest = &self.bytes[start..];

            if rest.starts_with(b"<!--") {
                match memmem::find(&rest[4..], b"-->") {
                    Some(end) => self.pos = start + 4 + end + 3,
                    None => {
                        self.error(SfcErrorCode::EofInComment, start, "unterminated comment");
                        return;
                    }
                }
                continue;
            }

            if rest.starts_with(b"</") {
                let Some(end) = find_tag_end(self.bytes, start + 2) else {
                    self.error(SfcErrorCode::EofInTag, start, "unexpected end of file in tag");
                    return;
                };
                let name = self.source[start + 2..end].trim().to_string();
                self.error(
                    SfcErrorCode::InvalidEndTag,
                    start,
                    format!("invalid end tag </{name}>"),
                );
                self.pos = end + 1;
                continue;
            }

            if !rest.get(1).is_some_and(|b| b.is_ascii_alphabetic()) {
                self.pos = start + 1;
                continue;
            }

            let Some(tag) = self.open_tag(start) else {
                self.error(SfcErrorCode::EofInTag, start, "unexpected end of file in tag");
                return;
            };

            if tag.self_closing {
                let end = tag.end;
                self.pos = end;
                self.push_block(start, tag, (end, end));
                continue;
            }

            let content_start = tag.end;
            let close = if tag.name == "template" {
                self.template_close(content_start)
            } else {
                raw_close(self.source, content_start, &tag.name)
            };

            match close {
                Some((content_end, after)) => {
                    self.pos = after;
                    self.push_block(start, tag, (content_start, content_end));
                }
                None => {
                    self.error(
                        SfcErrorCode::MissingEndTag,
                        start,
                        format!("element <{}> is missing end tag", tag.name),
                    );
                    let end = self.bytes.len();
                    self.push_block(start, tag, (content_start, end));
                    return;
                }
            }
        }
    }

    fn open_tag(&self, start: usize) -> Option<OpenTag> {
        let end = find_tag_end(self.bytes, start + 1)?;
        let inner = &self.source[start + 1..end];
        let self_closing = inner.ends_with('/');
        let inner = inner.trim_end_matches('/');

        let name_len = inner
            .find(|c: char| c.is_whitespace())
            .unwrap_or(inner.len());
        let name = inner[..name_len].to_ascii_lowercase();
        let attrs = parse_attrs(&inner[name_len..]);

        Some(OpenTag {
            name,
            attrs,
            self_closing,
            end: end + 1,
        })
    }

    /// Scan template content for its matching `</template>`, checking element
    /// balance on the way. Returns `(content_end, offset after close tag)`.
    fn template_close(&mut self, from: usize) -> Option<(usize, usize)> {
        let mut stack: Vec<(String, usize)> = vec![("template".to_string(), from)];
        let mut pos = from;

        while let Some(rel) = memchr(b'<', &self.bytes[pos..]) {
            let start = pos + rel;
            self.check_interpolation(pos, start);
            let rest = &self.bytes[start..];

            if rest.starts_with(b"<!--") {
                match memmem::find(&rest[4..], b"-->") {
                    Some(end) => pos = start + 4 + end + 3,
                    None => {
                        self.error(SfcErrorCode::EofInComment, start, "unterminated comment");
                        self.unclosed(&stack[1..]);
                        return None;
                    }
                }
                continue;
            }

            if rest.starts_with(b"</") {
                let Some(end) = find_tag_end(self.bytes, start + 2) else {
                    self.error(SfcErrorCode::EofInTag, start, "unexpected end of file in tag");
                    self.unclosed(&stack[1..]);
                    return None;
                };
                let name = self.source[start + 2..end].trim().to_ascii_lowercase();
                pos = end + 1;

                match stack.iter().rposition(|(open, _)| *open == name) {
                    Some(index) => {
                        let dangling: Vec<_> = stack.drain(index..).skip(1).collect();
                        self.unclosed(&dangling);
                        if stack.is_empty() {
                            return Some((start, pos));
                        }
                    }
                    None => self.error(
                        SfcErrorCode::InvalidEndTag,
                        start,
                        format!("invalid end tag </{name}>"),
                    ),
                }
                continue;
            }

            if !rest.get(1).is_some_and(|b| b.is_ascii_alphabetic()) {
                pos = start + 1;
                continue;
            }

            let Some(tag) = self.open_tag(start) else {
                self.error(SfcErrorCode::EofInTag, start, "unexpected end of file in tag");
                self.unclosed(&stack[1..]);
                return None;
            };
            pos = tag.end;
            if !tag.self_closing && !VOID_ELEMENTS.contains(&tag.name.as_str()) {
                stack.push((tag.name, start));
            }
        }

        self.check_interpolation(pos, self.bytes.len());
        // The outer template itself is reported by the caller.
        self.unclosed(&stack[1..]);
        None
    }

    fn unclosed(&mut self, elements: &[(String, usize)]) {
        for (name, offset) in elements {
            self.error(
                SfcErrorCode::MissingEndTag,
                *offset,
                format!("element <{name}> is missing end tag"),
            );
        }
    }

    /// Report `{{` without a matching `}}` in a text run.
    fn check_interpolation(&mut self, from: usize, to: usize) {
        let text = &self.bytes[from..to];
        let mut cursor = 0;
        while let Some(open) = memmem::find(&text[cursor..], b"{{") {
            let open = cursor + open;
            match memmem::find(&text[open + 2..], b"}}") {
                Some(close) => cursor = open + 2 + close + 2,
                None => {
                    self.error(
                        SfcErrorCode::MissingInterpolationEnd,
                        from + open,
                        "interpolation end sign was not found",
                    );
                    return;
                }
            }
        }
    }

    fn push_block(&mut self, tag_start: usize, tag: OpenTag, (start, end): (usize, usize)) {
        let content = self.source.get(start..end).unwrap_or_default().to_string();
        let block = SfcBlock {
            kind: tag.name,
            attrs: tag.attrs,
            content,
            start,
            end,
        };

        let descriptor = &mut self.result.descriptor;
        let duplicate = match block.kind.as_str() {
            "template" => descriptor.template.replace(block.clone()).is_some(),
            "script" => descriptor.script.replace(block.clone()).is_some(),
            "style" => {
                descriptor.styles.push(block);
                false
            }
            _ => {
                descriptor.custom_blocks.push(block);
                false
            }
        };
        if duplicate {
            self.error(
                SfcErrorCode::DuplicateBlock,
                tag_start,
                "single file component contains duplicate blocks",
            );
        }
    }
}

/// Closing `>` of a tag starting at `from`, skipping quoted attribute values.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &byte) in bytes.get(from..)?.iter().enumerate() {
        match (byte, quote) {
            (b'"' | b'\'', None) => quote = Some(byte),
            (b, Some(q)) if b == q => quote = None,
            (b'>', None) => return Some(from + i),
            _ => {}
        }
    }
    None
}

/// End of a raw-text block (`script`, `style`, custom): the first
/// `</name` followed by `>`.
fn raw_close(source: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let rel = memmem::find(&source.as_bytes()[from..], needle.as_bytes())?;
    let close_start = from + rel;
    let gt = find_tag_end(source.as_bytes(), close_start + needle.len())?;
    Some((close_start, gt + 1))
}

fn parse_attrs(input: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_string();
        rest = rest[name_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(q).unwrap_or(body.len());
                    rest = body.get(close + 1..).unwrap_or_default();
                    body[..close].to_string()
                }
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    after_eq[..end].to_string()
                }
            }
        } else {
            String::new()
        };

        if !name.is_empty() {
            attrs.insert(name, value);
        }
        rest = rest.trim_start();
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = r#"<template>
  <div class="app">
    <img src="logo.png">
    <h1>{{ msg }}</h1>
  </div>
</template>

<script lang="ts">
export default { data: () => ({ msg: "<b>hi</b>" }) }
</script>

<style scoped>
h1 { color: red; }
</style>

<i18n>{ "en": { "hello": "Hello" } }</i18n>
"#;

    #[test]
    fn parses_sections() {
        let result = parse(COMPONENT);
        assert!(result.is_clean(), "{:?}", result.errors);

        let descriptor = result.descriptor;
        let template = descriptor.template.unwrap();
        assert!(template.content.contains("<h1>{{ msg }}</h1>"));

        let script = descriptor.script.unwrap();
        assert_eq!(script.lang(), Some("ts"));
        assert!(script.content.contains("export default"));

        assert_eq!(descriptor.styles.len(), 1);
        assert!(descriptor.styles[0].has_attr("scoped"));
        assert_eq!(descriptor.custom_blocks[0].kind, "i18n");
    }

    #[test]
    fn unclosed_inner_element_is_single_missing_end_tag() {
        let result = parse("<template><div><span></div></template>");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, SfcErrorCode::MissingEndTag);
        assert_eq!(result.errors[0].code.code(), 24);
    }

    #[test]
    fn stray_end_tag_is_invalid() {
        let result = parse("<template><div></p></div></template>");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code.code(), 23);
    }

    #[test]
    fn truncated_template_reports_every_open_element() {
        let result = parse("<template><div>");
        let codes: Vec<_> = result.errors.iter().map(|e| e.code.code()).collect();
        assert_eq!(codes, vec![24, 24]);
    }

    #[test]
    fn unterminated_tag_and_comment() {
        assert_eq!(parse("<template><div class=\"a\"").errors[0].code.code(), 9);
        assert_eq!(parse("<!-- note").errors[0].code.code(), 7);
    }

    #[test]
    fn unterminated_interpolation() {
        let result = parse("<template><p>{{ msg </p></template>");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, SfcErrorCode::MissingInterpolationEnd);
    }

    #[test]
    fn duplicate_script_is_reported() {
        let result = parse("<script>a</script><script>b</script>");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, SfcErrorCode::DuplicateBlock);
    }

    #[test]
    fn script_content_is_raw_text() {
        let result = parse("<script>const s = '<div>';</script>");
        assert!(result.is_clean());
        assert_eq!(
            result.descriptor.script.unwrap().content,
            "const s = '<div>';"
        );
    }
}

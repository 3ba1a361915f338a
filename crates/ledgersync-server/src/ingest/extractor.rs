//! Tag extraction from ERP XML exports
//!
//! The export format is XML-shaped but not reliably well-formed: unescaped
//! ampersands, truncated tails and stray control characters are common.
//! Instead of building a DOM, [`Fragment`] scans for tag delimiters and
//! returns whatever it can find. A malformed tag only costs the field it
//! belongs to; it never aborts the payload.
//!
//! The scanner sits behind [`TagSource`] so a stricter parser can be
//! substituted without touching the extractors built on top of it.

use std::borrow::Cow;

/// Read access to tagged text.
pub trait TagSource {
    /// Inner text of the first `<tag>` element, entity-decoded and trimmed.
    ///
    /// Self-closing elements yield `Some("")`; missing or unclosed ones
    /// yield `None`.
    fn field(&self, tag: &str) -> Option<String>;

    /// Lazily iterate the outermost `<tag>` elements in document order.
    fn blocks<'s>(&'s self, tag: &'s str) -> Blocks<'s>;

    /// Attribute value from the opening tag of the first `<tag>` element.
    fn attribute(&self, tag: &str, attr: &str) -> Option<String>;

    /// First non-empty field among `tags`.
    fn first_field(&self, tags: &[&str]) -> Option<String> {
        tags.iter()
            .filter_map(|t| self.field(t))
            .find(|v| !v.is_empty())
    }
}

/// A slice of an export document.
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    text: Cow<'a, str>,
    /// Opening-tag contents of the element this fragment is the body of.
    head: &'a str,
}

impl<'a> Fragment<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text: Cow::Borrowed(text),
            head: "",
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// The whole body as text, decoded like a field value.
    pub fn decoded(&self) -> String {
        decode(&self.text)
    }

    /// Attribute of the enclosing element (`<VOUCHER VCHTYPE="Sales">`).
    pub fn own_attribute(&self, attr: &str) -> Option<String> {
        parse_attribute(self.head, attr)
    }

    /// A view with every nested `*.LIST` element removed, so scalar lookups
    /// only see fields that belong to this element itself.
    pub fn top_level(&self) -> Fragment<'_> {
        Fragment {
            text: Cow::Owned(mask_lists(&self.text)),
            head: self.head,
        }
    }
}

impl TagSource for Fragment<'_> {
    fn field(&self, tag: &str) -> Option<String> {
        let text: &str = &self.text;
        let open = find_open(text, tag, 0)?;
        if open.self_closing {
            return Some(String::new());
        }
        let (close_start, _) = find_close(text, tag, open.body_start)?;
        Some(decode(&text[open.body_start..close_start]))
    }

    fn blocks<'s>(&'s self, tag: &'s str) -> Blocks<'s> {
        Blocks {
            text: &self.text,
            tag,
            pos: 0,
        }
    }

    fn attribute(&self, tag: &str, attr: &str) -> Option<String> {
        let text: &str = &self.text;
        let open = find_open(text, tag, 0)?;
        parse_attribute(&text[open.head_start..open.head_end], attr)
    }
}

/// Iterator over the outermost elements of one tag.
///
/// Elements without a closing tag are skipped; scanning resumes right after
/// their opening tag.
pub struct Blocks<'a> {
    text: &'a str,
    tag: &'a str,
    pos: usize,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let open = find_open(self.text, self.tag, self.pos)?;
            let head = &self.text[open.head_start..open.head_end];
            if open.self_closing {
                self.pos = open.body_start;
                return Some(Fragment {
                    text: Cow::Borrowed(""),
                    head,
                });
            }
            match find_close(self.text, self.tag, open.body_start) {
                Some((close_start, close_end)) => {
                    self.pos = close_end;
                    return Some(Fragment {
                        text: Cow::Borrowed(&self.text[open.body_start..close_start]),
                        head,
                    });
                }
                None => {
                    tracing::debug!(tag = self.tag, offset = open.start, "Skipping unclosed element");
                    self.pos = open.body_start;
                }
            }
        }
    }
}

struct OpenTag {
    start: usize,
    /// Attribute section of the opening tag
    head_start: usize,
    head_end: usize,
    body_start: usize,
    self_closing: bool,
}

fn is_name_boundary(c: Option<char>) -> bool {
    matches!(c, Some('>') | Some('/')) || c.is_some_and(char::is_whitespace)
}

fn find_open(text: &str, tag: &str, from: usize) -> Option<OpenTag> {
    let needle = format!("<{}", tag);
    let mut pos = from;
    while let Some(rel) = text.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        if is_name_boundary(text[after..].chars().next()) {
            let gt = after + text[after..].find('>')?;
            let self_closing = text[..gt].ends_with('/');
            let head_end = if self_closing { gt - 1 } else { gt };
            return Some(OpenTag {
                start,
                head_start: after,
                head_end: head_end.max(after),
                body_start: gt + 1,
                self_closing,
            });
        }
        pos = after;
    }
    None
}

/// Matching `</tag>` for an element whose body starts at `from`, honouring
/// nested elements of the same tag.
fn find_close(text: &str, tag: &str, from: usize) -> Option<(usize, usize)> {
    let close = format!("</{}", tag);
    let mut depth = 0usize;
    let mut pos = from;

    loop {
        let next_close = text.get(pos..)?.find(&close).map(|i| pos + i);
        let next_open = find_open(text, tag, pos);

        match (next_open, next_close) {
            (Some(open), Some(c)) if open.start < c => {
                if !open.self_closing {
                    depth += 1;
                }
                pos = open.body_start;
            }
            (_, Some(c)) => {
                let after = c + close.len();
                let rest = &text[after..];
                let gt = rest.find('>')?;
                if !rest[..gt].trim().is_empty() {
                    // `</TAGNAME>` of a longer tag sharing this prefix
                    pos = after;
                    continue;
                }
                if depth == 0 {
                    return Some((c, after + gt + 1));
                }
                depth -= 1;
                pos = after + gt + 1;
            }
            (_, None) => return None,
        }
    }
}

fn parse_attribute(head: &str, attr: &str) -> Option<String> {
    let mut rest = head;
    while let Some(i) = rest.find(attr) {
        let before = rest[..i].chars().next_back();
        let after = &rest[i + attr.len()..];
        let trimmed = after.trim_start();
        if before.map_or(true, char::is_whitespace) && trimmed.starts_with('=') {
            let value = trimmed[1..].trim_start();
            let quote = value.chars().next()?;
            if quote == '"' || quote == '\'' {
                let body = &value[1..];
                let end = body.find(quote)?;
                return Some(decode(&body[..end]));
            }
            let end = value.find(char::is_whitespace).unwrap_or(value.len());
            return Some(decode(&value[..end]));
        }
        rest = after;
    }
    None
}

fn mask_lists(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(rel) = text[pos..].find('<') {
        let start = pos + rel;
        out.push_str(&text[pos..start]);

        let name: String = text[start + 1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
            .collect();

        if !name.is_empty() && name.ends_with(".LIST") {
            if let Some(open) = find_open(text, &name, start).filter(|o| o.start == start) {
                if open.self_closing {
                    pos = open.body_start;
                    continue;
                }
                if let Some((_, close_end)) = find_close(text, &name, open.body_start) {
                    pos = close_end;
                    continue;
                }
            }
        }

        out.push('<');
        pos = start + 1;
    }
    out.push_str(&text[pos..]);
    out
}

/// Decode entities, unwrap CDATA and drop control characters.
///
/// Text that fails to decode (a bare `&`, say) is returned as-is.
fn decode(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(cdata) = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        return cdata.trim().to_string();
    }

    let raw = strip_control_refs(raw);
    let raw: &str = raw.as_ref();
    let decoded = quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw));
    decoded
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Remove character references to control codes (`&#4;`), which the
/// exporter emits as markers but XML does not allow.
fn strip_control_refs(raw: &str) -> Cow<'_, str> {
    if !raw.contains("&#") {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(i) = rest.find("&#") {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        match tail.find(';') {
            Some(end) if is_control_ref(&tail[2..end]) => rest = &tail[end + 1..],
            _ => {
                out.push_str("&#");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn is_control_ref(code: &str) -> bool {
    let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => code.parse::<u32>().ok(),
    };
    value.is_some_and(|v| v < 0x20 && !matches!(v, 0x09 | 0x0A | 0x0D))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_field_basic_and_decoded() {
        let f = Fragment::new("<A><NAME> Tom &amp; Jerry </NAME><NAMES>x</NAMES></A>");
        assert_eq!(f.field("NAME").as_deref(), Some("Tom & Jerry"));
        assert_eq!(f.field("NAMES").as_deref(), Some("x"));
        assert!(f.field("MISSING").is_none());
    }

    #[test]
    fn test_field_spanning_lines() {
        let f = Fragment::new("<NARRATION>Line one\nline two</NARRATION>");
        assert_eq!(f.field("NARRATION").as_deref(), Some("Line one\nline two"));
    }

    #[test]
    fn test_self_closing_and_unclosed() {
        let f = Fragment::new("<REFERENCE/><DATE>20240401");
        assert_eq!(f.field("REFERENCE").as_deref(), Some(""));
        assert!(f.field("DATE").is_none());
    }

    #[test]
    fn test_bare_ampersand_survives() {
        let f = Fragment::new("<LEDGERNAME>R & D Expenses</LEDGERNAME>");
        assert_eq!(f.field("LEDGERNAME").as_deref(), Some("R & D Expenses"));
    }

    #[test]
    fn test_control_characters_dropped() {
        let f = Fragment::new("<PARENT>&#4; Primary</PARENT>");
        assert_eq!(f.field("PARENT").as_deref(), Some("Primary"));
    }

    #[test]
    fn test_cdata_unwrapped() {
        let f = Fragment::new("<NARRATION><![CDATA[a < b]]></NARRATION>");
        assert_eq!(f.field("NARRATION").as_deref(), Some("a < b"));
    }

    #[test]
    fn test_attribute() {
        let f = Fragment::new(r#"<VOUCHER REMOTEID="x-1" VCHTYPE="Sales" ACTION='Create'>..</VOUCHER>"#);
        assert_eq!(f.attribute("VOUCHER", "VCHTYPE").as_deref(), Some("Sales"));
        assert_eq!(f.attribute("VOUCHER", "ACTION").as_deref(), Some("Create"));
        assert!(f.attribute("VOUCHER", "TYPE").is_none());
    }

    #[test]
    fn test_blocks_in_order_with_heads() {
        let doc = r#"<V VCHTYPE="Sales"><N>1</N></V><X/><V VCHTYPE="Receipt"><N>2</N></V>"#;
        let f = Fragment::new(doc);
        let blocks: Vec<_> = f.blocks("V").collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].field("N").as_deref(), Some("1"));
        assert_eq!(blocks[1].own_attribute("VCHTYPE").as_deref(), Some("Receipt"));
    }

    #[test]
    fn test_blocks_balance_nested_same_tag() {
        let doc = "<L.LIST><A>1</A><L.LIST><A>2</A></L.LIST></L.LIST><L.LIST><A>3</A></L.LIST>";
        let f = Fragment::new(doc);
        let blocks: Vec<_> = f.blocks("L.LIST").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].as_str().contains("<A>2</A>"));
        assert_eq!(blocks[1].field("A").as_deref(), Some("3"));
    }

    #[test]
    fn test_blocks_skip_unclosed() {
        let doc = "<V><N>1</N><V><N>2</N></V>";
        let f = Fragment::new(doc);
        let blocks: Vec<_> = f.blocks("V").collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].field("N").as_deref(), Some("2"));
    }

    #[test]
    fn test_close_tag_prefix_not_confused() {
        let f = Fragment::new("<AMOUNT>1<AMOUNTS>2</AMOUNTS></AMOUNT>");
        assert_eq!(f.field("AMOUNT").as_deref(), Some("1<AMOUNTS>2</AMOUNTS>"));
    }

    #[test]
    fn test_top_level_masks_lists() {
        let doc = "<AMOUNT>-500</AMOUNT><BILL.LIST><AMOUNT>9</AMOUNT></BILL.LIST><NAME>x</NAME>";
        let f = Fragment::new("<ENTRY.LIST><LEDGERNAME>Cash</LEDGERNAME></ENTRY.LIST><DATE>20240401</DATE>");
        let top = f.top_level();
        assert!(top.field("LEDGERNAME").is_none());
        assert_eq!(top.field("DATE").as_deref(), Some("20240401"));

        let fragment = Fragment::new(doc);
        let entry = fragment.top_level();
        assert_eq!(entry.field("AMOUNT").as_deref(), Some("-500"));
        assert_eq!(entry.as_str(), "<AMOUNT>-500</AMOUNT><NAME>x</NAME>");
    }

    #[test]
    fn test_first_field() {
        let f = Fragment::new("<ACTUALQTY></ACTUALQTY><BILLEDQTY> 10 Nos</BILLEDQTY>");
        assert_eq!(f.first_field(&["ACTUALQTY", "BILLEDQTY"]).as_deref(), Some("10 Nos"));
    }
}

//! Text-block extraction from EDINET XBRL instances.
//!
//! Narrative disclosures in an EDINET instance are carried by elements whose
//! local name ends in `TextBlock` (for example
//! `jpcrp_cor:BusinessRisksTextBlock`). Their content is escaped XHTML; this
//! module collects it and flattens it to plain text.

use crate::error::{DataError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, HashMap, HashSet};

const TEXT_BLOCK_SUFFIX: &str = "TextBlock";

/// Local name of the elements a split text block continues in.
const CONTINUATION: &str = "continuation";

/// Separator between occurrences of the same text block.
const OCCURRENCE_SEPARATOR: &str = "\n\n";

/// Elements that start a new line when flattened.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "dd", "dt",
    "tr", "blockquote",
];

/// Text blocks of one XBRL instance, keyed by element local name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XbrlDocument {
    blocks: BTreeMap<String, String>,
}

/// A captured text block or continuation element.
struct Fragment {
    name: String,
    id: Option<String>,
    continued_at: Option<String>,
    html: String,
}

struct OpenFragment {
    fragment: Fragment,
    depth: usize,
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl XbrlDocument {
    /// Parse an XBRL instance.
    ///
    /// A block split with `continuedAt` is reassembled from its continuation
    /// chain. Every non-empty occurrence of a block is kept, in document
    /// order, separated by a blank line.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let fragments = collect_fragments(bytes)?;

        let continuations: HashMap<&str, &Fragment> = fragments
            .iter()
            .filter(|f| f.name == CONTINUATION)
            .filter_map(|f| f.id.as_deref().map(|id| (id, f)))
            .collect();

        let mut occurrences: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for fragment in fragments.iter().filter(|f| f.name.ends_with(TEXT_BLOCK_SUFFIX)) {
            let mut html = fragment.html.clone();
            let mut next = fragment.continued_at.as_deref();
            let mut visited = HashSet::new();
            while let Some(id) = next {
                if !visited.insert(id) {
                    break;
                }
                let Some(part) = continuations.get(id) else {
                    log::debug!("{} continues at unknown id {}", fragment.name, id);
                    break;
                };
                html.push_str(&part.html);
                next = part.continued_at.as_deref();
            }

            let text = html_to_text(&html);
            if !text.is_empty() {
                occurrences
                    .entry(fragment.name.clone())
                    .or_default()
                    .push(text);
            }
        }

        let blocks = occurrences
            .into_iter()
            .map(|(name, texts)| (name, texts.join(OCCURRENCE_SEPARATOR)))
            .collect();
        Ok(Self { blocks })
    }

    /// Plain text of a text block.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.blocks.get(tag).map(String::as_str)
    }

    /// First of `tags` present in the document, with its text.
    pub fn first_available<'a>(&'a self, tags: &[&'a str]) -> Option<(&'a str, &'a str)> {
        tags.iter()
            .find_map(|tag| self.get(tag).map(|text| (*tag, text)))
    }

    /// Local names of all text blocks present.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// Number of text blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the document has no text blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Raw XHTML of every text block and continuation element, in document
/// order. Elements nested inside a captured one stay part of its markup.
fn collect_fragments(bytes: &[u8]) -> Result<Vec<Fragment>> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut fragments = Vec::new();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<OpenFragment> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if let Some(capture) = open.as_mut() {
                    capture.fragment.html.push('<');
                    capture.fragment.html.push_str(&local);
                    capture.fragment.html.push('>');
                } else if local.ends_with(TEXT_BLOCK_SUFFIX) || local == CONTINUATION {
                    open = Some(OpenFragment {
                        fragment: Fragment {
                            id: attribute(&e, b"id"),
                            continued_at: attribute(&e, b"continuedAt"),
                            name: local,
                            html: String::new(),
                        },
                        depth,
                    });
                }
            }
            Ok(Event::End(e)) => {
                if let Some(mut capture) = open.take() {
                    if capture.depth == depth {
                        fragments.push(capture.fragment);
                    } else {
                        let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        capture.fragment.html.push_str("</");
                        capture.fragment.html.push_str(&local);
                        capture.fragment.html.push('>');
                        open = Some(capture);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Empty(e)) => {
                if let Some(capture) = open.as_mut() {
                    capture.fragment.html.push('<');
                    capture
                        .fragment
                        .html
                        .push_str(&String::from_utf8_lossy(e.local_name().as_ref()));
                    capture.fragment.html.push_str("/>");
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(capture) = open.as_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| DataError::XmlParse(format!("Bad text block: {}", e)))?;
                    capture.fragment.html.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(capture) = open.as_mut() {
                    capture
                        .fragment
                        .html
                        .push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DataError::XmlParse(format!(
                    "XML parse error at {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
        buf.clear();
    }

    Ok(fragments)
}

/// Flatten an XHTML fragment to plain text.
///
/// Tables become one `cell | cell` line per row, block elements start new
/// lines, and blank lines are dropped.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    walk(fragment.root_element(), &mut out);

    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            match el.value().name() {
                "table" => render_table(el, out),
                "br" => out.push('\n'),
                "script" | "style" | "head" => {}
                name => {
                    let block = BLOCK_ELEMENTS.contains(&name);
                    if block {
                        out.push('\n');
                    }
                    walk(el, out);
                    if block {
                        out.push('\n');
                    }
                }
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn render_table(table: ElementRef<'_>, out: &mut String) {
    out.push('\n');
    for row in table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
    {
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "td" | "th"))
            .map(|cell| {
                cell.text()
                    .flat_map(str::split_whitespace)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|cell| !cell.is_empty())
            .collect();
        if !cells.is_empty() {
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:jpcrp_cor="http://disclosure.edinet-fsa.go.jp/taxonomy/jpcrp/2023-12-01/jpcrp_cor">
  <jpcrp_cor:CompanyNameCoverPage contextRef="FilingDateInstant">トヨタ自動車株式会社</jpcrp_cor:CompanyNameCoverPage>
  <jpcrp_cor:BusinessRisksTextBlock contextRef="FilingDateInstant">&lt;h3&gt;3【事業等のリスク】&lt;/h3&gt;&lt;p&gt;(1) 市場リスク&lt;/p&gt;&lt;p&gt;為替の変動&lt;br/&gt;による影響&lt;/p&gt;</jpcrp_cor:BusinessRisksTextBlock>
  <jpcrp_cor:MajorShareholdersTextBlock contextRef="FilingDateInstant">&lt;table&gt;&lt;tr&gt;&lt;th&gt;氏名&lt;/th&gt;&lt;th&gt;持株比率&lt;/th&gt;&lt;/tr&gt;&lt;tr&gt;&lt;td&gt;日本マスタートラスト&lt;/td&gt;&lt;td&gt; 15.1 &lt;/td&gt;&lt;/tr&gt;&lt;/table&gt;</jpcrp_cor:MajorShareholdersTextBlock>
  <jpcrp_cor:BusinessRisksTextBlock contextRef="Prior1YearInstant">&lt;p&gt;前期&lt;/p&gt;</jpcrp_cor:BusinessRisksTextBlock>
  <jpcrp_cor:EmptyTextBlock contextRef="FilingDateInstant"></jpcrp_cor:EmptyTextBlock>
</xbrli:xbrl>"#;

    #[test]
    fn test_collects_text_blocks() {
        let doc = XbrlDocument::parse(INSTANCE.as_bytes()).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.get("BusinessRisksTextBlock"),
            Some("3【事業等のリスク】\n(1) 市場リスク\n為替の変動\nによる影響\n\n前期")
        );
        assert!(doc.get("CompanyNameCoverPage").is_none());
        assert!(doc.get("EmptyTextBlock").is_none());
    }

    #[test]
    fn test_tables_become_rows() {
        let doc = XbrlDocument::parse(INSTANCE.as_bytes()).unwrap();
        assert_eq!(
            doc.get("MajorShareholdersTextBlock"),
            Some("氏名 | 持株比率\n日本マスタートラスト | 15.1")
        );
    }

    #[test]
    fn test_first_available() {
        let doc = XbrlDocument::parse(INSTANCE.as_bytes()).unwrap();
        let found = doc.first_available(&["RiskManagementTextBlock", "BusinessRisksTextBlock"]);
        assert_eq!(found.map(|(tag, _)| tag), Some("BusinessRisksTextBlock"));
        assert!(doc.first_available(&["DividendPolicyTextBlock"]).is_none());
    }

    #[test]
    fn test_inline_xhtml_children() {
        let xml = r#"<root><x:NotesTextBlock xmlns:x="urn:x"><p>一行目</p><p>二行目</p></x:NotesTextBlock></root>"#;
        let doc = XbrlDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.get("NotesTextBlock"), Some("一行目\n二行目"));
    }

    #[test]
    fn test_follows_continuation_chain() {
        let xml = r#"<root xmlns:x="urn:x" xmlns:ix="urn:ix">
  <x:DividendPolicyTextBlock continuedAt="c1">&lt;p&gt;配当方針の前半&lt;/p&gt;</x:DividendPolicyTextBlock>
  <ix:continuation id="c2">&lt;p&gt;後半その2&lt;/p&gt;</ix:continuation>
  <ix:continuation id="c1" continuedAt="c2">&lt;p&gt;後半その1&lt;/p&gt;</ix:continuation>
  <ix:continuation id="orphan">&lt;p&gt;無関係&lt;/p&gt;</ix:continuation>
</root>"#;
        let doc = XbrlDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(
            doc.get("DividendPolicyTextBlock"),
            Some("配当方針の前半\n後半その1\n後半その2")
        );
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_continuation_cycle_terminates() {
        let xml = r#"<root xmlns:x="urn:x" xmlns:ix="urn:ix">
  <x:NotesTextBlock continuedAt="a">&lt;p&gt;本文&lt;/p&gt;</x:NotesTextBlock>
  <ix:continuation id="a" continuedAt="b">&lt;p&gt;続き&lt;/p&gt;</ix:continuation>
  <ix:continuation id="b" continuedAt="a">&lt;p&gt;末尾&lt;/p&gt;</ix:continuation>
</root>"#;
        let doc = XbrlDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc.get("NotesTextBlock"), Some("本文\n続き\n末尾"));
    }

    #[test]
    fn test_malformed_xml() {
        let result = XbrlDocument::parse(b"<a><b></a>");
        assert!(matches!(result, Err(DataError::XmlParse(_))));
    }
}

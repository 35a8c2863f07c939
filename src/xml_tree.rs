//! Tree-structured records: the document is parsed once into a flat element arena
//! and every element named like the record element becomes one record.

use crate::encoding::{read_to_string, TextEncoding};
use crate::error::TabulateResult;
use crate::label_map::{Locator, TreePath};
use crate::reader::{RawRecord, RecordReader};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
struct Node {
    name: String,
    /// Character data before the first child element.
    text: String,
    /// One past the last descendant (pre-order).
    end: usize,
}

/// Pre-order element arena; descendants of node `i` are `i + 1..nodes[i].end`.
#[derive(Debug, Default)]
pub struct XmlDocument {
    nodes: Vec<Node>,
}

impl XmlDocument {
    pub fn parse(text: &str) -> TabulateResult<Self> {
        let mut reader = Reader::from_str(text);
        let mut nodes: Vec<Node> = Vec::new();
        // (index, has_child)
        let mut open: Vec<(usize, bool)> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if let Some(top) = open.last_mut() {
                        top.1 = true;
                    }
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    open.push((nodes.len(), false));
                    nodes.push(Node { name, text: String::new(), end: 0 });
                }
                Event::Empty(e) => {
                    if let Some(top) = open.last_mut() {
                        top.1 = true;
                    }
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let idx = nodes.len();
                    nodes.push(Node { name, text: String::new(), end: idx + 1 });
                }
                Event::End(_) => {
                    if let Some((idx, _)) = open.pop() {
                        nodes[idx].end = nodes.len();
                    }
                }
                Event::Text(t) => {
                    if let Some(&(idx, false)) = open.last() {
                        nodes[idx].text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(&(idx, false)) = open.last() {
                        nodes[idx].text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        // unterminated elements extend to the end of the document
        for (idx, _) in open {
            nodes[idx].end = nodes.len();
        }
        Ok(Self { nodes })
    }

    /// Indices of every element named `name`, in document order.
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.nodes.iter().enumerate().filter(move |(_, n)| n.name == name).map(|(i, _)| i)
    }

    fn children(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let end = self.nodes[idx].end;
        let mut next = idx + 1;
        std::iter::from_fn(move || {
            if next >= end {
                return None;
            }
            let cur = next;
            next = self.nodes[cur].end;
            Some(cur)
        })
    }

    /// First match of `.//seg0/seg1/...` below `root`, in document order.
    pub fn find(&self, root: usize, path: &TreePath) -> Option<usize> {
        let (first, rest) = path.segments.split_first()?;
        (root + 1..self.nodes[root].end)
            .filter(|&i| self.nodes[i].name == *first)
            .find_map(|i| self.find_chain(i, rest))
    }

    fn find_chain(&self, idx: usize, segs: &[String]) -> Option<usize> {
        match segs.split_first() {
            None => Some(idx),
            Some((seg, rest)) => self
                .children(idx)
                .filter(|&c| self.nodes[c].name == *seg)
                .find_map(|c| self.find_chain(c, rest)),
        }
    }

    pub fn text(&self, idx: usize) -> &str {
        &self.nodes[idx].text
    }
}

pub struct XmlRecordReader {
    doc: Arc<XmlDocument>,
    records: std::vec::IntoIter<usize>,
}

impl XmlRecordReader {
    pub fn open(path: &Path, enc: TextEncoding, record_element: &str) -> TabulateResult<Self> {
        let text = read_to_string(path, enc)?;
        Self::parse_str(text.trim_start_matches('\u{feff}'), record_element)
    }

    pub fn parse_str(text: &str, record_element: &str) -> TabulateResult<Self> {
        let doc = XmlDocument::parse(text)?;
        let records: Vec<usize> = doc.elements_named(record_element).collect();
        tracing::debug!(records = records.len(), record_element, "parsed tree document");
        Ok(Self { doc: Arc::new(doc), records: records.into_iter() })
    }
}

pub struct XmlRecord {
    doc: Arc<XmlDocument>,
    idx: usize,
}

impl RawRecord for XmlRecord {
    fn lookup(&self, loc: &Locator) -> Cow<'_, str> {
        match loc {
            Locator::Path(path) => match self.doc.find(self.idx, path) {
                Some(i) => Cow::Borrowed(self.doc.text(i)),
                None => Cow::Borrowed(""),
            },
            Locator::Field(name) => match TreePath::parse(name) {
                Ok(path) => match self.doc.find(self.idx, &path) {
                    Some(i) => Cow::Borrowed(self.doc.text(i)),
                    None => Cow::Borrowed(""),
                },
                Err(_) => Cow::Borrowed(""),
            },
            Locator::Literal(v) => Cow::Owned(v.clone()),
        }
    }
}

impl RecordReader for XmlRecordReader {
    type Record = XmlRecord;

    fn next_record(&mut self) -> Option<TabulateResult<XmlRecord>> {
        self.records
            .next()
            .map(|idx| Ok(XmlRecord { doc: Arc::clone(&self.doc), idx }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<root>
  <store>
    <name>Corner &amp; Co</name>
    <addr><num>12</num><street>Main</street></addr>
    <empty/>
    <blank></blank>
  </store>
  <store>
    <addr><street>Side</street></addr>
    <addr><num>7</num></addr>
  </store>
</root>"#;

    fn path(s: &str) -> Locator {
        Locator::Path(TreePath::parse(s).unwrap())
    }

    #[test]
    fn records_are_record_elements_in_order() {
        let mut r = XmlRecordReader::parse_str(DOC, "store").unwrap();
        let first = r.next_record().unwrap().unwrap();
        assert_eq!(first.lookup(&path("name")), "Corner & Co");
        assert_eq!(first.lookup(&path("addr/num")), "12");
        assert_eq!(first.lookup(&path("num")), "12");
        let second = r.next_record().unwrap().unwrap();
        assert_eq!(second.lookup(&path("name")), "");
        assert!(r.next_record().is_none());
    }

    #[test]
    fn missing_or_textless_elements_are_empty() {
        let mut r = XmlRecordReader::parse_str(DOC, "store").unwrap();
        let first = r.next_record().unwrap().unwrap();
        assert_eq!(first.lookup(&path("empty")), "");
        assert_eq!(first.lookup(&path("blank")), "");
        assert_eq!(first.lookup(&path("nowhere/at/all")), "");
    }

    #[test]
    fn literal_lookup_returns_payload() {
        let mut r = XmlRecordReader::parse_str(DOC, "store").unwrap();
        let first = r.next_record().unwrap().unwrap();
        assert_eq!(first.lookup(&Locator::Literal("kept".into())), "kept");
    }

    #[test]
    fn chain_search_continues_past_first_partial_match() {
        let mut r = XmlRecordReader::parse_str(DOC, "store").unwrap();
        r.next_record();
        let second = r.next_record().unwrap().unwrap();
        // the first <addr> has no <num>; the second one does
        assert_eq!(second.lookup(&path("addr/num")), "7");
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// XML events for OOXML parts, read with quick-xml.
//
// The office readers only need element boundaries, raw attribute values and
// character data, so each part is flattened into a list of owned events.
// Names keep their namespace prefix (`w:p`, `r:id`) as written.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use vibeparser_core::{Result, VibeError};

/// One event from an XML part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// `<name attrs>`; `empty` is true for `<name/>`.
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        empty: bool,
    },
    Close { name: String },
    /// Unescaped character data, CDATA included.
    Text(String),
}

/// Parse `xml` into open/close/text events. Declarations, comments,
/// processing instructions and doctypes are skipped.
pub fn events(xml: &str) -> Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        let event = reader.read_event().map_err(|err| {
            VibeError::DocumentUnreadable(format!(
                "malformed XML at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(start) => out.push(open(&start, false)),
            Event::Empty(start) => out.push(open(&start, true)),
            Event::End(end) => out.push(XmlEvent::Close {
                name: String::from_utf8_lossy(end.name().as_ref()).into_owned(),
            }),
            Event::Text(text) => {
                let decoded = match text.unescape() {
                    Ok(decoded) => decoded.into_owned(),
                    // Undeclared entities are kept verbatim.
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                push_text(&mut out, decoded);
            }
            Event::CData(cdata) => push_text(&mut out, String::from_utf8_lossy(&cdata).into_owned()),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

fn open(start: &BytesStart<'_>, empty: bool) -> XmlEvent {
    let attrs = start
        .attributes()
        .flatten()
        .map(|attribute| {
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = match attribute.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attribute.value).into_owned(),
            };
            (key, value)
        })
        .collect();
    XmlEvent::Open {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attrs,
        empty,
    }
}

/// Adjacent text and CDATA merge into one event.
fn push_text(out: &mut Vec<XmlEvent>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(XmlEvent::Text(previous)) = out.last_mut() {
        previous.push_str(&text);
    } else {
        out.push(XmlEvent::Text(text));
    }
}

/// Attribute value by qualified name.
pub fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

//! Streaming XML extraction for StoreOnce Gen 3 payloads.
//!
//! Gen 3 speaks XML rather than JSON, and the client only needs two
//! operations on it: reading the text of one element (session expiry
//! probing) and slicing out repeated elements verbatim (pagination).
//! Both run as a single pass over the document, no DOM involved.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Split an `a/b/c` path into segments, ignoring empty ones.
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// True when `stack` is the document root followed by exactly `want`.
///
/// Paths are resolved against the children of the root element, matching
/// how device payloads are addressed (`errors/error/message` inside a
/// `<response>` document).
fn matches(stack: &[String], want: &[&str]) -> bool {
    stack.len() == want.len() + 1
        && stack[1..]
            .iter()
            .map(String::as_str)
            .eq(want.iter().copied())
}

/// Text content of the first element at `path` under the document root.
///
/// Direct text and CDATA children are concatenated and trimmed. Returns
/// `None` when no element matches or the document is malformed before a
/// match is found.
pub fn first_text(xml: &str, path: &str) -> Option<String> {
    let want = segments(path);
    if want.is_empty() {
        return None;
    }

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut capturing = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                if !capturing && matches(&stack, &want) {
                    capturing = true;
                    text.clear();
                }
            }
            Ok(Event::Empty(e)) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                let hit = !capturing && matches(&stack, &want);
                stack.pop();
                if hit {
                    return Some(String::new());
                }
            }
            Ok(Event::Text(t)) => {
                if capturing && matches(&stack, &want) {
                    if let Ok(chunk) = t.unescape() {
                        text.push_str(&chunk);
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if capturing && matches(&stack, &want) {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                let done = capturing && matches(&stack, &want);
                stack.pop();
                if done {
                    return Some(text.trim().to_string());
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Serialized fragments of every element at `path` under the document root.
///
/// Each returned string is the byte-for-byte slice of the document covering
/// one matching element, opening tag through closing tag. Parsing stops at
/// the first error and returns the fragments collected so far.
pub fn fragments(xml: &str, path: &str) -> Vec<String> {
    let want = segments(path);
    let mut found = Vec::new();
    if want.is_empty() {
        return found;
    }

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut open: Option<usize> = None;
    let mut last_pos = 0usize;

    loop {
        let event = reader.read_event();
        let after = reader.buffer_position() as usize;
        match event {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                if open.is_none() && matches(&stack, &want) {
                    open = Some(last_pos);
                }
            }
            Ok(Event::Empty(e)) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                let hit = open.is_none() && matches(&stack, &want);
                stack.pop();
                if hit {
                    if let Some(fragment) = xml.get(last_pos..after) {
                        found.push(fragment.to_string());
                    }
                }
            }
            Ok(Event::End(_)) => {
                if open.is_some() && matches(&stack, &want) {
                    if let Some(start) = open.take() {
                        if let Some(fragment) = xml.get(start..after) {
                            found.push(fragment.to_string());
                        }
                    }
                }
                stack.pop();
            }
            Ok(Event::Eof) | Err(_) => return found,
            Ok(_) => {}
        }
        last_pos = after;
    }
}

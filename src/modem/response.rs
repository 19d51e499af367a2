//! Response tokenizer.
//!
//! Each line coming off the wire is classified by its prefix into a
//! [`Response`]; every tag owns the rule that pulls its fields out of the
//! line. The extraction pipeline only ever matches on the tag, so each
//! format can be tested on its own.
//!
//! | Prefix | Tag | Fields |
//! |---|---|---|
//! | `+CMT:` | [`Response::Delivered`] | sender |
//! | `+CMTI:` | [`Response::Stored`] | memory, index |
//! | `+CMGR:` | [`Response::Fetched`] | sender |
//! | `+CMGL:` | [`Response::Listed`] | index, status, sender |
//! | contains `+CMGS:` | [`Response::SendAck`] | |
//! | `OK` | [`Response::Ok`] | |
//! | contains `ERROR` | [`Response::Error`] | |
//! | `>` | [`Response::Prompt`] | |

use super::dedup::InboundMessage;

/// Sender placeholder when a header carries no recoverable sender.
pub const UNKNOWN_SENDER: &str = "unknown";

/// A storage slot announced by `+CMTI: "<mem>",<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    pub memory: String,
    pub index: u32,
}

/// Header fields of one `+CMGL:` listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingHeader {
    pub index: Option<u32>,
    pub status: Option<String>,
    pub sender: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Inline delivered message header; the body is the next line.
    Delivered { sender: String },
    /// Stored-message indication. `None` when the slot could not be parsed.
    Stored(Option<StorageSlot>),
    /// `AT+CMGR` result header; the body is the next line.
    Fetched { sender: String },
    /// `AT+CMGL` entry header; the body is the next line.
    Listed(ListingHeader),
    SendAck,
    Ok,
    Error,
    Prompt,
    Other,
}

impl Response {
    pub fn classify(line: &str) -> Response {
        if let Some(rest) = line.strip_prefix("+CMTI:") {
            return Response::Stored(parse_slot(rest));
        }
        if let Some(rest) = line.strip_prefix("+CMT:") {
            return Response::Delivered {
                sender: parse_delivered_sender(rest),
            };
        }
        if line.starts_with("+CMGR:") {
            return Response::Fetched {
                sender: second_quoted_or_unknown(line),
            };
        }
        if let Some(rest) = line.strip_prefix("+CMGL:") {
            return Response::Listed(parse_listing(line, rest));
        }
        if line.contains("+CMGS:") {
            return Response::SendAck;
        }
        if line.to_ascii_uppercase().starts_with("OK") {
            return Response::Ok;
        }
        if line.contains("ERROR") {
            return Response::Error;
        }
        if line.starts_with('>') {
            return Response::Prompt;
        }
        Response::Other
    }

    /// Whether this line ends a send exchange.
    pub fn completes_send(&self) -> bool {
        matches!(self, Response::Ok | Response::SendAck | Response::Error)
    }
}

/// Contents of every `"..."` field on the line, in order.
fn quoted_fields(line: &str) -> Vec<&str> {
    line.split('"').skip(1).step_by(2).collect()
}

fn second_quoted_or_unknown(line: &str) -> String {
    quoted_fields(line)
        .get(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
}

/// `+CMT: "<sender>",...`: a leading phone number, quoted or not, wins;
/// an alphanumeric quoted sender is kept as is.
fn parse_delivered_sender(rest: &str) -> String {
    let body = rest.strip_prefix(' ').unwrap_or(rest);
    let body = body.strip_prefix('"').unwrap_or(body);
    let number: String = body
        .chars()
        .take_while(|c| *c == '+' || c.is_ascii_digit())
        .collect();
    if !number.is_empty() {
        return number;
    }
    match quoted_fields(rest).first() {
        Some(first) if !first.is_empty() => first.to_string(),
        Some(_) => String::new(),
        None => UNKNOWN_SENDER.to_string(),
    }
}

/// ` "<mem>",<index>`
fn parse_slot(rest: &str) -> Option<StorageSlot> {
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('"')?;
    let (memory, after) = rest.split_once('"')?;
    if memory.is_empty() || !memory.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let digits: String = after
        .strip_prefix(',')?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let index = digits.parse().ok()?;
    Some(StorageSlot {
        memory: memory.to_string(),
        index,
    })
}

/// Structured ` <index>,"<status>","<sender>"` match first, then the
/// second quoted field anywhere on the line.
fn parse_listing(line: &str, rest: &str) -> ListingHeader {
    if let Some(header) = parse_listing_strict(rest) {
        return header;
    }
    ListingHeader {
        index: None,
        status: None,
        sender: second_quoted_or_unknown(line),
    }
}

fn parse_listing_strict(rest: &str) -> Option<ListingHeader> {
    let rest = rest.trim_start_matches(' ');
    let (index, rest) = rest.split_once(',')?;
    let index: u32 = index.parse().ok()?;
    let rest = rest.strip_prefix('"')?;
    let (status, rest) = rest.split_once('"')?;
    if status.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(",\"")?;
    let (sender, _) = rest.split_once('"')?;
    Some(ListingHeader {
        index: Some(index),
        status: Some(status.to_string()),
        sender: sender.to_string(),
    })
}

/// Walk a response in "header line + body line" pairs.
///
/// `header` maps a classified line to the sender when the line opens a
/// message; the line after it is the body (empty when missing).
pub fn parse_message_pairs<F>(lines: &[String], header: F) -> Vec<InboundMessage>
where
    F: Fn(&Response) -> Option<String>,
{
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        match header(&Response::classify(&lines[i])) {
            Some(sender) => {
                let content = lines.get(i + 1).cloned().unwrap_or_default();
                out.push(InboundMessage::new(sender, content));
                i += 2;
            }
            None => i += 1,
        }
    }
    out
}

/// Messages in an `AT+CMGR` response.
pub fn parse_fetch(lines: &[String]) -> Vec<InboundMessage> {
    parse_message_pairs(lines, |r| match r {
        Response::Fetched { sender } => Some(sender.clone()),
        _ => None,
    })
}

/// Messages in an `AT+CMGL` response.
pub fn parse_listing_response(lines: &[String]) -> Vec<InboundMessage> {
    parse_message_pairs(lines, |r| match r {
        Response::Listed(h) => Some(h.sender.clone()),
        _ => None,
    })
}

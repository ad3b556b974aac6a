//! JSON → note parsing (§4.2).
//!
//! The JSON tokenizer itself is treated as an external collaborator (§1) —
//! we lean on a minimal hand-rolled byte scanner here only because the
//! validation rules this parser must enforce (rejecting `\uXXXX`, an
//! explicit overflow-checked decimal scanner, and an id-seen callback fired
//! at the exact moment the top-level `id` field's value is read) are
//! in-scope, specified behavior that a general-purpose JSON library has no
//! hook for.

use std::ops::ControlFlow;

use crate::builder::NoteBuilder;
use crate::{Error, Id32, Sig64};

/// A parsed-but-not-yet-packed event. [`ParsedEvent::into_builder`] feeds it
/// into a [`NoteBuilder`].
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub id: Id32,
    pub pubkey: Id32,
    pub sig: Sig64,
    pub kind: u32,
    pub created_at: u64,
    pub content: Vec<u8>,
    pub tags: Vec<Vec<Vec<u8>>>,
}

impl ParsedEvent {
    pub fn into_builder(self) -> Result<NoteBuilder, Error> {
        let mut b = NoteBuilder::new();
        b.set_id(self.id)
            .set_pubkey(self.pubkey)
            .set_sig(self.sig)
            .set_kind(self.kind)
            .set_created_at(self.created_at);
        b.set_content(&self.content)?;
        for tag in &self.tags {
            b.begin_tag();
            for elem in tag {
                b.push_tag_element(elem)?;
            }
        }
        Ok(b)
    }
}

/// Parse a single nostr event object. `on_id`, if supplied, is invoked with
/// the event's hex `id` as soon as that field is scanned; returning
/// [`ControlFlow::Break`] aborts the parse with [`Error::AlreadyHaveId`] so
/// the caller can drop the event before doing any further work (§4.2,
/// ingest-time dedup).
pub fn parse_event_json(
    json: &[u8],
    mut on_id: Option<&mut dyn FnMut(&str) -> ControlFlow<()>>,
) -> Result<ParsedEvent, Error> {
    let mut s = Scanner::new(json);

    let mut id: Option<Id32> = None;
    let mut pubkey: Option<Id32> = None;
    let mut sig: Option<Sig64> = None;
    let mut kind: Option<u32> = None;
    let mut created_at: Option<u64> = None;
    let mut content: Option<Vec<u8>> = None;
    let mut tags: Option<Vec<Vec<Vec<u8>>>> = None;

    s.skip_ws();
    s.expect(b'{')?;
    s.skip_ws();
    if s.peek() == Some(b'}') {
        s.advance();
    } else {
        loop {
            s.skip_ws();
            let key = s.parse_string()?;
            s.skip_ws();
            s.expect(b':')?;
            s.skip_ws();

            match key.as_slice() {
                b"id" => {
                    let hex_str = s.parse_string()?;
                    let hex_str = std::str::from_utf8(&hex_str).map_err(|_| Error::InvalidHex("id"))?;
                    if let Some(cb) = on_id.as_deref_mut() {
                        if cb(hex_str).is_break() {
                            return Err(Error::AlreadyHaveId);
                        }
                    }
                    id = Some(decode_hex_array::<32>(hex_str.as_bytes(), "id")?);
                }
                b"pubkey" => {
                    let hex_str = s.parse_string()?;
                    pubkey = Some(decode_hex_array::<32>(&hex_str, "pubkey")?);
                }
                b"sig" => {
                    let hex_str = s.parse_string()?;
                    sig = Some(decode_hex_array::<64>(&hex_str, "sig")?);
                }
                b"kind" => {
                    let n = s.parse_u64("kind")?;
                    kind = Some(u32::try_from(n).map_err(|_| Error::NumericOverflow("kind"))?);
                }
                b"created_at" => {
                    created_at = Some(s.parse_u64("created_at")?);
                }
                b"content" => {
                    content = Some(s.parse_string()?);
                }
                b"tags" => {
                    tags = Some(s.parse_tags()?);
                }
                _ => {
                    s.skip_value()?;
                }
            }

            s.skip_ws();
            match s.peek() {
                Some(b',') => {
                    s.advance();
                }
                Some(b'}') => {
                    s.advance();
                    break;
                }
                _ => return Err(Error::JsonMalformed("expected , or }")),
            }
        }
    }

    Ok(ParsedEvent {
        id: id.ok_or(Error::MissingField("id"))?,
        pubkey: pubkey.ok_or(Error::MissingField("pubkey"))?,
        sig: sig.ok_or(Error::MissingField("sig"))?,
        kind: kind.ok_or(Error::MissingField("kind"))?,
        created_at: created_at.ok_or(Error::MissingField("created_at"))?,
        content: content.ok_or(Error::MissingField("content"))?,
        tags: tags.ok_or(Error::MissingField("tags"))?,
    })
}

fn decode_hex_array<const N: usize>(hex_bytes: &[u8], field: &'static str) -> Result<[u8; N], Error> {
    if hex_bytes.len() != N * 2 {
        return Err(Error::InvalidHex(field));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(hex_bytes, &mut out).map_err(|_| Error::InvalidHex(field))?;
    Ok(out)
}

struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Scanner { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.advance();
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), Error> {
        if self.peek() == Some(b) {
            self.advance();
            Ok(())
        } else {
            Err(Error::JsonMalformed("unexpected byte"))
        }
    }

    /// Parse a JSON string, unescaping `\n \t \r \b \f \\ \/ \"`. `\uXXXX` is
    /// not supported (§4.2, §9 open question) and fails the parse.
    fn parse_string(&mut self) -> Result<Vec<u8>, Error> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.peek().ok_or(Error::JsonMalformed("unterminated string"))?;
            match b {
                b'"' => {
                    self.advance();
                    return Ok(out);
                }
                b'\\' => {
                    self.advance();
                    let esc = self.peek().ok_or(Error::JsonMalformed("dangling escape"))?;
                    self.advance();
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'"' => out.push(b'"'),
                        b'u' => return Err(Error::UnicodeEscapeUnsupported),
                        _ => return Err(Error::JsonMalformed("unknown escape")),
                    }
                }
                _ => {
                    out.push(b);
                    self.advance();
                }
            }
        }
    }

    /// An explicit decimal scanner: digits only, overflow-checked.
    fn parse_u64(&mut self, field: &'static str) -> Result<u64, Error> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut any = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                any = true;
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add((b - b'0') as u64))
                    .ok_or(Error::NumericOverflow(field))?;
                self.advance();
            } else {
                break;
            }
        }
        if !any {
            self.pos = start;
            return Err(Error::WrongShape(field));
        }
        Ok(value)
    }

    fn parse_tags(&mut self) -> Result<Vec<Vec<Vec<u8>>>, Error> {
        self.skip_ws();
        self.expect(b'[')?;
        let mut tags = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.advance();
            return Ok(tags);
        }
        loop {
            self.skip_ws();
            self.expect(b'[')?;
            let mut tag = Vec::new();
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.advance();
            } else {
                loop {
                    self.skip_ws();
                    tag.push(self.parse_string()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(b',') => self.advance(),
                        Some(b']') => {
                            self.advance();
                            break;
                        }
                        _ => return Err(Error::InvalidTags),
                    }
                }
            }
            tags.push(tag);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.advance(),
                Some(b']') => {
                    self.advance();
                    break;
                }
                _ => return Err(Error::InvalidTags),
            }
        }
        Ok(tags)
    }

    /// Skip over a generic JSON value (used for fields we do not care
    /// about). Does not validate as strictly as the typed parsers above.
    fn skip_value(&mut self) -> Result<(), Error> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => {
                self.parse_string()?;
                Ok(())
            }
            Some(b'{') => {
                self.advance();
                self.skip_ws();
                if self.peek() == Some(b'}') {
                    self.advance();
                    return Ok(());
                }
                loop {
                    self.skip_ws();
                    self.parse_string()?;
                    self.skip_ws();
                    self.expect(b':')?;
                    self.skip_value()?;
                    self.skip_ws();
                    match self.peek() {
                        Some(b',') => self.advance(),
                        Some(b'}') => {
                            self.advance();
                            break;
                        }
                        _ => return Err(Error::JsonMalformed("object")),
                    }
                }
                Ok(())
            }
            Some(b'[') => {
                self.advance();
                self.skip_ws();
                if self.peek() == Some(b']') {
                    self.advance();
                    return Ok(());
                }
                loop {
                    self.skip_value()?;
                    self.skip_ws();
                    match self.peek() {
                        Some(b',') => self.advance(),
                        Some(b']') => {
                            self.advance();
                            break;
                        }
                        _ => return Err(Error::JsonMalformed("array")),
                    }
                }
                Ok(())
            }
            Some(b't') => self.expect_literal(b"true"),
            Some(b'f') => self.expect_literal(b"false"),
            Some(b'n') => self.expect_literal(b"null"),
            Some(b'-') | Some(b'0'..=b'9') => {
                if self.peek() == Some(b'-') {
                    self.advance();
                }
                while matches!(self.peek(), Some(b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')) {
                    self.advance();
                }
                Ok(())
            }
            _ => Err(Error::JsonMalformed("value")),
        }
    }

    fn expect_literal(&mut self, lit: &'static [u8]) -> Result<(), Error> {
        if self.buf[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(Error::JsonMalformed("literal"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let id = hex::encode([1u8; 32]);
        let pubkey = hex::encode([2u8; 32]);
        let sig = hex::encode([3u8; 64]);
        format!(
            r#"{{"id":"{id}","pubkey":"{pubkey}","sig":"{sig}","kind":1,"created_at":100,"content":"hello","tags":[["p","{id}"],["word","words","w"]]}}"#
        )
        .into_bytes()
    }

    #[test]
    fn parses_a_well_formed_event() {
        let parsed = parse_event_json(&sample(), None).unwrap();
        assert_eq!(parsed.id, [1u8; 32]);
        assert_eq!(parsed.kind, 1);
        assert_eq!(parsed.created_at, 100);
        assert_eq!(parsed.content, b"hello");
        assert_eq!(parsed.tags.len(), 2);
        assert_eq!(parsed.tags[1], vec![b"word".to_vec(), b"words".to_vec(), b"w".to_vec()]);
    }

    #[test]
    fn missing_field_fails() {
        let json = br#"{"id":"aa"}"#;
        assert!(matches!(
            parse_event_json(json, None),
            Err(Error::MissingField(_)) | Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn unicode_escape_fails() {
        let json = "{\"content\":\"\\u0041\",\"id\":\"00\",\"pubkey\":\"00\",\"sig\":\"00\",\"kind\":1,\"created_at\":1,\"tags\":[]}";
        assert_eq!(parse_event_json(json.as_bytes(), None), Err(Error::UnicodeEscapeUnsupported));
    }

    #[test]
    fn overflowing_number_fails() {
        let json = br#"{"id":"00","pubkey":"00","sig":"00","kind":1,"created_at":99999999999999999999999999999,"content":"x","tags":[]}"#;
        assert_eq!(
            parse_event_json(json, None),
            Err(Error::NumericOverflow("created_at"))
        );
    }

    #[test]
    fn id_seen_callback_can_stop_early() {
        let data = sample();
        let mut seen_hex = String::new();
        let mut cb = |hex: &str| -> ControlFlow<()> {
            seen_hex = hex.to_string();
            ControlFlow::Break(())
        };
        let result = parse_event_json(&data, Some(&mut cb));
        assert_eq!(result, Err(Error::AlreadyHaveId));
        assert_eq!(seen_hex, hex::encode([1u8; 32]));
    }
}

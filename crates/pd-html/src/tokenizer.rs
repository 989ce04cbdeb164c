//! Byte-oriented HTML tokenizer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Doctype(String),
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    Comment(String),
}

/// How text following a start tag must be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextMode {
    /// Verbatim until the matching end tag (`script`, `style`, ...).
    RawText,
    /// Until the matching end tag, with character references decoded.
    EscapableRawText,
    /// Verbatim until end of input.
    Plaintext,
}

pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    text_mode: Option<(TextMode, String)>,
}

impl<'a> Tokenizer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            text_mode: None,
        }
    }

    /// Switches the tokenizer after the tree builder inserted a text-mode element.
    pub(crate) fn enter_text_mode(&mut self, mode: TextMode, tag_name: &str) {
        self.text_mode = Some((mode, tag_name.to_owned()));
    }

    pub(crate) fn next_token(&mut self) -> Option<Token> {
        if let Some((mode, tag_name)) = self.text_mode.take() {
            if let Some(token) = self.read_text_mode(mode, &tag_name) {
                return Some(token);
            }
        }

        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            let idx = self.pos;
            if bytes[idx] != b'<' {
                let next = find_byte(bytes, idx, b'<').unwrap_or(bytes.len());
                self.pos = next;
                return Some(Token::Text(decode_entities(&self.input[idx..next])));
            }

            if starts_with(bytes, idx, b"<!--") {
                let (data, next) = read_comment(self.input, idx);
                self.pos = next;
                return Some(Token::Comment(data));
            }

            if starts_with(bytes, idx, b"<!") {
                if starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), b"doctype") {
                    let end = find_byte(bytes, idx, b'>').unwrap_or(bytes.len());
                    let name = self.input[idx.saturating_add(9).min(end)..end]
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_ascii_lowercase();
                    self.pos = end.saturating_add(1).min(bytes.len());
                    return Some(Token::Doctype(name));
                }

                let (data, next) = read_bogus_comment(self.input, idx.saturating_add(2));
                self.pos = next;
                return Some(Token::Comment(data));
            }

            if starts_with(bytes, idx, b"<?") {
                let (data, next) = read_bogus_comment(self.input, idx.saturating_add(1));
                self.pos = next;
                return Some(Token::Comment(data));
            }

            if starts_with(bytes, idx, b"</") {
                match bytes.get(idx.saturating_add(2)).copied() {
                    Some(byte) if byte.is_ascii_alphabetic() => {
                        let Some((name, next)) = parse_end_tag(bytes, idx) else {
                            self.pos = bytes.len();
                            return None;
                        };
                        self.pos = next;
                        return Some(Token::EndTag { name });
                    }
                    Some(b'>') => {
                        self.pos = idx.saturating_add(3);
                        continue;
                    }
                    Some(_) => {
                        let (data, next) = read_bogus_comment(self.input, idx.saturating_add(2));
                        self.pos = next;
                        return Some(Token::Comment(data));
                    }
                    None => {
                        self.pos = bytes.len();
                        return Some(Token::Text("</".to_owned()));
                    }
                }
            }

            if bytes
                .get(idx.saturating_add(1))
                .is_some_and(|byte| byte.is_ascii_alphabetic())
            {
                let Some((token, next)) = parse_start_tag(self.input, idx) else {
                    // EOF inside a tag drops the tag.
                    self.pos = bytes.len();
                    return None;
                };
                self.pos = next;
                return Some(token);
            }

            self.pos = idx.saturating_add(1);
            let next = find_byte(bytes, self.pos, b'<').unwrap_or(bytes.len());
            let mut text = String::from("<");
            text.push_str(&decode_entities(&self.input[self.pos..next]));
            self.pos = next;
            return Some(Token::Text(text));
        }

        None
    }

    fn read_text_mode(&mut self, mode: TextMode, tag_name: &str) -> Option<Token> {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let end = match mode {
            TextMode::Plaintext => bytes.len(),
            TextMode::RawText | TextMode::EscapableRawText => {
                find_end_tag(bytes, start, tag_name.as_bytes()).unwrap_or(bytes.len())
            }
        };
        self.pos = end;

        if end == start {
            return None;
        }

        let raw = &self.input[start..end];
        let text = match mode {
            TextMode::EscapableRawText => decode_entities(raw),
            TextMode::RawText | TextMode::Plaintext => raw.to_owned(),
        };
        Some(Token::Text(text))
    }
}

fn read_comment(input: &str, start: usize) -> (String, usize) {
    let bytes = input.as_bytes();
    let data_start = start.saturating_add(4);

    // `<!-->` and `<!--->` close immediately with empty data.
    if starts_with(bytes, data_start, b">") {
        return (String::new(), data_start.saturating_add(1));
    }
    if starts_with(bytes, data_start, b"->") {
        return (String::new(), data_start.saturating_add(2));
    }

    let mut idx = data_start;
    while idx < bytes.len() {
        if starts_with(bytes, idx, b"-->") {
            return (input[data_start..idx].to_owned(), idx.saturating_add(3));
        }
        if starts_with(bytes, idx, b"--!>") {
            return (input[data_start..idx].to_owned(), idx.saturating_add(4));
        }
        idx = idx.saturating_add(1);
    }

    (input[data_start.min(bytes.len())..].to_owned(), bytes.len())
}

fn read_bogus_comment(input: &str, data_start: usize) -> (String, usize) {
    let bytes = input.as_bytes();
    let data_start = data_start.min(bytes.len());
    match find_byte(bytes, data_start, b'>') {
        Some(end) => (input[data_start..end].to_owned(), end.saturating_add(1)),
        None => (input[data_start..].to_owned(), bytes.len()),
    }
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let name_start = start.saturating_add(2);
    let mut idx = name_start;
    while idx < bytes.len() && !is_tag_name_terminator(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    let name = String::from_utf8_lossy(&bytes[name_start..idx]).to_ascii_lowercase();
    let end = skip_to_tag_end(bytes, idx)?;
    Some((name, end))
}

fn parse_start_tag(input: &str, start: usize) -> Option<(Token, usize)> {
    let bytes = input.as_bytes();
    let name_start = start.saturating_add(1);
    let mut idx = name_start;
    while idx < bytes.len() && !is_tag_name_terminator(bytes[idx]) {
        idx = idx.saturating_add(1);
    }

    let name = input[name_start..idx].to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        idx = skip_spaces(bytes, idx);
        let byte = *bytes.get(idx)?;

        if byte == b'>' {
            idx = idx.saturating_add(1);
            break;
        }

        if byte == b'/' {
            idx = idx.saturating_add(1);
            if bytes.get(idx).copied() == Some(b'>') {
                self_closing = true;
                idx = idx.saturating_add(1);
                break;
            }
            continue;
        }

        // An `=` at the start of a name belongs to the name.
        let attr_start = idx;
        idx = idx.saturating_add(1);
        while idx < bytes.len() && !is_attr_name_terminator(bytes[idx]) {
            idx = idx.saturating_add(1);
        }
        let attr_name = input[attr_start..idx].to_ascii_lowercase();

        idx = skip_spaces(bytes, idx);
        let mut value = String::new();
        if bytes.get(idx).copied() == Some(b'=') {
            idx = skip_spaces(bytes, idx.saturating_add(1));
            match bytes.get(idx).copied() {
                Some(quote @ (b'"' | b'\'')) => {
                    let value_start = idx.saturating_add(1);
                    let value_end = find_byte(bytes, value_start, quote)?;
                    value = decode_entities(&input[value_start..value_end]);
                    idx = value_end.saturating_add(1);
                }
                Some(_) => {
                    let value_start = idx;
                    while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() && bytes[idx] != b'>'
                    {
                        idx = idx.saturating_add(1);
                    }
                    value = decode_entities(&input[value_start..idx]);
                }
                None => return None,
            }
        }

        if !attrs.iter().any(|(existing, _)| *existing == attr_name) {
            attrs.push((attr_name, value));
        }
    }

    Some((
        Token::StartTag {
            name,
            attrs,
            self_closing,
        },
        idx,
    ))
}

/// Position of `</tag_name` (followed by a name boundary) at or after `from`.
fn find_end_tag(bytes: &[u8], from: usize, tag_name: &[u8]) -> Option<usize> {
    let mut idx = from;
    while idx < bytes.len() {
        if bytes[idx] == b'<'
            && bytes.get(idx.saturating_add(1)).copied() == Some(b'/')
            && starts_with_ignore_ascii_case(bytes, idx.saturating_add(2), tag_name)
            && tag_name_boundary(bytes, idx.saturating_add(2 + tag_name.len()))
        {
            return Some(idx);
        }
        idx = idx.saturating_add(1);
    }
    None
}

/// Skips attribute garbage in an end tag, honoring quotes.
fn skip_to_tag_end(bytes: &[u8], mut idx: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(idx.saturating_add(1)),
            None => {}
        }
        idx = idx.saturating_add(1);
    }
    None
}

pub(crate) fn decode_entities(input: &str) -> String {
    let Some((head, mut rest)) = input.split_once('&') else {
        return input.to_owned();
    };
    let mut out = String::with_capacity(input.len());
    out.push_str(head);

    loop {
        // `rest` starts right after an ampersand.
        let reference = rest
            .split_once(';')
            .and_then(|(entity, tail)| decode_entity(entity).map(|ch| (ch, tail)));
        match reference {
            Some((ch, tail)) => {
                out.push(ch);
                rest = tail;
            }
            None => out.push('&'),
        }

        match rest.split_once('&') {
            Some((text, tail)) => {
                out.push_str(text);
                rest = tail;
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => number.parse::<u32>().ok(),
        };
        return numeric_reference(code);
    }

    let ch = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        "yen" => '\u{a5}',
        "cent" => '\u{a2}',
        "sect" => '\u{a7}',
        "deg" => '\u{b0}',
        "plusmn" => '\u{b1}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "para" => '\u{b6}',
        "shy" => '\u{ad}',
        "zwj" => '\u{200d}',
        "zwnj" => '\u{200c}',
        _ => return None,
    };
    Some(ch)
}

fn numeric_reference(value: Option<u32>) -> Option<char> {
    let value = value?;
    if value == 0 {
        return Some('\u{fffd}');
    }
    Some(char::from_u32(value).unwrap_or('\u{fffd}'))
}

fn is_tag_name_terminator(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == b'/' || byte == b'>'
}

fn is_attr_name_terminator(byte: u8) -> bool {
    byte.is_ascii_whitespace() || matches!(byte, b'/' | b'>' | b'=')
}

fn tag_name_boundary(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx).copied() {
        None => true,
        Some(byte) => byte.is_ascii_whitespace() || byte == b'>' || byte == b'/',
    }
}

fn skip_spaces(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx = idx.saturating_add(1);
    }
    idx
}

fn starts_with(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    end <= bytes.len() && bytes[idx..end] == *pattern
}

fn starts_with_ignore_ascii_case(bytes: &[u8], idx: usize, pattern: &[u8]) -> bool {
    let end = idx.saturating_add(pattern.len());
    if end > bytes.len() {
        return false;
    }

    bytes[idx..end]
        .iter()
        .zip(pattern.iter())
        .all(|(left, right)| left.eq_ignore_ascii_case(right))
}

fn find_byte(bytes: &[u8], from: usize, byte: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|candidate| *candidate == byte)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::TextMode;
    use super::Token;
    use super::Tokenizer;
    use super::decode_entities;

    fn tokens(input: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::new(input);
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next_token() {
            out.push(token);
        }
        out
    }

    #[test]
    fn reads_attributes_in_all_quoting_styles() {
        let out = tokens("<form ACTION=/post method='get' novalidate data-x=\"a&amp;b\">");
        assert_eq!(
            out,
            vec![Token::StartTag {
                name: "form".to_owned(),
                attrs: vec![
                    ("action".to_owned(), "/post".to_owned()),
                    ("method".to_owned(), "get".to_owned()),
                    ("novalidate".to_owned(), String::new()),
                    ("data-x".to_owned(), "a&b".to_owned()),
                ],
                self_closing: false,
            }]
        );
    }

    #[test]
    fn keeps_first_duplicate_attribute() {
        let out = tokens("<a href=one href=two>");
        let Some(Token::StartTag { attrs, .. }) = out.first() else {
            panic!("expected a start tag");
        };
        assert_eq!(attrs, &vec![("href".to_owned(), "one".to_owned())]);
    }

    #[test]
    fn abrupt_empty_comment_closes_immediately() {
        assert_eq!(tokens("<!-->x"), vec![
            Token::Comment(String::new()),
            Token::Text("x".to_owned())
        ]);
    }

    #[test]
    fn processing_instructions_become_bogus_comments() {
        assert_eq!(tokens("<?xml version=\"1.0\"?>"), vec![Token::Comment(
            "?xml version=\"1.0\"?".to_owned()
        )]);
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        assert_eq!(tokens("1 < 2"), vec![
            Token::Text("1 ".to_owned()),
            Token::Text("< 2".to_owned())
        ]);
    }

    #[test]
    fn eof_inside_tag_drops_the_tag() {
        assert_eq!(tokens("hi<a href=\"x"), vec![Token::Text("hi".to_owned())]);
    }

    #[test]
    fn raw_text_runs_until_matching_end_tag() {
        let mut tokenizer = Tokenizer::new("<script>if (a<b) {}</SCRIPT >");
        assert!(matches!(tokenizer.next_token(), Some(Token::StartTag { .. })));
        tokenizer.enter_text_mode(TextMode::RawText, "script");
        assert_eq!(
            tokenizer.next_token(),
            Some(Token::Text("if (a<b) {}".to_owned()))
        );
        assert_eq!(
            tokenizer.next_token(),
            Some(Token::EndTag {
                name: "script".to_owned()
            })
        );
    }

    #[test]
    fn decodes_named_and_numeric_references() {
        assert_eq!(decode_entities("&lt;&#x41;&#66;&nbsp;&bogus;"), "<AB\u{a0}&bogus;");
        assert_eq!(decode_entities("&#0;"), "\u{fffd}");
    }
}

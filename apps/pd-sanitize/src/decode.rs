use encoding_rs::Encoding;
use tracing::debug;
use tracing::warn;

/// Bytes scanned for a `charset=` declaration.
const SNIFF_LIMIT: usize = 8 * 1024;

/// Decodes input bytes. A byte order mark wins, then an explicit encoding,
/// then a charset declared near the top of the markup, then lossy UTF-8.
pub(crate) fn decode_markup(bytes: &[u8], explicit: Option<&'static Encoding>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or(explicit)
        .or_else(|| {
            sniff_charset(bytes).and_then(|label| Encoding::for_label(label.as_bytes()))
        });

    let Some(encoding) = encoding else {
        return String::from_utf8_lossy(bytes).into_owned();
    };

    let (decoded, used, had_errors) = encoding.decode(bytes);
    debug!(encoding = used.name(), bytes = bytes.len(), "decoded input");
    if had_errors {
        warn!(encoding = used.name(), "input contained malformed sequences");
    }
    decoded.into_owned()
}

fn sniff_charset(bytes: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_LIMIT)]);
    let lower = prefix.to_ascii_lowercase();
    let mut cursor = 0_usize;

    while let Some(found) = lower.get(cursor..).and_then(|rest| rest.find("charset=")) {
        let start = cursor.saturating_add(found).saturating_add("charset=".len());
        if let Some(label) = prefix.get(start..).and_then(charset_label) {
            return Some(label);
        }
        cursor = start;
    }

    None
}

fn charset_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    let label = match trimmed.chars().next()? {
        quote @ ('"' | '\'') => {
            let rest = trimmed.get(1..)?;
            let end = rest.find(quote)?;
            rest.get(..end)?.trim()
        }
        _ => {
            let end = trimmed
                .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '>' | '/'))
                .unwrap_or(trimmed.len());
            trimmed.get(..end)?
        }
    };

    (!label.is_empty()).then(|| label.to_owned())
}

#[cfg(test)]
mod tests {
    use encoding_rs::WINDOWS_1252;

    use super::charset_label;
    use super::decode_markup;
    use super::sniff_charset;

    #[test]
    fn reads_quoted_and_bare_labels() {
        assert_eq!(charset_label("\"utf-8\">"), Some("utf-8".to_owned()));
        assert_eq!(charset_label(" 'koi8-r' "), Some("koi8-r".to_owned()));
        assert_eq!(charset_label("iso-8859-2;x"), Some("iso-8859-2".to_owned()));
        assert_eq!(charset_label("\"\""), None);
        assert_eq!(charset_label("\"open"), None);
        assert_eq!(charset_label(""), None);
    }

    #[test]
    fn sniffs_meta_declarations() {
        let markup = b"<html><head><meta http-equiv=content-type content=\"text/html; Charset=Shift_JIS\">";
        assert_eq!(sniff_charset(markup), Some("Shift_JIS".to_owned()));
        assert_eq!(sniff_charset(b"<meta charset= >"), None);
        assert_eq!(sniff_charset(b"<p>no declaration</p>"), None);
    }

    #[test]
    fn declared_charset_drives_decoding() {
        let bytes = b"<meta charset=windows-1252><p>caf\xe9</p>";
        assert_eq!(decode_markup(bytes, None), "<meta charset=windows-1252><p>caf\u{e9}</p>");
    }

    #[test]
    fn explicit_charset_beats_declaration() {
        let bytes = b"<meta charset=utf-8>\xe9";
        assert_eq!(decode_markup(bytes, Some(WINDOWS_1252)), "<meta charset=utf-8>\u{e9}");
    }

    #[test]
    fn byte_order_mark_beats_every_label() {
        assert_eq!(decode_markup(b"\xef\xbb\xbf<p>ok</p>", None), "<p>ok</p>");

        let utf16: Vec<u8> = [0xff, 0xfe]
            .into_iter()
            .chain("<b>\u{e9}</b>".encode_utf16().flat_map(u16::to_le_bytes))
            .collect();
        assert_eq!(decode_markup(&utf16, None), "<b>\u{e9}</b>");
        assert_eq!(decode_markup(&utf16, Some(WINDOWS_1252)), "<b>\u{e9}</b>");
    }

    #[test]
    fn undeclared_input_is_lossy_utf8() {
        assert_eq!(decode_markup(b"ok \xff", None), "ok \u{fffd}");
        assert_eq!(decode_markup("d\u{e9}j\u{e0}".as_bytes(), None), "d\u{e9}j\u{e0}");
    }
}

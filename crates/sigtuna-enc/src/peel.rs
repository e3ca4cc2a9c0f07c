#![forbid(unsafe_code)]

//! Plaintext peeling.
//!
//! Some XML-Enc stacks leave stray bytes around the decrypted fragment
//! (padding residue, BOMs, stray whitespace). Rather than a regex, we scan
//! for the opening tag of the expected element and its matching closing tag
//! and return exactly that window; anything outside it is tolerated noise.

use sigtuna_core::Error;

/// Extract the `<[prefix:]name ...> ... </[prefix:]name>` window from
/// decrypted plaintext.
pub fn peel<'a>(plaintext: &'a [u8], local_name: &str) -> Result<&'a str, Error> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|e| Error::MalformedPlaintext(format!("not valid UTF-8: {e}")))?;

    let start = find_opening(text, local_name).ok_or_else(|| {
        Error::MalformedPlaintext(format!("no <{local_name}> element in plaintext"))
    })?;
    let end = find_closing_end(text, local_name).ok_or_else(|| {
        Error::MalformedPlaintext(format!("no closing </{local_name}> tag in plaintext"))
    })?;
    if end <= start {
        return Err(Error::MalformedPlaintext(format!(
            "closing </{local_name}> precedes the opening tag"
        )));
    }
    Ok(&text[start..end])
}

/// Byte offset of the first `<name` or `<prefix:name` opening tag.
fn find_opening(text: &str, local_name: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    while let Some(lt) = text[pos..].find('<').map(|i| i + pos) {
        let after = &text[lt + 1..];
        if let Some(tag) = read_tag_name(after) {
            if tag_matches(tag, local_name) {
                // Must be followed by whitespace, '>', or '/' so that
                // "NameIDPolicy" does not match "NameID".
                let rest = &after[tag.len()..];
                if rest
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/')
                {
                    return Some(lt);
                }
            }
        }
        pos = lt + 1;
        if pos >= bytes.len() {
            break;
        }
    }
    None
}

/// End offset (exclusive) of the last `</name>` or `</prefix:name>` closing
/// tag.
fn find_closing_end(text: &str, local_name: &str) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut pos = 0;
    while let Some(open) = text[pos..].find("</").map(|i| i + pos) {
        let after = &text[open + 2..];
        if let Some(gt) = after.find('>') {
            let tag = after[..gt].trim();
            if tag_matches(tag, local_name) {
                best = Some(open + 2 + gt + 1);
            }
        }
        pos = open + 2;
    }
    best
}

/// Read a tag name (up to whitespace, '>', or '/').
fn read_tag_name(s: &str) -> Option<&str> {
    let end = s.find(|c: char| c.is_whitespace() || c == '>' || c == '/')?;
    let name = &s[..end];
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// True when `tag` is `local_name` with an optional namespace prefix.
fn tag_matches(tag: &str, local_name: &str) -> bool {
    match tag.rsplit_once(':') {
        Some((_, local)) => local == local_name,
        None => tag == local_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peels_prefixed_element_with_noise() {
        let plaintext = b"\x00\x07<saml:Assertion ID=\"a\">x</saml:Assertion>\x05\x05";
        let out = peel(plaintext, "Assertion").unwrap();
        assert_eq!(out, "<saml:Assertion ID=\"a\">x</saml:Assertion>");
    }

    #[test]
    fn peels_unprefixed_element() {
        let out = peel(b"<NameID>user@example.com</NameID>", "NameID").unwrap();
        assert_eq!(out, "<NameID>user@example.com</NameID>");
    }

    #[test]
    fn similar_names_do_not_match() {
        // NameIDPolicy must not satisfy a NameID peel.
        let err = peel(b"<NameIDPolicy Format=\"x\"></NameIDPolicy>", "NameID").unwrap_err();
        assert!(matches!(err, Error::MalformedPlaintext(_)));
    }

    #[test]
    fn missing_closing_tag_is_malformed() {
        let err = peel(b"<Assertion>unterminated", "Assertion").unwrap_err();
        assert!(matches!(err, Error::MalformedPlaintext(_)));
    }

    #[test]
    fn takes_last_closing_tag() {
        let plaintext = b"<Attribute><AttributeValue/></Attribute><Attribute>b</Attribute>";
        let out = peel(plaintext, "Attribute").unwrap();
        assert_eq!(out.len(), plaintext.len());
    }
}

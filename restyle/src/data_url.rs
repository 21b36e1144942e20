//! `data:` URLs, the in-memory representation handed to the transform service

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine as _;

const PREFIX: &str = "data:";
const DEFAULT_MIME: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

pub fn encode(mime_type: &str, data: &[u8]) -> String {
    let payload = Base64.encode(data);
    let mut url = String::with_capacity(PREFIX.len() + mime_type.len() + 8 + payload.len());
    url.push_str(PREFIX);
    url.push_str(mime_type);
    url.push_str(";base64,");
    url.push_str(&payload);
    url
}

pub fn is_data_url(s: &str) -> bool {
    s.get(..PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(PREFIX))
}

/// Parse `data:[<mime>][;param...][;base64],<payload>`
pub fn parse(s: &str) -> Result<DataUrl> {
    if !is_data_url(s) {
        anyhow::bail!("Not a data URL");
    }

    let (header, payload) = s[PREFIX.len()..]
        .split_once(',')
        .context("Data URL is missing the ',' separator")?;

    let mut params = header.split(';');
    let mime_type = match params.next() {
        Some(mime) if !mime.is_empty() => mime.to_ascii_lowercase(),
        _ => DEFAULT_MIME.to_string(),
    };
    let is_base64 = params.any(|param| param.eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        Base64
            .decode(payload.trim())
            .context("Data URL payload is not valid base64")?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok(DataUrl { mime_type, data })
}

/// The first `len` characters of a URL, for log lines
pub fn preview(url: &str, len: usize) -> &str {
    match url.char_indices().nth(len) {
        Some((idx, _)) => &url[..idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse() {
        let url = encode("image/jpeg", &[0xff, 0xd8, 0xff, 0x00]);
        assert_eq!(url, "data:image/jpeg;base64,/9j/AA==");

        let parsed = parse(&url).unwrap();
        assert_eq!(parsed.mime_type, "image/jpeg");
        assert_eq!(parsed.data, vec![0xff, 0xd8, 0xff, 0x00]);
    }

    #[test]
    fn parse_defaults_and_plain_payloads() {
        let parsed = parse("data:,hello").unwrap();
        assert_eq!(parsed.mime_type, "text/plain");
        assert_eq!(parsed.data, b"hello");

        let parsed = parse("DATA:Image/PNG;charset=x;BASE64,aGk=").unwrap();
        assert_eq!(parsed.mime_type, "image/png");
        assert_eq!(parsed.data, b"hi");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse("https://example.com/a.png").is_err());
        assert!(parse("data:image/png;base64").is_err());
        assert!(parse("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("data:image/png;base64,AAAA", 10), "data:image");
        assert_eq!(preview("short", 100), "short");
        assert_eq!(preview("ééé", 2), "éé");
    }
}

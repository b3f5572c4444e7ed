//! NDEF file images and SUN templates
//!
//! A file image is `NLEN (2, big-endian)` followed by a single short well-known
//! record. The whole image is capped at the size of the NDEF file.

use bytes::{BufMut, Bytes, BytesMut};
use url::Url;

/// Maximum NDEF file image size
pub const MAX_FILE_SIZE: usize = 256;

/// Bytes preceding the URI in a URL file image
pub const URL_HEADER_LEN: usize = 7;

/// Bytes preceding the text in a text file image
pub const TEXT_HEADER_LEN: usize = 9;

/// MB | ME | SR | TNF well-known
const RECORD_FLAGS: u8 = 0xD1;
const RECORD_TYPE_TEXT: u8 = b'T';
const RECORD_TYPE_URI: u8 = b'U';

/// URI identifier code: no abbreviation
const URI_PREFIX_NONE: u8 = 0x00;
/// UTF-8, two-byte language code, "en"
const TEXT_PREFIX: [u8; 3] = [0x02, b'e', b'n'];

const PICC_DATA_PARAM: &str = "picc_data";
const CMAC_PARAM: &str = "cmac";
const PICC_DATA_PLACEHOLDER: &str = "00000000000000000000000000000000";
const CMAC_PLACEHOLDER: &str = "0000000000000000";

fn record_file(record_type: u8, prefix: &[u8], content: &[u8]) -> Bytes {
    let header_len = 2 + 4 + prefix.len();
    let content = &content[..content.len().min(MAX_FILE_SIZE - header_len)];
    let payload_len = prefix.len() + content.len();

    let mut buf = BytesMut::with_capacity(header_len + content.len());
    buf.put_u16((4 + payload_len) as u16);
    buf.put_u8(RECORD_FLAGS);
    buf.put_u8(1);
    buf.put_u8(payload_len as u8);
    buf.put_u8(record_type);
    buf.put_slice(prefix);
    buf.put_slice(content);
    buf.freeze()
}

/// File image holding a single URI record
pub fn url_file(url: &str) -> Bytes {
    record_file(RECORD_TYPE_URI, &[URI_PREFIX_NONE], url.as_bytes())
}

/// File image holding a single text record (UTF-8, "en")
pub fn text_file(text: &str) -> Bytes {
    record_file(RECORD_TYPE_TEXT, &TEXT_PREFIX, text.as_bytes())
}

/// Extract the URI from a file image produced by [`url_file`]
pub fn parse_url_file(data: &[u8]) -> Option<String> {
    let nlen = u16::from_be_bytes([*data.first()?, *data.get(1)?]) as usize;
    let message = data.get(2..2 + nlen)?;

    let [flags, 1, payload_len, RECORD_TYPE_URI, rest @ ..] = message else {
        return None;
    };
    if *flags != RECORD_FLAGS {
        return None;
    }

    let payload = rest.get(..*payload_len as usize)?;
    let (&URI_PREFIX_NONE, uri) = payload.split_first()? else {
        return None;
    };
    String::from_utf8(uri.to_vec()).ok()
}

/// Errors building a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The base URL does not parse
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The filled template does not fit in the NDEF file
    #[error("Template is {0} bytes, larger than the NDEF file")]
    TooLong(usize),
}

/// Content of a SUN-enabled NDEF file with the positions the card overwrites
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdefTemplate {
    /// URI record ending in `picc_data=<32 hex>&cmac=<16 hex>`
    Url {
        /// Full URL including the zeroed placeholders
        url: String,
        /// File offset of the PICC data placeholder
        picc_data_offset: u32,
        /// File offset of the CMAC placeholder
        cmac_offset: u32,
    },
    /// Text record `<base>?picc_data=<32 hex>&cmac=<16 hex>`
    Text {
        /// Full text including the zeroed placeholders
        text: String,
        /// File offset of the PICC data placeholder
        picc_data_offset: u32,
        /// File offset of the CMAC placeholder
        cmac_offset: u32,
    },
}

/// Byte offset just past the last occurrence of `needle`
fn end_of_last(haystack: &str, needle: &str) -> Option<usize> {
    haystack.rfind(needle).map(|start| start + needle.len())
}

impl NdefTemplate {
    /// Build from a base URL
    ///
    /// Any existing `picc_data` or `cmac` query parameters (case-insensitive) are
    /// dropped and zeroed placeholders appended.
    pub fn from_url(base: &str) -> Result<Self, TemplateError> {
        let mut url = Url::parse(base)?;

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case(PICC_DATA_PARAM) && !name.eq_ignore_ascii_case(CMAC_PARAM)
            })
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(PICC_DATA_PARAM, PICC_DATA_PLACEHOLDER)
            .append_pair(CMAC_PARAM, CMAC_PLACEHOLDER);

        let url = String::from(url);
        if URL_HEADER_LEN + url.len() > MAX_FILE_SIZE {
            return Err(TemplateError::TooLong(URL_HEADER_LEN + url.len()));
        }

        // Both parameters were just appended, so the searches cannot miss
        let picc = end_of_last(&url, "picc_data=").unwrap_or_default();
        let cmac = end_of_last(&url, "cmac=").unwrap_or_default();

        Ok(Self::Url {
            picc_data_offset: (picc + URL_HEADER_LEN) as u32,
            cmac_offset: (cmac + URL_HEADER_LEN) as u32,
            url,
        })
    }

    /// Build from arbitrary base text
    pub fn from_text(base: &str) -> Result<Self, TemplateError> {
        let text = format!("{base}?picc_data={PICC_DATA_PLACEHOLDER}&cmac={CMAC_PLACEHOLDER}");
        if TEXT_HEADER_LEN + text.len() > MAX_FILE_SIZE {
            return Err(TemplateError::TooLong(TEXT_HEADER_LEN + text.len()));
        }

        Ok(Self::Text {
            picc_data_offset: (base.len() + 11 + TEXT_HEADER_LEN) as u32,
            cmac_offset: (base.len() + 49 + TEXT_HEADER_LEN) as u32,
            text,
        })
    }

    /// File offset of the PICC data placeholder
    pub const fn picc_data_offset(&self) -> u32 {
        match self {
            Self::Url {
                picc_data_offset, ..
            }
            | Self::Text {
                picc_data_offset, ..
            } => *picc_data_offset,
        }
    }

    /// File offset of the CMAC placeholder
    pub const fn cmac_offset(&self) -> u32 {
        match self {
            Self::Url { cmac_offset, .. } | Self::Text { cmac_offset, .. } => *cmac_offset,
        }
    }

    /// The URL or text carried by the template
    pub fn value(&self) -> &str {
        match self {
            Self::Url { url, .. } => url,
            Self::Text { text, .. } => text,
        }
    }

    /// NDEF file image to write to the card
    pub fn file_data(&self) -> Bytes {
        match self {
            Self::Url { url, .. } => url_file(url),
            Self::Text { text, .. } => text_file(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_url_file_layout() {
        let file = url_file("https://a.b");
        assert_eq!(
            file.as_ref(),
            [
                &hex!("00 10 D1 01 0C 55 00")[..],
                b"https://a.b".as_slice()
            ]
            .concat()
        );
        assert_eq!(parse_url_file(&file).as_deref(), Some("https://a.b"));
    }

    #[test]
    fn test_text_file_layout() {
        let file = text_file("hi");
        assert_eq!(file.as_ref(), hex!("00 09 D1 01 05 54 02 65 6E 68 69"));
    }

    #[test]
    fn test_file_truncated_to_capacity() {
        let long = "x".repeat(400);
        let file = url_file(&long);
        assert_eq!(file.len(), MAX_FILE_SIZE);
        assert_eq!(&file[..2], &[0x00, 0xFE]);
        assert_eq!(file[4], 0xFA);

        assert_eq!(text_file(&long).len(), MAX_FILE_SIZE);
    }

    #[test]
    fn test_url_template_offsets() {
        let template = NdefTemplate::from_url("https://example.com/card?id=7").unwrap();
        let url = template.value();
        assert_eq!(
            url,
            "https://example.com/card?id=7&picc_data=00000000000000000000000000000000&cmac=0000000000000000"
        );

        let file = template.file_data();
        let picc = template.picc_data_offset() as usize;
        let cmac = template.cmac_offset() as usize;
        assert_eq!(&file[picc - 10..picc], b"picc_data=");
        assert_eq!(&file[picc..picc + 32], PICC_DATA_PLACEHOLDER.as_bytes());
        assert_eq!(&file[cmac - 5..cmac], b"cmac=");
        assert_eq!(&file[cmac..cmac + 16], CMAC_PLACEHOLDER.as_bytes());
        assert_eq!(cmac + 16, file.len());
    }

    #[test]
    fn test_url_template_replaces_existing_params() {
        let template =
            NdefTemplate::from_url("https://example.com/?PICC_DATA=ff&x=1&Cmac=aa").unwrap();
        assert_eq!(
            template.value(),
            "https://example.com/?x=1&picc_data=00000000000000000000000000000000&cmac=0000000000000000"
        );
    }

    #[test]
    fn test_text_template_offsets() {
        let template = NdefTemplate::from_text("lnurlw://pay.me/w").unwrap();
        let base_len = "lnurlw://pay.me/w".len() as u32;
        assert_eq!(template.picc_data_offset(), base_len + 11 + 9);
        assert_eq!(template.cmac_offset(), base_len + 49 + 9);

        let file = template.file_data();
        let cmac = template.cmac_offset() as usize;
        assert_eq!(&file[cmac - 5..cmac], b"cmac=");
    }

    #[test]
    fn test_template_too_long() {
        let base = format!("https://example.com/{}", "a".repeat(200));
        assert!(matches!(
            NdefTemplate::from_url(&base),
            Err(TemplateError::TooLong(_))
        ));
        assert!(NdefTemplate::from_url("not a url").is_err());
    }
}

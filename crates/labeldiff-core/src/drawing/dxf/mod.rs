//! ASCII DXF tag codec.
//!
//! A DXF file is a flat sequence of group-code/value line pairs. The reader
//! projects the parts the annotation engine needs into a
//! [`DrawingDocument`](crate::drawing::DrawingDocument)
//! and keeps the full tag list; the writer replays that list and patches the
//! spans of layers and entities in place, so everything else in the file is
//! written back untouched.

#[cfg(test)]
pub(crate) mod fixture;
mod reader;
mod writer;

pub use reader::read_dxf;
pub use writer::write_dxf;

use crate::error::DocumentError;

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// One group-code/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub code: i32,
    pub value: String,
}

impl Tag {
    pub fn new(code: i32, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    pub(crate) fn is(&self, code: i32, value: &str) -> bool {
        self.code == code && self.value.trim() == value
    }

    /// Extended data (application xdata) group codes.
    pub(crate) fn is_xdata(&self) -> bool {
        self.code >= 1000
    }
}

/// Character encoding detected on read and reused on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    /// Anything that is not valid UTF-8. Bytes map one-to-one onto chars so
    /// legacy code-page text survives a read/write cycle unchanged.
    Latin1,
}

impl TextEncoding {
    pub(crate) fn decode(bytes: &[u8]) -> (String, Self) {
        match std::str::from_utf8(bytes) {
            Ok(text) => match text.strip_prefix('\u{feff}') {
                Some(rest) => (rest.to_string(), TextEncoding::Utf8Bom),
                None => (text.to_string(), TextEncoding::Utf8),
            },
            Err(_) => (
                bytes.iter().map(|&b| char::from(b)).collect(),
                TextEncoding::Latin1,
            ),
        }
    }

    pub(crate) fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf8Bom => {
                let mut out = "\u{feff}".as_bytes().to_vec();
                out.extend_from_slice(text.as_bytes());
                out
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// The tag stream a document was read from.
#[derive(Debug, Clone)]
pub(crate) struct DxfSource {
    pub(crate) tags: Vec<Tag>,
    pub(crate) encoding: TextEncoding,
    pub(crate) line_ending: &'static str,
}

impl DxfSource {
    pub(crate) fn render(&self, tags: &[Tag]) -> Vec<u8> {
        let nl = self.line_ending;
        let mut text = String::with_capacity(tags.len() * 16);
        for tag in tags {
            text.push_str(&format!("{:>3}{nl}{}{nl}", tag.code, tag.value));
        }
        self.encoding.encode(&text)
    }
}

/// Line number of the group code line of tag `index`.
pub(crate) fn line_of(index: usize) -> usize {
    index * 2 + 1
}

/// Split DXF text into tags. Reading stops after the `EOF` marker.
pub(crate) fn parse_tags(text: &str) -> Result<Vec<Tag>, DocumentError> {
    let mut tags = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((n, code_line)) = lines.next() {
        let code_line = code_line.trim();
        if code_line.is_empty() && tags.is_empty() {
            continue;
        }
        let code = code_line.parse::<i32>().map_err(|_| {
            DocumentError::parse(n + 1, format!("invalid group code {code_line:?}"))
        })?;
        let Some((_, value)) = lines.next() else {
            return Err(DocumentError::parse(
                n + 1,
                format!("group code {code} has no value"),
            ));
        };
        let tag = Tag::new(code, value);
        let at_eof = tag.is(0, "EOF");
        tags.push(tag);
        if at_eof {
            break;
        }
    }

    if tags.is_empty() {
        return Err(DocumentError::parse(1, "document is empty"));
    }
    Ok(tags)
}

pub(crate) fn check_not_binary(bytes: &[u8]) -> Result<(), DocumentError> {
    if bytes.starts_with(BINARY_SENTINEL) {
        return Err(DocumentError::parse(1, "binary DXF is not supported"));
    }
    Ok(())
}

/// Index one past the end of the object starting at `start`.
pub(crate) fn span_end(tags: &[Tag], start: usize) -> usize {
    tags.iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, t)| t.code == 0)
        .map(|(i, _)| i)
        .unwrap_or(tags.len())
}

/// Render a real value the way DXF writers usually do (`2.5`, `3.0`).
pub(crate) fn format_real(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

//! Single-document PDF output
//!
//! Each page image is embedded as-is as a `DCTDecode` image XObject, so JPEG
//! payloads are never re-encoded. The page's MediaBox equals the image size in
//! pixels, one pixel per point.

use super::AssembleError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use serde_json::Value;
use std::io::{BufWriter, Write};

const PRODUCER: &str = concat!("bookfetch ", env!("CARGO_PKG_VERSION"));

/// Frame header of a baseline or progressive JPEG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    pub components: u8,
}

/// Read the dimensions out of the first SOF segment
///
/// Returns `None` for anything that is not a well-formed JPEG header.
pub fn jpeg_info(data: &[u8]) -> Option<JpegInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        pos += 2;

        match marker {
            // Fill bytes
            0xFF => {
                pos -= 1;
                continue;
            }
            // Standalone markers carry no length
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let length = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]) as usize;
        if length < 2 {
            return None;
        }

        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let segment = data.get(pos + 2..pos + length)?;
            if segment.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]);
            let width = u16::from_be_bytes([segment[3], segment[4]]);
            let components = segment[5];
            if width == 0 || height == 0 {
                return None;
            }
            return Some(JpegInfo {
                width,
                height,
                components,
            });
        }

        pos += length;
    }
    None
}

/// Document Info fields taken from the book
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: String,
    pub author: Option<String>,
    pub subject: Option<String>,
}

impl DocumentInfo {
    pub fn from_metadata(title: &str, metadata: &Value) -> Self {
        Self {
            title: first_text(metadata.get("title")).unwrap_or_else(|| title.to_string()),
            author: first_text(metadata.get("creator")),
            subject: first_text(metadata.get("subject")),
        }
    }
}

/// Library metadata fields are either a string or a list of strings
fn first_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => {
            let joined: Vec<&str> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if joined.is_empty() {
                None
            } else {
                Some(joined.join("; "))
            }
        }
        _ => None,
    }
}

/// Encode text as a PDF text string: literal when ASCII, UTF-16BE otherwise
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Builds one PDF out of page images in the order they are added
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append a JPEG as a new page
    pub fn add_jpeg(&mut self, jpeg: &[u8]) -> Result<(), AssembleError> {
        let info = jpeg_info(jpeg).ok_or(AssembleError::NotJpeg)?;
        let width = i64::from(info.width);
        let height = i64::from(info.height);

        let color_space = match info.components {
            1 => "DeviceGray",
            4 => "DeviceCMYK",
            _ => "DeviceRGB",
        };

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg.to_vec(),
        )
        .with_compression(false);
        let image_id = self.doc.add_object(image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Im0".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Finish the page tree and Info dictionary, then write the document
    pub fn write_to<W: Write>(mut self, info: &DocumentInfo, target: W) -> Result<(), AssembleError> {
        if self.kids.is_empty() {
            return Err(AssembleError::NoPages);
        }

        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, pages.into());

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let date = chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string();
        let mut info_dict = Dictionary::new();
        info_dict.set("Title", text_string(&info.title));
        if let Some(author) = &info.author {
            info_dict.set("Author", text_string(author));
        }
        if let Some(subject) = &info.subject {
            info_dict.set("Subject", text_string(subject));
        }
        info_dict.set("Creator", text_string(PRODUCER));
        info_dict.set("Producer", text_string(PRODUCER));
        info_dict.set("CreationDate", text_string(&date));
        info_dict.set("ModDate", text_string(&date));
        let info_id = self.doc.add_object(info_dict);
        self.doc.trailer.set("Info", info_id);

        let mut writer = BufWriter::new(target);
        self.doc
            .save_to(&mut writer)
            .map_err(std::io::Error::other)?;
        writer.flush()?;
        Ok(())
    }
}

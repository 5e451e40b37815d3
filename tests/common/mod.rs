#![allow(dead_code)]

use bookfetch::config::HttpConfig;
use bookfetch::session::Session;

/// Minimal JPEG header (SOI, APP0, SOF0, EOI) with the given pixel size
///
/// Same bytes as `assemble::pdf::tests::fake_jpeg`, which integration tests
/// cannot reach because it only exists under `cfg(test)` of the library.
pub fn fake_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    data.extend_from_slice(b"JFIF\0");
    data.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

pub fn session() -> Session {
    Session::new(&HttpConfig::default(), "bookfetch-test").unwrap()
}

/// MediaBox widths of every page, in document order
pub fn page_widths(pdf: &[u8]) -> Vec<i64> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_i64().unwrap()
        })
        .collect()
}

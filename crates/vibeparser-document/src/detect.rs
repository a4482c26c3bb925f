// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format detection: magic bytes first, zip part sniffing for OOXML, and the
// file extension as a fallback for the plain-text family.

use std::io::Cursor;

use tracing::debug;
use vibeparser_core::DocumentFormat;
use zip::ZipArchive;

const PDF_MAGIC: &[u8] = b"%PDF-";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF";
const TIFF_LE_MAGIC: &[u8] = b"II*\0";
const TIFF_BE_MAGIC: &[u8] = b"MM\0*";
const GIF_MAGIC: &[u8] = b"GIF8";
const BMP_MAGIC: &[u8] = b"BM";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Bytes scanned for a leading HTML marker when no extension is available.
const HTML_SNIFF_LEN: usize = 512;

/// Detect the format of `data`, using `name` (a path or file name) as a hint.
///
/// Returns `None` when neither the content nor the name identify a
/// supported format.
pub fn detect_format(data: &[u8], name: Option<&str>) -> Option<DocumentFormat> {
    let by_extension = name.and_then(extension_of).and_then(DocumentFormat::from_extension);

    if let Some(format) = detect_from_magic(data) {
        debug!(%format, "Format detected from magic bytes");
        return Some(format);
    }

    // A named PDF without the magic header is still a PDF, only a broken one.
    if by_extension.is_some() {
        return by_extension;
    }

    if looks_like_html(data) {
        return Some(DocumentFormat::Html);
    }
    if std::str::from_utf8(data).is_ok() {
        return Some(DocumentFormat::PlainText);
    }
    None
}

/// Formats that can be recognised from content alone.
fn detect_from_magic(data: &[u8]) -> Option<DocumentFormat> {
    if data.starts_with(PDF_MAGIC) {
        return Some(DocumentFormat::Pdf);
    }
    let image_magics = [PNG_MAGIC, JPEG_MAGIC, TIFF_LE_MAGIC, TIFF_BE_MAGIC, GIF_MAGIC];
    if image_magics.iter().any(|magic| data.starts_with(magic)) {
        return Some(DocumentFormat::Image);
    }
    // "BM" alone is too weak; require a plausible header length.
    if data.starts_with(BMP_MAGIC) && data.len() > 26 && data[14] >= 12 {
        return Some(DocumentFormat::Image);
    }
    if data.starts_with(ZIP_MAGIC) {
        return sniff_ooxml(data);
    }
    None
}

/// Identify an Office Open XML package by its main part.
fn sniff_ooxml(data: &[u8]) -> Option<DocumentFormat> {
    let archive = ZipArchive::new(Cursor::new(data)).ok()?;
    let mut format = None;
    for name in archive.file_names() {
        match name {
            "word/document.xml" => format = Some(DocumentFormat::Docx),
            "ppt/presentation.xml" => format = Some(DocumentFormat::Pptx),
            "xl/workbook.xml" => format = Some(DocumentFormat::Xlsx),
            _ => continue,
        }
        break;
    }
    format
}

fn looks_like_html(data: &[u8]) -> bool {
    let head = &data[..data.len().min(HTML_SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

fn extension_of(name: &str) -> Option<&str> {
    let file_name = name.rsplit(['/', '\\']).next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() { None } else { Some(ext) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_with(part: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("[Content_Types].xml", options).unwrap();
            writer.write_all(b"<Types/>").unwrap();
            writer.start_file(part, options).unwrap();
            writer.write_all(b"<root/>").unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(
            detect_format(b"%PDF-1.7\n...", Some("report.txt")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            detect_format(b"\x89PNG\r\n\x1a\n\0\0", None),
            Some(DocumentFormat::Image)
        );
        assert_eq!(
            detect_format(b"\xFF\xD8\xFF\xE0rest", None),
            Some(DocumentFormat::Image)
        );
    }

    #[test]
    fn ooxml_packages_are_told_apart_by_main_part() {
        assert_eq!(
            detect_format(&zip_with("word/document.xml"), None),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            detect_format(&zip_with("ppt/presentation.xml"), None),
            Some(DocumentFormat::Pptx)
        );
        assert_eq!(
            detect_format(&zip_with("xl/workbook.xml"), None),
            Some(DocumentFormat::Xlsx)
        );
    }

    #[test]
    fn unknown_zip_is_not_a_document() {
        assert_eq!(detect_format(&zip_with("data/file.bin"), None), None);
    }

    #[test]
    fn text_family_uses_extension() {
        assert_eq!(
            detect_format(b"a,b\n1,2\n", Some("/tmp/table.csv")),
            Some(DocumentFormat::Csv)
        );
        assert_eq!(
            detect_format(b"# Title\n", Some("README.md")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(
            detect_format(b"<!DOCTYPE html><html></html>", None),
            Some(DocumentFormat::Html)
        );
        assert_eq!(
            detect_format(b"just some words", None),
            Some(DocumentFormat::PlainText)
        );
    }

    #[test]
    fn binary_garbage_is_undetected() {
        assert_eq!(detect_format(&[0xC3, 0x28, 0xFF, 0x00], None), None);
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(extension_of("dir.d/file.PDF"), Some("PDF"));
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("noext"), None);
    }
}

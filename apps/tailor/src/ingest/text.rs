//! Plain-text extraction from job postings and resumes on disk.
//!
//! Unreadable input yields `None` with a warning; nothing here returns an error.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, warn};

static DOCX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap());

const SKIPPED_HTML_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

pub fn extract_text(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let result = match extension.as_str() {
        "txt" | "md" => std::fs::read_to_string(path).map_err(|e| e.to_string()),
        "pdf" => pdf_extract::extract_text(path).map_err(|e| e.to_string()),
        "html" | "htm" => std::fs::read_to_string(path)
            .map(|html| html_to_text(&html))
            .map_err(|e| e.to_string()),
        "docx" => read_docx(path),
        other => Err(format!("unsupported file type '{other}'")),
    };

    match result {
        Ok(text) if !text.trim().is_empty() => {
            debug!(path = %path.display(), chars = text.len(), "Extracted text");
            Some(text)
        }
        Ok(_) => {
            warn!(path = %path.display(), "No text found in file");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), "Failed to extract text: {e}");
            None
        }
    }
}

/// Visible text nodes, trimmed, one per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
            if parent.is_some_and(|name| SKIPPED_HTML_ELEMENTS.contains(&name)) {
                return None;
            }
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_docx(path: &Path) -> Result<String, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| format!("invalid docx archive: {e}"))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| format!("missing document body: {e}"))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| e.to_string())?;
    Ok(docx_xml_to_text(&xml))
}

/// Joins `<w:t>` runs per paragraph; paragraphs end at `</w:p>`.
pub fn docx_xml_to_text(xml: &str) -> String {
    xml.split("</w:p>")
        .map(|paragraph| {
            DOCX_RUN
                .captures_iter(paragraph)
                .map(|caps| unescape_xml(&caps[1]))
                .collect::<String>()
        })
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const DOCUMENT_XML: &str = r#"<w:document><w:body><w:p><w:r><w:t>Senior</w:t></w:r><w:r><w:t xml:space="preserve"> Engineer</w:t></w:r></w:p><w:p><w:r><w:tab/><w:t>R&amp;D team</w:t></w:r></w:p><w:p></w:p></w:body></w:document>"#;

    #[test]
    fn test_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.txt");
        std::fs::write(&path, "Platform Engineer\nRemote").unwrap();
        assert_eq!(extract_text(&path).as_deref(), Some("Platform Engineer\nRemote"));
    }

    #[test]
    fn test_html_skips_scripts() {
        let html = "<html><head><style>p{}</style><script>var x = 1;</script></head>\
                    <body><h1>Data Engineer</h1><p>  Acme Corp </p></body></html>";
        assert_eq!(html_to_text(html), "Data Engineer\nAcme Corp");
    }

    #[test]
    fn test_html_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posting.HTML");
        std::fs::write(&path, "<p>Hello</p>").unwrap();
        assert_eq!(extract_text(&path).as_deref(), Some("Hello"));
    }

    #[test]
    fn test_docx_xml_runs_and_paragraphs() {
        assert_eq!(docx_xml_to_text(DOCUMENT_XML), "Senior Engineer\nR&D team");
    }

    #[test]
    fn test_docx_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resume.docx");
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(DOCUMENT_XML.as_bytes()).unwrap();
        zip.finish().unwrap();

        assert_eq!(extract_text(&path).as_deref(), Some("Senior Engineer\nR&D team"));
    }

    #[test]
    fn test_unreadable_inputs_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_text(&dir.path().join("missing.txt")).is_none());

        let odd = dir.path().join("notes.xyz");
        std::fs::write(&odd, "text").unwrap();
        assert!(extract_text(&odd).is_none());

        let blank = dir.path().join("blank.md");
        std::fs::write(&blank, "   \n").unwrap();
        assert!(extract_text(&blank).is_none());

        let bad_docx = dir.path().join("bad.docx");
        std::fs::write(&bad_docx, "not a zip").unwrap();
        assert!(extract_text(&bad_docx).is_none());
    }
}

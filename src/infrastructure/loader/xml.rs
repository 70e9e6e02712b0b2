use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::{debug, warn};

use crate::domain::{
    ports::{DocumentLoader, UploadedFile},
    Document, DomainError, SourceMetadata,
};

/// Loads PLC exports as pretty-printed XML text. Content that does not parse
/// as XML is kept verbatim.
#[derive(Debug, Clone)]
pub struct XmlDocumentLoader {
    allowed_extensions: Vec<String>,
    indent: usize,
}

impl XmlDocumentLoader {
    pub fn new(allowed_extensions: Vec<String>) -> Self {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            indent: 2,
        }
    }

    fn check_extension(&self, name: &str) -> Result<(), DomainError> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }

        let extension = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if self.allowed_extensions.contains(&extension) {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "'{name}' is not an accepted file type (allowed: {})",
                self.allowed_extensions.join(", ")
            )))
        }
    }
}

impl Default for XmlDocumentLoader {
    fn default() -> Self {
        Self::new(vec!["xml".to_string()])
    }
}

impl DocumentLoader for XmlDocumentLoader {
    fn load(&self, files: &[UploadedFile]) -> Result<Vec<Document>, DomainError> {
        if files.is_empty() {
            return Err(DomainError::validation("no files were uploaded"));
        }

        // Same-named uploads overwrite each other: the later bytes win but the
        // file keeps the position it was first seen at.
        let mut unique: Vec<&UploadedFile> = Vec::with_capacity(files.len());
        for file in files {
            if file.name.trim().is_empty() {
                return Err(DomainError::validation("uploaded file has no name"));
            }
            self.check_extension(&file.name)?;

            match unique.iter_mut().find(|f| f.name == file.name) {
                Some(existing) => *existing = file,
                None => unique.push(file),
            }
        }

        let documents = unique
            .into_iter()
            .enumerate()
            .map(|(i, file)| {
                let content = match pretty_print(&file.bytes, self.indent) {
                    Ok(pretty) => pretty,
                    Err(e) => {
                        warn!(file = %file.name, error = %e, "not well-formed XML, keeping raw text");
                        String::from_utf8_lossy(&file.bytes).into_owned()
                    }
                };
                Document::new(content, SourceMetadata::new(file.name.clone(), i + 1))
            })
            .collect::<Vec<_>>();

        debug!(count = documents.len(), "documents loaded");
        Ok(documents)
    }
}

/// Re-indents an XML document, dropping whitespace-only text between tags.
pub fn pretty_print(bytes: &[u8], indent: usize) -> Result<String, DomainError> {
    let text = String::from_utf8_lossy(bytes);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);
    let mut depth: usize = 0;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DomainError::validation(format!("invalid XML: {e}")))?;

        match &event {
            Event::Eof => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }

        writer
            .write_event(event)
            .map_err(|e| DomainError::internal(format!("failed to write XML: {e}")))?;
    }

    if depth != 0 {
        return Err(DomainError::validation("invalid XML: unclosed elements"));
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| DomainError::internal(format!("pretty-printed XML is not UTF-8: {e}")))
}

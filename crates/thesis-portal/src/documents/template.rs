//! `.docx` placeholder substitution.
//!
//! Word splits typed text into several runs, so a `{nama}` placeholder may
//! arrive as `{na` + `ma}` in adjacent `<w:t>` nodes. Substitution therefore
//! works on the concatenated text of one paragraph at a time and writes the
//! replacement back into the node where the placeholder starts.

use std::io::{Cursor, Read, Write};
use std::ops::Range;

use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::fields::FieldMap;

const DOCUMENT_ENTRY: &str = "word/document.xml";
const PARAGRAPH_END: &str = "</w:p>";
const TEXT_END: &str = "</w:t>";

/// Value rendered for placeholders the field map does not know.
pub const MISSING_VALUE: &str = "-";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no master template has been uploaded")]
    Missing,
    #[error("template is not a .docx archive: {0}")]
    NotAnArchive(#[source] ZipError),
    #[error("template has no word/document.xml")]
    MissingDocument,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot read template entry: {0}")]
    Archive(#[source] ZipError),
    #[error("cannot read template entry {entry}: {source}")]
    ReadEntry {
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("template entry {entry} is not valid UTF-8")]
    NotUtf8 { entry: String },
    #[error("unclosed placeholder in {entry}")]
    UnclosedPlaceholder { entry: String },
    #[error("cannot write generated document: {0}")]
    Write(#[source] ZipError),
    #[error("cannot write entry {entry}: {source}")]
    WriteEntry {
        entry: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Fill every `{name}` placeholder in the template with its value from `fields`.
pub fn render(template: &[u8], fields: &FieldMap) -> Result<Vec<u8>, DocumentError> {
    if template.is_empty() {
        return Err(TemplateError::Missing.into());
    }
    let mut archive =
        ZipArchive::new(Cursor::new(template)).map_err(TemplateError::NotAnArchive)?;
    if archive.by_name(DOCUMENT_ENTRY).is_err() {
        return Err(TemplateError::MissingDocument.into());
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(RenderError::Archive)?;
        let name = entry.name().to_string();
        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(DateTime::default());

        if entry.is_dir() {
            writer
                .add_directory(name, options)
                .map_err(RenderError::Write)?;
            continue;
        }

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut content)
            .map_err(|source| RenderError::ReadEntry {
                entry: name.clone(),
                source,
            })?;

        if is_templated(&name) {
            let xml = String::from_utf8(content).map_err(|_| RenderError::NotUtf8 {
                entry: name.clone(),
            })?;
            content = substitute_xml(&xml, fields, &name)?.into_bytes();
        }

        writer
            .start_file(name.as_str(), options)
            .map_err(RenderError::Write)?;
        writer
            .write_all(&content)
            .map_err(|source| RenderError::WriteEntry {
                entry: name.clone(),
                source,
            })?;
    }

    let output = writer.finish().map_err(RenderError::Write)?;
    debug!(bytes = output.get_ref().len(), "rendered document");
    Ok(output.into_inner())
}

fn is_templated(entry: &str) -> bool {
    if entry == DOCUMENT_ENTRY {
        return true;
    }
    entry
        .strip_prefix("word/")
        .filter(|file| file.ends_with(".xml"))
        .is_some_and(|file| file.starts_with("header") || file.starts_with("footer"))
}

fn substitute_xml(xml: &str, fields: &FieldMap, entry: &str) -> Result<String, RenderError> {
    let mut output = String::with_capacity(xml.len());
    let mut rest = xml;
    while !rest.is_empty() {
        let end = rest
            .find(PARAGRAPH_END)
            .map(|at| at + PARAGRAPH_END.len())
            .unwrap_or(rest.len());
        output.push_str(&substitute_paragraph(&rest[..end], fields, entry)?);
        rest = &rest[end..];
    }
    Ok(output)
}

/// Content ranges of the `<w:t>` nodes in a chunk of WordprocessingML.
fn text_nodes(xml: &str) -> Vec<Range<usize>> {
    let mut nodes = Vec::new();
    let mut cursor = 0;
    while let Some(found) = xml[cursor..].find("<w:t") {
        let after_name = cursor + found + "<w:t".len();
        let Some(close) = xml[after_name..].find('>') else {
            break;
        };
        let tag_end = after_name + close;
        let is_text_tag = matches!(xml[after_name..].chars().next(), Some('>' | ' '));
        if !is_text_tag || xml[..tag_end].ends_with('/') {
            cursor = tag_end + 1;
            continue;
        }

        let start = tag_end + 1;
        let Some(len) = xml[start..].find(TEXT_END) else {
            break;
        };
        nodes.push(start..start + len);
        cursor = start + len + TEXT_END.len();
    }
    nodes
}

struct Replacement {
    span: Range<usize>,
    text: String,
}

fn substitute_paragraph(
    chunk: &str,
    fields: &FieldMap,
    entry: &str,
) -> Result<String, RenderError> {
    let nodes = text_nodes(chunk);
    let text: String = nodes.iter().map(|node| &chunk[node.clone()]).collect();

    let mut replacements = Vec::new();
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find('{') {
        let open = cursor + found;
        let Some(len) = text[open..].find('}') else {
            return Err(RenderError::UnclosedPlaceholder {
                entry: entry.to_string(),
            });
        };
        let close = open + len;
        let name = text[open + 1..close].trim();
        let value = fields.get(name).map(String::as_str).unwrap_or(MISSING_VALUE);
        replacements.push(Replacement {
            span: open..close + 1,
            text: escape_xml(value),
        });
        cursor = close + 1;
    }

    if replacements.is_empty() {
        return Ok(chunk.to_string());
    }

    let mut rebuilt = String::with_capacity(chunk.len());
    let mut last = 0;
    let mut offset = 0;
    for node in nodes {
        rebuilt.push_str(&chunk[last..node.start]);
        let own = offset..offset + node.len();

        let mut position = own.start;
        for replacement in &replacements {
            let span = &replacement.span;
            if span.end <= position || span.start >= own.end {
                continue;
            }
            if span.start >= position {
                rebuilt.push_str(&text[position..span.start]);
                rebuilt.push_str(&replacement.text);
            }
            position = span.end.min(own.end);
        }
        if position < own.end {
            rebuilt.push_str(&text[position..own.end]);
        }

        last = node.end;
        offset = own.end;
    }
    rebuilt.push_str(&chunk[last..]);
    Ok(rebuilt)
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn docx(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .expect("start entry");
            writer.write_all(body.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish").into_inner()
    }

    fn entry(document: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(document)).expect("archive");
        let mut file = archive.by_name(name).expect("entry");
        let mut xml = String::new();
        file.read_to_string(&mut xml).expect("utf8");
        xml
    }

    #[test]
    fn substitutes_placeholders_split_across_runs() {
        let xml = r#"<w:body><w:p><w:r><w:t>Nama: {na</w:t></w:r><w:r><w:t xml:space="preserve">ma} </w:t></w:r><w:r><w:t>({nim})</w:t></w:r></w:p></w:body>"#;
        let template = docx(&[(DOCUMENT_ENTRY, xml)]);

        let output = render(&template, &fields(&[("nama", "Ani"), ("nim", "2020123")]))
            .expect("renders");

        assert_eq!(
            entry(&output, DOCUMENT_ENTRY),
            r#"<w:body><w:p><w:r><w:t>Nama: Ani</w:t></w:r><w:r><w:t xml:space="preserve"> </w:t></w:r><w:r><w:t>(2020123)</w:t></w:r></w:p></w:body>"#
        );
    }

    #[test]
    fn unknown_placeholders_render_as_dash_and_values_are_escaped() {
        let xml = "<w:p><w:r><w:t>{judul} / {ruang}</w:t></w:r></w:p>";
        let template = docx(&[(DOCUMENT_ENTRY, xml)]);

        let output =
            render(&template, &fields(&[("judul", "R&D <AI>")])).expect("renders");

        assert_eq!(
            entry(&output, DOCUMENT_ENTRY),
            "<w:p><w:r><w:t>R&amp;D &lt;AI&gt; / -</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn headers_and_footers_are_filled_but_other_parts_are_copied() {
        let template = docx(&[
            (DOCUMENT_ENTRY, "<w:p><w:r><w:t>{nama}</w:t></w:r></w:p>"),
            ("word/header1.xml", "<w:p><w:r><w:t>No. {no_surat}</w:t></w:r></w:p>"),
            ("word/styles.xml", "<w:style>{nama}</w:style>"),
        ]);

        let output = render(
            &template,
            &fields(&[("nama", "Ani"), ("no_surat", "001/TA/2024")]),
        )
        .expect("renders");

        assert_eq!(
            entry(&output, "word/header1.xml"),
            "<w:p><w:r><w:t>No. 001/TA/2024</w:t></w:r></w:p>"
        );
        assert_eq!(entry(&output, "word/styles.xml"), "<w:style>{nama}</w:style>");
    }

    #[test]
    fn tab_and_table_tags_are_not_text_nodes() {
        let xml = "<w:p><w:r><w:tab/><w:t>{nama}</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>{tgl}</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        let template = docx(&[(DOCUMENT_ENTRY, xml)]);

        let output = render(&template, &fields(&[("nama", "Ani"), ("tgl", "20 Juni 2024")]))
            .expect("renders");

        assert_eq!(
            entry(&output, DOCUMENT_ENTRY),
            "<w:p><w:r><w:tab/><w:t>Ani</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>20 Juni 2024</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"
        );
    }

    #[test]
    fn output_is_deterministic() {
        let template = docx(&[(DOCUMENT_ENTRY, "<w:p><w:r><w:t>{nama}</w:t></w:r></w:p>")]);
        let values = fields(&[("nama", "Ani")]);

        let first = render(&template, &values).expect("renders");
        let second = render(&template, &values).expect("renders");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_invalid_templates() {
        assert!(matches!(
            render(&[], &FieldMap::new()),
            Err(DocumentError::Template(TemplateError::Missing))
        ));
        assert!(matches!(
            render(b"not a zip", &FieldMap::new()),
            Err(DocumentError::Template(TemplateError::NotAnArchive(_)))
        ));

        let no_document = docx(&[("word/styles.xml", "<w:styles/>")]);
        assert!(matches!(
            render(&no_document, &FieldMap::new()),
            Err(DocumentError::Template(TemplateError::MissingDocument))
        ));
    }

    #[test]
    fn unclosed_placeholder_is_a_render_error() {
        let template = docx(&[(DOCUMENT_ENTRY, "<w:p><w:r><w:t>{nama</w:t></w:r></w:p>")]);
        let err = render(&template, &FieldMap::new()).expect_err("unclosed");
        assert!(matches!(
            err,
            DocumentError::Render(RenderError::UnclosedPlaceholder { .. })
        ));
    }
}

use std::fs;
use std::path::Path;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use super::languages::Language;
use super::symbols::{CompilationUnit, SectionSymbol, Span};
use crate::error::{IndexError, Result};

struct Heading {
    level: usize,
    title: String,
    line: usize,
    summary: String,
}

pub struct MarkdownExtractor;

impl MarkdownExtractor {
    pub fn extract_file(path: &Path) -> Result<CompilationUnit> {
        let content = fs::read_to_string(path).map_err(|e| IndexError::io(path, e))?;
        Ok(Self::extract_source(path, &content))
    }

    /// Splits a document at its headings.
    ///
    /// A section runs from its heading to the line before the next heading of
    /// any level. Its `path` lists the titles of the enclosing headings, so a
    /// `###` under a `##` carries both. The first paragraph before any heading
    /// becomes the unit doc.
    pub fn extract_source(path: &Path, content: &str) -> CompilationUnit {
        let file_path = path.to_string_lossy().replace('\\', "/");
        let mut unit = CompilationUnit::new(Language::Markdown, file_path.clone());
        unit.package = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let line_starts: Vec<usize> = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        let line_of = |offset: usize| line_starts.partition_point(|&s| s <= offset);
        let lines: Vec<&str> = content.lines().collect();

        let mut headings: Vec<Heading> = Vec::new();
        let mut preamble = String::new();
        let mut preamble_span = Span::default();
        let mut title: Option<String> = None;
        let mut paragraph: Option<String> = None;

        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_HEADING_ATTRIBUTES
            | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS;
        for (event, range) in Parser::new_ext(content, options).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    title = Some(String::new());
                    headings.push(Heading {
                        level: level as usize,
                        title: String::new(),
                        line: line_of(range.start),
                        summary: String::new(),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let (Some(text), Some(last)) = (title.take(), headings.last_mut()) {
                        last.title = text.trim().to_string();
                    }
                }
                Event::Start(Tag::Paragraph) => {
                    let wanted = match headings.last() {
                        Some(h) => h.summary.is_empty(),
                        None => preamble.is_empty(),
                    };
                    if wanted {
                        paragraph = Some(String::new());
                        if headings.is_empty() {
                            preamble_span = Span::new(
                                line_of(range.start),
                                line_of(range.end.saturating_sub(1)),
                            );
                        }
                    }
                }
                Event::End(TagEnd::Paragraph) => {
                    if let Some(text) = paragraph.take() {
                        match headings.last_mut() {
                            Some(h) => h.summary = text.trim().to_string(),
                            None => preamble = text.trim().to_string(),
                        }
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(buf) = title.as_mut().or(paragraph.as_mut()) {
                        buf.push_str(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(buf) = title.as_mut().or(paragraph.as_mut()) {
                        buf.push(' ');
                    }
                }
                _ => {}
            }
        }

        if !preamble.is_empty() {
            unit.doc = preamble;
            unit.doc_file = file_path.clone();
            unit.doc_span = preamble_span;
        }

        // Enclosing headings as (level, title).
        let mut stack: Vec<(usize, String)> = Vec::new();
        for (i, heading) in headings.iter().enumerate() {
            let mut end = headings
                .get(i + 1)
                .map(|next| next.line.saturating_sub(1))
                .unwrap_or(lines.len())
                .max(heading.line);
            while end > heading.line && lines.get(end - 1).is_some_and(|l| l.trim().is_empty()) {
                end -= 1;
            }

            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }
            let mut section_path: Vec<String> = stack.iter().map(|(_, t)| t.clone()).collect();
            section_path.push(heading.title.clone());
            stack.push((heading.level, heading.title.clone()));

            unit.sections.push(SectionSymbol {
                title: heading.title.clone(),
                level: heading.level,
                path: section_path,
                file_path: file_path.clone(),
                span: Span::new(heading.line, end),
                summary: heading.summary.clone(),
                code: lines[heading.line - 1..end.min(lines.len())].join("\n"),
            });
        }
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GUIDE: &str = "Intro paragraph\nspanning two lines.\n\n# Guide\n\nWelcome to the `guide`.\n\n## Install\n\n```sh\n# not a heading\ncargo install symdex\n```\n\n### From source\n\nClone it.\n\n## Usage\n\nRun it.\n\n\n# Appendix\n";

    fn extract(src: &str) -> CompilationUnit {
        MarkdownExtractor::extract_source(Path::new("docs/guide.md"), src)
    }

    #[test]
    fn test_sections_follow_headings() {
        let unit = extract(GUIDE);
        let titles: Vec<&str> = unit.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Guide", "Install", "From source", "Usage", "Appendix"]);

        let levels: Vec<usize> = unit.sections.iter().map(|s| s.level).collect();
        assert_eq!(levels, vec![1, 2, 3, 2, 1]);
    }

    #[test]
    fn test_section_paths_nest_by_level() {
        let unit = extract(GUIDE);
        assert_eq!(unit.sections[2].path, vec!["Guide", "Install", "From source"]);
        assert_eq!(unit.sections[3].path, vec!["Guide", "Usage"]);
        assert_eq!(unit.sections[4].path, vec!["Appendix"]);
    }

    #[test]
    fn test_section_spans_and_summaries() {
        let unit = extract(GUIDE);
        let guide = &unit.sections[0];
        assert_eq!(guide.span, Span::new(4, 6));
        assert_eq!(guide.summary, "Welcome to the guide.");

        let install = &unit.sections[1];
        assert_eq!(install.span, Span::new(8, 13));
        assert!(install.code.contains("cargo install symdex"));
        assert_eq!(install.summary, "");

        // Trailing blank lines are dropped.
        assert_eq!(unit.sections[3].span, Span::new(19, 21));
        assert_eq!(unit.sections[4].span, Span::new(24, 24));
    }

    #[test]
    fn test_preamble_becomes_unit_doc() {
        let unit = extract(GUIDE);
        assert_eq!(unit.doc, "Intro paragraph spanning two lines.");
        assert_eq!(unit.doc_span, Span::new(1, 2));
        assert_eq!(unit.package, "guide");
    }

    #[test]
    fn test_document_without_headings() {
        let unit = extract("just text\n");
        assert!(unit.sections.is_empty());
        assert_eq!(unit.doc, "just text");
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_extract_file() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        write!(temp_file, "# Test\n\nThis is a short file.").unwrap();

        let unit = MarkdownExtractor::extract_file(temp_file.path()).unwrap();
        assert_eq!(unit.sections.len(), 1);
        assert_eq!(unit.sections[0].summary, "This is a short file.");
    }
}

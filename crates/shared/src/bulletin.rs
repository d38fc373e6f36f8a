use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::StorySegment;
use crate::render::PdfRenderer;

pub const BULLETIN_NAME: &str = "GRNewsAI v2";
pub const INTRO: &str = "Ακολουθούν τα νέα με την ευρύτερη κάλυψη στις πηγές RSS που επιλέχθηκαν. \n \n";
pub const OUTRO: &str = "Τέλος δελτίου.";

/// Paths written for one bulletin, all sharing the same timestamped stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletinArtifacts {
    pub markdown: PathBuf,
    pub html: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
}

impl BulletinArtifacts {
    pub fn audio_path(&self) -> PathBuf {
        self.markdown.with_extension("mp3")
    }
}

pub struct BulletinGenerator;

impl BulletinGenerator {
    pub fn generate_markdown(segments: &[StorySegment], now: NaiveDateTime) -> String {
        let mut md = String::new();

        md.push_str(&format!("{}: {}\n \n", BULLETIN_NAME, now.format("%Y-%m-%d %H:%M")));
        md.push_str(INTRO);

        for segment in segments {
            md.push_str(&format!("# {}\n{}\n \n", segment.title, segment.text));
            for (index, link) in segment.links.iter().enumerate() {
                md.push_str(&format!("[{}]({}) ", index + 1, link));
            }
            md.push_str("\n--- \n \n");
        }

        md
    }

    /// Link-free variant read out by the speech synthesizer
    pub fn generate_narration(segments: &[StorySegment]) -> String {
        let mut text = String::from(INTRO);

        for segment in segments {
            text.push_str(&format!("# {}\n{}\n \n", segment.title, segment.text));
        }
        text.push_str(OUTRO);

        text
    }

    /// Strip characters the voice would otherwise read aloud or stumble on
    pub fn prepare_for_speech(text: &str) -> String {
        text.replace('*', " ").replace('&', " και ").replace(':', ".")
    }

    pub fn generate_html(segments: &[StorySegment], now: NaiveDateTime) -> String {
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n<html lang=\"el\">\n<head>\n");
        html.push_str("  <meta charset=\"UTF-8\">\n");
        html.push_str(&format!("  <title>{}</title>\n", Self::escape_html(BULLETIN_NAME)));
        html.push_str("  <style>\n");
        html.push_str("    body { font-family: Arial, sans-serif; max-width: 900px; margin: 40px auto; padding: 0 20px; line-height: 1.6; }\n");
        html.push_str("    h1 { color: #2c3e50; margin-top: 30px; }\n");
        html.push_str("    .header { color: #7f8c8d; font-size: 0.9em; }\n");
        html.push_str("    .links a { color: #3498db; text-decoration: none; margin-right: 6px; }\n");
        html.push_str("    .links a:hover { text-decoration: underline; }\n");
        html.push_str("    hr { border: none; border-top: 1px solid #ddd; margin: 30px 0; }\n");
        html.push_str("  </style>\n");
        html.push_str("</head>\n<body>\n");

        html.push_str(&format!(
            "<p class=\"header\">{}: {}</p>\n",
            Self::escape_html(BULLETIN_NAME),
            now.format("%Y-%m-%d %H:%M")
        ));
        html.push_str(&format!("<p>{}</p>\n", Self::escape_html(INTRO.trim())));

        for segment in segments {
            html.push_str(&format!("<h1>{}</h1>\n", Self::escape_html(&segment.title)));

            for paragraph in segment.text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
                html.push_str(&format!("<p>{}</p>\n", Self::escape_html(paragraph)));
            }

            if !segment.links.is_empty() {
                html.push_str("<p class=\"links\">");
                for (index, link) in segment.links.iter().enumerate() {
                    html.push_str(&format!(
                        "<a href=\"{}\">[{}]</a>",
                        Self::escape_html(link),
                        index + 1
                    ));
                }
                html.push_str("</p>\n");
            }
            html.push_str("<hr>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    pub fn file_stem(now: NaiveDateTime) -> String {
        format!("GR_digest_{}", now.format("%Y-%m-%d_%H-%M-%S"))
    }

    /// Write the Markdown bulletin, then the HTML page and PDF on a best-effort basis
    pub async fn save_bulletin(
        segments: &[StorySegment],
        output_dir: &Path,
        now: NaiveDateTime,
        pdf: &PdfRenderer,
    ) -> Result<BulletinArtifacts> {
        fs::create_dir_all(output_dir).context("Failed to create output directory")?;

        let stem = Self::file_stem(now);
        let markdown = output_dir.join(format!("{}.md", stem));
        fs::write(&markdown, Self::generate_markdown(segments, now))
            .context("Failed to write bulletin markdown")?;

        let html_path = markdown.with_extension("html");
        let html = match fs::write(&html_path, Self::generate_html(segments, now)) {
            Ok(()) => Some(html_path),
            Err(e) => {
                warn!(path = %html_path.display(), error = %e, "Failed to write HTML bulletin");
                None
            }
        };

        let pdf_path = markdown.with_extension("pdf");
        let pdf = match pdf.render(&markdown, &pdf_path).await {
            Ok(()) => Some(pdf_path),
            Err(e) => {
                warn!(path = %pdf_path.display(), error = %format!("{:#}", e), "Failed to render PDF bulletin");
                None
            }
        };

        Ok(BulletinArtifacts { markdown, html, pdf })
    }
}

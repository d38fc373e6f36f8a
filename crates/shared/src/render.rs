//! External converters: Markdown to PDF and text to speech.
//!
//! Both shell out to a configured command and wait for it to finish.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;

async fn run(command: &mut Command, program: &str) -> Result<()> {
    let Output { status, stderr, .. } = command
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            status,
            String::from_utf8_lossy(&stderr).trim()
        );
    }
    Ok(())
}

pub struct PdfRenderer {
    command: String,
    engine: String,
    font: String,
}

impl PdfRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            engine: "xelatex".to_string(),
            font: "DejaVu Serif".to_string(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>, font: impl Into<String>) -> Self {
        self.engine = engine.into();
        self.font = font.into();
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.pdf_command.clone())
            .with_engine(config.pdf_engine.clone(), config.pdf_font.clone())
    }

    /// Command line for converting `markdown` into `pdf`.
    ///
    /// pandoc's default pdflatex cannot typeset Greek, so a Unicode engine and
    /// a font with Greek glyphs are always passed.
    pub fn args(&self, markdown: &Path, pdf: &Path) -> Vec<OsString> {
        vec![
            markdown.into(),
            "-o".into(),
            pdf.into(),
            "--metadata".into(),
            "title=News Bulletin".into(),
            format!("--pdf-engine={}", self.engine).into(),
            "-V".into(),
            format!("mainfont={}", self.font).into(),
        ]
    }

    pub async fn render(&self, markdown: &Path, pdf: &Path) -> Result<()> {
        debug!(command = %self.command, engine = %self.engine, input = %markdown.display(), "Rendering PDF");

        let mut command = Command::new(&self.command);
        command.args(self.args(markdown, pdf));

        run(&mut command, &self.command).await
    }
}

pub struct SpeechSynthesizer {
    command: String,
    voice: String,
}

impl SpeechSynthesizer {
    pub fn new(command: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            voice: voice.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tts_command.clone(), config.tts_voice.clone())
    }

    /// Narrate `text` into an audio file at `output`
    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<()> {
        debug!(command = %self.command, voice = %self.voice, output = %output.display(), "Synthesizing speech");

        let mut command = Command::new(&self.command);
        command
            .arg("--voice")
            .arg(&self.voice)
            .arg("--text")
            .arg(text)
            .arg("--write-media")
            .arg(output);

        run(&mut command, &self.command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_converter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = PdfRenderer::new("news-bulletin-missing-converter");

        let err = renderer
            .render(&dir.path().join("in.md"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to run news-bulletin-missing-converter"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_command() {
        let dir = tempfile::tempdir().unwrap();
        let tts = SpeechSynthesizer::new("true", "el-GR-NestorasNeural");

        tts.synthesize("Καλησπέρα", &dir.path().join("out.mp3"))
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_status() {
        let dir = tempfile::tempdir().unwrap();
        let tts = SpeechSynthesizer::new("false", "el-GR-NestorasNeural");

        let err = tts
            .synthesize("Καλησπέρα", &dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("false exited with"));
    }

    #[test]
    fn test_from_config() {
        let config = Config::default();
        let tts = SpeechSynthesizer::from_config(&config);
        assert_eq!(tts.command, "edge-tts");
        assert_eq!(tts.voice, "el-GR-NestorasNeural");
        assert_eq!(PdfRenderer::from_config(&config).command, "pandoc");
    }

    #[test]
    fn test_pdf_args_select_unicode_engine_and_greek_font() {
        let renderer = PdfRenderer::from_config(&Config::default());
        let args = renderer.args(Path::new("bulletin.md"), Path::new("bulletin.pdf"));

        let expected: Vec<OsString> = [
            "bulletin.md",
            "-o",
            "bulletin.pdf",
            "--metadata",
            "title=News Bulletin",
            "--pdf-engine=xelatex",
            "-V",
            "mainfont=DejaVu Serif",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_pdf_engine_and_font_follow_config() {
        let config = Config {
            pdf_engine: "lualatex".to_string(),
            pdf_font: "GFS Didot".to_string(),
            ..Config::default()
        };
        let args = PdfRenderer::from_config(&config).args(Path::new("a.md"), Path::new("a.pdf"));

        assert!(args.contains(&OsString::from("--pdf-engine=lualatex")));
        assert!(args.contains(&OsString::from("mainfont=GFS Didot")));
    }
}

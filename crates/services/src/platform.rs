//! OS capabilities behind one interface: speech, clipboard, browser, screen.
//!
//! The concrete implementation is picked once at startup by [`detect`];
//! call sites never branch on the operating system themselves.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::ImageOutputFormat;
use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Longest edge of a screenshot sent to the model.
const MAX_SCREENSHOT_EDGE: u32 = 1600;
const JPEG_QUALITY: u8 = 85;

pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start speaking `text`. The returned handle owns the speech process.
    fn speak(&self, text: &str) -> Result<SpeechHandle>;

    fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
        clipboard
            .set_text(text.to_string())
            .context("failed to copy to clipboard")?;
        Ok(())
    }

    fn open_url(&self, url: &str) -> Result<()> {
        open::that(url).with_context(|| format!("could not open browser for {}", url))?;
        Ok(())
    }

    /// Grab the primary display as JPEG bytes.
    fn capture_screen(&self) -> Result<Vec<u8>>;
}

/// How a speech process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEnd {
    Finished,
    Cancelled,
}

/// A running text-to-speech process.
pub struct SpeechHandle {
    child: Child,
}

impl SpeechHandle {
    /// Spawn `command` with its output discarded.
    pub fn spawn(mut command: Command) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let child = command.spawn().context("error starting speech")?;
        Ok(Self { child })
    }

    /// Wait for the process to exit, or kill it once `token` is cancelled.
    pub async fn wait_or_cancel(mut self, token: &CancellationToken) -> Result<SpeechEnd> {
        tokio::select! {
            status = self.child.wait() => {
                let status = status.context("error speaking message")?;
                if !status.success() {
                    tracing::warn!("Speech process exited with {}", status);
                }
                Ok(SpeechEnd::Finished)
            }
            _ = token.cancelled() => {
                self.child.kill().await.context("failed to stop speech")?;
                Ok(SpeechEnd::Cancelled)
            }
        }
    }
}

pub struct MacOs;
pub struct Linux;
pub struct Windows;
pub struct Unsupported;

impl Platform for MacOs {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn speak(&self, text: &str) -> Result<SpeechHandle> {
        let mut cmd = Command::new("say");
        cmd.arg(text);
        SpeechHandle::spawn(cmd)
    }

    fn capture_screen(&self) -> Result<Vec<u8>> {
        capture_with(&[&["screencapture", "-x", "-t", "png"]])
    }
}

impl Platform for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn speak(&self, text: &str) -> Result<SpeechHandle> {
        // -w blocks until the utterance is done, so waiting on the child works.
        let mut cmd = Command::new("spd-say");
        cmd.arg("-w").arg(text);
        SpeechHandle::spawn(cmd)
    }

    fn capture_screen(&self) -> Result<Vec<u8>> {
        capture_with(&[&["grim"], &["gnome-screenshot", "-f"], &["scrot", "-o"]])
    }
}

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn speak(&self, text: &str) -> Result<SpeechHandle> {
        let script = format!(
            "Add-Type -AssemblyName System.Speech; \
             $speak = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
             $speak.Speak('{}')",
            text.replace('\'', "''")
        );
        let mut cmd = Command::new("powershell");
        cmd.arg("-c").arg(script);
        SpeechHandle::spawn(cmd)
    }

    fn capture_screen(&self) -> Result<Vec<u8>> {
        let file = tempfile::Builder::new()
            .prefix("gema-screen-")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
             $b = [System.Windows.Forms.Screen]::PrimaryScreen.Bounds; \
             $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
             $g = [System.Drawing.Graphics]::FromImage($bmp); \
             $g.CopyFromScreen($b.Location, [System.Drawing.Point]::Empty, $b.Size); \
             $bmp.Save('{}')",
            file.display().to_string().replace('\'', "''")
        );
        run_capture("powershell", &["-c", &script], None)?;
        read_screenshot(&file)
    }
}

impl Platform for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn speak(&self, _text: &str) -> Result<SpeechHandle> {
        Err(anyhow!("Text-to-speech not supported on this platform"))
    }

    fn capture_screen(&self) -> Result<Vec<u8>> {
        Err(anyhow!("Screen capture not supported on this platform"))
    }
}

/// Select the implementation for the running OS.
pub fn detect() -> Box<dyn Platform> {
    if cfg!(target_os = "macos") {
        Box::new(MacOs)
    } else if cfg!(target_os = "windows") {
        Box::new(Windows)
    } else if cfg!(target_os = "linux") {
        Box::new(Linux)
    } else {
        Box::new(Unsupported)
    }
}

/// Try each screenshot tool in turn; the output file path is appended as the last argument.
fn capture_with(tools: &[&[&str]]) -> Result<Vec<u8>> {
    let file = tempfile::Builder::new()
        .prefix("gema-screen-")
        .suffix(".png")
        .tempfile()?
        .into_temp_path();

    let mut last_err = None;
    for tool in tools {
        let (program, args) = tool.split_first().ok_or_else(|| anyhow!("empty tool"))?;
        match run_capture(program, args, Some(&file)) {
            Ok(()) => return read_screenshot(&file),
            Err(e) => {
                tracing::debug!("{} failed: {:#}", program, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("no screenshot tool available")))
}

fn run_capture(program: &str, args: &[&str], output: Option<&Path>) -> Result<()> {
    let mut cmd = std::process::Command::new(program);
    cmd.args(args).stdout(Stdio::null()).stderr(Stdio::piped());
    if let Some(path) = output {
        cmd.arg(path);
    }
    let out = cmd
        .output()
        .with_context(|| format!("could not run {}", program))?;
    if !out.status.success() {
        return Err(anyhow!(
            "{} failed: {}",
            program,
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}

fn read_screenshot(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;
    if raw.is_empty() {
        return Err(anyhow!("screenshot tool produced an empty file"));
    }
    encode_jpeg(&raw, MAX_SCREENSHOT_EDGE)
}

/// Decode any supported image, shrink it to `max_edge` and re-encode as JPEG.
pub fn encode_jpeg(raw: &[u8], max_edge: u32) -> Result<Vec<u8>> {
    let mut img = image::load_from_memory(raw).context("failed to decode screenshot")?;
    if img.width() > max_edge || img.height() > max_edge {
        img = img.resize(max_edge, max_edge, FilterType::Triangle);
    }
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .context("failed to encode screenshot")?;
    Ok(out.into_inner())
}

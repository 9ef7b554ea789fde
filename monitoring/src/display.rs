//! Status rendering for small monochrome e-ink panels.
//!
//! Frames are drawn into a 1-bit [`Bitmap`] with a built-in 5x7 glyph set and
//! handed to a [`DisplayDriver`]. The shipped driver writes a binary PBM that
//! the panel daemon picks up.

use chrono::{DateTime, Local, Utc};
use memerelay_core::config::{DisplaySettings, PanelModel};
use memerelay_core::{format_uptime, DisplayError, RunStats};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;
const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

/// One bit per pixel, `true` is ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.pixels[(y * self.width + x) as usize]
    }

    /// Set a pixel; coordinates outside the frame are clipped.
    pub fn set(&mut self, x: u32, y: u32, ink: bool) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = ink;
        }
    }

    pub fn ink_count(&self) -> usize {
        self.pixels.iter().filter(|ink| **ink).count()
    }

    /// Draw text with its top-left corner at (x, y). Returns the x after the
    /// last glyph.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, scale: u32) -> u32 {
        let scale = scale.max(1);
        let mut cursor = x;
        for c in text.chars() {
            let rows = glyph(c);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            self.set(
                                cursor + col * scale + dx,
                                y + row as u32 * scale + dy,
                                true,
                            );
                        }
                    }
                }
            }
            cursor += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
        }
        cursor
    }

    pub fn text_width(text: &str, scale: u32) -> u32 {
        text.chars().count() as u32 * (GLYPH_WIDTH + GLYPH_SPACING) * scale.max(1)
    }

    /// Binary PBM (P4): rows packed MSB first, padded to whole bytes.
    pub fn to_pbm(&self) -> Vec<u8> {
        let row_bytes = self.width.div_ceil(8) as usize;
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.reserve(row_bytes * self.height as usize);

        for y in 0..self.height {
            let mut row = vec![0u8; row_bytes];
            for x in 0..self.width {
                if self.get(x, y) {
                    row[(x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
            out.extend_from_slice(&row);
        }
        out
    }
}

/// 5x7 rows for a character, low five bits used. Lowercase renders as
/// uppercase; anything unknown renders as `?`.
pub fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        ' ' => [0x00; 7],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

pub fn render_startup(model: PanelModel) -> Bitmap {
    let (width, height) = model.dimensions();
    let mut frame = Bitmap::new(width, height);
    frame.draw_text(6, 8, "MEME RELAY", 2);
    frame.draw_text(6, 36, "Starting up...", 1);
    frame.draw_text(6, 52, &format!("Display: {}", model.as_str()), 1);
    frame
}

/// Statistics screen: counters, last run, uptime, status and update time.
pub fn render_status(model: PanelModel, stats: &RunStats, now: DateTime<Local>) -> Bitmap {
    let (width, height) = model.dimensions();
    let mut frame = Bitmap::new(width, height);

    frame.draw_text(4, 4, "Meme Relay Status", 1);
    for x in 4..width.saturating_sub(4) {
        frame.set(x, 14, true);
    }

    let mut y = 20;
    for line in [
        format!("Scraped: {}", stats.scraped),
        format!("Sent: {}", stats.sent),
        format!("Failed: {}", stats.failed),
    ] {
        frame.draw_text(4, y, &line, 1);
        y += 12;
    }

    if let Some(last_run) = stats.last_run {
        let last_run = last_run.with_timezone(&Local);
        frame.draw_text(4, y, &format!("Last run: {}", last_run.format("%H:%M")), 1);
        y += 12;
    }

    let uptime = stats.uptime(now.with_timezone(&Utc));
    frame.draw_text(4, y, &format!("Uptime: {}", format_uptime(uptime)), 1);

    frame.draw_text(4, height - 22, &format!("Status: {}", stats.status), 1);
    frame.draw_text(4, height - 11, &format!("Updated: {}", now.format("%H:%M:%S")), 1);
    frame
}

pub trait DisplayDriver: Send {
    fn name(&self) -> &str;
    fn show(&mut self, frame: &Bitmap) -> Result<(), DisplayError>;
}

/// Writes each frame to a PBM file for the panel daemon.
#[derive(Debug)]
pub struct PbmFileDriver {
    path: PathBuf,
}

impl PbmFileDriver {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DisplayError> {
        let path = path.into();
        let parent_ok = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
            _ => true,
        };
        if !parent_ok {
            return Err(DisplayError::DriverUnavailable {
                driver: format!("pbm:{}", path.display()),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DisplayDriver for PbmFileDriver {
    fn name(&self) -> &str {
        "pbm"
    }

    fn show(&mut self, frame: &Bitmap) -> Result<(), DisplayError> {
        fs::write(&self.path, frame.to_pbm()).map_err(|e| DisplayError::WriteFailed {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct EInkDisplay {
    model: PanelModel,
    driver: Box<dyn DisplayDriver>,
}

impl std::fmt::Debug for EInkDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EInkDisplay")
            .field("model", &self.model)
            .field("driver", &self.driver.name())
            .finish()
    }
}

impl EInkDisplay {
    pub fn new(model: PanelModel, driver: Box<dyn DisplayDriver>) -> Self {
        Self { model, driver }
    }

    /// Set up the panel when running on a Raspberry Pi. Anywhere else, or when
    /// the driver cannot be opened, there is no display.
    pub fn probe(settings: &DisplaySettings) -> Option<Self> {
        Self::probe_with_marker(settings, Path::new(DEVICE_TREE_MODEL))
    }

    pub fn probe_with_marker(settings: &DisplaySettings, marker: &Path) -> Option<Self> {
        if !marker.exists() {
            info!("Not on Raspberry Pi, skipping display init");
            return None;
        }

        match PbmFileDriver::open(&settings.frame_path) {
            Ok(driver) => {
                info!(
                    "E-ink display ({}) initialized, frames go to {}",
                    settings.model.as_str(),
                    driver.path().display()
                );
                Some(Self::new(settings.model, Box::new(driver)))
            }
            Err(e) => {
                info!("Continuing without display: {}", e);
                None
            }
        }
    }

    pub fn model(&self) -> PanelModel {
        self.model
    }

    pub fn show_startup(&mut self) -> Result<(), DisplayError> {
        self.driver.show(&render_startup(self.model))
    }

    pub fn show_status(&mut self, stats: &RunStats, now: DateTime<Local>) -> Result<(), DisplayError> {
        let frame = render_status(self.model, stats, now);
        debug!("Rendering status frame ({} ink pixels)", frame.ink_count());
        self.driver.show(&frame)
    }
}

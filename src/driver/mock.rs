//! Deterministic in-memory browser.
//!
//! Pages are rendered into a [`MockFramebuffer`]: a background colour derived
//! from the URL plus the URL itself drawn with font8x8 glyphs. The same script
//! therefore always produces the same pixels, and a configured tint produces
//! predictable drift.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{BrowserDriver, BrowserLauncher, CONSOLE_API_SOURCE, ConsoleEntry};
use crate::error::{RegressionError, Result};
use crate::window::{GUI_HEIGHT, GUI_WIDTH, WindowSize};

/// A virtual framebuffer for programmatic drawing
///
/// - `fill()` - Fill entire buffer with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs
/// - `get_pixel()` / `set_pixel()` - Direct pixel access
#[derive(Debug, Clone)]
pub struct MockFramebuffer {
    width: u32,
    height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
}

impl MockFramebuffer {
    /// Create a new framebuffer with the given dimensions, initialized to black
    pub fn new(width: u32, height: u32) -> Self {
        let buffer = vec![0u8; (width * height * 3) as usize];
        Self {
            width,
            height,
            buffer,
        }
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Load a framebuffer from PNG image bytes
    pub fn from_png_bytes(data: &[u8]) -> Result<Self> {
        let rgb = image::load_from_memory(data)?.to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            buffer: rgb.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle, clipped to the buffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= self.height {
                break;
            }
            for bit in 0..8 {
                let px = x + bit;
                if px >= self.width {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let is_fg = (row >> bit) & 1 == 1;
                self.set_pixel(px, py, if is_fg { fg } else { bg });
            }
        }
    }

    /// Get the color of a pixel (black outside the buffer)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    /// Set the color of a pixel
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Convert to an image buffer
    pub fn to_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| image::Rgb(self.get_pixel(x, y)))
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.to_image()
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Behaviour knobs of the mock browser
#[derive(Debug, Clone)]
pub struct MockBrowserConfig {
    /// Outer window geometry of a freshly launched session
    pub initial_size: WindowSize,
    /// Added (wrapping) to every page colour; non-zero simulates visual drift
    pub tint: [u8; 3],
    /// Capture this viewport size regardless of the window geometry
    pub viewport_override: Option<WindowSize>,
    /// `(url fragment, message)`: navigating to a matching URL logs the message
    pub console_messages: Vec<(String, String)>,
    /// The session stops reporting geometry after this many geometry reads
    pub vanish_after_polls: Option<u32>,
    /// The user resizes the window to the given size after this many geometry reads
    pub external_resize: Option<(u32, WindowSize)>,
}

impl Default for MockBrowserConfig {
    fn default() -> Self {
        Self {
            initial_size: WindowSize::new(800 + GUI_WIDTH, 600 + GUI_HEIGHT),
            tint: [0, 0, 0],
            viewport_override: None,
            console_messages: Vec::new(),
            vanish_after_polls: None,
            external_resize: None,
        }
    }
}

impl MockBrowserConfig {
    pub fn tint(mut self, tint: [u8; 3]) -> Self {
        self.tint = tint;
        self
    }

    pub fn viewport_override(mut self, size: WindowSize) -> Self {
        self.viewport_override = Some(size);
        self
    }

    pub fn console_message(mut self, url_fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.console_messages.push((url_fragment.into(), message.into()));
        self
    }

    pub fn vanish_after_polls(mut self, polls: u32) -> Self {
        self.vanish_after_polls = Some(polls);
        self
    }

    pub fn external_resize(mut self, after_polls: u32, size: WindowSize) -> Self {
        self.external_resize = Some((after_polls, size));
        self
    }
}

/// Observable driver calls, recorded in launch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Launched(u32),
    Navigated(u32, String),
    Resized(u32, WindowSize),
    Screenshot(u32, WindowSize),
    Quit(u32),
}

/// Launches [`MockBrowser`] sessions sharing one event log
#[derive(Debug, Clone)]
pub struct MockLauncher {
    config: MockBrowserConfig,
    events: Arc<Mutex<Vec<DriverEvent>>>,
    next_session: Arc<AtomicU32>,
}

impl MockLauncher {
    pub fn new(config: MockBrowserConfig) -> Self {
        Self {
            config,
            events: Arc::new(Mutex::new(Vec::new())),
            next_session: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Snapshot of every driver call made so far
    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new(MockBrowserConfig::default())
    }
}

impl BrowserLauncher for MockLauncher {
    fn launch(&self) -> Result<Box<dyn BrowserDriver>> {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let browser = MockBrowser {
            id,
            config: self.config.clone(),
            events: Arc::clone(&self.events),
            size: Some(self.config.initial_size),
            url: None,
            console: Vec::new(),
            polls: 0,
        };
        browser.record(DriverEvent::Launched(id));
        Ok(Box::new(browser))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One mock browser session
pub struct MockBrowser {
    id: u32,
    config: MockBrowserConfig,
    events: Arc<Mutex<Vec<DriverEvent>>>,
    /// `None` once the session has vanished or quit
    size: Option<WindowSize>,
    url: Option<String>,
    console: Vec<ConsoleEntry>,
    polls: u32,
}

impl MockBrowser {
    fn record(&self, event: DriverEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn alive(&self) -> Result<WindowSize> {
        self.size.ok_or_else(|| RegressionError::driver("mock session is closed"))
    }

    fn viewport(&self, outer: WindowSize) -> WindowSize {
        self.config.viewport_override.unwrap_or_else(|| {
            WindowSize::new(
                outer.width.saturating_sub(GUI_WIDTH).max(1),
                outer.height.saturating_sub(GUI_HEIGHT).max(1),
            )
        })
    }

    fn render(&self, viewport: WindowSize) -> MockFramebuffer {
        let tint = self.config.tint;
        let shade = |color: [u8; 3]| {
            [
                color[0].wrapping_add(tint[0]),
                color[1].wrapping_add(tint[1]),
                color[2].wrapping_add(tint[2]),
            ]
        };
        let url = self.url.as_deref().unwrap_or("about:blank");
        let background = shade(page_color(url));
        let mut fb = MockFramebuffer::with_color(viewport.width, viewport.height, background);
        fb.draw_rect(0, 0, viewport.width, 16, shade([32, 32, 32]));
        fb.draw_text(4, 4, url, shade([255, 255, 255]), shade([32, 32, 32]));
        fb
    }
}

impl BrowserDriver for MockBrowser {
    fn navigate(&mut self, url: &str) -> Result<()> {
        self.alive()?;
        self.url = Some(url.to_string());
        for (fragment, message) in &self.config.console_messages {
            if url.contains(fragment.as_str()) {
                self.console.push(ConsoleEntry::new(
                    CONSOLE_API_SOURCE,
                    format!("{} 1:1 \"{}\"", url, message),
                ));
            }
        }
        self.record(DriverEvent::Navigated(self.id, url.to_string()));
        Ok(())
    }

    fn set_window_size(&mut self, size: WindowSize) -> Result<()> {
        self.alive()?;
        self.size = Some(size);
        self.record(DriverEvent::Resized(self.id, size));
        Ok(())
    }

    fn window_size(&mut self) -> Result<Option<WindowSize>> {
        self.polls += 1;
        if let Some(limit) = self.config.vanish_after_polls {
            if self.polls > limit {
                self.size = None;
            }
        }
        if let Some((after, size)) = self.config.external_resize {
            if self.polls > after && self.size.is_some() {
                self.size = Some(size);
            }
        }
        Ok(self.size)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>> {
        let viewport = self.viewport(self.alive()?);
        self.record(DriverEvent::Screenshot(self.id, viewport));
        self.render(viewport).to_png()
    }

    fn console_log(&mut self) -> Result<Vec<ConsoleEntry>> {
        self.alive()?;
        Ok(std::mem::take(&mut self.console))
    }

    fn quit(&mut self) -> Result<()> {
        self.size = None;
        self.record(DriverEvent::Quit(self.id));
        Ok(())
    }
}

/// FNV-1a over the URL, folded into a light colour
fn page_color(url: &str) -> [u8; 3] {
    let hash = url.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    });
    [
        128 | (hash & 0x7f) as u8,
        128 | ((hash >> 8) & 0x7f) as u8,
        128 | ((hash >> 16) & 0x7f) as u8,
    ]
}

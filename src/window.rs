//! Window geometry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Horizontal window decoration the driver cannot remove (pixels)
pub const GUI_WIDTH: u32 = 10;

/// Vertical window decoration (title bar, toolbar) the driver cannot remove (pixels)
pub const GUI_HEIGHT: u32 = 86;

/// Largest viewport width whose outer geometry still fits a `u32`
pub const MAX_WIDTH: u32 = u32::MAX - GUI_WIDTH;

/// Largest viewport height whose outer geometry still fits a `u32`
pub const MAX_HEIGHT: u32 = u32::MAX - GUI_HEIGHT;

/// Name of the window installed when a test opens its browser session
pub const DEFAULT_WINDOW_NAME: &str = "default";

/// Live outer geometry of a browser window as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometry with the browser chrome added back
    pub fn with_chrome(self) -> Self {
        Self::new(
            self.width.saturating_add(GUI_WIDTH),
            self.height.saturating_add(GUI_HEIGHT),
        )
    }

    /// Geometry with the browser chrome taken off (viewport size)
    pub fn without_chrome(self) -> Self {
        Self::new(
            self.width.saturating_sub(GUI_WIDTH),
            self.height.saturating_sub(GUI_HEIGHT),
        )
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A named viewport size. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    width: u32,
    height: u32,
    name: String,
}

impl Window {
    /// Create a window; the name defaults to `<width>x<height>`
    pub fn new(width: u32, height: u32, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| format!("{}x{}", width, height));
        Self { width, height, name }
    }

    /// The window a fresh session starts with
    pub fn default_for(size: WindowSize) -> Self {
        Self::new(size.width, size.height, Some(DEFAULT_WINDOW_NAME.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> WindowSize {
        WindowSize::new(self.width, self.height)
    }

    /// Outer geometry to request from the driver so the viewport ends up this size
    pub fn outer_size(&self) -> WindowSize {
        self.size().with_chrome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_default_name() {
        let window = Window::new(800, 600, None);
        assert_eq!(window.name(), "800x600");
    }

    #[test]
    fn test_window_explicit_name() {
        let window = Window::new(1280, 800, Some("desktop".to_string()));
        assert_eq!(window.name(), "desktop");
        assert_eq!(window.size(), WindowSize::new(1280, 800));
    }

    #[test]
    fn test_outer_size_adds_chrome() {
        let window = Window::new(800, 600, None);
        assert_eq!(window.outer_size(), WindowSize::new(810, 686));
    }

    #[test]
    fn test_with_chrome_saturates() {
        let largest = WindowSize::new(MAX_WIDTH, MAX_HEIGHT).with_chrome();
        assert_eq!(largest, WindowSize::new(u32::MAX, u32::MAX));
        assert_eq!(WindowSize::new(u32::MAX, 600).with_chrome(), WindowSize::new(u32::MAX, 686));
    }

    #[test]
    fn test_without_chrome_saturates() {
        assert_eq!(WindowSize::new(810, 686).without_chrome(), WindowSize::new(800, 600));
        assert_eq!(WindowSize::new(5, 50).without_chrome(), WindowSize::new(0, 0));
    }

    #[test]
    fn test_default_window() {
        let window = Window::default_for(WindowSize::new(1024, 768));
        assert_eq!(window.name(), "default");
        assert_eq!(window.width(), 1024);
    }
}

//! Shell color palette.
//!
//! Truecolor terminals (`COLORTERM=truecolor|24bit`) get the RGB palette;
//! everything else falls back to the closest basic ANSI color. Whether color
//! is emitted at all is left to `colored` (`NO_COLOR`, non-tty output).

use colored::Color;

/// Terminal color depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSupport {
    Basic,
    Truecolor,
}

impl ColorSupport {
    pub fn detect() -> Self {
        Self::from_colorterm(std::env::var("COLORTERM").ok().as_deref())
    }

    fn from_colorterm(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("truecolor") || v.eq_ignore_ascii_case("24bit") => {
                Self::Truecolor
            }
            _ => Self::Basic,
        }
    }
}

/// Colors used by the shell output.
pub struct ShellColors {
    support: ColorSupport,
}

impl ShellColors {
    /// Prompt and row numbers: cyan (#00D9FF)
    pub const PRIMARY_RGB: (u8, u8, u8) = (0, 217, 255);
    /// Timing lines: green (#10B981)
    pub const SUCCESS_RGB: (u8, u8, u8) = (16, 185, 129);
    /// Pager marker: yellow (#F59E0B)
    pub const WARNING_RGB: (u8, u8, u8) = (245, 158, 11);
    /// Errors: red (#EF4444)
    pub const ERROR_RGB: (u8, u8, u8) = (239, 68, 68);

    pub fn new() -> Self {
        Self { support: ColorSupport::detect() }
    }

    #[cfg(test)]
    pub fn with_support(support: ColorSupport) -> Self {
        Self { support }
    }

    fn pick(&self, rgb: (u8, u8, u8), basic: Color) -> Color {
        match self.support {
            ColorSupport::Truecolor => Color::TrueColor { r: rgb.0, g: rgb.1, b: rgb.2 },
            ColorSupport::Basic => basic,
        }
    }

    pub fn primary(&self) -> Color {
        self.pick(Self::PRIMARY_RGB, Color::Cyan)
    }

    pub fn success(&self) -> Color {
        self.pick(Self::SUCCESS_RGB, Color::Green)
    }

    pub fn warning(&self) -> Color {
        self.pick(Self::WARNING_RGB, Color::Yellow)
    }

    pub fn error(&self) -> Color {
        self.pick(Self::ERROR_RGB, Color::Red)
    }
}

impl Default for ShellColors {
    fn default() -> Self {
        Self::new()
    }
}

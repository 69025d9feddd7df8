use clap::builder::styling::{AnsiColor, Color as ClapColor, RgbColor};
use colored::Color;
use comfy_table::Color as TableColor;
use once_cell::sync::Lazy;

/// CLI color theme configuration
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub primary: Color,
    pub secondary: Color,
    pub key: Color,
    pub value: Color,
    /// Table header cells
    pub header: Color,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            info: Color::Blue,
            highlight: Color::Cyan,
            muted: Color::BrightBlack,
            primary: Color::BrightGreen,
            secondary: Color::Magenta,
            key: Color::BrightCyan,
            value: Color::White,
            header: Color::Cyan,
        }
    }
}

pub static THEME: Lazy<ColorTheme> = Lazy::new(ColorTheme::default);

/// Same color for comfy-table cells.
pub fn table_color(color: Color) -> TableColor {
    match color {
        Color::Black => TableColor::Black,
        Color::Red => TableColor::DarkRed,
        Color::Green => TableColor::DarkGreen,
        Color::Yellow => TableColor::DarkYellow,
        Color::Blue => TableColor::DarkBlue,
        Color::Magenta => TableColor::DarkMagenta,
        Color::Cyan => TableColor::DarkCyan,
        Color::White => TableColor::Grey,
        Color::BrightBlack => TableColor::DarkGrey,
        Color::BrightRed => TableColor::Red,
        Color::BrightGreen => TableColor::Green,
        Color::BrightYellow => TableColor::Yellow,
        Color::BrightBlue => TableColor::Blue,
        Color::BrightMagenta => TableColor::Magenta,
        Color::BrightCyan => TableColor::Cyan,
        Color::BrightWhite => TableColor::White,
        Color::TrueColor { r, g, b } => TableColor::Rgb { r, g, b },
    }
}

/// Same color for clap help styles.
pub fn clap_color(color: Color) -> ClapColor {
    let ansi = match color {
        Color::Black => AnsiColor::Black,
        Color::Red => AnsiColor::Red,
        Color::Green => AnsiColor::Green,
        Color::Yellow => AnsiColor::Yellow,
        Color::Blue => AnsiColor::Blue,
        Color::Magenta => AnsiColor::Magenta,
        Color::Cyan => AnsiColor::Cyan,
        Color::White => AnsiColor::White,
        Color::BrightBlack => AnsiColor::BrightBlack,
        Color::BrightRed => AnsiColor::BrightRed,
        Color::BrightGreen => AnsiColor::BrightGreen,
        Color::BrightYellow => AnsiColor::BrightYellow,
        Color::BrightBlue => AnsiColor::BrightBlue,
        Color::BrightMagenta => AnsiColor::BrightMagenta,
        Color::BrightCyan => AnsiColor::BrightCyan,
        Color::BrightWhite => AnsiColor::BrightWhite,
        Color::TrueColor { r, g, b } => return ClapColor::Rgb(RgbColor(r, g, b)),
    };
    ClapColor::Ansi(ansi)
}

/// Icons for different message types
pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub arrow: &'static str,
    pub bullet: &'static str,
    pub loading: &'static str,
    pub file: &'static str,
    pub folder: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    loading: "⟳",
    file: "📄",
    folder: "📁",
};

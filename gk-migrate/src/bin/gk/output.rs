use anyhow::Result;
use clap::ValueEnum;
use colored::{Color, Colorize};
use comfy_table::{Attribute, Cell, Table, presets};
use serde::Serialize;
use std::io::Write;

use crate::theme::{ICONS, THEME, table_color};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table or a compact line.
pub trait TableDisplay {
    fn to_table(&self, output: &OutputManager) -> Table;
    fn to_compact(&self) -> String;
}

/// Formats and prints everything the CLI shows the user.
///
/// Status messages are suppressed by `--quiet` and by `--output json`, so JSON
/// output stays machine-readable. Errors always go to stderr.
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    fn chatty(&self) -> bool {
        !self.options.quiet && self.options.output_format != OutputFormat::Json
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.options.no_color {
            text.to_string()
        } else {
            text.color(color).to_string()
        }
    }

    /// `<icon> <message>`, with both in `color`.
    fn status_line(&self, icon: &str, color: Color, message: &str) -> String {
        format!("{} {}", self.paint(icon, color), self.paint(message, color))
    }

    /// Print data in the configured output format.
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
            OutputFormat::Table => println!("{}", data.to_table(self)),
            OutputFormat::Compact => println!("{}", data.to_compact()),
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if self.chatty() {
            println!("{}", self.status_line(ICONS.success, THEME.success, message));
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.status_line(ICONS.error, THEME.error, message));
    }

    pub fn warning(&self, message: &str) {
        if self.chatty() {
            println!("{}", self.status_line(ICONS.warning, THEME.warning, message));
        }
    }

    pub fn info(&self, message: &str) {
        if self.chatty() {
            println!("{}", self.status_line(ICONS.info, THEME.info, message));
        }
    }

    /// Only shown with `--verbose`; goes to stderr.
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{}", self.status_line(ICONS.arrow, THEME.muted, message));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.chatty() {
            return;
        }
        if self.options.no_color {
            println!("\n{text}\n{}", "=".repeat(text.chars().count()));
        } else {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.chatty() {
            return;
        }
        let key = if self.options.no_color {
            key.to_string()
        } else {
            key.color(THEME.key).bold().to_string()
        };
        println!("  {key}: {}", self.paint(value, THEME.value));
    }

    pub fn bullet(&self, text: &str) {
        self.indented(ICONS.bullet, text);
    }

    /// Indented line with a muted leading icon.
    pub fn indented(&self, icon: &str, text: &str) {
        if self.chatty() {
            println!("  {} {text}", self.paint(icon, THEME.muted));
        }
    }

    /// Table using the UTF-8 preset, or plain ASCII with `--no-color`.
    pub fn create_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(if self.options.no_color {
            presets::ASCII_FULL
        } else {
            presets::UTF8_FULL_CONDENSED
        });
        table
    }

    pub fn add_table_header(&self, table: &mut Table, headers: &[&str]) {
        table.set_header(headers.iter().map(|header| {
            let cell = Cell::new(header).add_attribute(Attribute::Bold);
            self.color_cell(cell, THEME.header)
        }));
    }

    /// Apply a theme color to a table cell unless colors are disabled.
    pub fn color_cell(&self, cell: Cell, color: Color) -> Cell {
        if self.options.no_color {
            cell
        } else {
            cell.fg(table_color(color))
        }
    }

    /// Transient progress line; call [`clear_line`](Self::clear_line) when done.
    pub fn progress(&self, message: &str) {
        if !self.chatty() {
            return;
        }
        let icon = if self.options.no_color {
            ICONS.loading.to_string()
        } else {
            ICONS.loading.color(THEME.highlight).bold().to_string()
        };
        print!("\r{icon} {}...", self.paint(message, THEME.highlight));
        std::io::stdout().flush().ok();
    }

    pub fn clear_line(&self) {
        if !self.chatty() {
            return;
        }
        print!("\r{}\r", " ".repeat(80));
        std::io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        key: String,
        runs: i32,
    }

    impl TableDisplay for Row {
        fn to_table(&self, output: &OutputManager) -> Table {
            let mut table = output.create_table();
            output.add_table_header(&mut table, &["Key", "Runs"]);
            table.add_row(vec![Cell::new(&self.key), Cell::new(self.runs)]);
            table
        }

        fn to_compact(&self) -> String {
            format!("{}={}", self.key, self.runs)
        }
    }

    fn row() -> Row {
        Row {
            key: "0001_init".to_string(),
            runs: 1,
        }
    }

    #[test]
    fn test_json_output_is_not_chatty() {
        let manager = OutputManager::new(GlobalOptions {
            output_format: OutputFormat::Json,
            ..Default::default()
        });

        assert!(manager.display(&row()).is_ok());
        assert!(!manager.chatty());
    }

    #[test]
    fn test_quiet_display_is_ok() {
        let manager = OutputManager::new(GlobalOptions {
            quiet: true,
            ..Default::default()
        });

        assert!(manager.display(&row()).is_ok());
        assert!(!manager.chatty());
    }

    #[test]
    fn test_plain_table_uses_ascii_preset() {
        let manager = OutputManager::new(GlobalOptions {
            no_color: true,
            ..Default::default()
        });

        let rendered = row().to_table(&manager).to_string();
        assert!(rendered.contains("0001_init"));
        assert!(rendered.contains('+'));
        assert_eq!(manager.status_line("*", THEME.success, "done"), "* done");
    }
}

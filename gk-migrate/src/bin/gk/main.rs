mod commands;
mod discovery;
mod examples;
mod generator;
mod output;
mod theme;
mod utils;

use anyhow::Result;
use clap::{
    ColorChoice, Command, CommandFactory, FromArgMatches, Parser, Subcommand,
    builder::{Styles, styling::Style},
    error::ErrorKind,
};

use colored::{Color as ThemeColor, Colorize, control::ShouldColorize};
use std::fmt::Write;
use std::io::{self, Write as IoWrite};

use commands::{
    generate::{GenerateArgs, handle_generate},
    init::{InitArgs, handle_init},
    resolve::{ResolveArgs, handle_resolve},
    status::handle_status,
};
use examples::{ExampleGroup, command_examples};
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{ICONS, THEME, clap_color};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("MONGO_URL", "Connection URL; when set, 'gk init' writes ${MONGO_URL} into config.json"),
    ("RUST_LOG", "Log filter for diagnostic output (e.g., debug)"),
];

#[derive(Parser)]
#[command(name = "gk")]
#[command(version)]
#[command(
    about = "MongoDB migration scaffolding for Rust projects",
    long_about = r#"Migration CLI for MongoDB projects that provides:

• Timestamped migration stubs that register themselves
• A generated migrator binary that applies pending migrations in key order
• A bookkeeping collection so every migration runs exactly once

Commands:
  init      Initialize gk migrations in a project
  generate  Create a new migration file
  status    Show applied and pending migrations
  resolve   Mark a migration as applied or release a stale claim
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn parse_with_styles() -> Self {
        let command = build_cli_command();
        let err = match command.styles(help_styles()).try_get_matches() {
            Ok(matches) => return Cli::from_arg_matches(&matches).expect("Failed to parse CLI arguments"),
            Err(err) => err,
        };

        match err.kind() {
            ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                print_long_help(err.exit_code())
            }
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print_clap_message(&err, io::stdout, "help");
                std::process::exit(0);
            }
            _ => {
                print_clap_message(&err, io::stderr, "error");
                std::process::exit(err.exit_code());
            }
        }
    }
}

fn print_clap_message<W: IoWrite>(err: &clap::error::Error, stream: fn() -> W, what: &str) {
    blank_line(stream());
    if let Err(print_err) = err.print()
        && print_err.kind() != io::ErrorKind::BrokenPipe
    {
        eprintln!("Failed to display {what}: {print_err}");
    }
    blank_line(stream());
}

fn print_long_help(exit_code: i32) -> ! {
    let mut command = build_cli_command().styles(help_styles());

    blank_line(io::stderr());
    let mut stderr = io::stderr();
    if command.write_long_help(&mut stderr).is_ok() {
        blank_line(&mut stderr);
    }
    blank_line(io::stderr());

    std::process::exit(exit_code);
}

fn build_cli_command() -> Command {
    let use_color = detect_color_support();
    let appendix = render_top_level_appendix(use_color);
    let mut command = Cli::command().after_long_help(appendix);
    command = command.color(if use_color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    });
    attach_command_examples(&mut command, use_color);
    command
}

fn attach_command_examples(command: &mut Command, use_color: bool) {
    for example in command_examples() {
        if let Some(subcommand) = command.find_subcommand_mut(example.name) {
            *subcommand = subcommand
                .clone()
                .after_long_help(render_examples(example.groups, use_color));
        }
    }
}

fn render_examples(groups: &[ExampleGroup], use_color: bool) -> String {
    let theme = &THEME;
    let mut buffer = String::new();

    let heading = stylize("Examples:", theme.highlight, true, use_color);
    let _ = writeln!(buffer, "{heading}");

    for (index, group) in groups.iter().enumerate() {
        let title = stylize(group.title, theme.primary, true, use_color);
        let _ = writeln!(buffer, "  {title}");

        let arrow = stylize(ICONS.arrow, theme.secondary, false, use_color);
        for command in group.commands {
            let command_text = stylize(command, theme.secondary, false, use_color);
            let _ = writeln!(buffer, "    {arrow} {command_text}");
        }

        if index + 1 < groups.len() {
            buffer.push('\n');
        }
    }

    buffer
}

fn render_top_level_appendix(use_color: bool) -> String {
    let theme = &THEME;
    let mut buffer = String::new();

    let env_heading = stylize("Environment Variables:", theme.highlight, true, use_color);
    let _ = writeln!(buffer, "{env_heading}");
    let width = ENVIRONMENT_VARIABLES.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, description) in ENVIRONMENT_VARIABLES {
        let key_text = stylize(&format!("{key:<width$}"), theme.key, true, use_color);
        let value_text = stylize(description, theme.value, false, use_color);
        let _ = writeln!(buffer, "  {key_text}  {value_text}");
    }

    buffer.push('\n');

    let tip_heading = stylize("Tip:", theme.highlight, true, use_color);
    let tip_text = stylize(
        "Use 'gk <command> --help' to view examples for each command.",
        theme.secondary,
        false,
        use_color,
    );
    let _ = writeln!(buffer, "{tip_heading} {tip_text}");

    if !buffer.ends_with('\n') {
        buffer.push('\n');
    }

    buffer
}

/// Write a blank line, ignoring broken pipes and closed streams.
fn blank_line(mut stream: impl IoWrite) {
    let _ = stream.write_all(b"\n").and_then(|()| stream.flush());
}

fn stylize(text: &str, color: ThemeColor, bold: bool, use_color: bool) -> String {
    if use_color {
        let styled = text.color(color);
        if bold {
            styled.bold().to_string()
        } else {
            styled.to_string()
        }
    } else {
        text.to_string()
    }
}

fn detect_color_support() -> bool {
    ShouldColorize::from_env().should_colorize()
}

fn help_styles() -> Styles {
    let theme = &THEME;
    Styles::styled()
        .usage(style_from_color(theme.primary).bold())
        .header(style_from_color(theme.highlight).bold())
        .literal(style_from_color(theme.secondary))
        .placeholder(style_from_color(theme.muted))
        .valid(style_from_color(theme.success))
        .invalid(style_from_color(theme.warning))
        .error(style_from_color(theme.error).bold())
}

fn style_from_color(color: ThemeColor) -> Style {
    Style::new().fg_color(Some(clap_color(color)))
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize gk migrations in the current project
    Init(InitArgs),

    /// Generate a new timestamped migration file
    Generate(GenerateArgs),

    /// Show which migrations are applied, running or pending
    Status,

    /// Mark a migration as applied or release a stale claim
    Resolve(ResolveArgs),
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse_with_styles();

    blank_line(io::stdout());

    match execute(cli).await {
        Ok(()) => {
            blank_line(io::stdout());
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            blank_line(io::stdout());
            std::process::exit(1);
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let global_options = GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };

    if global_options.no_color {
        colored::control::set_override(false);
    }

    let output = OutputManager::new(global_options);

    match cli.command {
        Commands::Init(args) => handle_init(args, &output).await?,
        Commands::Generate(args) => handle_generate(args, &output).await?,
        Commands::Status => handle_status(&output).await?,
        Commands::Resolve(args) => handle_resolve(args, &output).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve_requires_one_flag() {
        assert!(Cli::try_parse_from(["gk", "resolve", "0001_init"]).is_err());
        assert!(Cli::try_parse_from(["gk", "resolve", "0001_init", "--applied", "--release"]).is_err());

        let cli = Cli::try_parse_from(["gk", "resolve", "0001_init", "--release"]).unwrap();
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.key, "0001_init");
                assert!(args.release);
                assert!(!args.applied);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gk", "status", "--output", "json", "-q"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_examples_attach_to_every_command() {
        let names: Vec<&str> = command_examples().iter().map(|example| example.name).collect();
        for name in names {
            assert!(Cli::command().find_subcommand(name).is_some(), "unknown command {name}");
        }
    }

    #[test]
    fn test_render_examples_without_color() {
        let rendered = render_examples(commands::status::EXAMPLES, false);
        assert!(rendered.starts_with("Examples:\n  Migration Status\n"));
        assert!(rendered.contains("→ gk status"));
    }
}

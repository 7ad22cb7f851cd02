use std::sync::Arc;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tabled::{Table, Tabled, settings::Style};

use soundlens::{config, error, server, success, warning};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the SoundLens server
    Serve,

    /// Check the environment configuration
    Check,

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[derive(Tabled)]
struct EnvRow {
    #[tabled(rename = "Variable")]
    name: &'static str,
    #[tabled(rename = "Set")]
    set: &'static str,
}

async fn check_env() {
    let rows: Vec<EnvRow> = config::REQUIRED_VARS
        .iter()
        .copied()
        .map(|name| EnvRow {
            name,
            set: if std::env::var(name).is_ok_and(|v| !v.is_empty()) {
                "✓"
            } else {
                "✗"
            },
        })
        .collect();
    let missing = rows.iter().filter(|r| r.set == "✗").count();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    if missing == 0 {
        success!("Environment looks complete.");
    } else {
        warning!("{} variable(s) missing. See .env.example.", missing);
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            let cfg = match config::Config::from_env() {
                Ok(cfg) => cfg,
                Err(e) => error!("{}", e),
            };
            let state = Arc::new(server::AppState::new(cfg).await);
            if let Err(e) = server::start_api_server(state).await {
                error!("Server failed: {}", e);
            }
        }
        Command::Check => check_env().await,
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}

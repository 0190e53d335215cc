use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "A goal-directed browser exploration agent",
    long_about = "Kestrel drives a real browser toward a stated goal: it executes actions, \
                  observes the page between batches, clears cookie banners and login walls, \
                  and exchanges observations and decisions with an external decision-maker \
                  through a file mailbox. It can also replay fixed scenarios without one."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a site toward a goal, driven by an external decision-maker
    Explore {
        /// Start URL
        #[arg(value_name = "URL")]
        url: String,

        /// What the session is trying to accomplish
        #[arg(short, long)]
        goal: String,

        /// Decision cycles allowed before the session fails
        #[arg(long, default_value_t = 20)]
        max_steps: u32,

        /// Seconds to wait for each decision
        #[arg(long, default_value_t = 300)]
        decision_timeout: u64,

        /// Directory for the observation/decision mailbox
        #[arg(long, default_value = ".kestrel")]
        exchange_dir: PathBuf,

        /// Directory for screenshots and other artifacts
        #[arg(long, default_value = "kestrel-artifacts")]
        artifacts_dir: PathBuf,

        /// Username for login walls
        #[arg(long)]
        username: Option<String>,

        /// Password for login walls
        #[arg(long, env = "KESTREL_PASSWORD")]
        password: Option<String>,

        /// Path to the Chrome binary
        #[arg(long)]
        chrome_path: Option<PathBuf>,

        /// Run Chrome with a visible window
        #[arg(long)]
        headed: bool,

        /// Persistent Chrome profile directory (temporary profile otherwise)
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Run a fixed scenario from a YAML file
    Run {
        /// Path to the scenario file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the run report to a JSON file
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Path to the Chrome binary
        #[arg(long)]
        chrome_path: Option<PathBuf>,

        /// Run Chrome with a visible window
        #[arg(long)]
        headed: bool,

        /// Persistent Chrome profile directory (temporary profile otherwise)
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    #[command(long_about = "Generate shell completion scripts for kestrel.

SUPPORTED SHELLS:
    bash, zsh, fish, powershell, elvish

INSTALLATION:
    Bash:       kestrel completion --shell bash >> ~/.bashrc
    Zsh:        kestrel completion --shell zsh > ~/.zfunc/_kestrel
                (add 'fpath+=~/.zfunc' to ~/.zshrc before compinit)
    Fish:       kestrel completion --shell fish > ~/.config/fish/completions/kestrel.fish
    PowerShell: kestrel completion --shell powershell >> $PROFILE")]
    Completion {
        /// Shell to generate completions for
        #[arg(long, value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Explore {
            url,
            goal,
            max_steps,
            decision_timeout,
            exchange_dir,
            artifacts_dir,
            username,
            password,
            chrome_path,
            headed,
            profile,
        } => commands::explore::execute(commands::explore::ExploreArgs {
            url,
            goal,
            max_steps,
            decision_timeout,
            exchange_dir,
            artifacts_dir,
            username,
            password,
            chrome_path,
            headed,
            profile,
        }),
        Commands::Run {
            file,
            report,
            chrome_path,
            headed,
            profile,
        } => commands::run::execute(&file, report, chrome_path, headed, profile),
        Commands::Completion { shell } => {
            commands::completion::execute(shell, &mut Cli::command())
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("kestrel=debug,kestrel_core=debug,kestrel_browser=debug,kestrel_engine=debug")
    } else {
        EnvFilter::new("kestrel=info,kestrel_engine=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use kestrel_browser::{CdpDriver, ChromeConfig, Driver};
use kestrel_core::session::SessionStatus;
use kestrel_engine::{Credentials, ExploreConfig, FileExchange, SessionOrchestrator};

pub struct ExploreArgs {
    pub url: String,
    pub goal: String,
    pub max_steps: u32,
    pub decision_timeout: u64,
    pub exchange_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub headed: bool,
    pub profile: Option<PathBuf>,
}

pub fn execute(args: ExploreArgs) -> Result<()> {
    // Argument problems surface before a browser is started
    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        (None, None) => None,
        _ => anyhow::bail!("--username and --password must be given together"),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        println!("🚀 Launching Chrome...");
        tracing::debug!(headed = args.headed, "Launching browser");
        let chrome_config = ChromeConfig {
            chrome_path: args.chrome_path,
            headed: args.headed,
            profile_dir: args.profile,
            ..Default::default()
        };
        let driver = CdpDriver::launch(&chrome_config)
            .await
            .context("could not start the browser")?;
        let driver: Arc<dyn Driver> = Arc::new(driver);

        let exchange = FileExchange::new(&args.exchange_dir)
            .context("could not prepare the exchange directory")?;
        println!("📬 Exchange mailbox: {}", args.exchange_dir.display());
        println!("🎯 Goal: {}", args.goal);

        let mut config = ExploreConfig::new(args.url, args.goal);
        config.max_steps = args.max_steps;
        config.decision_timeout = Duration::from_secs(args.decision_timeout);
        config.credentials = credentials;
        config.artifacts_dir = args.artifacts_dir;

        tracing::info!(
            max_steps = config.max_steps,
            timeout_s = args.decision_timeout,
            "Starting exploration"
        );
        let orchestrator = SessionOrchestrator::new(driver, Arc::new(exchange), config);
        let session = orchestrator.run().await?;

        println!();
        match &session.status {
            SessionStatus::Completed => {
                println!(
                    "{} Goal achieved in {} steps ({} obstacles cleared)",
                    style("✅").green(),
                    session.steps_taken,
                    session.obstacles_cleared
                );
                println!("📝 Session record: {}", args.exchange_dir.join("session.json").display());
                Ok(())
            }
            SessionStatus::Failed { kind, reason } => {
                println!(
                    "{} Session failed after {} steps ({:?}): {}",
                    style("❌").red(),
                    session.steps_taken,
                    kind,
                    reason
                );
                anyhow::bail!("session did not reach its goal")
            }
            SessionStatus::Running => anyhow::bail!("session ended without a terminal status"),
        }
    })
}

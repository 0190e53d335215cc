use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;

use kestrel_browser::{CdpDriver, ChromeConfig, Driver};
use kestrel_core::scenario::Scenario;
use kestrel_engine::{ScenarioReport, ScenarioRunner, StepStatus};

pub fn execute(
    file: &Path,
    report_path: Option<PathBuf>,
    chrome_path: Option<PathBuf>,
    headed: bool,
    profile: Option<PathBuf>,
) -> Result<()> {
    // Load and validate before any browser is started, so a broken
    // scenario fails fast
    let scenario = Scenario::load(file)
        .with_context(|| format!("could not load scenario from {}", file.display()))?;
    tracing::debug!(file = %file.display(), steps = scenario.steps.len(), "Scenario loaded");
    println!(
        "📋 Scenario: {} ({} steps)",
        scenario.name,
        scenario.steps.len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(async {
        println!("🚀 Launching Chrome...");
        let chrome_config = ChromeConfig {
            chrome_path,
            headed,
            profile_dir: profile,
            ..Default::default()
        };
        let driver = CdpDriver::launch(&chrome_config)
            .await
            .context("could not start the browser")?;
        let driver: Arc<dyn Driver> = Arc::new(driver);

        let runner = ScenarioRunner::new(driver);
        runner.run(&scenario).await.context("scenario run failed")
    })?;

    tracing::info!(
        scenario = %report.scenario,
        passed = report.passed(),
        failed = report.failed_steps().len(),
        "Scenario finished"
    );
    print_report(&report);

    if let Some(path) = report_path {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("could not write report to {}", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }

    if report.passed() {
        Ok(())
    } else {
        anyhow::bail!("{} step(s) failed", report.failed_steps().len())
    }
}

fn print_report(report: &ScenarioReport) {
    println!();
    for step in &report.steps {
        match step.status {
            StepStatus::Passed => println!(
                "  {} {} ({} ms)",
                style("✅").green(),
                step.name,
                step.duration_ms
            ),
            StepStatus::Failed => println!(
                "  {} {}: {}",
                style("❌").red(),
                step.name,
                step.error.as_deref().unwrap_or("failed")
            ),
            StepStatus::Skipped => {
                println!("  {} {} (skipped)", style("⏭").yellow(), step.name)
            }
        }
    }
    for expectation in &report.expectations {
        let mark = if expectation.satisfied {
            style("✅").green()
        } else {
            style("❌").red()
        };
        println!("  {} expect {}", mark, expectation.condition);
    }
}

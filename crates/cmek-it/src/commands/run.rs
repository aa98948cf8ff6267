use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;

use cmek_admin::InMemoryControlPlane;
use cmek_convergence::{RecordingSleeper, Sleeper, TokioSleeper};
use cmek_harness::{Harness, HarnessConfig, ScenarioKind, ScenarioReport, Verdict, run_suite};

pub const SANDBOX_PROJECT: &str = "cmek-sandbox";
pub const SANDBOX_KEY: &str =
    "projects/cmek-sandbox/locations/us-central1/keyRings/cmek-it/cryptoKeys/cmek-it-key";

pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub scenario: String,
    pub wait_for_key_status: bool,
    pub convergence_reads: u32,
    pub transient_failures: u32,
    pub skip_sleep: bool,
    pub json: bool,
}

pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HarnessConfig::scaffold(SANDBOX_PROJECT, SANDBOX_KEY),
    }
    .with_env_overrides()?;
    if options.wait_for_key_status {
        config.wait_for_key_status = true;
    }

    let kinds = parse_scenarios(&options.scenario)?;

    let plane = InMemoryControlPlane::new(&config.project_id)
        .with_convergence_reads(options.convergence_reads)
        .with_transient_failures(options.transient_failures);
    let sleeper: Arc<dyn Sleeper> = if options.skip_sleep {
        Arc::new(RecordingSleeper::new())
    } else {
        Arc::new(TokioSleeper)
    };

    info!(
        project_id = %config.project_id,
        kms_key_name = %config.kms_key_name,
        wait_for_key_status = config.wait_for_key_status,
        scenarios = kinds.len(),
        "starting scenarios"
    );
    let harness = Arc::new(Harness::new(config, Arc::new(plane), sleeper)?);
    let reports = run_suite(harness, &kinds).await;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", format_report(report));
        }
    }

    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{failed} of {} scenarios failed", reports.len());
    }
    Ok(())
}

fn parse_scenarios(name: &str) -> anyhow::Result<Vec<ScenarioKind>> {
    if name == "all" {
        return Ok(ScenarioKind::ALL.to_vec());
    }
    let kind = name.parse::<ScenarioKind>().map_err(anyhow::Error::msg)?;
    Ok(vec![kind])
}

fn format_report(report: &ScenarioReport) -> String {
    let head = format!(
        "{:<16} {:<32} {:>6} ms",
        report.scenario.name(),
        report.instance_id,
        report.duration_ms
    );
    match &report.verdict {
        Verdict::Passed => format!("PASS  {head}"),
        Verdict::Failed { reason } => format!("FAIL  {head}\n      {reason}"),
    }
}

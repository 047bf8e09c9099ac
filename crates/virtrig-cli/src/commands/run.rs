use super::{json_pretty, load_config, EXIT_DIRTY, EXIT_FAILURE, EXIT_SUCCESS};
use serde::Serialize;
use std::path::{Path, PathBuf};
use virtrig_core::{Harness, PlanOptions, RunLock, TestPlan};

pub struct RunArgs {
    pub only: Vec<String>,
    pub skip: Vec<String>,
    pub smoke: bool,
    pub whitelist: Option<PathBuf>,
    pub blacklist: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub no_check: bool,
    pub no_recover: bool,
}

#[derive(Serialize)]
struct TestSummary {
    test: String,
    status: String,
    dirty: bool,
    duration_secs: f64,
}

#[derive(Serialize)]
struct RunSummary {
    total: usize,
    passed: usize,
    failed: usize,
    dirty: usize,
    tests: Vec<TestSummary>,
}

pub fn run(config_path: &Path, args: RunArgs, json: bool) -> Result<u8, String> {
    let mut config = load_config(config_path)?;
    if let Some(report) = &args.report {
        config.report.xml_path = report.display().to_string();
    }

    let _lock = RunLock::acquire(Path::new(".virtrig.lock")).map_err(|e| e.to_string())?;

    let mut harness = Harness::new(config.clone()).map_err(|e| e.to_string())?;
    let options = PlanOptions {
        only: args.only,
        skip: args.skip,
        smoke: args.smoke,
        whitelist: args.whitelist,
        blacklist: args.blacklist,
    };
    let plan = TestPlan::assemble(&config.suite.list_command, harness.runner(), &options)
        .map_err(|e| e.to_string())?;
    plan.write(Path::new(&config.suite.plan_file))
        .map_err(|e| e.to_string())?;

    if plan.is_empty() {
        println!("no tests selected");
        return Ok(EXIT_SUCCESS);
    }

    let outcomes = harness
        .run(&plan, !args.no_check, !args.no_recover)
        .map_err(|e| e.to_string())?;

    let summary = RunSummary {
        total: outcomes.len(),
        passed: outcomes.iter().filter(|o| o.status.is_success()).count(),
        failed: outcomes.iter().filter(|o| !o.status.is_success()).count(),
        dirty: outcomes.iter().filter(|o| o.dirty).count(),
        tests: outcomes
            .iter()
            .map(|o| TestSummary {
                test: o.test.clone(),
                status: o.status.to_string(),
                dirty: o.dirty,
                duration_secs: o.duration.as_secs_f64(),
            })
            .collect(),
    };

    if json {
        println!("{}", json_pretty(&summary)?);
    } else {
        for outcome in &outcomes {
            println!(
                "{} {}{} ({:.2}s)",
                outcome.test,
                outcome.status,
                if outcome.dirty { " DIFF" } else { "" },
                outcome.duration.as_secs_f64()
            );
            for line in &outcome.diff_lines {
                println!("   {line}");
            }
        }
        println!(
            "{} total, {} passed, {} failed, {} dirty",
            summary.total, summary.passed, summary.failed, summary.dirty
        );
        println!("report written to {}", config.report.xml_path);
    }

    if summary.failed > 0 {
        Ok(EXIT_FAILURE)
    } else if summary.dirty > 0 {
        Ok(EXIT_DIRTY)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

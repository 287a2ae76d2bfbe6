use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use dcsim_core::{load_requests, load_workload};
use dcsim_dr::{MicroLp, Simulation};

use super::load_config;
use crate::sink::JsonLinesSink;

pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub workload: PathBuf,
    pub requests: Option<PathBuf>,
    pub output: PathBuf,
    pub length: Option<i64>,
}

pub fn run(args: &RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(length) = args.length {
        config.cluster.length = length;
        config.validate().context("validating config")?;
    }

    let workload = load_workload(&args.workload, &config)
        .with_context(|| format!("loading workload {}", args.workload.display()))?;
    let requests = match &args.requests {
        Some(path) => load_requests(path).with_context(|| format!("loading requests {}", path.display()))?,
        None => Vec::new(),
    };
    info!(
        jobs = workload.jobs.len(),
        requests = requests.len(),
        length = config.cluster.length,
        output = %args.output.display(),
        "inputs loaded"
    );

    let sink = JsonLinesSink::create(&args.output)?;
    let mut simulation = Simulation::from_config(&config, &workload, requests, Arc::new(MicroLp), sink)?;
    let summary = simulation.run()?;
    simulation.into_sink().flush()?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

use anyhow::{Context as _, Result};
use declarative::{ComponentReader, HostStateManager, Plan, Planner, PlannerConfig};

use super::Session;
use crate::Context;
use crate::cli::PlanArgs;
use crate::repository::SourceRepository;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open()?;
    let plan = build(
        &session.systemd,
        &session.installed(),
        &session.source(),
        &session.hostname,
        session.config.planner_config(),
    )?;

    if args.json {
        println!("{}", plan.to_json().context("Failed to serialize plan")?);
        return Ok(());
    }

    if plan.is_empty() {
        ui::success("Nothing to do");
        return Ok(());
    }
    if !ctx.quiet {
        ui::header(&format!("Plan for {}", session.hostname));
    }
    ui::print_plan(&plan, args.diff);
    Ok(())
}

/// Load both sides and plan the changes for `hostname`.
pub fn build(
    host: &dyn HostStateManager,
    installed: &dyn ComponentReader,
    source: &SourceRepository,
    hostname: &str,
    config: PlannerConfig,
) -> Result<Plan> {
    let installed = installed
        .read_all()
        .context("Could not load installed components")?;
    let assigned = source
        .read_assigned(hostname)
        .context("Could not load assigned components")?;
    log::info!(
        "{} installed, {} assigned components",
        installed.len(),
        assigned.len()
    );

    let plan = Planner::new(host, config)
        .plan(installed, assigned)
        .context("Planning failed")?;
    for (name, state) in plan.states() {
        log::debug!("{}: {}", name, state);
    }
    Ok(plan)
}

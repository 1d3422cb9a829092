use anyhow::{Context as _, Result};
use declarative::{
    CancelToken, ComponentWriter, ExecuteOptions, ExecuteSummary, Executor, HostStateManager, Plan,
};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::Session;
use crate::Context;
use crate::cli::UpdateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: UpdateArgs) -> Result<()> {
    let session = Session::open()?;
    let installed = session.installed();
    let plan = super::plan::build(
        &session.systemd,
        &installed,
        &session.source(),
        &session.hostname,
        session.config.planner_config(),
    )?;

    if plan.is_empty() {
        ui::success("Nothing to do");
        return Ok(());
    }

    ui::header(&format!("Updating {}", session.hostname));
    ui::print_plan(&plan, false);
    println!();

    if args.dry_run {
        ui::warn("Dry run - no changes made");
        return Ok(());
    }
    if !args.yes && !confirm_proceed(plan.len())? {
        ui::info("Aborted");
        return Ok(());
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("Could not install Ctrl-C handler")?;

    let spinner = spinner(ctx, plan.len());
    let result = apply(
        &session.systemd,
        &installed,
        session.config.execute_options(),
        cancel,
        &plan,
    );
    spinner.finish_and_clear();

    let summary = result?;
    ui::print_summary(&summary);
    Ok(())
}

/// Execute `plan`, turning a failed step into a readable error.
pub fn apply(
    host: &dyn HostStateManager,
    writer: &dyn ComponentWriter,
    options: ExecuteOptions,
    cancel: CancelToken,
    plan: &Plan,
) -> Result<ExecuteSummary> {
    Executor::new(host, writer, options)
        .with_cancel(cancel)
        .execute(plan)
        .map_err(|err| {
            ui::error(&format!(
                "Stopped at step {} of {}: {}",
                err.step,
                plan.steps().len(),
                err.action
            ));
            if err.is_configuration() {
                ui::dim("This is a bug in the plan, not a host problem.");
            } else {
                ui::dim("Run `materia plan` to see what is left to do.");
            }
            anyhow::Error::new(err)
        })
}

fn confirm_proceed(steps: usize) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(format!("Apply {} changes?", steps))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

fn spinner(ctx: &Context, steps: usize) -> ProgressBar {
    if ctx.quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Applying {} steps...", steps));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

//! Execution engine - applies plan steps in order, then verifies services
//!
//! Steps run strictly one after another; the first failure stops the run.
//! Service actions are followed up by concurrent convergence waits, one per
//! unit, whose failures only produce warnings.

use crate::action::{Action, ActionType};
use crate::context::{CancelToken, ComponentWriter, HostStateManager};
use crate::error::{ExecuteError, ExecuteErrorKind};
use crate::plan::Plan;
use crate::types::{ExecuteOptions, ExecuteSummary, ServiceOp, UnitState};
use anyhow::{Context, Result};
use components::ResourceType;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// What a handler gets to work with
pub struct ExecContext<'a> {
    pub host: &'a dyn HostStateManager,
    pub writer: &'a dyn ComponentWriter,
    pub options: &'a ExecuteOptions,
}

impl ExecContext<'_> {
    fn timeout(&self, action: &Action) -> Duration {
        action
            .service_timeout()
            .map_or(self.options.default_timeout, Duration::from_secs)
    }

    fn dump_path(&self, action: &Action) -> PathBuf {
        self.options
            .backup_dir
            .join(format!("{}.tar", action.target.host_object))
    }
}

type Handler = fn(&ExecContext<'_>, &Action) -> Result<()>;

type DispatchTable = HashMap<ResourceType, HashMap<ActionType, Handler>>;

static DISPATCH: LazyLock<DispatchTable> = LazyLock::new(dispatch_table);

fn register(table: &mut DispatchTable, kind: ResourceType, todo: ActionType, handler: Handler) {
    table.entry(kind).or_default().insert(todo, handler);
}

fn dispatch_table() -> DispatchTable {
    use ActionType as A;
    use ResourceType as R;

    let mut table = DispatchTable::new();

    register(&mut table, R::Component, A::Install, install_component);
    register(&mut table, R::Component, A::Update, update_component);
    register(&mut table, R::Component, A::Remove, remove_component);
    register(&mut table, R::Component, A::Setup, run_setup);
    register(&mut table, R::Component, A::Cleanup, run_cleanup);

    let on_disk = R::ALL
        .into_iter()
        .filter(|kind| (kind.is_file() && *kind != R::Combined) || *kind == R::Directory);
    for kind in on_disk {
        register(&mut table, kind, A::Install, write_resource);
        register(&mut table, kind, A::Update, write_resource);
        register(&mut table, kind, A::Remove, delete_resource);
    }

    register(&mut table, R::Host, A::Reload, daemon_reload);

    for todo in [A::Start, A::Stop, A::Restart, A::Reload, A::Enable, A::Disable] {
        register(&mut table, R::Service, todo, service_op);
    }

    register(&mut table, R::Volume, A::Ensure, ensure_object);
    register(&mut table, R::Volume, A::Dump, dump_volume);
    register(&mut table, R::Volume, A::Import, import_volume);
    register(&mut table, R::Volume, A::Cleanup, remove_volume);
    register(&mut table, R::Network, A::Ensure, ensure_object);
    register(&mut table, R::Network, A::Cleanup, remove_network);
    register(&mut table, R::Image, A::Cleanup, remove_image);
    register(&mut table, R::Build, A::Cleanup, remove_image);

    register(&mut table, R::PodmanSecret, A::Install, write_secret);
    register(&mut table, R::PodmanSecret, A::Update, write_secret);
    register(&mut table, R::PodmanSecret, A::Remove, remove_secret);

    table
}

fn install_component(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.writer.install_component(&action.parent)
}

fn update_component(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.writer.update_component(&action.parent)
}

fn remove_component(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.writer.remove_component(&action.parent)
}

fn run_setup(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    let script = action
        .parent
        .setup_script()
        .with_context(|| format!("{} has no setup script", action.parent.name))?;
    run_script(ctx, action, script)
}

fn run_cleanup(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    let script = action
        .parent
        .cleanup_script()
        .with_context(|| format!("{} has no cleanup script", action.parent.name))?;
    run_script(ctx, action, script)
}

fn run_script(ctx: &ExecContext<'_>, action: &Action, script: &str) -> Result<()> {
    let parent = &action.parent;
    let body = parent
        .resources
        .get(script)
        .with_context(|| format!("script {} is not part of {}", script, parent.name))?;
    ctx.host
        .run_script(&parent.name, script, &body.content, ctx.options.default_timeout)
}

fn write_resource(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.writer.install_resource(&action.parent, &action.target)
}

fn delete_resource(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.writer.remove_resource(&action.parent, &action.target)
}

fn daemon_reload(ctx: &ExecContext<'_>, _action: &Action) -> Result<()> {
    ctx.host.daemon_reload()
}

fn service_op(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    let op = ServiceOp::from_action(action.todo)
        .with_context(|| format!("{} is not a service operation", action.todo))?;
    ctx.host
        .apply_service(&action.target.path, op, ctx.timeout(action))
}

/// Restart the generated unit, which recreates the object.
fn ensure_object(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    let unit = action
        .target
        .backing_service()
        .with_context(|| format!("{} has no backing unit", action.target))?;
    ctx.host
        .apply_service(&unit, ServiceOp::Restart, ctx.timeout(action))
}

fn dump_volume(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host
        .dump_volume(&action.target.host_object, &ctx.dump_path(action))
}

fn import_volume(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host
        .import_volume(&action.target.host_object, &ctx.dump_path(action))
}

fn remove_volume(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host.remove_volume(&action.target.host_object)
}

fn remove_network(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host.remove_network(&action.target.host_object)
}

fn remove_image(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host.remove_image(&action.target.host_object)
}

fn write_secret(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host
        .write_secret(&action.target.path, &action.target.content)
}

fn remove_secret(ctx: &ExecContext<'_>, action: &Action) -> Result<()> {
    ctx.host.remove_secret(&action.target.path)
}

fn apply(ctx: &ExecContext<'_>, action: &Action) -> std::result::Result<(), ExecuteErrorKind> {
    let kind = action.target.kind;
    let handlers = DISPATCH
        .get(&kind)
        .ok_or(ExecuteErrorKind::MissingKind(kind))?;
    let handler = handlers
        .get(&action.todo)
        .ok_or(ExecuteErrorKind::MissingAction {
            kind,
            todo: action.todo,
        })?;
    handler(ctx, action).map_err(ExecuteErrorKind::Failed)
}

pub struct Executor<'a> {
    host: &'a dyn HostStateManager,
    writer: &'a dyn ComponentWriter,
    options: ExecuteOptions,
    cancel: CancelToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        host: &'a dyn HostStateManager,
        writer: &'a dyn ComponentWriter,
        options: ExecuteOptions,
    ) -> Self {
        Self {
            host,
            writer,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Share a token that cuts verification waits short.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Apply every step of `plan` in order.
    ///
    /// Stops at the first failing step; the error says how many steps
    /// completed. Verification problems never turn into errors.
    pub fn execute(&self, plan: &Plan) -> std::result::Result<ExecuteSummary, ExecuteError> {
        if plan.is_empty() {
            log::info!("Nothing to do");
            return Ok(ExecuteSummary::nothing_to_do());
        }

        let ctx = ExecContext {
            host: self.host,
            writer: self.writer,
            options: &self.options,
        };
        let steps = plan.steps();
        let total = steps.len();
        let mut summary = ExecuteSummary::default();
        let mut touched = Vec::new();

        for (idx, action) in steps.iter().enumerate() {
            log::info!("[{}/{}] {}", idx + 1, total, action);
            if let Err(kind) = apply(&ctx, action) {
                return Err(ExecuteError {
                    completed: idx,
                    step: idx + 1,
                    action: action.to_string(),
                    kind,
                });
            }
            summary.record(action);
            if action.todo.is_service_action() && !action.targets_host() {
                touched.push(action);
            }
        }

        self.verify(&touched);
        Ok(summary)
    }

    /// State worth waiting for after `todo` on `unit`, if any.
    fn expected_state(&self, unit: &str, todo: ActionType) -> Option<UnitState> {
        let status = match self.host.get_service(unit) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Cannot check {}: {:#}", unit, e);
                return None;
            }
        };
        match (todo, status.state) {
            (
                ActionType::Start | ActionType::Restart | ActionType::Reload,
                UnitState::Activating | UnitState::Reloading,
            ) => Some(UnitState::Active),
            (ActionType::Start | ActionType::Restart | ActionType::Reload, UnitState::Failed) => {
                log::warn!("{} failed after {}", unit, todo);
                None
            }
            (ActionType::Stop, UnitState::Deactivating) => Some(UnitState::Inactive),
            _ => None,
        }
    }

    /// Wait for touched services to settle, one concurrent wait per unit.
    fn verify(&self, touched: &[&Action]) {
        let mut latest: BTreeMap<&str, ActionType> = BTreeMap::new();
        for action in touched {
            latest.insert(action.target.path.as_str(), action.todo);
        }

        let waits: Vec<(&str, UnitState)> = latest
            .into_iter()
            .filter_map(|(unit, todo)| self.expected_state(unit, todo).map(|s| (unit, s)))
            .collect();
        if waits.is_empty() {
            return;
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(waits.len())
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                log::warn!("Skipping service verification: {}", e);
                return;
            }
        };

        log::debug!("Waiting on {} services", waits.len());
        pool.install(|| {
            waits.par_iter().for_each(|(unit, target)| {
                match self
                    .host
                    .wait_for_state(unit, *target, self.options.verify_timeout, &self.cancel)
                {
                    Ok(()) => log::debug!("{} is {}", unit, target),
                    Err(e) => log::warn!("{} did not become {}: {:#}", unit, target, e),
                }
            });
        });
    }
}

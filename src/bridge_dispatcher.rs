use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::bridge_command::{
    Command, CommandError, SUCCESS_PREFIX, error_result, parse_f32_or, parse_u32_or,
};
use crate::deferred_scheduler::DeferredScheduler;
use crate::editor_host::{EditorHost, HostError, PropertyChange, PropertyValue};
use crate::refresh_escalation::EscalationChain;
use crate::{debug_log, warn_log};

/// Longest delay a deferred command may ask for
const MAX_DELAY_SECS: f32 = 3600.0;

const DEFAULT_SCREENSHOT_WIDTH: u32 = 1920;
const DEFAULT_SCREENSHOT_HEIGHT: u32 = 1080;

/// Everything a handler may touch while it runs
pub struct DispatchContext<'a> {
    pub host: &'a mut dyn EditorHost,
    pub scheduler: &'a mut DeferredScheduler,
    pub escalation: &'a EscalationChain,
    pub now: Instant,
}

/// A registered command handler; `args` already satisfies the entry's arity
pub type Handler = fn(&mut DispatchContext<'_>, &[String]) -> Result<String, CommandError>;

struct HandlerEntry {
    handler: Handler,
    min_args: usize,
    usage: &'static str,
}

/// Routes bridge commands to their handlers
///
/// [`CommandDispatcher::dispatch`] is total: parse errors, unknown actions, handler
/// errors and handler panics all come back as an `Error:` result string.
pub struct CommandDispatcher {
    handlers: HashMap<String, HandlerEntry>,
}

impl CommandDispatcher {
    /// Dispatcher with the built-in scene and refresh commands
    pub fn new() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register("ping", 0, "ping", handle_ping);
        dispatcher.register("create_gameobject", 1, "create_gameobject|name[|delay]", handle_create);
        dispatcher.register("delete_gameobject", 1, "delete_gameobject|name[|delay]", handle_delete);
        dispatcher.register("find_gameobject", 1, "find_gameobject|name", handle_find);
        dispatcher.register("list_gameobjects", 0, "list_gameobjects", handle_list);
        dispatcher.register(
            "set_property",
            3,
            "set_property|name|property|value[|delay]",
            handle_set_property,
        );
        dispatcher.register(
            "screenshot",
            1,
            "screenshot|path[|width[|height[|delay]]]",
            handle_screenshot,
        );
        dispatcher.register("refresh", 0, "refresh[|delay]", handle_refresh);
        dispatcher
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register or replace the handler for `action`
    ///
    /// Action names are matched case-insensitively, so the name is stored lowercased.
    pub fn register(&mut self, action: &str, min_args: usize, usage: &'static str, handler: Handler) {
        self.handlers.insert(
            action.trim().to_ascii_lowercase(),
            HandlerEntry {
                handler,
                min_args,
                usage,
            },
        );
    }

    /// Sorted list of the registered action names
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    pub fn dispatch(&self, raw: &str, ctx: &mut DispatchContext<'_>) -> String {
        match self.try_dispatch(raw, ctx) {
            Ok(result) => result,
            Err(e) => {
                warn_log!("Command '{}' failed: {}", raw.trim(), e);
                error_result(&e)
            }
        }
    }

    fn try_dispatch(&self, raw: &str, ctx: &mut DispatchContext<'_>) -> Result<String, CommandError> {
        let command = Command::parse(raw)?;
        let action = command.action.trim().to_ascii_lowercase();
        let entry = self
            .handlers
            .get(action.as_str())
            .ok_or_else(|| CommandError::UnknownCommand(command.action.clone()))?;

        if command.args.len() < entry.min_args {
            return Err(CommandError::MissingArguments {
                action,
                expected: entry.min_args,
                usage: entry.usage,
            });
        }

        debug_log!("Dispatching {}", command);
        let handler = entry.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, &command.args))) {
            Ok(result) => result,
            Err(payload) => Err(CommandError::Panicked(panic_message(payload))),
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `action` now, or schedule it when the optional delay argument is positive
///
/// Unparsable delays count as zero. A deferred action reports its own outcome to the
/// log only; the caller gets the acknowledgement.
fn run_or_defer<F>(ctx: &mut DispatchContext<'_>, delay_arg: Option<&str>, label: String, action: F) -> Result<String, CommandError>
where
    F: FnOnce(&mut dyn EditorHost) -> Result<String, CommandError> + 'static,
{
    let delay = parse_f32_or(delay_arg, 0.0).min(MAX_DELAY_SECS);
    if delay > 0.0 {
        ctx.scheduler
            .schedule(ctx.now, Duration::from_secs_f32(delay), label.clone(), Box::new(action));
        Ok(format!("{}Scheduled {} in {}s", SUCCESS_PREFIX, label, delay))
    } else {
        action(&mut *ctx.host)
    }
}

fn required_name(raw: &str) -> Result<String, CommandError> {
    let name = raw.trim();
    if name.is_empty() {
        Err(CommandError::InvalidArgument("GameObject name cannot be empty".to_string()))
    } else {
        Ok(name.to_string())
    }
}

fn arg(args: &[String], index: usize) -> Option<&str> {
    args.get(index).map(String::as_str)
}

fn handle_ping(_ctx: &mut DispatchContext<'_>, _args: &[String]) -> Result<String, CommandError> {
    Ok("pong".to_string())
}

fn handle_create(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let name = required_name(&args[0])?;
    let label = format!("create_gameobject '{}'", name);
    run_or_defer(ctx, arg(args, 1), label, move |host| {
        let info = host.create_game_object(&name)?;
        Ok(format!("{}Created GameObject '{}'", SUCCESS_PREFIX, info.name))
    })
}

fn handle_delete(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let name = required_name(&args[0])?;
    let label = format!("delete_gameobject '{}'", name);
    run_or_defer(ctx, arg(args, 1), label, move |host| {
        host.delete_game_object(&name)?;
        Ok(format!("{}Deleted GameObject '{}'", SUCCESS_PREFIX, name))
    })
}

fn handle_find(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let name = required_name(&args[0])?;
    let info = ctx
        .host
        .find_game_object(&name)
        .ok_or_else(|| HostError::NotFound(name.clone()))?;
    let json = serde_json::to_string(&info)
        .map_err(|e| HostError::OperationFailed(e.to_string()))?;
    Ok(format!("{}{}", SUCCESS_PREFIX, json))
}

fn handle_list(ctx: &mut DispatchContext<'_>, _args: &[String]) -> Result<String, CommandError> {
    let names: Vec<String> = ctx
        .host
        .list_game_objects()
        .into_iter()
        .map(|info| info.name)
        .collect();
    let json = serde_json::to_string(&names)
        .map_err(|e| HostError::OperationFailed(e.to_string()))?;
    Ok(format!("{}{}", SUCCESS_PREFIX, json))
}

fn handle_set_property(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let name = required_name(&args[0])?;
    // Parse before touching the host so malformed values never mutate the scene
    let value = PropertyValue::parse(&args[1], &args[2])?;
    let label = format!("set_property '{}' {}", name, value.property_name());

    run_or_defer(ctx, arg(args, 3), label, move |host| {
        match host.set_property(&name, &value)? {
            PropertyChange::Changed => Ok(format!(
                "{}Set {} of '{}' to {}",
                SUCCESS_PREFIX,
                value.property_name(),
                name,
                value
            )),
            PropertyChange::Unchanged => Ok(format!(
                "{}{} of '{}' already set to {}",
                SUCCESS_PREFIX,
                value.property_name(),
                name,
                value
            )),
        }
    })
}

fn handle_screenshot(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let path = args[0].trim();
    if path.is_empty() {
        return Err(CommandError::InvalidArgument("screenshot path cannot be empty".to_string()));
    }
    let path = PathBuf::from(path);
    let width = parse_u32_or(arg(args, 1), DEFAULT_SCREENSHOT_WIDTH);
    let height = parse_u32_or(arg(args, 2), DEFAULT_SCREENSHOT_HEIGHT);
    let label = format!("screenshot {}", path.display());

    run_or_defer(ctx, arg(args, 3), label, move |host| {
        let written = host.capture_screenshot(&path, width, height)?;
        Ok(format!(
            "{}Screenshot saved to {} ({}x{})",
            SUCCESS_PREFIX,
            written.display(),
            width,
            height
        ))
    })
}

fn handle_refresh(ctx: &mut DispatchContext<'_>, args: &[String]) -> Result<String, CommandError> {
    let chain = ctx.escalation.clone();
    run_or_defer(ctx, arg(args, 0), "refresh".to_string(), move |host| {
        let report = chain.run(host);
        if !report.outcomes.is_empty() && report.succeeded() == 0 {
            return Err(HostError::OperationFailed(report.summary()).into());
        }
        Ok(format!("{}Refresh requested, {}", SUCCESS_PREFIX, report.summary()))
    })
}

#[cfg(test)]
#[path = "bridge_dispatcher_tests.rs"]
mod tests;

//! Command dispatch: bridges CLI args -> controller calls -> output.

pub mod bootstrap;
pub mod config_cmd;
pub mod control;
pub mod device;
pub mod watch;

use uprotect_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Bootstrap(args) => bootstrap::handle(controller, &args, global).await,
        Command::Device(args) => device::handle(controller, &args, global).await,
        Command::Watch(args) => watch::handle(controller, &args, global).await,
        Command::Control(args) => control::handle(controller, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

//! `uprotect control ...`: change device settings and send commands.

use std::io::Write;

use serde_json::Value;
use uprotect_core::{Controller, Record};

use crate::cli::{ControlArgs, ControlCommand, GlobalOpts, Switch};
use crate::commands::device::{detail, model_type};
use crate::error::CliError;
use crate::output;

fn parse_patch(text: &str) -> Result<Value, CliError> {
    let patch: Value = serde_json::from_str(text).map_err(|e| CliError::Validation {
        field: "json".into(),
        reason: e.to_string(),
    })?;
    if !patch.is_object() {
        return Err(CliError::Validation {
            field: "json".into(),
            reason: "expected an object of settings".into(),
        });
    }
    Ok(patch)
}

fn print_record(record: &Record, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let rendered = output::render_single(
        global.output,
        record,
        |r| detail(r, color),
        |r| r.id().to_owned(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

fn accepted(message: &str, global: &GlobalOpts) {
    if !global.quiet {
        eprintln!("{message}");
    }
}

pub async fn handle(
    controller: &Controller,
    args: &ControlArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match &args.command {
        ControlCommand::Patch { kind, id, json } => {
            let patch = parse_patch(json)?;
            let record = controller.update_device(model_type(*kind), id.as_str(), patch).await?;
            print_record(&record, global)
        }

        ControlCommand::Reboot { kind, id } => {
            let model_type = model_type(*kind);
            controller.reboot_device(model_type, id).await?;
            accepted(&format!("{model_type} '{id}' is rebooting"), global);
            Ok(())
        }

        ControlCommand::Lock { id } => {
            controller.lock_doorlock(id).await?;
            accepted(&format!("Door lock '{id}' locked"), global);
            Ok(())
        }

        ControlCommand::Unlock { id } => {
            controller.unlock_doorlock(id).await?;
            accepted(&format!("Door lock '{id}' unlocked"), global);
            Ok(())
        }

        ControlCommand::Light { id, state } => {
            let record = controller.set_light(id, *state == Switch::On).await?;
            print_record(&record, global)
        }

        ControlCommand::Chime { id, volume, repeat } => {
            controller.play_chime(id, *volume, *repeat).await?;
            accepted(&format!("Chime '{id}' playing"), global);
            Ok(())
        }

        ControlCommand::Snapshot { id, file } => {
            let jpeg = controller.camera_snapshot(id).await?;
            match file {
                Some(path) => {
                    std::fs::write(path, &jpeg)?;
                    accepted(&format!("Wrote {} bytes to {}", jpeg.len(), path.display()), global);
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&jpeg)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
    }
}

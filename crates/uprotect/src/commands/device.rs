//! `uprotect device <type> <id>`: refresh one device from the NVR.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use uprotect_core::{Controller, DeviceRefresh, ModelType, Reachability, Record};

use crate::cli::{DeviceArgs, DeviceKind, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub(crate) fn model_type(kind: DeviceKind) -> ModelType {
    match kind {
        DeviceKind::Camera => ModelType::Camera,
        DeviceKind::Light => ModelType::Light,
        DeviceKind::Sensor => ModelType::Sensor,
        DeviceKind::Doorlock => ModelType::Doorlock,
        DeviceKind::Chime => ModelType::Chime,
        DeviceKind::Bridge => ModelType::Bridge,
        DeviceKind::Viewer => ModelType::Viewer,
        DeviceKind::AiPort => ModelType::AiPort,
    }
}

fn yes_no(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

fn when(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

pub(crate) fn detail(record: &Record, color: bool) -> String {
    let Some(info) = record.device_info() else {
        return format!("ID:       {}", record.id());
    };

    let state = info.state.as_deref().unwrap_or("UNKNOWN");
    let model = info.market_name.as_deref().or(info.hardware.as_deref());
    let mut lines = vec![
        format!("ID:       {}", info.id),
        format!("Name:     {}", output::bold(info.display_name(), color)),
        format!("Type:     {}", record.model_type()),
        format!("Model:    {}", model.unwrap_or("-")),
        format!("State:    {}", output::status(state, info.is_online(), color)),
        format!("MAC:      {}", info.mac.as_deref().unwrap_or("-")),
        format!("Host:     {}", info.host.as_deref().unwrap_or("-")),
        format!("Firmware: {}", info.firmware_version.as_deref().unwrap_or("-")),
        format!("Seen:     {}", when(info.last_seen)),
    ];

    match record {
        Record::Camera(c) => {
            lines.push(format!("Recording: {}", yes_no(c.is_recording)));
            lines.push(format!("Motion:    {}", yes_no(c.is_motion_detected)));
            lines.push(format!("Last ring: {}", when(c.last_ring)));
        }
        Record::Light(l) => lines.push(format!("Light on: {}", yes_no(l.is_light_on))),
        Record::Sensor(s) => lines.push(format!("Opened:   {}", yes_no(s.is_opened))),
        Record::Doorlock(d) => {
            lines.push(format!("Lock:     {}", d.lock_status.as_deref().unwrap_or("-")));
        }
        Record::Chime(c) => lines.push(format!("Cameras:  {}", c.camera_ids.len())),
        _ => {}
    }

    lines.join("\n")
}

/// Wait out a scheduled retry and report where it left the device.
async fn await_retry(
    controller: &Controller,
    mut changes: tokio::sync::broadcast::Receiver<(String, Reachability)>,
    model_type: ModelType,
    id: &str,
) -> Result<Record, CliError> {
    let config = controller.config();
    let budget = config.sync.device_retry_delay + config.timeout;
    eprintln!(
        "NVR unreachable, retrying in {}s",
        config.sync.device_retry_delay.as_secs()
    );

    let outcome = tokio::time::timeout(budget, async {
        loop {
            match changes.recv().await {
                Ok((changed, state)) if changed == id && state != Reachability::Unreachable => {
                    return Some(state);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .map_err(|_| CliError::Timeout {
        seconds: budget.as_secs(),
    })?;

    match outcome {
        Some(Reachability::Reachable) => controller
            .get_cached_bootstrap()
            .and_then(|b| b.record(model_type, id))
            .ok_or_else(|| not_found(model_type, id)),
        Some(Reachability::Gone) => Err(not_found(model_type, id)),
        _ => Err(CliError::ConnectionFailed {
            reason: format!("{model_type} '{id}' is still unreachable"),
        }),
    }
}

fn not_found(model_type: ModelType, id: &str) -> CliError {
    CliError::NotFound {
        resource: format!("{model_type} '{id}'"),
    }
}

async fn fetch(controller: &Controller, model_type: ModelType, id: &str) -> Result<Record, CliError> {
    let changes = controller.reachability_changes();
    match controller.refresh_device(model_type, id).await? {
        DeviceRefresh::Updated(record) => Ok(record),
        DeviceRefresh::Removed => Err(not_found(model_type, id)),
        DeviceRefresh::RetryScheduled => await_retry(controller, changes, model_type, id).await,
    }
}

pub async fn handle(
    controller: &Controller,
    args: &DeviceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let model_type = model_type(args.kind);
    tracing::debug!(%model_type, id = %args.id, "fetching device");

    controller.connect().await?;
    let fetched = fetch(controller, model_type, &args.id).await;
    controller.disconnect().await;
    let record = fetched?;

    let color = output::should_color(global.color);
    let rendered = output::render_single(
        global.output,
        &record,
        |r| detail(r, color),
        |r| r.id().to_owned(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

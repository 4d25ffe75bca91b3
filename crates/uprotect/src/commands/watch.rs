//! `uprotect watch`: stream coalesced events until Ctrl-C.

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use uprotect_core::{
    Coalesced, ConnectionState, Controller, Event, EventUpdate, ModelType, UpdateAction,
    UpdateMessage,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct EventLine<'a> {
    id: &'a str,
    action: UpdateAction,
    merged: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a Event>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLine<'a> {
    action: UpdateAction,
    model_type: ModelType,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

struct Printer {
    format: OutputFormat,
    color: bool,
    types: Option<Vec<String>>,
}

impl Printer {
    fn wants(&self, event: Option<&Event>) -> bool {
        let Some(types) = &self.types else {
            return true;
        };
        event
            .and_then(|e| e.event_type.as_deref())
            .is_some_and(|t| types.iter().any(|want| want.eq_ignore_ascii_case(t)))
    }

    fn event(
        &self,
        controller: &Controller,
        delivered: &Coalesced<EventUpdate>,
    ) -> Result<Option<String>, CliError> {
        let update = &delivered.value;
        let event = update.event.as_deref();
        if !self.wants(event) {
            return Ok(None);
        }

        if self.format != OutputFormat::Table {
            let line = EventLine {
                id: &update.id,
                action: update.action,
                merged: delivered.merged,
                event,
            };
            return output::render_json(&line, true).map(Some);
        }

        let kind = event
            .and_then(|e| e.event_type.as_deref())
            .unwrap_or("event");
        let camera = event
            .and_then(|e| e.camera.as_deref())
            .map(|id| camera_name(controller, id))
            .unwrap_or_default();
        let score = event
            .and_then(|e| e.score)
            .map(|s| format!("score {s}"))
            .unwrap_or_default();
        let smart = event
            .map(|e| e.smart_detect_types.join(","))
            .unwrap_or_default();
        let ongoing = event.is_some_and(Event::is_ongoing);

        let mut line = format!(
            "{}  {:<16} {:<20} {score}",
            chrono::Local::now().format("%H:%M:%S"),
            output::status(kind, !ongoing, self.color),
            output::bold(&camera, self.color),
        );
        if !smart.is_empty() {
            line.push_str(&format!("  [{smart}]"));
        }
        if delivered.merged > 1 {
            line.push_str(&output::dim(&format!("  ({} updates)", delivered.merged), self.color));
        }
        Ok(Some(line))
    }

    fn update(&self, msg: &UpdateMessage) -> Result<String, CliError> {
        if self.format == OutputFormat::Table {
            return Ok(output::dim(
                &format!("update {} {} {}", msg.action, msg.model_type, msg.id),
                self.color,
            ));
        }
        let line = UpdateLine {
            action: msg.action,
            model_type: msg.model_type,
            id: &msg.id,
            cursor: msg.cursor.as_deref(),
        };
        output::render_json(&line, true)
    }
}

fn camera_name(controller: &Controller, id: &str) -> String {
    controller
        .get_cached_bootstrap()
        .and_then(|b| b.cameras.get(id))
        .map_or_else(|| id.to_owned(), |c| c.info.display_name().to_owned())
}

pub async fn handle(
    controller: &Controller,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let printer = Printer {
        format: global.output,
        color,
        types: args.types.clone(),
    };

    let mut events = controller.subscribe();
    let mut updates = controller.updates();
    let mut state = controller.connection_state();
    let observer = controller.on_connection_state_change(
        move || eprintln!("{}", output::status("update stream connected", true, color)),
        move |code, reason: &str| {
            let line = format!("update stream closed ({code}) {reason}");
            eprintln!("{}", output::status(&line, false, color));
        },
        move |error: &str| {
            let line = format!("update stream error: {error}");
            eprintln!("{}", output::status(&line, false, color));
        },
    );

    controller.connect().await?;
    if !global.quiet {
        let nvr = controller
            .get_cached_bootstrap()
            .and_then(|b| b.nvr())
            .and_then(|n| n.name.clone())
            .unwrap_or_else(|| controller.config().url.to_string());
        eprintln!("Watching {nvr} (Ctrl-C to stop)");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            delivered = events.recv() => match delivered {
                Ok(delivered) => {
                    if let Some(line) = printer.event(controller, &delivered)? {
                        output::print_output(&line, global.quiet);
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event output lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
            update = updates.recv(), if args.updates => match update {
                Ok(msg) => output::print_output(&printer.update(&msg)?, global.quiet),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "update output lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                if *state.borrow() == ConnectionState::GivenUp {
                    break Err(CliError::StreamGivenUp {
                        attempts: controller.config().sync.reconnect.max_attempts,
                    });
                }
            }
        }
    };

    observer.abort();
    controller.disconnect().await;
    result
}

//! `uprotect bootstrap`: fetch the full state and summarize it.

use std::fmt::Write;

use serde::Serialize;
use tabled::Tabled;
use uprotect_core::{Bootstrap, Controller, ModelType};

use crate::cli::{BootstrapArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct CollectionCount {
    model: ModelType,
    collection: &'static str,
    records: usize,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Records")]
    records: usize,
}

fn counts(bootstrap: &Bootstrap) -> Vec<CollectionCount> {
    bootstrap
        .counts()
        .into_iter()
        .filter_map(|(model, records)| {
            model.collection_key().map(|collection| CollectionCount {
                model,
                collection,
                records,
            })
        })
        .collect()
}

fn header(bootstrap: &Bootstrap, color: bool) -> String {
    let mut out = String::new();
    let nvr = bootstrap.nvr();
    let name = nvr
        .as_ref()
        .and_then(|n| n.name.clone())
        .unwrap_or_else(|| "-".into());
    let version = nvr
        .as_ref()
        .and_then(|n| n.version.clone())
        .unwrap_or_else(|| "?".into());
    let _ = writeln!(
        out,
        "NVR:      {} {}",
        output::bold(&name, color),
        output::dim(&format!("(v{version})"), color)
    );
    let _ = writeln!(
        out,
        "Cursor:   {}",
        bootstrap.last_update_id().as_deref().unwrap_or("-")
    );
    let _ = write!(out, "Records:  {}", bootstrap.total_records());
    out
}

pub async fn handle(
    controller: &Controller,
    args: &BootstrapArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    controller.connect().await?;
    let fetched = controller.get_bootstrap().await;
    controller.disconnect().await;
    let bootstrap = fetched?;

    let format = if args.json { OutputFormat::Json } else { global.output };
    let rendered = match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(
            &bootstrap.snapshot(),
            format == OutputFormat::JsonCompact,
        )?,
        OutputFormat::Table => {
            let color = output::should_color(global.color);
            let table = output::render_list(
                format,
                &counts(&bootstrap),
                |c| CountRow {
                    collection: c.collection.into(),
                    records: c.records,
                },
                |c| c.collection.into(),
            )?;
            format!("{}\n\n{table}", header(&bootstrap, color))
        }
        OutputFormat::Plain => counts(&bootstrap)
            .iter()
            .map(|c| format!("{}\t{}", c.collection, c.records))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    output::print_output(&rendered, global.quiet);
    Ok(())
}

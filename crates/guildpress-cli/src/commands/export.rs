use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use guildpress_core::config::GuildpressConfig;
use guildpress_core::types::{EntityType, Stage};
use guildpress_store::{MessageQuery, Store};

use crate::cli::{ExportArgs, ExportCommand, ExportFormat};

pub fn run(config: &GuildpressConfig, command: ExportCommand) -> anyhow::Result<()> {
    let store = Store::open(&config.database.path)?;
    match command {
        ExportCommand::Messages(args) => export_messages(&store, config, &args),
        ExportCommand::Channels(args) => export_channels(&store, config, &args),
        ExportCommand::Summary(args) => export_summary(&store, config, &args),
    }
}

fn export_messages(store: &Store, config: &GuildpressConfig, args: &ExportArgs) -> anyhow::Result<()> {
    let query = MessageQuery {
        channel_id: None,
        since: args.since.map(|d| format!("{d}T00:00:00")),
        until: args.until.map(|d| format!("{d}T23:59:59.999Z")),
        limit: None,
    };
    let rows = store.messages_in_range(&query)?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut record = json!({
            "id": row.message.id,
            "channel_id": row.message.channel_id,
            "author": row.author.username,
            "author_id": row.author.id,
            "content": row.message.content,
            "clean_content": row.message.clean_content,
            "timestamp": row.message.timestamp,
            "edited_timestamp": row.message.edited_timestamp,
            "reaction_count": row.message.reaction_count,
        });
        if args.include_embeds || args.include_attachments || args.include_reactions {
            let (embeds, attachments, reactions) = store.message_children(&row.message.id)?;
            if let Some(obj) = record.as_object_mut() {
                if args.include_embeds {
                    obj.insert("embeds".into(), serde_json::to_value(&embeds)?);
                }
                if args.include_attachments {
                    obj.insert("attachments".into(), serde_json::to_value(&attachments)?);
                }
                if args.include_reactions {
                    obj.insert("reactions".into(), serde_json::to_value(&reactions)?);
                }
            }
        }
        records.push(record);
    }

    let path = output_path(config, args, "messages");
    match args.format {
        ExportFormat::Json => write_json(&path, &Value::Array(records), args.pretty)?,
        ExportFormat::Csv => {
            let header = [
                "id",
                "channel_id",
                "author",
                "timestamp",
                "content",
                "reaction_count",
            ];
            let csv_rows: Vec<Vec<String>> = rows
                .iter()
                .map(|row| {
                    vec![
                        row.message.id.clone(),
                        row.message.channel_id.clone(),
                        row.author.username.clone(),
                        row.message.timestamp.clone(),
                        row.message.content.clone(),
                        row.message.reaction_count.to_string(),
                    ]
                })
                .collect();
            write_csv(&path, &header, &csv_rows)?;
        }
    }
    println!("exported {} messages to {}", rows.len(), path.display());
    Ok(())
}

fn export_channels(store: &Store, config: &GuildpressConfig, args: &ExportArgs) -> anyhow::Result<()> {
    let channels = store.all_channels()?;
    let path = output_path(config, args, "channels");
    match args.format {
        ExportFormat::Json => write_json(&path, &serde_json::to_value(&channels)?, args.pretty)?,
        ExportFormat::Csv => {
            let header = ["id", "name", "type", "last_scraped_message_id", "message_count"];
            let rows: Vec<Vec<String>> = channels
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        c.kind.to_string(),
                        c.last_scraped_message_id.clone().unwrap_or_default(),
                        c.message_count.to_string(),
                    ]
                })
                .collect();
            write_csv(&path, &header, &rows)?;
        }
    }
    println!("exported {} channels to {}", channels.len(), path.display());
    Ok(())
}

fn export_summary(store: &Store, config: &GuildpressConfig, args: &ExportArgs) -> anyhow::Result<()> {
    let dailies = store.stage_results(EntityType::DailySummary, Stage::Summarize)?;
    let weeklies = store.stage_results(EntityType::WeeklySummary, Stage::Summarize)?;
    let extracts = store.list_extracts(None, i64::MAX)?;

    let path = output_path(config, args, "summary");
    match args.format {
        ExportFormat::Json => {
            let payload = json!({
                "daily_summaries": dailies
                    .iter()
                    .map(|r| json!({"key": r.entity_id, "summary": r.result}))
                    .collect::<Vec<_>>(),
                "weekly_summaries": weeklies
                    .iter()
                    .map(|r| json!({"key": r.entity_id, "summary": r.result}))
                    .collect::<Vec<_>>(),
                "extracts": extracts,
            });
            write_json(&path, &payload, args.pretty)?;
        }
        ExportFormat::Csv => {
            let header = ["kind", "key", "headline_or_content"];
            let mut rows: Vec<Vec<String>> = Vec::new();
            for r in dailies.iter().chain(weeklies.iter()) {
                let headline = r.result["summary"]["headline"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                rows.push(vec!["summary".into(), r.entity_id.clone(), headline]);
            }
            for e in &extracts {
                rows.push(vec![
                    e.extract_type.to_string(),
                    e.source_id.clone(),
                    e.content.clone(),
                ]);
            }
            write_csv(&path, &header, &rows)?;
        }
    }
    println!(
        "exported {} summaries and {} extracts to {}",
        dailies.len() + weeklies.len(),
        extracts.len(),
        path.display()
    );
    Ok(())
}

fn output_path(config: &GuildpressConfig, args: &ExportArgs, kind: &str) -> PathBuf {
    if let Some(output) = &args.output {
        return PathBuf::from(output);
    }
    let ext = match args.format {
        ExportFormat::Json => "json",
        ExportFormat::Csv => "csv",
    };
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(&config.export.output_dir).join(format!("{kind}-{stamp}.{ext}"))
}

fn write_json(path: &Path, value: &Value, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    write_file(path, &text)
}

fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, contents)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

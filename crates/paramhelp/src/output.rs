use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use paramhelp_frame::Channel;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    kind: &'static str,
    request: &'a str,
    recognized: bool,
    lines: Vec<&'a str>,
}

/// True unless the server appended its "not recognized" tail.
pub fn is_recognized(reply: &str) -> bool {
    !reply
        .lines()
        .last()
        .is_some_and(|line| line.ends_with("not recognized."))
}

pub fn print_reply(request: &str, reply: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput {
            kind: "rpc-reply",
            request,
            recognized: is_recognized(reply),
            lines: reply.lines().collect(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["REPLY"]);
            for line in reply.lines() {
                table.add_row(vec![line]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("> {request}");
            for line in reply.lines() {
                println!("  {line}");
            }
        }
        OutputFormat::Raw => print_raw_line(reply),
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'static str,
    channel: &'static str,
    fields: Vec<&'a str>,
    timestamp: String,
}

/// Print one stream or info message; stream fields are its lines.
pub fn print_message(channel: Channel, message: &str, format: OutputFormat) {
    let fields: Vec<&str> = message.split('\n').collect();
    match format {
        OutputFormat::Json => print_json(&MessageOutput {
            kind: "channel-message",
            channel: channel.suffix(),
            fields,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CHANNEL", "FIELD", "VALUE"]);
            for (index, field) in fields.iter().enumerate() {
                table.add_row(vec![
                    channel.suffix().to_string(),
                    index.to_string(),
                    field.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{} {}", channel.suffix(), fields.join(" | ")),
        OutputFormat::Raw => print_raw_line(message),
    }
}

/// One parameter or command of a described server.
#[derive(Debug, Serialize)]
pub struct DescribeRow {
    pub kind: &'static str,
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub size: String,
    pub bounds: String,
    pub io: String,
    pub default: String,
    pub description: String,
}

#[derive(Serialize)]
struct DescribeOutput<'a> {
    kind: &'static str,
    server: &'a str,
    entries: &'a [DescribeRow],
}

/// `raw` prints `help_text`, the same text the server answers `help` with.
pub fn print_describe(server: &str, rows: &[DescribeRow], help_text: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DescribeOutput {
            kind: "describe",
            server,
            entries: rows,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "KIND",
                "ID",
                "NAME",
                "TYPE",
                "SIZE",
                "BOUNDS",
                "IO",
                "DEFAULT",
                "DESCRIPTION",
            ]);
            for row in rows {
                table.add_row(vec![
                    row.kind.to_string(),
                    row.id.to_string(),
                    row.name.clone(),
                    row.ty.clone(),
                    row.size.clone(),
                    row.bounds.clone(),
                    row.io.clone(),
                    row.default.clone(),
                    row.description.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("server {server}");
            for row in rows {
                if row.kind == "command" {
                    println!(
                        "  command {} {} (arity {}) {}",
                        row.id, row.name, row.size, row.description
                    );
                } else {
                    println!(
                        "  param {} {}: {}[{}] bounds={} io={} default={} {}",
                        row.id,
                        row.name,
                        row.ty,
                        row.size,
                        row.bounds,
                        row.io,
                        row.default,
                        row.description
                    );
                }
            }
        }
        OutputFormat::Raw => print_raw_line(help_text),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw_line(text: &str) {
    let mut out = std::io::stdout();
    let _ = out.write_all(text.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

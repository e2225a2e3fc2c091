use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use recmux_frame::Message;
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
struct MessageOutput<'a> {
    source: &'a str,
    type_code: u8,
    type_name: &'a str,
    urgent: bool,
    length: usize,
    data_length: usize,
    data: String,
    timestamp: String,
}

/// Print one received message. `source` names the queue it came from.
pub fn print_message(msg: &Message, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                source,
                type_code: msg.type_code(),
                type_name: type_name(msg),
                urgent: msg.urgent(),
                length: msg.total_length(),
                data_length: msg.data_length(),
                data: data_preview(msg.data()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "URGENT", "SIZE", "SOURCE", "DATA"])
                .add_row(vec![
                    format!("{} ({})", type_name(msg), msg.type_code()),
                    msg.urgent().to_string(),
                    msg.data_length().to_string(),
                    source.to_string(),
                    data_preview(msg.data()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} ({}) urgent={} size={} source={} data={}",
                type_name(msg),
                msg.type_code(),
                msg.urgent(),
                msg.data_length(),
                source,
                data_preview(msg.data())
            );
        }
        OutputFormat::Raw => {
            print_raw(msg.data());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn type_name(msg: &Message) -> &'static str {
    msg.message_type().map_or("unknown", |kind| kind.name())
}

fn data_preview(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", data.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use recmux_frame::MessageType;

    use super::*;

    #[test]
    fn unknown_type_codes_are_named_unknown() {
        assert_eq!(type_name(&Message::with_type_code(200, false)), "unknown");
        assert_eq!(
            type_name(&Message::new(MessageType::RecogEnd, false)),
            MessageType::RecogEnd.name()
        );
    }

    #[test]
    fn binary_payloads_are_summarised() {
        assert_eq!(data_preview(b"beam 15"), "beam 15");
        assert_eq!(data_preview(&[0xff, 0xfe, 0x00]), "<binary 3 bytes>");
    }
}

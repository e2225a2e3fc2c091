use std::io::stdin;
use std::os::fd::AsFd;
use std::time::Duration;

use clap::{Args, Subcommand};
use recmux_frame::{InQueue, MessageType};
use recmux_transport::PipeEnd;

use crate::exit::{io_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a recognizer and print the messages it sends.
    Run(RunArgs),
    /// Read framed messages from stdin and print them.
    Decode(DecodeArgs),
    /// Write one framed message to stdout.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Command prefix used to reach the recognizer host (e.g. "ssh host").
    #[arg(long, default_value = "")]
    pub connect: String,
    /// Recognizer command line.
    #[arg(long)]
    pub script: String,
    /// Decoder beam width (1-300).
    #[arg(long, default_value = "100")]
    pub beam: u32,
    /// Language model scale (1-100).
    #[arg(long, default_value = "30")]
    pub lm_scale: u32,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Forward framed messages read from stdin to the recognizer.
    #[arg(long)]
    pub forward_stdin: bool,
    /// How often to check for Ctrl-C while waiting (e.g. 200ms, 1s).
    #[arg(long, default_value = "200ms")]
    pub poll_interval: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type: a name such as "decoder-setting" or a numeric code.
    #[arg(long = "type", value_name = "TYPE", value_parser = parse_type_code)]
    pub type_code: u8,
    /// Mark the message urgent.
    #[arg(long)]
    pub urgent: bool,
    /// Text payload.
    #[arg(long)]
    pub data: Option<String>,
    /// 32-bit integers appended after the text (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub u32: Vec<u32>,
    /// 32-bit floats appended after the integers (comma-separated).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub f32: Vec<f32>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_type_code(input: &str) -> Result<u8, String> {
    match input.parse::<u8>() {
        Ok(code) => Ok(code),
        Err(_) => input.parse::<MessageType>().map(MessageType::code),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// An in-queue reading from a non-blocking duplicate of stdin.
pub(crate) fn stdin_queue(name: &str) -> CliResult<InQueue> {
    let fd = stdin()
        .as_fd()
        .try_clone_to_owned()
        .map_err(|err| io_error("stdin unavailable", err))?;
    let pipe = PipeEnd::from(fd);
    pipe.set_nonblocking(true)
        .map_err(|err| transport_error("stdin setup failed", err))?;

    let mut queue = InQueue::new().with_name(name);
    queue.enable(pipe);
    Ok(queue)
}

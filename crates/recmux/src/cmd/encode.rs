use recmux_frame::Message;

use crate::cmd::EncodeArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::print_raw;

/// Encoded output is always the wire form, whatever `--format` says.
pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let msg = build_message(&args);
    print_raw(msg.as_bytes());
    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs) -> Message {
    let mut msg = Message::with_type_code(args.type_code, args.urgent);
    if let Some(data) = &args.data {
        msg.append(data);
    }
    for value in &args.u32 {
        msg.append_u32(*value);
    }
    for value in &args.f32 {
        msg.append_f32(*value);
    }
    msg
}

use recmux_frame::Mux;
use tracing::debug;

use crate::cmd::{stdin_queue, DecodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_message, OutputFormat};

const SOURCE: &str = "stdin";

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut queue = stdin_queue(SOURCE)?;
    let mut printed = 0usize;

    loop {
        Mux::new()
            .add_in_queue(&mut queue)
            .wait_and_flush()
            .map_err(|err| frame_error("read failed", err))?;

        while let Some(msg) = queue.pop_front() {
            print_message(&msg, SOURCE, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }

        if queue.eof() || !queue.is_enabled() {
            break;
        }
    }

    debug!(printed, "stdin closed");
    if queue.buffered_len() > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!(
                "input ended inside a message ({} bytes left over)",
                queue.buffered_len()
            ),
        ));
    }
    Ok(SUCCESS)
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use recmux_frame::{InQueue, Mux};
use recmux_process::{RecognizerProcess, IN_QUEUE_NAME};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, stdin_queue, RunArgs};
use crate::exit::{frame_error, process_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const STDIN_QUEUE_NAME: &str = "stdin";

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    let mut process = RecognizerProcess::new(args.connect, args.script, args.beam, args.lm_scale)
        .map_err(|err| process_error("invalid recognizer settings", err))?;
    let mut stdin = if args.forward_stdin {
        Some(stdin_queue(STDIN_QUEUE_NAME)?)
    } else {
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    process
        .start()
        .map_err(|err| process_error("failed to start recognizer", err))?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let waited = {
            let (inq, outq) = process.queues_mut();
            let mut mux = Mux::new();
            mux.add_in_queue(inq).add_out_queue(outq);
            if let Some(queue) = stdin.as_mut().filter(|queue| !queue.eof()) {
                mux.add_in_queue(queue);
            }
            mux.wait_and_flush_timeout(poll_interval)
        };
        match waited {
            Ok(_) => {}
            Err(err) if err.is_broken_pipe() => {
                warn!("recognizer closed its input, no longer forwarding");
                process.close_input();
                stdin = None;
            }
            Err(err) => return Err(frame_error("wait failed", err)),
        }

        if let Some(queue) = stdin.as_mut() {
            if !forward(queue, &mut process)? {
                stdin = None;
            }
        }

        while let Some(msg) = process.in_queue_mut().pop_front() {
            print_message(&msg, IN_QUEUE_NAME, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                finish(&mut process)?;
                return Ok(SUCCESS);
            }
        }

        if process.in_queue().eof() {
            info!(printed, "recognizer closed its output");
            break;
        }
    }

    finish(&mut process)?;
    Ok(SUCCESS)
}

/// Move everything read from stdin to the recognizer. Once stdin is
/// exhausted and sent, close the recognizer's input so it can finish.
///
/// Returns whether forwarding should go on.
fn forward(stdin: &mut InQueue, process: &mut RecognizerProcess) -> CliResult<bool> {
    while let Some(msg) = stdin.pop_front() {
        process
            .send(msg)
            .map_err(|err| process_error("forward failed", err))?;
    }
    if stdin.eof() && !process.out_queue().has_pending() {
        debug!("stdin exhausted, closing recognizer input");
        stdin.disable();
        process.close_input();
        return Ok(false);
    }
    Ok(true)
}

fn finish(process: &mut RecognizerProcess) -> CliResult<()> {
    let status = process
        .finish()
        .map_err(|err| process_error("failed to stop recognizer", err))?;
    if let Some(status) = status {
        debug!(%status, "recognizer reaped");
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

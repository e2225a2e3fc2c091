use std::process::ExitStatus;
use std::time::Duration;

use recmux_frame::{FrameConfig, InQueue, Message, MessageType, OutQueue};
use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};
use crate::settings::{validate_beam, validate_lmscale, DecoderSettings, BEAM_SETTING, LMSCALE_SETTING};
use crate::spawn::{spawn, Child};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub const IN_QUEUE_NAME: &str = "recognizer-in";
pub const OUT_QUEUE_NAME: &str = "recognizer-out";

/// Configuration for a [`RecognizerProcess`].
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// How long `finish` waits for the child after closing its pipes, and
    /// again after `SIGTERM`. Default: 500 ms.
    pub shutdown_grace: Duration,
    /// Framing limits for the recognizer's output.
    pub frame: FrameConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            frame: FrameConfig::default(),
        }
    }
}

/// An external recognizer talking framed messages over its stdin/stdout.
///
/// The command line is the connect prefix (for example `ssh host`) followed
/// by the recognizer script, both split with shell quoting rules. While
/// running, the out-queue feeds the child's stdin and the in-queue collects
/// its stdout. Neither queue is flushed here; register them with a
/// [`recmux_frame::Mux`] through [`RecognizerProcess::queues_mut`].
pub struct RecognizerProcess {
    connect: String,
    script: String,
    settings: DecoderSettings,
    config: ProcessConfig,
    child: Option<Child>,
    in_queue: InQueue,
    out_queue: OutQueue,
}

impl RecognizerProcess {
    /// Create a stopped recognizer. Fails if `beam` or `lmscale` is out of range.
    pub fn new(
        connect: impl Into<String>,
        script: impl Into<String>,
        beam: u32,
        lmscale: u32,
    ) -> Result<Self> {
        Self::with_config(connect, script, beam, lmscale, ProcessConfig::default())
    }

    pub fn with_config(
        connect: impl Into<String>,
        script: impl Into<String>,
        beam: u32,
        lmscale: u32,
        config: ProcessConfig,
    ) -> Result<Self> {
        let settings = DecoderSettings::new(beam, lmscale)?;
        let (in_queue, out_queue) = new_queues(&config);
        Ok(Self {
            connect: connect.into(),
            script: script.into(),
            settings,
            config,
            child: None,
            in_queue,
            out_queue,
        })
    }

    /// The argument vector `start` will execute.
    pub fn argv(&self) -> Result<Vec<String>> {
        let mut argv = split_words(&self.connect)?;
        argv.extend(split_words(&self.script)?);
        if argv.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(argv)
    }

    /// Launch the recognizer and queue the decoder settings handshake.
    ///
    /// A child that has already exited is reaped first; one that is still
    /// running is an error. Both queues are replaced, so messages left over
    /// from a previous run are gone.
    pub fn start(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            if child.try_wait()?.is_none() {
                return Err(ProcessError::AlreadyRunning(child.pid()));
            }
            self.finish()?;
        }

        let argv = self.argv()?;
        let mut child = spawn(&argv)?;
        let stdin = child.take_stdin().ok_or(ProcessError::NotRunning)?;
        let stdout = child.take_stdout().ok_or(ProcessError::NotRunning)?;
        stdin.set_nonblocking(true)?;
        stdout.set_nonblocking(true)?;

        let (mut in_queue, mut out_queue) = new_queues(&self.config);
        in_queue.enable(stdout);
        out_queue.enable(stdin);
        for msg in self.settings.messages() {
            out_queue.add_message(msg);
        }

        info!(
            pid = child.pid(),
            beam = self.settings.beam(),
            lm_scale = self.settings.lmscale(),
            "recognizer running"
        );
        self.in_queue = in_queue;
        self.out_queue = out_queue;
        self.child = Some(child);
        Ok(())
    }

    /// Close both pipes and reap the child.
    ///
    /// Returns the exit status, or `None` if nothing was running. Messages
    /// already received stay in the in-queue.
    pub fn finish(&mut self) -> Result<Option<ExitStatus>> {
        self.out_queue.disable();
        self.in_queue.disable();

        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        let status = child.terminate(self.config.shutdown_grace)?;
        info!(pid = child.pid(), %status, "recognizer finished");
        Ok(Some(status))
    }

    /// Set the beam width; a running recognizer is told right away.
    ///
    /// On error the stored value is unchanged. Fails with
    /// [`ProcessError::InputClosed`] once the recognizer's input is gone.
    pub fn set_beam(&mut self, beam: u32) -> Result<()> {
        validate_beam(beam)?;
        let live = self.input_state()?;
        self.settings.set_beam(beam)?;
        if live {
            self.out_queue
                .add_message(Message::decoder_setting(BEAM_SETTING, beam));
        }
        Ok(())
    }

    /// Set the language model scale; a running recognizer is told right away.
    ///
    /// On error the stored value is unchanged. Fails with
    /// [`ProcessError::InputClosed`] once the recognizer's input is gone.
    pub fn set_lmscale(&mut self, lmscale: u32) -> Result<()> {
        validate_lmscale(lmscale)?;
        let live = self.input_state()?;
        self.settings.set_lmscale(lmscale)?;
        if live {
            self.out_queue
                .add_message(Message::decoder_setting(LMSCALE_SETTING, lmscale));
        }
        Ok(())
    }

    pub fn get_beam(&self) -> u32 {
        self.settings.beam()
    }

    pub fn get_lmscale(&self) -> u32 {
        self.settings.lmscale()
    }

    pub fn settings(&self) -> DecoderSettings {
        self.settings
    }

    /// Change both settings at once and push them to a running recognizer.
    ///
    /// Nothing changes unless both values are valid. If the recognizer has
    /// gone away the process is finished and the broken pipe is returned.
    pub fn apply_settings(&mut self, beam: u32, lmscale: u32) -> Result<()> {
        validate_beam(beam)?;
        validate_lmscale(lmscale)?;
        self.input_state()?;
        self.set_beam(beam)?;
        self.set_lmscale(lmscale)?;
        if self.is_running() {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue a message for the recognizer.
    ///
    /// Fails with [`ProcessError::NotRunning`] before `start` and with
    /// [`ProcessError::InputClosed`] after the recognizer's input was closed.
    pub fn send(&mut self, msg: Message) -> Result<()> {
        if !self.input_state()? {
            return Err(ProcessError::NotRunning);
        }
        self.out_queue.add_message(msg);
        Ok(())
    }

    /// Close the recognizer's stdin, dropping anything not yet written.
    ///
    /// Its output keeps flowing until it exits. Later sends fail.
    pub fn close_input(&mut self) {
        if self.out_queue.is_enabled() {
            debug!(pid = ?self.pid(), "closing recognizer input");
        }
        self.out_queue.disable();
    }

    /// Whether messages can still reach the recognizer.
    pub fn is_input_open(&self) -> bool {
        self.is_running() && self.out_queue.is_enabled()
    }

    /// `Ok(true)` while running with input open, `Ok(false)` when stopped.
    fn input_state(&self) -> Result<bool> {
        match (self.is_running(), self.out_queue.is_enabled()) {
            (false, _) => Ok(false),
            (true, true) => Ok(true),
            (true, false) => Err(ProcessError::InputClosed),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        self.send(Message::new(MessageType::DecoderPause, true))
    }

    pub fn unpause(&mut self) -> Result<()> {
        self.send(Message::new(MessageType::DecoderUnpause, true))
    }

    /// Ask the recognizer to drop its current utterance.
    pub fn reset(&mut self) -> Result<()> {
        self.send(Message::new(MessageType::Reset, true))
    }

    /// Write whatever the out-queue can send without blocking.
    ///
    /// A broken pipe finishes the process before the error is returned.
    pub fn flush(&mut self) -> Result<()> {
        match self.out_queue.flush() {
            Ok(()) => Ok(()),
            Err(err) if err.is_broken_pipe() => {
                warn!("recognizer closed its input");
                if let Err(finish_err) = self.finish() {
                    debug!(%finish_err, "finish after broken pipe failed");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Whether a child has been started and not yet finished.
    ///
    /// A child that exited on its own still counts until `finish` reaps it.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<i32> {
        self.child.as_ref().map(Child::pid)
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Err(ProcessError::NotRunning),
        }
    }

    pub fn in_queue(&self) -> &InQueue {
        &self.in_queue
    }

    pub fn in_queue_mut(&mut self) -> &mut InQueue {
        &mut self.in_queue
    }

    pub fn out_queue(&self) -> &OutQueue {
        &self.out_queue
    }

    pub fn out_queue_mut(&mut self) -> &mut OutQueue {
        &mut self.out_queue
    }

    /// Both queues at once, for registering with a multiplexer.
    pub fn queues_mut(&mut self) -> (&mut InQueue, &mut OutQueue) {
        (&mut self.in_queue, &mut self.out_queue)
    }
}

impl Drop for RecognizerProcess {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!(%err, "failed to finish recognizer on drop");
        }
    }
}

impl std::fmt::Debug for RecognizerProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerProcess")
            .field("connect", &self.connect)
            .field("script", &self.script)
            .field("settings", &self.settings)
            .field("pid", &self.pid())
            .field("in_queue", &self.in_queue)
            .field("out_queue", &self.out_queue)
            .finish()
    }
}

fn new_queues(config: &ProcessConfig) -> (InQueue, OutQueue) {
    (
        InQueue::with_config(config.frame.clone()).with_name(IN_QUEUE_NAME),
        OutQueue::new().with_name(OUT_QUEUE_NAME),
    )
}

fn split_words(line: &str) -> Result<Vec<String>> {
    shell_words::split(line)
        .map_err(|err| ProcessError::InvalidCommand(format!("{line:?}: {err}")))
}

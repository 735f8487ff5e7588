//! The speechd session: one connection, one background reader thread.

use crate::config::{SpeechdAddress, Stream};
use crate::error::{ClientError, Result};
use crate::events::{EventCode, EventRegistry, PendingMessage};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use ssip_protocol::{FrameReader, FrameWriter, ServerMessage};
use std::io::BufReader;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::thread;

/// An open session with speech-dispatcher.
///
/// A dedicated reader thread owns the receive side of the socket and
/// splits incoming frames into command replies (handed to whichever caller
/// holds the command lock) and event notifications (dispatched to
/// registered handlers). All public methods may be called from any thread;
/// commands serialize on an internal lock, so replies always reach the
/// caller that issued the command.
pub struct SpeechdSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    /// Write half plus the reply receiver, under one lock: a command is
    /// write-then-await-reply, and for speak the multi-line payload must
    /// not interleave with anyone else's writes.
    command: Mutex<CommandChannel>,
    registry: EventRegistry,
    /// First terminal reader error, if any. Once set it never clears;
    /// every later command fails with it without touching the socket.
    read_error: Mutex<Option<String>>,
}

struct CommandChannel {
    writer: FrameWriter<Stream>,
    replies: Receiver<ServerMessage>,
}

impl SpeechdSession {
    /// Open a session using the environment's address (`SPEECHD_ADDRESS`
    /// or the per-user default socket), autospawning the dispatcher if it
    /// is not running. What most clients want.
    pub fn open() -> Result<Self> {
        Self::connect(SpeechdAddress::from_env()?, true)
    }

    /// Open a session to a specific address. With `autospawn`, a
    /// best-effort `speech-dispatcher --spawn` is issued first.
    pub fn connect(address: SpeechdAddress, autospawn: bool) -> Result<Self> {
        if autospawn {
            spawn_dispatcher();
        }
        info!("📡 Connecting to speech-dispatcher at {}", address);
        let session = Self::from_stream(address.connect()?)?;
        info!("✅ Connected to speech-dispatcher");
        Ok(session)
    }

    /// Build a session over an already connected transport.
    pub fn from_stream(stream: Stream) -> Result<Self> {
        let reader = FrameReader::new(BufReader::new(stream.try_clone()?));
        let writer = FrameWriter::new(stream);

        // Depth-one handoff: the reader publishes a reply, the one caller
        // holding the command lock takes it.
        let (reply_tx, reply_rx) = bounded(1);

        let inner = Arc::new(SessionInner {
            command: Mutex::new(CommandChannel {
                writer,
                replies: reply_rx,
            }),
            registry: EventRegistry::new(),
            read_error: Mutex::new(None),
        });

        let loop_inner = Arc::clone(&inner);
        thread::Builder::new()
            .name("speechd-reader".to_string())
            .spawn(move || receive_loop(loop_inner, reader, reply_tx))?;

        Ok(SpeechdSession { inner })
    }

    /// Send a raw SSIP command and return the server's reply.
    ///
    /// No status check is applied; most callers want the typed methods
    /// below instead.
    pub fn command(&self, command: &str) -> Result<ServerMessage> {
        let mut channel = self.inner.command.lock().unwrap();
        self.exchange(&mut channel, command)
    }

    /// One write-then-await-reply round trip. Caller holds the lock.
    fn exchange(&self, channel: &mut CommandChannel, command: &str) -> Result<ServerMessage> {
        if let Some(reason) = self.inner.read_error.lock().unwrap().clone() {
            return Err(ClientError::ConnectionLost(reason));
        }
        debug!("📤 Sending command: {}", command);
        channel.writer.write_line(command)?;
        match channel.replies.recv() {
            Ok(reply) => Ok(reply),
            // The reader exited between our check and now; surface its
            // error rather than hanging on a reply that will never come.
            Err(_) => Err(ClientError::ConnectionLost(self.read_error_reason())),
        }
    }

    fn read_error_reason(&self) -> String {
        self.inner
            .read_error
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "reader thread exited".to_string())
    }

    /// Queue `text` for speaking and return a handle for the utterance.
    ///
    /// The text may span multiple lines; carriage returns are stripped and
    /// each `\n`-separated line is sent as its own payload line. The
    /// returned [`PendingMessage`] can be ignored (fire and forget) or
    /// waited on, provided event notifications were enabled first with
    /// [`set_event_notifications`](Self::set_event_notifications).
    pub fn speak(&self, text: &str) -> Result<PendingMessage> {
        let mut channel = self.inner.command.lock().unwrap();

        require_success(self.exchange(&mut channel, "speak")?)?;

        let normalized = text.replace('\r', "");
        for line in normalized.split('\n') {
            channel.writer.write_speak_line(line)?;
        }

        let reply = require_success(self.exchange(&mut channel, ".")?)?;
        let id = reply
            .lines
            .first()
            .cloned()
            .ok_or(ClientError::MissingMessageId)?;
        debug!("🗣️ Server accepted message {}", id);

        Ok(self.watch_message(id))
    }

    /// Register the subscription resolving a message's terminal event and
    /// hand back the wait handle.
    fn watch_message(&self, id: String) -> PendingMessage {
        let (done_tx, done_rx) = bounded(1);
        let watched = id.clone();
        self.register_event_handler(move |event: &ServerMessage| {
            if event.lines.first().map(String::as_str) != Some(watched.as_str()) {
                return true;
            }
            match EventCode::from_code(event.code) {
                // try_send: a duplicate terminal event must not corrupt
                // an already resolved completion.
                Some(EventCode::End) => {
                    done_tx.try_send(true).ok();
                    false
                }
                Some(EventCode::Cancel) => {
                    done_tx.try_send(false).ok();
                    false
                }
                _ => true,
            }
        });
        PendingMessage::new(id, done_rx)
    }

    /// Register a handler for every event notification this session
    /// receives. Return `false` from the handler to stop receiving.
    ///
    /// Handlers run on the reader thread; keep them non-blocking.
    pub fn register_event_handler<F>(&self, handler: F)
    where
        F: FnMut(&ServerMessage) -> bool + Send + 'static,
    {
        self.inner.registry.register(Box::new(handler));
    }

    /// Set a session parameter (`set self <name> <value>`). Prefer the
    /// typed setters where one exists.
    pub fn set(&self, name: &str, value: &str) -> Result<()> {
        require_success(self.command(&format!("set self {} {}", name, value))?)?;
        Ok(())
    }

    /// Identify this client to the server as `user:progname:component`.
    pub fn set_client_name(&self, user: &str, progname: &str, component: &str) -> Result<()> {
        self.set(
            "client_name",
            &format!("{}:{}:{}", user, progname, component),
        )
    }

    /// Priority class for all following messages (`important`, `message`,
    /// `text`, `notification` or `progress`).
    pub fn set_priority(&self, priority: &str) -> Result<()> {
        self.set("priority", priority)
    }

    /// Output module (synthesizer) to use; see
    /// [`list_output_modules`](Self::list_output_modules).
    pub fn set_output_module(&self, module: &str) -> Result<()> {
        self.set("output_module", module)
    }

    /// Two-letter language code. May change the selected voice.
    pub fn set_language(&self, code: &str) -> Result<()> {
        self.set("language", code)
    }

    /// Switch spelling mode on or off.
    pub fn set_spelling(&self, on: bool) -> Result<()> {
        self.set("spelling", on_off(on))
    }

    /// Speech rate, -100 (slowest) to 100 (fastest).
    ///
    /// # Panics
    /// If `rate` is outside [-100, 100]; validate before calling.
    pub fn set_rate(&self, rate: i32) -> Result<()> {
        assert!(
            (-100..=100).contains(&rate),
            "rate out of range: {}",
            rate
        );
        self.set("rate", &rate.to_string())
    }

    /// Speech pitch, -100 to 100.
    ///
    /// # Panics
    /// If `pitch` is outside [-100, 100]; validate before calling.
    pub fn set_pitch(&self, pitch: i32) -> Result<()> {
        assert!(
            (-100..=100).contains(&pitch),
            "pitch out of range: {}",
            pitch
        );
        self.set("pitch", &pitch.to_string())
    }

    /// Speech volume, -100 to 100.
    ///
    /// # Panics
    /// If `volume` is outside [-100, 100]; validate before calling.
    pub fn set_volume(&self, volume: i32) -> Result<()> {
        assert!(
            (-100..=100).contains(&volume),
            "volume out of range: {}",
            volume
        );
        self.set("volume", &volume.to_string())
    }

    /// Synthesizer voice by name; overrides the language setting. See
    /// [`list_synth_voices`](Self::list_synth_voices).
    pub fn set_synth_voice(&self, voice: &str) -> Result<()> {
        self.set("synthesis_voice", voice)
    }

    /// Enable or disable all event notifications. Must be enabled before
    /// speaking for [`PendingMessage::wait`] to ever resolve.
    pub fn set_event_notifications(&self, on: bool) -> Result<()> {
        self.set("notification all", on_off(on))
    }

    /// Available output modules (synthesizers).
    pub fn list_output_modules(&self) -> Result<Vec<String>> {
        self.list("list output_modules")
    }

    /// Available voices for the selected output module.
    pub fn list_synth_voices(&self) -> Result<Vec<String>> {
        self.list("list synthesis_voices")
    }

    fn list(&self, command: &str) -> Result<Vec<String>> {
        let reply = require_success(self.command(command)?)?;
        let mut entries = reply.lines;
        // The final line is the status text terminating the listing, not
        // an entry.
        entries.pop();
        Ok(entries)
    }

    /// Stop speaking the current message immediately. Best effort; use
    /// [`command`](Self::command) to observe the outcome.
    pub fn stop(&self) {
        if let Err(err) = self.command("stop self") {
            warn!("stop failed: {}", err);
        }
    }

    /// Cancel all queued messages. Best effort, like
    /// [`stop`](Self::stop).
    pub fn cancel(&self) {
        if let Err(err) = self.command("cancel self") {
            warn!("cancel failed: {}", err);
        }
    }

    /// Say goodbye and close the connection. The session is unusable
    /// afterwards; also performed on drop.
    pub fn close(&self) {
        let mut channel = self.inner.command.lock().unwrap();
        channel.writer.write_line("quit").ok();
        channel.writer.get_ref().shutdown().ok();
    }
}

impl Drop for SpeechdSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fail non-2xx replies with the server's own code and text.
fn require_success(reply: ServerMessage) -> Result<ServerMessage> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(ClientError::Rejected {
            code: reply.code,
            details: reply.lines,
        })
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Ask the dispatcher to start itself if it is not already running. The
/// connect that follows reports the real failure, so this only logs.
fn spawn_dispatcher() {
    match Command::new("speech-dispatcher").arg("--spawn").spawn() {
        Ok(_) => debug!("Requested speech-dispatcher autospawn"),
        Err(err) => warn!("Could not autospawn speech-dispatcher: {}", err),
    }
}

/// Runs on the dedicated reader thread for the session's whole lifetime.
///
/// Every frame is either an event notification (700-799), dispatched to
/// the handler registry, or a command reply, handed to the caller blocked
/// in `exchange`. Any read error is terminal: it is recorded for later
/// commands to fail fast on, waiters are released, and the loop ends.
fn receive_loop(
    inner: Arc<SessionInner>,
    mut reader: FrameReader<BufReader<Stream>>,
    replies: Sender<ServerMessage>,
) {
    loop {
        let message = match reader.read_message() {
            Ok(message) => message,
            Err(err) => {
                debug!("Receive loop stopped: {}", err);
                *inner.read_error.lock().unwrap() = Some(err.to_string());
                break;
            }
        };

        if message.is_event() {
            debug!("📥 Event {}: {:?}", message.code, message.lines);
            inner.registry.dispatch(&message);
            continue;
        }

        if replies.send(message).is_err() {
            break;
        }
    }

    // Dropping `replies` unblocks a caller awaiting a reply; clearing the
    // registry unblocks everyone waiting on a PendingMessage.
    inner.registry.clear();
}

//! Speech-dispatcher client speaking SSIP over its Unix socket.
//!
//! Every command is one CRLF-terminated line. Replies are one or more lines of
//! the form `NNN-text` (continuation) ending with `NNN text` (final); codes in
//! the 2xx range mean success. `SPEAK` switches the connection into data mode
//! until a line holding a single `.` arrives.

use crate::constants::speech::{CLIENT_NAME, RESPONSE_TIMEOUT, SPAWN_SETTLE_TIME};
use crate::error::SpeechError;
use crate::speech::{Priority, SpeechSettings, SpeechSink};
use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// A complete SSIP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
    /// Continuation lines preceding the final line.
    pub data: Vec<String>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Locate the speech-dispatcher socket.
///
/// Honours `SPEECHD_ADDRESS=unix_socket:<path>`, then the per-user runtime
/// directory, then the cache directory.
pub fn socket_path() -> Option<PathBuf> {
    if let Ok(address) = env::var("SPEECHD_ADDRESS") {
        if let Some(path) = address.strip_prefix("unix_socket:") {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
    }
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("speech-dispatcher").join("speechd.sock"))
}

pub struct SsipClient<R = BufReader<UnixStream>, W = UnixStream> {
    reader: R,
    writer: W,
    priority: Option<Priority>,
    closed: bool,
}

impl SsipClient {
    /// Connect to the running speech-dispatcher, starting it if needed.
    pub fn connect() -> Result<Self, SpeechError> {
        let path = socket_path().ok_or_else(|| {
            SpeechError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "cannot determine the speech-dispatcher socket location",
            ))
        })?;

        let stream = match UnixStream::connect(&path) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Speech dispatcher not reachable, trying to spawn it");
                spawn_server(&path)?;
                connect_with_retry(&path)?
            }
        };
        tracing::debug!(path = %path.display(), "Connected to speech dispatcher");
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: UnixStream) -> Result<Self, SpeechError> {
        stream.set_read_timeout(Some(RESPONSE_TIMEOUT))?;
        stream.set_write_timeout(Some(RESPONSE_TIMEOUT))?;
        let writer = stream.try_clone()?;
        Ok(SsipClient::new(BufReader::new(stream), writer))
    }
}

impl<R: BufRead, W: Write> SsipClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        SsipClient {
            reader,
            writer,
            priority: None,
            closed: false,
        }
    }

    /// Send one command and require a 2xx reply.
    ///
    /// An I/O or protocol failure leaves the connection in an unknown state, so
    /// the client is closed and later calls fail fast with [`SpeechError::Closed`].
    pub fn command(&mut self, command: &str) -> Result<Reply, SpeechError> {
        if self.closed {
            return Err(SpeechError::Closed);
        }
        let reply = match self.exchange(command) {
            Ok(reply) => reply,
            Err(err) => {
                self.abandon(&err);
                return Err(err);
            }
        };
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(SpeechError::Rejected {
                command: command.to_string(),
                code: reply.code,
                message: reply.message,
            })
        }
    }

    fn set(&mut self, parameter: &str, value: impl std::fmt::Display) -> Result<Reply, SpeechError> {
        self.command(&format!("SET self {} {}", parameter, value))
    }

    fn exchange(&mut self, command: &str) -> Result<Reply, SpeechError> {
        self.send_line(command)?;
        self.writer.flush()?;
        self.read_reply()
    }

    fn abandon(&mut self, err: &SpeechError) {
        tracing::warn!(error = %err, "Speech dispatcher connection out of sync, dropping it");
        self.closed = true;
    }

    /// Write a message body in data mode, escaping lines that start with '.'.
    fn send_text(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            if line.starts_with('.') {
                self.writer.write_all(b".")?;
            }
            self.send_line(line)?;
        }
        Ok(())
    }

    /// Terminate a data block that was cut short so the server leaves data mode.
    fn end_data_block(&mut self) -> Result<(), SpeechError> {
        self.writer.write_all(b"\r\n.\r\n")?;
        self.writer.flush()?;
        self.read_reply().map(drop)
    }

    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")
    }

    fn read_reply(&mut self) -> Result<Reply, SpeechError> {
        let mut data = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(SpeechError::Protocol("connection closed by server".to_string()));
            }
            let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');

            let code = line
                .get(..3)
                .and_then(|digits| digits.parse::<u16>().ok())
                .ok_or_else(|| SpeechError::Protocol(format!("bad reply line: {:?}", line)))?;
            let text = line.get(4..).unwrap_or("").to_string();

            match line.as_bytes().get(3) {
                Some(b'-') => data.push(text),
                Some(b' ') | None => {
                    return Ok(Reply {
                        code,
                        message: text,
                        data,
                    })
                }
                Some(_) => {
                    return Err(SpeechError::Protocol(format!("bad reply line: {:?}", line)));
                }
            }
        }
    }
}

impl<R, W> SpeechSink for SsipClient<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn configure(&mut self, settings: &SpeechSettings) -> Result<(), SpeechError> {
        let user = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        self.set("CLIENT_NAME", format!("{}:{}:main", user, CLIENT_NAME))?;
        self.set("OUTPUT_MODULE", settings.voice.module_name())?;
        self.set("LANGUAGE", &settings.language)?;
        self.set("RATE", settings.rate)?;
        self.set("PITCH", settings.pitch)?;
        self.set("VOLUME", settings.volume)?;
        self.set("PRIORITY", settings.priority.as_ssip())?;
        self.priority = Some(settings.priority);
        Ok(())
    }

    fn speak(&mut self, text: &str, priority: Priority) -> Result<(), SpeechError> {
        if self.priority != Some(priority) {
            self.set("PRIORITY", priority.as_ssip())?;
            self.priority = Some(priority);
        }

        self.command("SPEAK")?;
        if let Err(err) = self.send_text(text) {
            if let Err(resync) = self.end_data_block() {
                self.abandon(&resync);
            }
            return Err(err.into());
        }
        self.command(".")?;
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.command("QUIT") {
            tracing::debug!(error = %err, "Speech dispatcher did not acknowledge QUIT");
        }
        self.closed = true;
    }
}

fn spawn_server(socket: &Path) -> Result<(), SpeechError> {
    let status = Command::new("speech-dispatcher")
        .args(["--spawn", "--communication-method", "unix_socket", "--socket-path"])
        .arg(socket)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    tracing::debug!(%status, "speech-dispatcher --spawn finished");
    Ok(())
}

fn connect_with_retry(socket: &Path) -> io::Result<UnixStream> {
    let deadline = Instant::now() + SPAWN_SETTLE_TIME;
    loop {
        match UnixStream::connect(socket) {
            Ok(stream) => return Ok(stream),
            Err(err) if Instant::now() >= deadline => return Err(err),
            Err(_) => thread::sleep(Duration::from_millis(50)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoiceModule;
    use std::thread::JoinHandle;

    /// Minimal speech-dispatcher stand-in. Returns every line it received.
    fn fake_server(stream: UnixStream, reject: Option<&'static str>) -> JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut received = Vec::new();
            let mut in_data = false;

            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string();
                received.push(line.clone());

                let reply = if in_data {
                    if line == "." {
                        in_data = false;
                        "225-21\r\n225 OK MESSAGE QUEUED\r\n"
                    } else {
                        continue;
                    }
                } else if Some(line.as_str()) == reject {
                    "409 ERR RATE TOO HIGH\r\n"
                } else if line == "SPEAK" {
                    in_data = true;
                    "230 OK RECEIVING DATA\r\n"
                } else if line == "QUIT" {
                    writer.write_all(b"231 HAPPY HACKING\r\n").unwrap();
                    break;
                } else {
                    "200 OK\r\n"
                };
                writer.write_all(reply.as_bytes()).unwrap();
            }
            received
        })
    }

    fn settings() -> SpeechSettings {
        SpeechSettings {
            voice: VoiceModule::Pico,
            rate: -10,
            pitch: 5,
            volume: 80,
            language: "en".to_string(),
            priority: Priority::Text,
        }
    }

    #[test]
    fn test_configure_speak_and_quit() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let server = fake_server(server_end, None);

        let mut client = SsipClient::from_stream(client_end).unwrap();
        client.configure(&settings()).unwrap();
        client.speak("alice says: hi", Priority::Text).unwrap();
        client.close();
        client.close();

        let received = server.join().unwrap();
        assert!(received[0].starts_with("SET self CLIENT_NAME "));
        assert!(received[0].ends_with(":yt-liveread:main"));
        assert_eq!(
            &received[1..],
            &[
                "SET self OUTPUT_MODULE pico",
                "SET self LANGUAGE en",
                "SET self RATE -10",
                "SET self PITCH 5",
                "SET self VOLUME 80",
                "SET self PRIORITY text",
                "SPEAK",
                "alice says: hi",
                ".",
                "QUIT",
            ]
        );
    }

    #[test]
    fn test_leading_dots_are_escaped() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let server = fake_server(server_end, None);

        let mut client = SsipClient::from_stream(client_end).unwrap();
        client.speak(".hidden\nsecond", Priority::Text).unwrap();
        client.close();

        let received = server.join().unwrap();
        assert_eq!(
            received,
            vec!["SET self PRIORITY text", "SPEAK", "..hidden", "second", ".", "QUIT"]
        );
    }

    #[test]
    fn test_rejected_command_reports_code() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let server = fake_server(server_end, Some("SET self RATE -10"));

        let mut client = SsipClient::from_stream(client_end).unwrap();
        match client.configure(&settings()) {
            Err(SpeechError::Rejected { code, command, .. }) => {
                assert_eq!(code, 409);
                assert_eq!(command, "SET self RATE -10");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        client.close();
        server.join().unwrap();
    }

    #[test]
    fn test_commands_after_close_fail() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let server = fake_server(server_end, None);

        let mut client = SsipClient::from_stream(client_end).unwrap();
        client.close();
        assert!(matches!(
            client.speak("late", Priority::Text),
            Err(SpeechError::Closed)
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_multiline_reply_parsing() {
        let input = b"249-first\r\n249-second\r\n249 OK DONE\r\n".to_vec();
        let mut client = SsipClient::new(io::Cursor::new(input), Vec::new());
        let reply = client.command("LIST OUTPUT_MODULES").unwrap();
        assert_eq!(reply.code, 249);
        assert_eq!(reply.message, "OK DONE");
        assert_eq!(reply.data, vec!["first", "second"]);
    }

    #[test]
    fn test_garbage_reply_is_protocol_error() {
        let mut client = SsipClient::new(io::Cursor::new(b"hello\r\n".to_vec()), Vec::new());
        assert!(matches!(
            client.command("HELP"),
            Err(SpeechError::Protocol(_))
        ));
        // Reply stream is unusable after that
        assert!(matches!(client.command("HELP"), Err(SpeechError::Closed)));
    }

    /// Socket writer that fails the first write containing `fail_on`.
    struct FlakyWriter {
        inner: UnixStream,
        fail_on: Option<&'static str>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(needle) = self.fail_on {
                if buf.windows(needle.len()).any(|window| window == needle.as_bytes()) {
                    self.fail_on = None;
                    return Err(io::Error::new(io::ErrorKind::Other, "write failed"));
                }
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_failed_data_write_recovers_for_next_message() {
        let (client_end, server_end) = UnixStream::pair().unwrap();
        let server = fake_server(server_end, None);
        client_end.set_read_timeout(Some(RESPONSE_TIMEOUT)).unwrap();
        let writer = FlakyWriter {
            inner: client_end.try_clone().unwrap(),
            fail_on: Some("hello"),
        };

        let mut client = SsipClient::new(BufReader::new(client_end), writer);
        assert!(matches!(
            client.speak("hello", Priority::Text),
            Err(SpeechError::Io(_))
        ));

        let started = Instant::now();
        client.speak("world", Priority::Text).unwrap();
        assert!(started.elapsed() < RESPONSE_TIMEOUT);
        client.close();

        let received = server.join().unwrap();
        assert_eq!(
            received,
            vec![
                "SET self PRIORITY text",
                "SPEAK",
                "",
                ".",
                "SPEAK",
                "world",
                ".",
                "QUIT",
            ]
        );
    }

    #[test]
    fn test_lost_reply_closes_client() {
        let mut client = SsipClient::new(io::Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(
            client.speak("first", Priority::Text),
            Err(SpeechError::Protocol(_))
        ));
        assert!(matches!(
            client.speak("second", Priority::Text),
            Err(SpeechError::Closed)
        ));
        client.close();
    }
}

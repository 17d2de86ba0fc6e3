//! Polling session: the command/response loop over a mailbox connection.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use crate::command::{TagGenerator, quote_astring};
use crate::message::RawMessage;
use crate::stream::{MailStream, connect};
use crate::{Error, Result, parser};

/// Default per-command timeout.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Header fields requested for each message.
const HEADER_FIELDS: &str = "MESSAGE-ID FROM TO SUBJECT DATE";

/// An untagged response item, with any literals it carried.
///
/// `segments[i]` is the line text preceding `literals[i]`; the final segment
/// has no literal after it.
struct Untagged {
    segments: Vec<String>,
    literals: Vec<Vec<u8>>,
}

impl Untagged {
    fn joined(&self) -> String {
        self.segments.join(" ")
    }
}

/// An authenticated mailbox session with a folder selected.
///
/// Commands run sequentially; each is bounded by the session's command
/// timeout so a stalled server cannot wedge the ingestion worker.
pub struct Session {
    stream: BufReader<MailStream>,
    tags: TagGenerator,
    command_timeout: Duration,
}

impl Session {
    /// Connects to the server and reads the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP/TLS connect fails, times out, or the
    /// server greeting is not an OK.
    pub async fn connect(
        host: &str,
        port: u16,
        use_tls: bool,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, connect(host, port, use_tls))
            .await
            .map_err(|_| Error::Timeout(connect_timeout))??;

        let mut session = Self {
            stream: BufReader::new(stream),
            tags: TagGenerator::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        };

        let greeting = session.read_line().await?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(Error::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        debug!(host, port, tls = use_tls, "mailbox connection established");

        Ok(session)
    }

    /// Overrides the per-command timeout.
    pub const fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    /// Authenticates with LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the server rejects the credentials.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let command = format!(
            "LOGIN {} {}",
            quote_astring(username),
            quote_astring(password)
        );
        match self.run(&command).await {
            Ok(_) => Ok(()),
            Err(Error::No(msg) | Error::Bad(msg)) => Err(Error::Auth(msg)),
            Err(e) => Err(e),
        }
    }

    /// Selects a folder for subsequent search/fetch commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder does not exist or the command fails.
    pub async fn select(&mut self, folder: &str) -> Result<()> {
        let command = format!("SELECT {}", quote_astring(folder));
        self.run(&command).await?;
        Ok(())
    }

    /// Returns the UIDs of unseen messages in the selected folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the response is malformed.
    pub async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        let items = self.run("UID SEARCH UNSEEN").await?;

        for item in &items {
            if let Some(uids) = parser::parse_search_line(&item.joined()) {
                return Ok(uids);
            }
        }
        // A server may omit the SEARCH line entirely when nothing matches.
        Ok(Vec::new())
    }

    /// Fetches the header fields and text body of a message by UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or no FETCH data comes back.
    pub async fn fetch(&mut self, uid: u32) -> Result<RawMessage> {
        let command = format!(
            "UID FETCH {uid} (INTERNALDATE BODY.PEEK[HEADER.FIELDS ({HEADER_FIELDS})] BODY.PEEK[TEXT])"
        );
        let items = self.run(&command).await?;

        let fetch = items
            .iter()
            .find(|item| {
                item.segments
                    .first()
                    .is_some_and(|s| s.to_ascii_uppercase().contains("FETCH"))
            })
            .ok_or_else(|| Error::Protocol(format!("no FETCH data for UID {uid}")))?;

        let mut header_block = String::new();
        let mut body = String::new();
        for (segment, literal) in fetch.segments.iter().zip(&fetch.literals) {
            let upper = segment.to_ascii_uppercase();
            if upper.contains("BODY[HEADER") {
                header_block = String::from_utf8_lossy(literal).into_owned();
            } else if upper.contains("BODY[TEXT") {
                body = String::from_utf8_lossy(literal).into_owned();
            }
        }

        let first_segment = fetch.segments.first().map_or("", String::as_str);
        Ok(RawMessage::from_parts(uid, &header_block, body, first_segment))
    }

    /// Flags a message seen so the next poll skips it.
    ///
    /// # Errors
    ///
    /// Returns an error if the STORE command fails.
    pub async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let command = format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)");
        self.run(&command).await?;
        Ok(())
    }

    /// Ends the session cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the LOGOUT exchange fails; the connection is
    /// dropped either way.
    pub async fn logout(mut self) -> Result<()> {
        // Servers answer LOGOUT with an untagged BYE before the tagged OK;
        // the BYE arrives as a collected (and ignored) untagged item.
        self.run("LOGOUT").await?;
        Ok(())
    }

    /// Sends one tagged command and collects its untagged responses,
    /// bounded by the command timeout.
    async fn run(&mut self, command: &str) -> Result<Vec<Untagged>> {
        let timeout = self.command_timeout;
        match tokio::time::timeout(timeout, self.run_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn run_inner(&mut self, command: &str) -> Result<Vec<Untagged>> {
        let tag = self.tags.next();
        trace!(%tag, command = command.split(' ').next().unwrap_or(""), "sending command");

        self.stream
            .write_all(format!("{tag} {command}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;

        let mut items = Vec::new();
        loop {
            let line = self.read_line().await?;

            if let Some(rest) = line.strip_prefix(&tag) {
                let rest = rest.trim_start();
                return if let Some(msg) = rest.strip_prefix("OK") {
                    trace!(%tag, status = msg.trim(), "command completed");
                    Ok(items)
                } else if let Some(msg) = rest.strip_prefix("NO") {
                    Err(Error::No(msg.trim().to_string()))
                } else if let Some(msg) = rest.strip_prefix("BAD") {
                    Err(Error::Bad(msg.trim().to_string()))
                } else {
                    Err(Error::Protocol(format!("unexpected completion: {line}")))
                };
            }

            if line.starts_with('*') {
                items.push(self.read_untagged(line).await?);
            } else if line.starts_with('+') {
                return Err(Error::Protocol(
                    "unexpected continuation request".to_string(),
                ));
            }
            // Anything else (stray tagged data from a previous exchange)
            // is dropped; the session runs commands strictly in sequence.
        }
    }

    /// Reads the remainder of an untagged response, following literals.
    async fn read_untagged(&mut self, first: String) -> Result<Untagged> {
        let mut item = Untagged {
            segments: Vec::new(),
            literals: Vec::new(),
        };

        let mut current = first;
        while let Some(len) = parser::literal_len(&current) {
            item.segments.push(current);
            let mut buf = vec![0u8; len];
            self.stream.read_exact(&mut buf).await?;
            item.literals.push(buf);
            current = self.read_line().await?;
        }
        item.segments.push(current);

        Ok(item)
    }

    /// Reads one CRLF-terminated line, stripped of the terminator.
    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(Error::Protocol("connection closed by server".to_string()));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

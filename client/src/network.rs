//! Connection handling and the verb loop for the reference bot.

use log::{debug, info, warn};
use shared::parse_line;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::strategy;

/// One bot connection. Drives a simple state machine keyed on the server's
/// prompt verbs; the server paces the conversation.
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    name: String,
    token: Option<String>,
}

impl Client {
    pub async fn connect(addr: &str, name: &str, token: Option<String>) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to {}", addr);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            name: name.to_string(),
            token,
        })
    }

    /// The session token, once the server has assigned one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    async fn send(&mut self, line: &str) -> std::io::Result<()> {
        debug!("SEND:{}", line);
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await?;
        self.writer.flush().await
    }

    /// Plays until the server hangs up, says goodbye, or the bankroll cannot
    /// cover another bet.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                info!("Server closed the connection");
                return Ok(());
            }
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            debug!("RECV:{}", line);
            let msg = match parse_line(line) {
                Some(msg) => msg,
                None => {
                    warn!("Could not parse server line: {}", line);
                    continue;
                }
            };
            match msg.verb.as_str() {
                "HELLO" => {
                    let reply = match &self.token {
                        Some(token) => format!("LOGIN {}", token),
                        None => format!("REGISTER {}", self.name),
                    };
                    self.send(&reply).await?;
                }
                "TOKEN" => {
                    info!("Assigned token {}", msg.noun);
                    self.token = Some(msg.noun);
                }
                "OK" => {}
                "READY" => {
                    let bankroll: i64 = msg
                        .noun
                        .split_whitespace()
                        .next()
                        .unwrap_or("0")
                        .parse()
                        .unwrap_or(0);
                    match strategy::choose_bet(bankroll) {
                        Some(bet) => self.send(&format!("BET {}", bet)).await?,
                        None => {
                            info!("Out of money, leaving the table");
                            return Ok(());
                        }
                    }
                }
                "INSURANCE" => self.send("NO").await?,
                "ACT" => {
                    let action = strategy::choose_action_from_view(&msg.noun);
                    self.send(action).await?;
                }
                "DONE" => debug!("Round result: {}", msg.noun),
                "TIMEOUT" => warn!("Server timed us out"),
                "INVALID" => warn!("Server rejected a command: {}", msg.noun),
                "BYE" => {
                    info!("Server said goodbye: {}", msg.noun);
                    return Ok(());
                }
                other => debug!("Ignoring unexpected verb {}", other),
            }
        }
    }
}

//! Prompt/response enforcement shared by every game phase.
//!
//! All server-to-client conversations go through [`request`]: it sends one
//! prompt line, then keeps reading until the client produces a verb from the
//! allowed set or the deadline expires. Unknown verbs and malformed lines
//! earn an `INVALID` without moving the deadline, so a misbehaving client
//! can only waste its own clock.

use std::sync::Arc;

use shared::parse_line;
use tokio::time::Instant;

use crate::session::PlayerSession;
use crate::table::Table;
use crate::transport::TransportError;

/// One prompt: its text, the verbs it accepts, the verb substituted on
/// timeout, and explanations for verbs that are recognized but barred.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub allowed: Vec<&'static str>,
    pub timeout_default: &'static str,
    rejections: Vec<(&'static str, String)>,
}

impl Prompt {
    pub fn new(text: String, allowed: &[&'static str], timeout_default: &'static str) -> Self {
        Self {
            text,
            allowed: allowed.to_vec(),
            timeout_default,
            rejections: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: String) -> Self {
        self.text = text;
        self
    }

    pub fn allow(mut self, allowed: Vec<&'static str>) -> Self {
        self.allowed = allowed;
        self
    }

    /// Registers an explanation sent when the client tries `verb` while it is
    /// not currently legal.
    pub fn reject(mut self, verb: &'static str, reason: String) -> Self {
        self.rejections.push((verb, reason));
        self
    }

    pub fn rejection_for(&self, verb: &str) -> Option<&str> {
        self.rejections
            .iter()
            .find(|(v, _)| *v == verb)
            .map(|(_, reason)| reason.as_str())
    }
}

/// Sends `prompt` and collects one legal reply before `deadline`.
///
/// On timeout the client is told `TIMEOUT` and the prompt's default verb is
/// returned with an empty noun, with the session flagged as timed out. A
/// closed connection marks the session disconnected and surfaces as an error;
/// nothing else this round should talk to that socket.
pub async fn request(
    table: &Table,
    player: &Arc<PlayerSession>,
    deadline: Instant,
    prompt: &Prompt,
) -> Result<(String, String), TransportError> {
    let show = table.show_comms().await;
    {
        let mut st = player.state.lock().await;
        st.timed_out = false;
        st.active = true;
        st.stats.interactions += 1;
    }
    table.update_monitors().await;
    let started = Instant::now();

    if player.send(&prompt.text, show).await.is_err() {
        finish(player, started, false).await;
        return Err(TransportError::Closed);
    }

    loop {
        let line = match player.recv_deadline(deadline, show).await {
            Ok(line) => line,
            Err(TransportError::Timeout) => {
                let _ = player.send("TIMEOUT", show).await;
                finish(player, started, true).await;
                return Ok((prompt.timeout_default.to_string(), String::new()));
            }
            Err(TransportError::Closed) => {
                finish(player, started, false).await;
                return Err(TransportError::Closed);
            }
        };

        let reply = match parse_line(&line) {
            Some(msg) => msg,
            None => {
                if player.send("INVALID Bad command format", show).await.is_err() {
                    finish(player, started, false).await;
                    return Err(TransportError::Closed);
                }
                continue;
            }
        };

        if prompt.allowed.iter().any(|v| *v == reply.verb) {
            finish(player, started, false).await;
            return Ok((reply.verb, reply.noun));
        }

        let complaint = match prompt.rejection_for(&reply.verb) {
            Some(reason) => format!("INVALID {}", reason),
            None => format!(
                "INVALID Bad command '{}' - valid commands: {}",
                reply.verb,
                prompt.allowed.join(" ")
            ),
        };
        if player.send(&complaint, show).await.is_err() {
            finish(player, started, false).await;
            return Err(TransportError::Closed);
        }
    }
}

async fn finish(player: &Arc<PlayerSession>, started: Instant, timed_out: bool) {
    let mut st = player.state.lock().await;
    st.active = false;
    st.timed_out = timed_out;
    st.stats.wait_time += started.elapsed();
}

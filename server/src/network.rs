//! Connection acceptance, the registration handshake, and the top-level
//! server loop.
//!
//! The acceptor runs as its own task. Each accepted socket gets a handshake
//! task with a bounded deadline; sessions that survive the handshake flow to
//! the coordinator over a channel and are installed at the table between
//! rounds. The coordinator alternates between installing newcomers and
//! playing rounds for as long as anyone is seated.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use shared::{parse_line, SERVER_GREETING};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::config::ADMIN_PASSWORD;
use crate::persist;
use crate::session::{new_token, MonitorSession, PlayerSession};
use crate::table::Table;
use crate::transport::{LineTransport, TransportError};

/// A session that completed the handshake, ready to be installed.
pub enum Registration {
    Player(Arc<PlayerSession>),
    Monitor(Arc<MonitorSession>),
}

/// Owns the listening socket and the round loop.
pub struct Server {
    listener: TcpListener,
    table: Arc<Table>,
}

impl Server {
    /// Binds the listening socket. A bind failure is fatal to the caller.
    pub async fn bind(addr: &str, table: Arc<Table>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Now accepting connections at {}", listener.local_addr()?);
        Ok(Self { listener, table })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn table(&self) -> Arc<Table> {
        Arc::clone(&self.table)
    }

    /// Runs forever: accept clients in the background and deal rounds while
    /// any player is registered.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let table = self.table;
        tokio::spawn(accept_loop(self.listener, Arc::clone(&table), tx));

        loop {
            while let Ok(registration) = rx.try_recv() {
                install(&table, registration).await;
            }
            if table.has_players().await {
                table.run_round().await;
                sleep(table.game_wait_time().await).await;
            } else {
                // Nobody seated; block until someone registers.
                match rx.recv().await {
                    Some(registration) => install(&table, registration).await,
                    None => return Ok(()),
                }
            }
        }
    }
}

async fn install(table: &Table, registration: Registration) {
    match registration {
        Registration::Player(player) => table.seat_player(player).await,
        Registration::Monitor(monitor) => table.add_monitor(monitor).await,
    }
}

async fn accept_loop(
    listener: TcpListener,
    table: Arc<Table>,
    tx: mpsc::UnboundedSender<Registration>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Answering a client from {}", addr);
                let table = Arc::clone(&table);
                let tx = tx.clone();
                tokio::spawn(async move {
                    match handshake(stream, addr, &table).await {
                        Ok(Some(registration)) => {
                            let _ = tx.send(registration);
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Handshake with {} failed: {}", addr, e),
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

/// Greets a fresh connection and resolves it into a player, a monitor, or an
/// admin command. Failures close the socket without ceremony.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    table: &Table,
) -> Result<Option<Registration>, TransportError> {
    let mut conn = LineTransport::new(stream, addr);
    let (timeout, start_currency) = {
        let config = table.config().read().await;
        (config.command_timeout, config.start_currency)
    };

    conn.send_line(SERVER_GREETING).await?;
    let deadline = Instant::now() + timeout;
    loop {
        let line = conn.read_line_deadline(deadline).await?;
        let msg = match parse_line(&line) {
            Some(msg) => msg,
            None => {
                conn.send_line("INVALID Bad command format").await?;
                continue;
            }
        };
        match msg.verb.as_str() {
            "REGISTER" => {
                if msg.noun == "Playername" {
                    conn.send_line("INVALID Please use a real name, not the example name.")
                        .await?;
                    return Ok(None);
                }
                let name = msg.noun.replace(' ', "_");
                let token = new_token();
                conn.send_line(&format!("TOKEN {}", token)).await?;
                info!("Registered player {} from {}", name, addr);
                let session = PlayerSession::new(name, token, conn, start_currency);
                return Ok(Some(Registration::Player(Arc::new(session))));
            }
            "LOGIN" => match persist::load_player(table.store().as_ref(), msg.noun.trim()) {
                Some(record) => {
                    conn.send_line("OK").await?;
                    info!("Player {} logged back in from {}", record.name, addr);
                    let session =
                        PlayerSession::new(record.name, record.token, conn, record.currency);
                    return Ok(Some(Registration::Player(Arc::new(session))));
                }
                None => {
                    debug!("Unknown token in LOGIN from {}", addr);
                    return Ok(None);
                }
            },
            "MONITOR" => {
                let label = if msg.noun.is_empty() {
                    format!("Generic {}", &new_token()[..8])
                } else {
                    msg.noun.clone()
                };
                let session = MonitorSession::new(format!("Monitor {}", label), conn);
                return Ok(Some(Registration::Monitor(Arc::new(session))));
            }
            "SET" => {
                let parts: Vec<&str> = msg.noun.split_whitespace().collect();
                match parts.as_slice() {
                    [password, param, value] if *password == ADMIN_PASSWORD => {
                        match table.config().write().await.apply_set(param, value) {
                            Ok(()) => info!("Admin set {} to {}", param, value),
                            Err(e) => warn!("Rejected admin change from {}: {}", addr, e),
                        }
                    }
                    _ => {
                        let _ = conn.send_line("BYE Invalid client.").await;
                        warn!(
                            "Client from {} attempted an admin command with an invalid password.",
                            addr
                        );
                    }
                }
                return Ok(None);
            }
            other => {
                conn.send_line(&format!(
                    "INVALID Bad command '{}' - valid commands: LOGIN REGISTER MONITOR SET",
                    other
                ))
                .await?;
            }
        }
    }
}

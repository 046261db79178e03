//! The single game table: synchronized round phases, dealer play, settlement
//! ordering, and observer broadcasts.
//!
//! The coordinator owns the round lifecycle. Within the Ready, Insurance and
//! Act phases it fans one task out per player through a bounded worker pool
//! and joins them all before moving on; dealing, dealer play and settlement
//! run sequentially on the coordinator in the seating order captured at round
//! start. Shoe draws during Act are serialized by the shoe mutex, and the
//! house counters are atomics so concurrent stakes never tear.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use shared::{Card, Hand, HandStatus, Rank};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::config::{Config, SharedConfig};
use crate::persist::{self, PlayerRecord, StateStore};
use crate::session::{self, MonitorSession, PlayerSession};
use crate::shoe::Shoe;

/// Per-phase fan-out limit; players beyond this queue for a worker.
pub const WORKER_POOL_SIZE: usize = 8;

/// The dealer draws until reaching this value.
const DEALER_STAND_VALUE: u32 = 17;

/// Net house winnings and total turnover since boot. Updated from Act tasks
/// and settlement alike, so both counters are atomic.
#[derive(Debug, Default)]
pub struct HouseBook {
    net: AtomicI64,
    turnover: AtomicI64,
}

impl HouseBook {
    /// Records a wager received from a player.
    pub fn stake(&self, amount: i64) {
        self.net.fetch_add(amount, Ordering::Relaxed);
        self.turnover.fetch_add(amount, Ordering::Relaxed);
    }

    /// Records a payout credited to a player.
    pub fn pay(&self, amount: i64) {
        self.net.fetch_sub(amount, Ordering::Relaxed);
    }

    pub fn net(&self) -> i64 {
        self.net.load(Ordering::Relaxed)
    }

    pub fn turnover(&self) -> i64 {
        self.turnover.load(Ordering::Relaxed)
    }
}

/// The dealer's cards plus whether the hole card has been revealed.
#[derive(Debug, Clone, Default)]
pub struct DealerHand {
    pub hand: Option<Hand>,
    pub revealed: bool,
}

impl DealerHand {
    /// What seated players see: the upcard and a hidden hole card until the
    /// reveal, then the full hand.
    pub fn player_view(&self) -> String {
        self.view("--")
    }

    /// What monitors see; the hidden hole card renders as `??`.
    pub fn monitor_view(&self) -> String {
        self.view("??")
    }

    fn view(&self, hidden: &str) -> String {
        match &self.hand {
            None => "????".to_string(),
            Some(hand) if !self.revealed => match hand.cards.first() {
                Some(up) => format!("{}{}", up, hidden),
                None => "????".to_string(),
            },
            Some(hand) => hand.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Ready,
    Insurance,
    Act,
}

/// The one table this server runs.
pub struct Table {
    config: SharedConfig,
    pub house: HouseBook,
    shoe: Mutex<Shoe>,
    dealer: Mutex<DealerHand>,
    players: RwLock<Vec<Arc<PlayerSession>>>,
    monitors: RwLock<Vec<Arc<MonitorSession>>>,
    rounds_dealt: AtomicU64,
    workers: Semaphore,
    store: Arc<dyn StateStore>,
}

impl Table {
    pub fn new(config: Config, store: Arc<dyn StateStore>) -> Self {
        let shoe = Shoe::new(config.minimum_decks);
        Self {
            config: crate::config::shared(config),
            house: HouseBook::default(),
            shoe: Mutex::new(shoe),
            dealer: Mutex::new(DealerHand::default()),
            players: RwLock::new(Vec::new()),
            monitors: RwLock::new(Vec::new()),
            rounds_dealt: AtomicU64::new(0),
            workers: Semaphore::new(WORKER_POOL_SIZE),
            store,
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    pub fn rounds_dealt(&self) -> u64 {
        self.rounds_dealt.load(Ordering::Relaxed)
    }

    pub async fn command_timeout(&self) -> Duration {
        self.config.read().await.command_timeout
    }

    pub async fn game_wait_time(&self) -> Duration {
        self.config.read().await.game_wait_time
    }

    pub async fn show_comms(&self) -> bool {
        self.config.read().await.show_comms
    }

    /// Replaces the shoe wholesale. Lets operators and tests install a
    /// prepared card order.
    pub async fn set_shoe(&self, shoe: Shoe) {
        *self.shoe.lock().await = shoe;
    }

    pub async fn shoe_stats(&self) -> (u32, usize) {
        let shoe = self.shoe.lock().await;
        (shoe.decks(), shoe.len())
    }

    pub async fn draw_card(&self) -> Card {
        self.shoe.lock().await.draw()
    }

    pub async fn seat_player(&self, player: Arc<PlayerSession>) {
        info!("Seated player {} from {}", player.name, player.addr);
        self.players.write().await.push(player);
    }

    pub async fn add_monitor(&self, monitor: Arc<MonitorSession>) {
        info!("Attached monitor {}", monitor.name);
        self.monitors.write().await.push(monitor);
    }

    pub async fn players(&self) -> Vec<Arc<PlayerSession>> {
        self.players.read().await.clone()
    }

    pub async fn has_players(&self) -> bool {
        !self.players.read().await.is_empty()
    }

    /// The table as seen from one player: own hands first, then the dealer,
    /// then everyone else in seating order.
    pub async fn table_state(&self, viewpoint: &str) -> String {
        let players = self.players.read().await.clone();
        let dealer = self.dealer.lock().await.clone();

        let mut own = "----".to_string();
        for player in &players {
            if player.token == viewpoint {
                own = player.state.lock().await.holding_state();
            }
        }
        let mut parts = vec![own, dealer.player_view()];
        for player in &players {
            if player.token != viewpoint {
                parts.push(player.state.lock().await.holding_state());
            }
        }
        parts.join(" ")
    }

    /// The one-line observer snapshot: table counters, the dealer, then every
    /// player with statistics.
    pub async fn monitor_snapshot(&self) -> String {
        let (decks, cards_left) = self.shoe_stats().await;
        let dealer = self.dealer.lock().await.clone();
        let mut line = format!(
            "{},{},{},{},{} {}",
            self.rounds_dealt(),
            decks,
            cards_left,
            self.house.net(),
            self.house.turnover(),
            dealer.monitor_view(),
        );
        let players = self.players.read().await.clone();
        for player in &players {
            let rendered = player.state.lock().await.monitor_state(&player.name);
            line.push(' ');
            line.push_str(&rendered);
        }
        line
    }

    /// Pushes a fresh snapshot to every attached monitor. Failed writes mark
    /// the monitor for reaping at round end.
    pub async fn update_monitors(&self) {
        let monitors = self.monitors.read().await.clone();
        if monitors.is_empty() {
            return;
        }
        let line = self.monitor_snapshot().await;
        for monitor in monitors {
            if !monitor.is_disconnected() {
                let _ = monitor.send(&line).await;
            }
        }
    }

    /// Plays one complete round across every seated session.
    pub async fn run_round(self: &Arc<Self>) {
        let seats = self.players.read().await.clone();
        if seats.is_empty() {
            return;
        }
        *self.dealer.lock().await = DealerHand::default();

        self.run_phase(Phase::Ready, &seats).await;

        {
            let config = self.config.read().await.clone();
            let mut shoe = self.shoe.lock().await;
            if shoe.reshuffle_if_needed(seats.len(), &config) {
                info!(
                    "Reshuffled the shoe: {} decks, {} cards",
                    shoe.decks(),
                    shoe.len()
                );
            }
        }
        self.deal(&seats).await;
        self.rounds_dealt.fetch_add(1, Ordering::Relaxed);
        self.update_monitors().await;

        let upcard_is_ace = {
            let dealer = self.dealer.lock().await;
            dealer
                .hand
                .as_ref()
                .and_then(|h| h.cards.first().copied())
                .map(|c| c.rank == Rank::Ace)
                .unwrap_or(false)
        };

        let mut dealer_blackjack = false;
        if upcard_is_ace {
            let playing = self.playing_seats(&seats).await;
            self.run_phase(Phase::Insurance, &playing).await;

            let natural = {
                let dealer = self.dealer.lock().await;
                dealer.hand.as_ref().map(|h| h.is_natural()).unwrap_or(false)
            };
            if natural {
                // Peeked blackjack ends the round before anyone acts.
                {
                    let mut dealer = self.dealer.lock().await;
                    dealer.revealed = true;
                    if let Some(hand) = dealer.hand.as_mut() {
                        hand.status = HandStatus::Stood;
                    }
                }
                for player in &playing {
                    let mut st = player.state.lock().await;
                    for hand in st.hands.iter_mut() {
                        hand.status = HandStatus::Stood;
                    }
                }
                dealer_blackjack = true;
            }
        }

        if !dealer_blackjack {
            let playing = self.playing_seats(&seats).await;
            self.run_phase(Phase::Act, &playing).await;
            self.play_dealer().await;
        }

        let dealer_hand = {
            let dealer = self.dealer.lock().await;
            dealer.hand.clone()
        };
        match dealer_hand {
            Some(dealer_hand) => {
                for player in &seats {
                    session::settle(self, player, &dealer_hand).await;
                }
            }
            None => error!("round ended without a dealt dealer hand"),
        }

        self.update_monitors().await;
        self.reap().await;
    }

    /// Runs one phase across `seats` with at most [`WORKER_POOL_SIZE`] tasks
    /// in flight, then joins them all.
    async fn run_phase(self: &Arc<Self>, phase: Phase, seats: &[Arc<PlayerSession>]) {
        let mut tasks = JoinSet::new();
        for player in seats {
            if player.is_disconnected() {
                continue;
            }
            let table = Arc::clone(self);
            let player = Arc::clone(player);
            tasks.spawn(async move {
                let _permit = match table.workers.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                match phase {
                    Phase::Ready => session::ready(&table, &player).await,
                    Phase::Insurance => session::insurance(&table, &player).await,
                    Phase::Act => session::act(&table, &player).await,
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    async fn playing_seats(&self, seats: &[Arc<PlayerSession>]) -> Vec<Arc<PlayerSession>> {
        let mut playing = Vec::new();
        for player in seats {
            if player.is_disconnected() {
                continue;
            }
            if player.state.lock().await.playing {
                playing.push(Arc::clone(player));
            }
        }
        playing
    }

    async fn deal(&self, seats: &[Arc<PlayerSession>]) {
        for player in seats {
            let playing = player.state.lock().await.playing;
            if playing {
                let first = self.draw_card().await;
                let second = self.draw_card().await;
                player.state.lock().await.hands = vec![Hand::new(vec![first, second])];
            }
        }
        let first = self.draw_card().await;
        let second = self.draw_card().await;
        let mut dealer = self.dealer.lock().await;
        dealer.hand = Some(Hand::new(vec![first, second]));
        dealer.revealed = false;
    }

    async fn play_dealer(&self) {
        let mut dealer = self.dealer.lock().await;
        dealer.revealed = true;
        if let Some(hand) = dealer.hand.as_mut() {
            while hand.value() < DEALER_STAND_VALUE {
                let card = self.shoe.lock().await.draw();
                hand.push(card);
            }
            hand.status = HandStatus::Stood;
        }
    }

    /// Drops sessions whose sockets died this round, saving player records on
    /// the way out. Sockets close when the last reference drops.
    async fn reap(&self) {
        {
            let mut players = self.players.write().await;
            let mut kept = Vec::with_capacity(players.len());
            for player in players.drain(..) {
                if player.is_disconnected() {
                    let currency = player.state.lock().await.currency;
                    persist::save_player(
                        self.store.as_ref(),
                        &PlayerRecord {
                            name: player.name.clone(),
                            token: player.token.clone(),
                            currency,
                        },
                    );
                    info!("Reaped disconnected player {} ({})", player.name, player.addr);
                } else {
                    kept.push(player);
                }
            }
            *players = kept;
        }
        let mut monitors = self.monitors.write().await;
        monitors.retain(|monitor| {
            if monitor.is_disconnected() {
                info!("Reaped disconnected monitor {}", monitor.name);
                false
            } else {
                true
            }
        });
    }
}

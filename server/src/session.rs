//! Per-client session state and the conversations each game phase holds with
//! it.
//!
//! A [`PlayerSession`] owns its socket for its whole life; the round
//! coordinator hands each session to exactly one task per phase, so the state
//! mutex is only ever contended by short view-rendering reads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{log, Level};
use rand::Rng;
use shared::{Hand, HandStatus};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::protocol::{request, Prompt};
use crate::table::Table;
use crate::transport::{LineTransport, TransportError};

/// Most hands one player may hold at once; splitting stops here.
pub const MAX_HANDS: usize = 4;

/// Round-scoped and lifetime state of one seated player.
#[derive(Debug, Default)]
pub struct PlayerState {
    pub currency: i64,
    pub cur_bet: i64,
    pub hands: Vec<Hand>,
    /// Set when the player bet this round; clear means they are watching.
    pub playing: bool,
    pub insured: bool,
    /// Bankroll snapshot at round start, for the end-of-round delta.
    pub start_currency: i64,
    /// The player let at least one prompt expire this round.
    pub timed_out: bool,
    /// A prompt is outstanding right now.
    pub active: bool,
    pub stats: PlayerStats,
}

/// Lifetime counters reported in the monitor snapshot.
#[derive(Debug, Default, Clone)]
pub struct PlayerStats {
    pub wins: u64,
    pub losses: u64,
    pub pushes: u64,
    pub sitouts: u64,
    /// Total amount wagered, including split and double-down stakes.
    pub total_bets: i64,
    /// Number of prompts issued to this client.
    pub interactions: u64,
    /// Total time spent waiting on this client.
    pub wait_time: Duration,
}

impl PlayerState {
    /// Resets the round-scoped fields before the Ready phase.
    pub fn begin_round(&mut self) {
        self.cur_bet = 0;
        self.hands.clear();
        self.playing = false;
        self.insured = false;
        self.timed_out = false;
        self.start_currency = self.currency;
    }

    /// Index of the next hand still needing decisions, if any.
    pub fn first_open_hand(&self) -> Option<usize> {
        self.hands.iter().position(|h| !h.is_closed())
    }

    /// Moves the hand at `idx` to the front, where the Act loop drives it.
    pub fn make_active_hand(&mut self, idx: usize) {
        let hand = self.hands.remove(idx);
        self.hands.insert(0, hand);
    }

    pub fn phase_char(&self) -> char {
        if self.timed_out {
            't'
        } else if self.active {
            'a'
        } else {
            'p'
        }
    }

    /// Slash-joined hand list, or `----` when sitting this round out.
    pub fn holding_state(&self) -> String {
        if !self.playing {
            return "----".to_string();
        }
        self.hands
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The per-player field of the monitor snapshot:
    /// `name:bankroll:stats:phase:hands`.
    pub fn monitor_state(&self, name: &str) -> String {
        format!(
            "{}:{}:{},{},{},{},{},{},{:.3}:{}:{}",
            name,
            self.currency,
            self.stats.wins,
            self.stats.losses,
            self.stats.pushes,
            self.stats.sitouts,
            self.stats.total_bets,
            self.stats.interactions,
            self.stats.wait_time.as_secs_f64(),
            self.phase_char(),
            self.holding_state(),
        )
    }
}

/// One registered player and its connection.
pub struct PlayerSession {
    pub name: String,
    pub token: String,
    pub addr: SocketAddr,
    disconnected: AtomicBool,
    pub state: Mutex<PlayerState>,
    conn: Mutex<LineTransport>,
}

impl PlayerSession {
    pub fn new(name: String, token: String, conn: LineTransport, currency: i64) -> Self {
        let addr = conn.peer();
        let state = PlayerState {
            currency,
            ..PlayerState::default()
        };
        Self {
            name,
            token,
            addr,
            disconnected: AtomicBool::new(false),
            state: Mutex::new(state),
            conn: Mutex::new(conn),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    pub fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::Relaxed);
    }

    /// Sends one line, marking the session disconnected on failure. No
    /// further I/O is attempted on a disconnected session.
    pub async fn send(&self, line: &str, show_comms: bool) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Closed);
        }
        log!(comm_level(show_comms), "SEND:{}:{}", self.name, line);
        let result = self.conn.lock().await.send_line(line).await;
        if result.is_err() {
            self.mark_disconnected();
        }
        result
    }

    /// Reads one line before `deadline`. Timeouts leave the connection
    /// usable; closure marks the session disconnected.
    pub async fn recv_deadline(
        &self,
        deadline: Instant,
        show_comms: bool,
    ) -> Result<String, TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Closed);
        }
        match self.conn.lock().await.read_line_deadline(deadline).await {
            Ok(line) => {
                log!(comm_level(show_comms), "RECV:{}:{}", self.name, line);
                Ok(line)
            }
            Err(TransportError::Timeout) => Err(TransportError::Timeout),
            Err(TransportError::Closed) => {
                self.mark_disconnected();
                Err(TransportError::Closed)
            }
        }
    }
}

/// An observer connection; receives snapshots, is never prompted.
pub struct MonitorSession {
    pub name: String,
    disconnected: AtomicBool,
    conn: Mutex<LineTransport>,
}

impl MonitorSession {
    pub fn new(name: String, conn: LineTransport) -> Self {
        Self {
            name,
            disconnected: AtomicBool::new(false),
            conn: Mutex::new(conn),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Relaxed)
    }

    pub async fn send(&self, line: &str) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Closed);
        }
        let result = self.conn.lock().await.send_line(line).await;
        if result.is_err() {
            self.disconnected.store(true, Ordering::Relaxed);
        }
        result
    }
}

fn comm_level(show_comms: bool) -> Level {
    if show_comms {
        Level::Info
    } else {
        Level::Debug
    }
}

/// Allocates an opaque printable token for a new identity.
pub fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Drives the Ready phase for one player: prompt for a bet, validate it, and
/// debit the stake. Empty and zero bets sit the player out.
pub async fn ready(table: &Table, player: &Arc<PlayerSession>) {
    player.state.lock().await.begin_round();

    let show = table.show_comms().await;
    let deadline = Instant::now() + table.command_timeout().await;
    loop {
        if Instant::now() >= deadline {
            let _ = player.send("TIMEOUT", show).await;
            let mut st = player.state.lock().await;
            st.timed_out = true;
            st.playing = false;
            return;
        }

        let bankroll = player.state.lock().await.currency;
        let (decks, cards_left) = table.shoe_stats().await;
        let text = format!("READY {} {} {}", bankroll, decks, cards_left);
        let prompt = Prompt::new(text, &["BET"], "BET");
        let (_, noun) = match request(table, player, deadline, &prompt).await {
            Ok(reply) => reply,
            Err(_) => {
                player.state.lock().await.playing = false;
                return;
            }
        };

        if noun.is_empty() {
            let mut st = player.state.lock().await;
            st.playing = false;
            st.stats.sitouts += 1;
            return;
        }

        let amount: i64 = match noun.trim().parse() {
            Ok(amount) => amount,
            Err(_) => {
                let _ = player
                    .send("INVALID BET must be a positive integer.", show)
                    .await;
                continue;
            }
        };
        if amount < 0 || amount % 2 != 0 {
            let _ = player
                .send("INVALID BET must be a positive even integer", show)
                .await;
            continue;
        }

        let mut st = player.state.lock().await;
        if amount > st.currency {
            drop(st);
            let _ = player
                .send("INVALID You do not have that much currency.", show)
                .await;
            continue;
        }
        if amount == 0 {
            st.playing = false;
            st.stats.sitouts += 1;
        } else {
            st.cur_bet = amount;
            st.currency -= amount;
            st.stats.total_bets += amount;
            st.playing = true;
            table.house.stake(amount);
        }
        return;
    }
}

/// Offers insurance to one playing session while the dealer shows an Ace.
pub async fn insurance(table: &Table, player: &Arc<PlayerSession>) {
    let (bet, bankroll) = {
        let st = player.state.lock().await;
        (st.cur_bet, st.currency)
    };
    let insurance_stake = bet / 2;

    let text = format!("INSURANCE {}", table.table_state(&player.token).await);
    let mut prompt = Prompt::new(text, &["YES", "NO"], "NO");
    if bankroll < insurance_stake {
        prompt = Prompt::new(prompt.text, &["NO"], "NO").reject(
            "YES",
            format!(
                "You do not have sufficient currency for insurance - {} needed, you hold {}.",
                insurance_stake, bankroll
            ),
        );
    }

    let deadline = Instant::now() + table.command_timeout().await;
    if let Ok((verb, _)) = request(table, player, deadline, &prompt).await {
        if verb == "YES" {
            let mut st = player.state.lock().await;
            st.insured = true;
            st.currency -= insurance_stake;
            table.house.stake(insurance_stake);
        }
    }
    table.update_monitors().await;
}

/// Drives the Act phase for one player: every open hand, front first, until
/// all are closed or the client disappears.
pub async fn act(table: &Table, player: &Arc<PlayerSession>) {
    loop {
        if player.is_disconnected() {
            return;
        }
        let next = {
            let mut st = player.state.lock().await;
            match st.first_open_hand() {
                Some(idx) => {
                    st.make_active_hand(idx);
                    true
                }
                None => false,
            }
        };
        if !next {
            return;
        }
        act_hand(table, player).await;
    }
}

/// Plays out the front hand under a single decision deadline.
async fn act_hand(table: &Table, player: &Arc<PlayerSession>) {
    let deadline = Instant::now() + table.command_timeout().await;
    loop {
        let prompt = {
            let mut st = player.state.lock().await;
            if st.hands[0].value() >= 21 {
                // Nothing left to decide; the hand stands on its own.
                st.hands[0].status = HandStatus::Stood;
                return;
            }
            st.hands[0].status = HandStatus::Awaiting;
            build_act_prompt(&st)
        };
        let text = format!("ACT {}", table.table_state(&player.token).await);
        let prompt = prompt.with_text(text);

        let (verb, _) = match request(table, player, deadline, &prompt).await {
            Ok(reply) => reply,
            Err(_) => return,
        };

        match verb.as_str() {
            "HIT" => {
                let card = table.draw_card().await;
                let mut st = player.state.lock().await;
                st.hands[0].push(card);
            }
            "STAND" => {
                let mut st = player.state.lock().await;
                st.hands[0].status = HandStatus::Stood;
                return;
            }
            "DOUBLE" => {
                let card = table.draw_card().await;
                let mut st = player.state.lock().await;
                st.hands[0].push(card);
                st.hands[0].status = HandStatus::Doubled;
                let bet = st.cur_bet;
                st.currency -= bet;
                st.stats.total_bets += bet;
                table.house.stake(bet);
                return;
            }
            "SPLIT" => {
                let first_draw = table.draw_card().await;
                let second_draw = table.draw_card().await;
                let mut st = player.state.lock().await;
                let old = st.hands.remove(0);
                st.hands
                    .insert(0, Hand::new(vec![old.cards[1], second_draw]));
                st.hands.insert(0, Hand::new(vec![old.cards[0], first_draw]));
                let bet = st.cur_bet;
                st.currency -= bet;
                st.stats.total_bets += bet;
                table.house.stake(bet);
            }
            _ => {}
        }
        table.update_monitors().await;
    }
}

/// Computes the legal verbs for the front hand, with explanations for the
/// moves that are recognized but currently barred.
fn build_act_prompt(st: &PlayerState) -> Prompt {
    let hand = &st.hands[0];
    let value = hand.value();
    let two_cards = hand.cards.len() == 2;

    let mut allowed: Vec<&'static str> = vec!["HIT", "STAND"];
    let mut prompt = Prompt::new(String::new(), &[], "STAND");

    if two_cards {
        if (9..=11).contains(&value) {
            if st.currency >= st.cur_bet {
                allowed.push("DOUBLE");
            } else {
                prompt = prompt.reject(
                    "DOUBLE",
                    format!(
                        "You do not have sufficient currency to double down - {} needed, you hold {}.",
                        st.cur_bet, st.currency
                    ),
                );
            }
        } else {
            prompt = prompt.reject(
                "DOUBLE",
                format!(
                    "Double down only permitted on card values between 9 and 11 - you are holding {}.",
                    value
                ),
            );
        }
    } else {
        prompt = prompt.reject(
            "DOUBLE",
            "Double down only permitted on the first two cards dealt.".to_string(),
        );
    }

    if two_cards {
        if hand.cards[0].rank.value() == hand.cards[1].rank.value() {
            if st.currency >= st.cur_bet {
                if st.hands.len() < MAX_HANDS {
                    allowed.push("SPLIT");
                } else {
                    prompt = prompt.reject(
                        "SPLIT",
                        "You are already holding four hands at once, the table limit.".to_string(),
                    );
                }
            } else {
                prompt = prompt.reject(
                    "SPLIT",
                    format!(
                        "You do not have sufficient currency to split - {} needed, you hold {}.",
                        st.cur_bet, st.currency
                    ),
                );
            }
        } else {
            prompt = prompt.reject(
                "SPLIT",
                "You can only split hands whose two cards are the same value.".to_string(),
            );
        }
    } else {
        prompt = prompt.reject(
            "SPLIT",
            "You can only split on the first two cards dealt.".to_string(),
        );
    }

    prompt.allow(allowed)
}

/// What one hand earned at settlement. Credits are amounts returned to the
/// player; stakes were already debited when wagered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOutcome {
    Won(i64),
    Push(i64),
    Lost,
}

/// Scores a single hand against the dealer.
///
/// `lone` is true when this is the player's only hand, which is required for
/// the 3:2 blackjack payout. Insurance is settled separately by the caller.
pub fn settle_hand(hand: &Hand, dealer: &Hand, bet: i64, lone: bool) -> HandOutcome {
    let value = hand.value();
    if value > 21 {
        return HandOutcome::Lost;
    }
    let dealer_value = dealer.value();
    if dealer_value == value {
        return HandOutcome::Push(bet);
    }
    if dealer_value > 21 || value > dealer_value {
        let winnings = if hand.status == HandStatus::Doubled {
            bet * 3
        } else if lone && hand.is_natural() {
            // Blackjack pays 3:2, rounded up.
            (bet * 3 + 1) / 2
        } else {
            bet
        };
        return HandOutcome::Won(bet + winnings);
    }
    HandOutcome::Lost
}

/// Settles every hand of one session against the dealer and reports the
/// round's delta with `DONE`. Sessions that sat out get the report too.
pub async fn settle(table: &Table, player: &Arc<PlayerSession>, dealer: &Hand) {
    let delta = {
        let mut st = player.state.lock().await;
        if st.insured && dealer.is_natural() {
            // The side bet pays 2:1 on half the stake, squaring the round
            // when the main hand loses to the dealer's blackjack.
            let insurance_stake = st.cur_bet / 2;
            st.currency += insurance_stake * 3;
            table.house.pay(insurance_stake * 3);
        }
        let lone = st.hands.len() == 1;
        let bet = st.cur_bet;
        let outcomes: Vec<HandOutcome> = st
            .hands
            .iter()
            .map(|hand| settle_hand(hand, dealer, bet, lone))
            .collect();
        let mut credit = 0;
        for outcome in outcomes {
            match outcome {
                HandOutcome::Won(amount) => {
                    credit += amount;
                    st.stats.wins += 1;
                }
                HandOutcome::Push(amount) => {
                    credit += amount;
                    st.stats.pushes += 1;
                }
                HandOutcome::Lost => st.stats.losses += 1,
            }
        }
        st.currency += credit;
        table.house.pay(credit);
        st.currency - st.start_currency
    };

    if player.is_disconnected() {
        return;
    }
    let show = table.show_comms().await;
    let view = table.table_state(&player.token).await;
    let _ = player
        .send(&format!("DONE {}:{}", view, delta), show)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(codes: &[&str], status: HandStatus) -> Hand {
        let mut hand = Hand::new(codes.iter().map(|c| c.parse().unwrap()).collect());
        hand.status = status;
        hand
    }

    fn dealer(codes: &[&str]) -> Hand {
        hand(codes, HandStatus::Stood)
    }

    #[test]
    fn test_settle_bust_loses() {
        let outcome = settle_hand(
            &hand(&["KS", "QD", "5C"], HandStatus::Stood),
            &dealer(&["TS", "8D"]),
            100,
            true,
        );
        assert_eq!(outcome, HandOutcome::Lost);
    }

    #[test]
    fn test_settle_push_refunds_bet() {
        let outcome = settle_hand(
            &hand(&["TS", "8C"], HandStatus::Stood),
            &dealer(&["TD", "8D"]),
            100,
            true,
        );
        assert_eq!(outcome, HandOutcome::Push(100));
    }

    #[test]
    fn test_settle_plain_win_pays_even_money() {
        let outcome = settle_hand(
            &hand(&["TS", "9C"], HandStatus::Stood),
            &dealer(&["TD", "8D"]),
            100,
            true,
        );
        assert_eq!(outcome, HandOutcome::Won(200));
    }

    #[test]
    fn test_settle_dealer_bust_pays() {
        let outcome = settle_hand(
            &hand(&["TS", "2C"], HandStatus::Stood),
            &dealer(&["TD", "6D", "9H"]),
            50,
            true,
        );
        assert_eq!(outcome, HandOutcome::Won(100));
    }

    #[test]
    fn test_settle_natural_pays_three_to_two() {
        let outcome = settle_hand(
            &hand(&["AS", "TC"], HandStatus::Stood),
            &dealer(&["TD", "8D"]),
            100,
            true,
        );
        assert_eq!(outcome, HandOutcome::Won(100 + 150));
    }

    #[test]
    fn test_settle_split_hand_21_pays_even_money() {
        // Two cards making 21 in a split hand are not a natural.
        let outcome = settle_hand(
            &hand(&["AS", "TC"], HandStatus::Stood),
            &dealer(&["TD", "8D"]),
            100,
            false,
        );
        assert_eq!(outcome, HandOutcome::Won(200));
    }

    #[test]
    fn test_settle_double_down_pays_triple_winnings() {
        let outcome = settle_hand(
            &hand(&["5H", "5D", "TC"], HandStatus::Doubled),
            &dealer(&["TD", "6D", "9S"]),
            20,
            true,
        );
        assert_eq!(outcome, HandOutcome::Won(80));
    }

    #[test]
    fn test_settle_dealer_higher_loses() {
        let outcome = settle_hand(
            &hand(&["TS", "7C"], HandStatus::Stood),
            &dealer(&["TD", "9D"]),
            100,
            true,
        );
        assert_eq!(outcome, HandOutcome::Lost);
    }

    #[test]
    fn test_begin_round_resets_round_fields_only() {
        let mut st = PlayerState {
            currency: 500,
            cur_bet: 40,
            hands: vec![hand(&["TS", "7C"], HandStatus::Stood)],
            playing: true,
            insured: true,
            timed_out: true,
            ..PlayerState::default()
        };
        st.stats.wins = 3;
        st.begin_round();
        assert_eq!(st.currency, 500);
        assert_eq!(st.start_currency, 500);
        assert_eq!(st.cur_bet, 0);
        assert!(st.hands.is_empty());
        assert!(!st.playing && !st.insured && !st.timed_out);
        assert_eq!(st.stats.wins, 3);
    }

    #[test]
    fn test_holding_state_sitting_out() {
        let st = PlayerState::default();
        assert_eq!(st.holding_state(), "----");
    }

    #[test]
    fn test_holding_state_joins_split_hands() {
        let st = PlayerState {
            playing: true,
            hands: vec![
                hand(&["8H", "8S"], HandStatus::Stood),
                hand(&["8D", "8C"], HandStatus::Pending),
            ],
            ..PlayerState::default()
        };
        assert_eq!(st.holding_state(), "8H8S./8D8Cp");
    }

    #[test]
    fn test_monitor_state_layout() {
        let mut st = PlayerState {
            currency: 9_960,
            playing: true,
            hands: vec![hand(&["AS", "TC"], HandStatus::Stood)],
            ..PlayerState::default()
        };
        st.stats.wins = 1;
        st.stats.total_bets = 40;
        st.stats.interactions = 2;
        let rendered = st.monitor_state("Alice");
        assert_eq!(rendered, "Alice:9960:1,0,0,0,40,2,0.000:p:ASTC.");
    }

    #[test]
    fn test_phase_char_priorities() {
        let mut st = PlayerState::default();
        assert_eq!(st.phase_char(), 'p');
        st.active = true;
        assert_eq!(st.phase_char(), 'a');
        st.timed_out = true;
        assert_eq!(st.phase_char(), 't');
    }

    #[test]
    fn test_make_active_hand_moves_to_front() {
        let mut st = PlayerState {
            hands: vec![
                hand(&["8H", "8S"], HandStatus::Stood),
                hand(&["8D", "8C"], HandStatus::Pending),
            ],
            ..PlayerState::default()
        };
        let open = st.first_open_hand().unwrap();
        assert_eq!(open, 1);
        st.make_active_hand(open);
        assert_eq!(st.hands[0].cards[0].to_string(), "8D");
    }

    #[test]
    fn test_new_token_is_unique_and_printable() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_act_prompt_on_pair_with_funds() {
        let st = PlayerState {
            currency: 100,
            cur_bet: 20,
            playing: true,
            hands: vec![hand(&["8H", "8D"], HandStatus::Pending)],
            ..PlayerState::default()
        };
        let prompt = build_act_prompt(&st);
        assert!(prompt.allowed.contains(&"HIT"));
        assert!(prompt.allowed.contains(&"STAND"));
        assert!(!prompt.allowed.contains(&"DOUBLE"));
        assert!(prompt.allowed.contains(&"SPLIT"));
    }

    #[test]
    fn test_act_prompt_double_window() {
        let st = PlayerState {
            currency: 100,
            cur_bet: 20,
            playing: true,
            hands: vec![hand(&["5H", "5D"], HandStatus::Pending)],
            ..PlayerState::default()
        };
        let prompt = build_act_prompt(&st);
        assert!(prompt.allowed.contains(&"DOUBLE"));
        assert!(prompt.allowed.contains(&"SPLIT"));
    }

    #[test]
    fn test_act_prompt_rejections_name_the_blocker() {
        // Broke player holding a pair: both moves barred over funds.
        let st = PlayerState {
            currency: 5,
            cur_bet: 20,
            playing: true,
            hands: vec![hand(&["5H", "5D"], HandStatus::Pending)],
            ..PlayerState::default()
        };
        let prompt = build_act_prompt(&st);
        assert!(!prompt.allowed.contains(&"DOUBLE"));
        let reason = prompt.rejection_for("DOUBLE").unwrap();
        assert!(reason.contains("20 needed"));
        let reason = prompt.rejection_for("SPLIT").unwrap();
        assert!(reason.contains("you hold 5"));
    }

    #[test]
    fn test_act_prompt_split_capped_at_four_hands() {
        let st = PlayerState {
            currency: 1_000,
            cur_bet: 20,
            playing: true,
            hands: vec![
                hand(&["8H", "8D"], HandStatus::Pending),
                hand(&["8S", "2C"], HandStatus::Pending),
                hand(&["8C", "3C"], HandStatus::Pending),
                hand(&["2D", "3D"], HandStatus::Pending),
            ],
            ..PlayerState::default()
        };
        let prompt = build_act_prompt(&st);
        assert!(!prompt.allowed.contains(&"SPLIT"));
        let reason = prompt.rejection_for("SPLIT").unwrap();
        assert!(reason.contains("table limit"));
    }
}

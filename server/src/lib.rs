//! # Blackjack Game Server Library
//!
//! The authoritative server for a multi-player Blackjack table speaking a
//! line-oriented text protocol over TCP. Clients register, bet, and play
//! each round under per-decision deadlines while monitor connections receive
//! one-line table snapshots for visualization.
//!
//! ## Round lifecycle
//!
//! Every round walks the same four phases:
//!
//! 1. **Ready** - every seated player is prompted for a bet.
//! 2. **Insurance** - offered only when the dealer shows an Ace; a peeked
//!    dealer blackjack ends the round here.
//! 3. **Act** - each playing session drives its hands with HIT, STAND,
//!    DOUBLE and SPLIT.
//! 4. **Dealer & settlement** - the dealer draws to seventeen, hands are
//!    scored, and every session gets a `DONE` report.
//!
//! The first three phases fan out one task per player through a bounded
//! worker pool with a join barrier between phases; settlement is sequential
//! so the observable order stays stable. Sessions that vanish mid-phase are
//! flagged and reaped at round end.
//!
//! ## Module organization
//!
//! - [`config`] - process-wide tunables mutated by the admin verb
//! - [`transport`] - newline-framed socket I/O with read deadlines
//! - [`shoe`] - the multi-deck card source and its reshuffle policy
//! - [`session`] - per-client state, phase conversations, settlement
//! - [`protocol`] - the prompt/response interaction primitive
//! - [`table`] - the round coordinator and observer broadcasts
//! - [`network`] - acceptor, handshake registry, and the server loop
//! - [`persist`] - the pluggable session save/restore hook

pub mod config;
pub mod network;
pub mod persist;
pub mod protocol;
pub mod session;
pub mod shoe;
pub mod table;
pub mod transport;

//! # Reference Bot Client Library
//!
//! A deliberately simple Blackjack client used to exercise the server: it
//! registers under a chosen name, bets a fixed amount while it can afford to,
//! declines insurance, and hits any hand below fourteen. The decision rules
//! live in [`strategy`] as pure functions; [`network`] owns the connection
//! and the verb loop.

pub mod network;
pub mod strategy;

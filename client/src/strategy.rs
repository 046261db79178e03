//! Betting and play decisions for the reference bot.

use shared::{hand_value, parse_hand_cards};

/// Wager placed whenever the bankroll covers it.
pub const STANDARD_BET: i64 = 20;

/// Hands below this value get another card.
pub const HIT_BELOW: u32 = 14;

/// Picks the round's bet: the standard wager while flush, everything rounded
/// down to an even amount when short, and `None` once too broke to play.
pub fn choose_bet(bankroll: i64) -> Option<i64> {
    if bankroll >= STANDARD_BET {
        Some(STANDARD_BET)
    } else if bankroll > 2 {
        // Bets must be even.
        Some(bankroll / 2 * 2)
    } else {
        None
    }
}

/// Hit under fourteen, otherwise stand.
pub fn choose_action(value: u32) -> &'static str {
    if value < HIT_BELOW {
        "HIT"
    } else {
        "STAND"
    }
}

/// Decides on the active hand in an `ACT` table view. The first token is our
/// own hand list and the hand being played is always at its front.
pub fn choose_action_from_view(view: &str) -> &'static str {
    let own = view.split_whitespace().next().unwrap_or("");
    let active = own.split('/').next().unwrap_or("");
    choose_action(hand_value(&parse_hand_cards(active)))
}

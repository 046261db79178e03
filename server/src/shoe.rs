//! Multi-deck card shoe with the table's reshuffle policy.

use log::warn;
use rand::seq::SliceRandom;
use shared::{Card, Rank, Suit};

use crate::config::Config;

/// The pool of shuffled decks the dealer draws from. Draws come off the back.
#[derive(Debug, Clone)]
pub struct Shoe {
    cards: Vec<Card>,
    decks: u32,
}

impl Shoe {
    /// Builds a freshly shuffled shoe of `decks` complete decks.
    pub fn new(decks: u32) -> Self {
        let mut shoe = Self {
            cards: Vec::new(),
            decks: decks.max(1),
        };
        shoe.rebuild();
        shoe
    }

    /// Builds a shoe holding exactly `cards`, unshuffled. Draws pop from the
    /// back of the slice, so the last element is the first card dealt.
    pub fn from_cards(cards: Vec<Card>) -> Self {
        let decks = ((cards.len() + 51) / 52).max(1) as u32;
        Self { cards, decks }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn decks(&self) -> u32 {
        self.decks
    }

    pub fn draw(&mut self) -> Card {
        if let Some(card) = self.cards.pop() {
            return card;
        }
        // A round that outruns the reshuffle margin (long split chains) gets
        // a fresh shoe mid-hand rather than a dead table.
        warn!("shoe ran dry mid-round, rebuilding {} decks", self.decks);
        self.rebuild();
        self.cards.pop().expect("rebuilt shoe holds at least one deck")
    }

    /// True when the shoe has dropped below the configured percentage or
    /// cannot cover eleven cards per seated player.
    pub fn needs_reshuffle(&self, players: usize, min_percent: u32) -> bool {
        let cards_left = self.cards.len();
        let floor = self.decks as usize * 52 * min_percent as usize / 100;
        cards_left < floor || cards_left < players * 11
    }

    /// Runs the start-of-round reshuffle check, resizing the shoe to suit the
    /// current table when it fires. Returns whether a reshuffle happened.
    pub fn reshuffle_if_needed(&mut self, players: usize, config: &Config) -> bool {
        if !self.needs_reshuffle(players, config.shoe_min_percent) {
            return false;
        }
        let ideal = (players as f64 / 8.0).round() as u32;
        self.decks = config.minimum_decks.max(ideal).max(1);
        self.rebuild();
        true
    }

    fn rebuild(&mut self) {
        self.cards.clear();
        for _ in 0..self.decks {
            for rank in Rank::ALL {
                for suit in Suit::ALL {
                    self.cards.push(Card::new(rank, suit));
                }
            }
        }
        self.cards.shuffle(&mut rand::thread_rng());
    }
}

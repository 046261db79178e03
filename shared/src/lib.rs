//! # Shared Blackjack Library
//!
//! Data structures and helpers used by both the game server and the reference
//! client: the card model, hand valuation with Ace softening, the hand status
//! markers that ride along on the wire, and the `VERB [NOUN]` line-message
//! parser for the text protocol.
//!
//! ## Wire conventions
//!
//! The protocol is newline-delimited UTF-8 text. A card is two characters,
//! `<rank><suit>` (for example `AS` or `TD`). A hand is its cards concatenated
//! followed by exactly one status character, so `AS TC` standing becomes
//! `ASTC.`. Verbs are case-insensitive on reception and upper-cased on
//! emission; the noun is everything after the first separating space,
//! preserved as-is.

use std::fmt;
use std::str::FromStr;

/// TCP port the server listens on unless overridden.
pub const DEFAULT_PORT: u16 = 9876;

/// Greeting the server sends as soon as a connection is accepted.
pub const SERVER_GREETING: &str = "HELLO BlackjackServer v1.00";

/// Card rank. Face cards all count ten; an Ace counts one and is promoted to
/// eleven by [`hand_value`] whenever that does not bust the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Base counting value: Ace is one here, softening happens in
    /// [`hand_value`].
    pub fn value(self) -> u32 {
        match self {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Rank::Ace => 'A',
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
        }
    }

    pub fn from_char(c: char) -> Option<Rank> {
        match c {
            'A' => Some(Rank::Ace),
            '2' => Some(Rank::Two),
            '3' => Some(Rank::Three),
            '4' => Some(Rank::Four),
            '5' => Some(Rank::Five),
            '6' => Some(Rank::Six),
            '7' => Some(Rank::Seven),
            '8' => Some(Rank::Eight),
            '9' => Some(Rank::Nine),
            'T' => Some(Rank::Ten),
            'J' => Some(Rank::Jack),
            'Q' => Some(Rank::Queen),
            'K' => Some(Rank::King),
            _ => None,
        }
    }
}

/// Card suit. Suits never affect valuation; they exist for display and so
/// that the shoe holds distinguishable cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

    pub fn as_char(self) -> char {
        match self {
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Hearts => 'H',
            Suit::Spades => 'S',
        }
    }

    pub fn from_char(c: char) -> Option<Suit> {
        match c {
            'C' => Some(Suit::Clubs),
            'D' => Some(Suit::Diamonds),
            'H' => Some(Suit::Hearts),
            'S' => Some(Suit::Spades),
            _ => None,
        }
    }
}

/// A single playing card, written on the wire as `<rank><suit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.as_char(), self.suit.as_char())
    }
}

impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let rank = chars.next().and_then(Rank::from_char);
        let suit = chars.next().and_then(Suit::from_char);
        match (rank, suit, chars.next()) {
            (Some(rank), Some(suit), None) => Ok(Card { rank, suit }),
            _ => Err(ParseCardError),
        }
    }
}

/// Error returned when a two-character card code cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseCardError;

impl fmt::Display for ParseCardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid card code")
    }
}

impl std::error::Error for ParseCardError {}

/// Best blackjack value of a set of cards.
///
/// Every Ace is counted as one first; each is then promoted to eleven as long
/// as the total stays at or below 21. The result is the highest value not
/// exceeding 21 when such an assignment exists, otherwise the minimum.
pub fn hand_value(cards: &[Card]) -> u32 {
    let mut total: u32 = cards.iter().map(|c| c.rank.value()).sum();
    let aces = cards.iter().filter(|c| c.rank == Rank::Ace).count();
    for _ in 0..aces {
        if total + 10 <= 21 {
            total += 10;
        }
    }
    total
}

/// Status marker carried as the trailing character of a serialized hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandStatus {
    /// Waiting for its turn this round.
    Pending,
    /// The owner is being prompted on this hand right now.
    Awaiting,
    /// The owner let the decision clock run out.
    TimedOut,
    /// Completed by standing or busting.
    Stood,
    /// Completed by a double down; the third card lies sideways on a table
    /// display.
    Doubled,
}

impl HandStatus {
    pub fn as_char(self) -> char {
        match self {
            HandStatus::Pending => 'p',
            HandStatus::Awaiting => 'a',
            HandStatus::TimedOut => 't',
            HandStatus::Stood => '.',
            HandStatus::Doubled => '+',
        }
    }

    pub fn from_char(c: char) -> Option<HandStatus> {
        match c {
            'p' => Some(HandStatus::Pending),
            'a' => Some(HandStatus::Awaiting),
            't' => Some(HandStatus::TimedOut),
            '.' => Some(HandStatus::Stood),
            '+' => Some(HandStatus::Doubled),
            _ => None,
        }
    }

    /// Closed hands take no further actions and are ready for settlement.
    pub fn is_closed(self) -> bool {
        matches!(self, HandStatus::Stood | HandStatus::Doubled)
    }
}

/// An ordered set of cards plus its status marker.
///
/// The status character is appended only when the hand is rendered for the
/// wire; internally cards and status stay separate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hand {
    pub cards: Vec<Card>,
    pub status: HandStatus,
}

impl Hand {
    pub fn new(cards: Vec<Card>) -> Self {
        Self {
            cards,
            status: HandStatus::Pending,
        }
    }

    pub fn value(&self) -> u32 {
        hand_value(&self.cards)
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// A two-card 21. Whether it pays as a blackjack additionally requires the
    /// hand to be the owner's only one, which the caller knows.
    pub fn is_natural(&self) -> bool {
        self.cards.len() == 2 && self.value() == 21
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for card in &self.cards {
            write!(f, "{}", card)?;
        }
        write!(f, "{}", self.status.as_char())
    }
}

/// Extracts the cards from a serialized hand, ignoring any trailing status
/// marker. Used by clients reading table views.
pub fn parse_hand_cards(s: &str) -> Vec<Card> {
    let mut cards = Vec::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i + 1 < chars.len() {
        let code: String = chars[i..i + 2].iter().collect();
        match code.parse::<Card>() {
            Ok(card) => cards.push(card),
            Err(_) => break,
        }
        i += 2;
    }
    cards
}

/// One parsed protocol line: an upper-cased verb and its raw noun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub verb: String,
    pub noun: String,
}

/// Splits a line into verb and noun.
///
/// The verb is the leading run of word characters, upper-cased. If it is
/// followed by a single space the remainder becomes the noun, verbatim; any
/// other trailing text is discarded. Lines that do not start with a word
/// character do not parse.
pub fn parse_line(line: &str) -> Option<Message> {
    let word_len = line
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    if word_len == 0 {
        return None;
    }
    let (verb, rest) = line.split_at(word_len);
    let noun = match rest.strip_prefix(' ') {
        Some(noun) => noun,
        None => "",
    };
    Some(Message {
        verb: verb.to_ascii_uppercase(),
        noun: noun.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(codes: &[&str]) -> Vec<Card> {
        codes.iter().map(|c| c.parse().unwrap()).collect()
    }

    #[test]
    fn test_card_roundtrip() {
        for rank in Rank::ALL {
            for suit in Suit::ALL {
                let card = Card::new(rank, suit);
                let parsed: Card = card.to_string().parse().unwrap();
                assert_eq!(parsed, card);
            }
        }
    }

    #[test]
    fn test_card_parse_rejects_garbage() {
        assert!("XX".parse::<Card>().is_err());
        assert!("A".parse::<Card>().is_err());
        assert!("ASS".parse::<Card>().is_err());
        assert!("".parse::<Card>().is_err());
    }

    #[test]
    fn test_hand_value_face_cards() {
        assert_eq!(hand_value(&cards(&["TS", "JC"])), 20);
        assert_eq!(hand_value(&cards(&["QS", "KD", "2H"])), 22);
    }

    #[test]
    fn test_hand_value_ace_softening() {
        // One Ace promotes to eleven while it fits.
        assert_eq!(hand_value(&cards(&["AS", "6D"])), 17);
        // Two Aces: only one can be eleven.
        assert_eq!(hand_value(&cards(&["AS", "AD"])), 12);
        // Ace falls back to one rather than busting.
        assert_eq!(hand_value(&cards(&["AS", "9D", "5C"])), 15);
        // Ace plus ten is a 21.
        assert_eq!(hand_value(&cards(&["AS", "TC"])), 21);
        // Four aces and a seven: 1+1+1+11+7.
        assert_eq!(hand_value(&cards(&["AS", "AD", "AH", "AC", "7S"])), 21);
    }

    #[test]
    fn test_hand_value_bust_is_minimum() {
        assert_eq!(hand_value(&cards(&["AS", "KD", "QH", "2C"])), 23);
    }

    #[test]
    fn test_natural_requires_two_cards() {
        let natural = Hand::new(cards(&["AS", "TC"]));
        assert!(natural.is_natural());
        let drawn = Hand::new(cards(&["7S", "7C", "7D"]));
        assert_eq!(drawn.value(), 21);
        assert!(!drawn.is_natural());
    }

    #[test]
    fn test_hand_display_appends_status() {
        let mut hand = Hand::new(cards(&["AS", "TC"]));
        assert_eq!(hand.to_string(), "ASTCp");
        hand.status = HandStatus::Stood;
        assert_eq!(hand.to_string(), "ASTC.");
        hand.status = HandStatus::Doubled;
        assert_eq!(hand.to_string(), "ASTC+");
    }

    #[test]
    fn test_status_char_roundtrip() {
        for status in [
            HandStatus::Pending,
            HandStatus::Awaiting,
            HandStatus::TimedOut,
            HandStatus::Stood,
            HandStatus::Doubled,
        ] {
            assert_eq!(HandStatus::from_char(status.as_char()), Some(status));
        }
        assert_eq!(HandStatus::from_char('x'), None);
    }

    #[test]
    fn test_parse_hand_cards_stops_at_marker() {
        assert_eq!(parse_hand_cards("AS9D."), cards(&["AS", "9D"]));
        assert_eq!(parse_hand_cards("5H5D"), cards(&["5H", "5D"]));
        assert_eq!(parse_hand_cards("----"), Vec::<Card>::new());
    }

    #[test]
    fn test_parse_line_verb_and_noun() {
        let msg = parse_line("BET 100").unwrap();
        assert_eq!(msg.verb, "BET");
        assert_eq!(msg.noun, "100");
    }

    #[test]
    fn test_parse_line_uppercases_verb_keeps_noun() {
        let msg = parse_line("register Alice Smith").unwrap();
        assert_eq!(msg.verb, "REGISTER");
        assert_eq!(msg.noun, "Alice Smith");
    }

    #[test]
    fn test_parse_line_bare_verb() {
        let msg = parse_line("HIT").unwrap();
        assert_eq!(msg.verb, "HIT");
        assert_eq!(msg.noun, "");
    }

    #[test]
    fn test_parse_line_discards_unseparated_tail() {
        // No space after the verb means whatever follows is dropped.
        let msg = parse_line("BET;100").unwrap();
        assert_eq!(msg.verb, "BET");
        assert_eq!(msg.noun, "");
    }

    #[test]
    fn test_parse_line_rejects_empty_and_leading_space() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   BET 10").is_none());
        assert!(parse_line("!?").is_none());
    }
}

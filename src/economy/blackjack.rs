use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

/// Dealer keeps drawing below this total.
pub const DEALER_STANDS_ON: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];

    fn symbol(self) -> &'static str {
        match self {
            Suit::Spades => "♠",
            Suit::Hearts => "♥",
            Suit::Diamonds => "♦",
            Suit::Clubs => "♣",
        }
    }
}

/// Rank 1 is the ace, 11-13 are J/Q/K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub rank: u8,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: u8, suit: Suit) -> Self {
        Self { rank, suit }
    }

    fn points(self) -> u8 {
        self.rank.min(10)
    }

    fn is_ace(self) -> bool {
        self.rank == 1
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank = match self.rank {
            1 => "A".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            n => n.to_string(),
        };
        write!(f, "{}{}", rank, self.suit.symbol())
    }
}

#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut cards: Vec<Card> = Suit::ALL
            .iter()
            .flat_map(|suit| (1..=13).map(move |rank| Card::new(rank, *suit)))
            .collect();
        cards.shuffle(rng);
        Self { cards }
    }

    /// Draws the top card, starting a fresh shuffled deck when empty.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Card {
        loop {
            if let Some(card) = self.cards.pop() {
                return card;
            }
            *self = Deck::shuffled(rng);
        }
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

/// Best total for a hand: aces count 1, one of them counts 11 if that does not bust.
pub fn hand_value(hand: &[Card]) -> u8 {
    let total: u8 = hand.iter().map(|c| c.points()).sum();
    if hand.iter().any(|c| c.is_ace()) && total + 10 <= 21 {
        total + 10
    } else {
        total
    }
}

pub fn is_natural(hand: &[Card]) -> bool {
    hand.len() == 2 && hand_value(hand) == 21
}

pub fn format_hand(hand: &[Card]) -> String {
    hand.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Natural,
    Win,
    DealerBust,
    Push,
    Bust,
    Loss,
    /// Player stopped responding; the bet is returned.
    Abandoned,
}

impl Outcome {
    /// Total credited back after the bet was escrowed at deal time.
    pub fn payout(self, bet: i64, is_booster: bool) -> i64 {
        match self {
            Outcome::Natural => {
                let bonus = if is_booster { bet * 3 } else { bet * 5 / 2 };
                bet + bonus
            }
            Outcome::Win | Outcome::DealerBust => {
                let bonus = if is_booster { bet * 5 / 2 } else { bet * 2 };
                bet + bonus
            }
            Outcome::Push | Outcome::Abandoned => bet,
            Outcome::Bust | Outcome::Loss => 0,
        }
    }

    pub fn describe(self, is_booster: bool) -> &'static str {
        match (self, is_booster) {
            (Outcome::Natural, true) => "🎉 BLACKJACK! You win 3x your bet! (Booster bonus applied)",
            (Outcome::Natural, false) => "🎉 BLACKJACK! You win 2.5x your bet!",
            (Outcome::Win, true) => "🎉 You win 2.5x your bet! (Booster bonus applied)",
            (Outcome::Win, false) => "🎉 You win 2x your bet!",
            (Outcome::DealerBust, true) => "🎉 Dealer busts! You win 2.5x your bet! (Booster bonus applied)",
            (Outcome::DealerBust, false) => "🎉 Dealer busts! You win 2x your bet!",
            (Outcome::Push, _) => "🤝 Push! Bet returned.",
            (Outcome::Bust, _) => "💥 Bust! You lose your bet.",
            (Outcome::Loss, _) => "❌ Dealer wins!",
            (Outcome::Abandoned, _) => "⏱️ Game timed out. Bet returned.",
        }
    }

    pub fn is_win(self) -> bool {
        matches!(self, Outcome::Natural | Outcome::Win | Outcome::DealerBust)
    }
}

/// One hand of blackjack between a player and the dealer.
#[derive(Debug, Clone)]
pub struct Game {
    pub bet: i64,
    pub is_booster: bool,
    pub player: Vec<Card>,
    pub dealer: Vec<Card>,
    deck: Deck,
    outcome: Option<Outcome>,
}

impl Game {
    /// Deals two cards each and settles immediately on a player natural.
    pub fn deal<R: Rng + ?Sized>(bet: i64, is_booster: bool, rng: &mut R) -> Self {
        let mut deck = Deck::shuffled(rng);
        let player = vec![deck.draw(rng), deck.draw(rng)];
        let dealer = vec![deck.draw(rng), deck.draw(rng)];
        let mut game = Self {
            bet,
            is_booster,
            player,
            dealer,
            deck,
            outcome: None,
        };
        if is_natural(&game.player) {
            game.outcome = Some(if is_natural(&game.dealer) {
                Outcome::Push
            } else {
                Outcome::Natural
            });
        }
        game
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn player_value(&self) -> u8 {
        hand_value(&self.player)
    }

    pub fn dealer_value(&self) -> u8 {
        hand_value(&self.dealer)
    }

    pub fn hit<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Outcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let card = self.deck.draw(rng);
        self.player.push(card);
        if self.player_value() > 21 {
            self.outcome = Some(Outcome::Bust);
        }
        self.outcome
    }

    pub fn stand<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Outcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        while self.dealer_value() < DEALER_STANDS_ON {
            let card = self.deck.draw(rng);
            self.dealer.push(card);
        }

        let player = self.player_value();
        let dealer = self.dealer_value();
        let outcome = if dealer > 21 {
            Outcome::DealerBust
        } else if player > dealer {
            Outcome::Win
        } else if dealer > player {
            Outcome::Loss
        } else {
            Outcome::Push
        };
        self.outcome = Some(outcome);
        outcome
    }

    pub fn abandon(&mut self) -> Outcome {
        *self.outcome.get_or_insert(Outcome::Abandoned)
    }

    pub fn payout(&self) -> i64 {
        self.outcome
            .map(|o| o.payout(self.bet, self.is_booster))
            .unwrap_or(0)
    }

    /// Dealer hand as shown to the player: hole card hidden until the hand ends.
    pub fn dealer_display(&self) -> (String, String) {
        if self.is_finished() {
            (format_hand(&self.dealer), self.dealer_value().to_string())
        } else {
            let up = self.dealer.first().map(|c| c.to_string()).unwrap_or_default();
            let up_value = self.dealer.first().map(|c| hand_value(&[*c])).unwrap_or(0);
            (format!("{} 🂠", up), up_value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cards(ranks: &[u8]) -> Vec<Card> {
        ranks.iter().map(|r| Card::new(*r, Suit::Hearts)).collect()
    }

    #[test]
    fn test_hand_value_optimises_aces() {
        assert_eq!(hand_value(&cards(&[1, 1, 9])), 21);
        assert_eq!(hand_value(&cards(&[1, 13])), 21);
        assert_eq!(hand_value(&cards(&[1, 1])), 12);
        assert_eq!(hand_value(&cards(&[1, 9, 5])), 15);
        assert_eq!(hand_value(&cards(&[12, 11, 2])), 22);
        assert_eq!(hand_value(&cards(&[1, 1, 1, 1])), 14);
    }

    #[test]
    fn test_natural_detection() {
        assert!(is_natural(&cards(&[1, 10])));
        assert!(!is_natural(&cards(&[7, 7, 7])));
        assert!(!is_natural(&cards(&[10, 9])));
    }

    #[test]
    fn test_deck_has_52_unique_cards_and_refills() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut deck = Deck::shuffled(&mut rng);
        assert_eq!(deck.remaining(), 52);

        let mut seen = Vec::new();
        for _ in 0..52 {
            let card = deck.draw(&mut rng);
            assert!(!seen.contains(&card));
            seen.push(card);
        }
        assert_eq!(deck.remaining(), 0);

        deck.draw(&mut rng);
        assert_eq!(deck.remaining(), 51);
    }

    #[test]
    fn test_payouts() {
        assert_eq!(Outcome::Natural.payout(10, false), 35);
        assert_eq!(Outcome::Natural.payout(10, true), 40);
        assert_eq!(Outcome::Win.payout(10, false), 30);
        assert_eq!(Outcome::DealerBust.payout(3, true), 10);
        assert_eq!(Outcome::Push.payout(10, true), 10);
        assert_eq!(Outcome::Abandoned.payout(10, false), 10);
        assert_eq!(Outcome::Bust.payout(10, true), 0);
        assert_eq!(Outcome::Loss.payout(10, false), 0);
    }

    #[test]
    fn test_dealer_draws_to_seventeen() {
        let mut rng = StdRng::seed_from_u64(9);
        for seed in 0..50 {
            let mut seeded = StdRng::seed_from_u64(seed);
            let mut game = Game::deal(10, false, &mut seeded);
            if game.is_finished() {
                continue;
            }
            let outcome = game.stand(&mut rng);
            assert!(game.dealer_value() >= DEALER_STANDS_ON);
            if game.dealer_value() > 21 {
                assert_eq!(outcome, Outcome::DealerBust);
            }
            // Settled games ignore further input
            assert_eq!(game.hit(&mut rng), Some(outcome));
            assert_eq!(game.abandon(), outcome);
        }
    }

    #[test]
    fn test_hit_until_bust() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut game = Game::deal(5, false, &mut rng);
        while !game.is_finished() {
            game.hit(&mut rng);
        }
        if game.player.len() > 2 {
            assert_eq!(game.outcome(), Some(Outcome::Bust));
            assert_eq!(game.payout(), 0);
        }
    }

    #[test]
    fn test_hidden_hole_card() {
        let mut rng = StdRng::seed_from_u64(77);
        let mut game = Game::deal(5, false, &mut rng);
        if !game.is_finished() {
            let (shown, _) = game.dealer_display();
            assert!(shown.ends_with("🂠"));
        }
        game.abandon();
        let (shown, value) = game.dealer_display();
        assert!(!shown.contains("🂠"));
        assert_eq!(value, game.dealer_value().to_string());
    }
}

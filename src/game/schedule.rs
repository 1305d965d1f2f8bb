//! Deal schedule: which `(player, card_id)` slot to fill next.
//!
//! Card ids leave gaps for burn slots, matching the historical layout: hole
//! card `h` of seat `j` is `h * n + j`, the flop occupies `2n+1..=2n+3`, the
//! turn `2n+5` and the river `2n+7`. Community requests are addressed to
//! `player_id = -1` (every seat decodes its own copy).

use super::types::{CardType, RevealRequest, FLOP_CARDS, HOLE_CARDS};

#[derive(Clone, Debug)]
pub struct DealSchedule {
    num_players: usize,
    hole: Vec<[bool; HOLE_CARDS]>,
    flop: [bool; FLOP_CARDS],
    turn: bool,
    river: bool,
}

impl DealSchedule {
    pub fn new(num_players: usize) -> Self {
        Self {
            num_players,
            hole: vec![[false; HOLE_CARDS]; num_players],
            flop: [false; FLOP_CARDS],
            turn: false,
            river: false,
        }
    }

    pub fn hole_card_id(&self, hole_index: usize, slot: usize) -> usize {
        hole_index * self.num_players + slot
    }

    pub fn flop_card_id(&self, flop_index: usize) -> usize {
        HOLE_CARDS * self.num_players + 1 + flop_index
    }

    pub fn turn_card_id(&self) -> usize {
        HOLE_CARDS * self.num_players + 5
    }

    pub fn river_card_id(&self) -> usize {
        HOLE_CARDS * self.num_players + 7
    }

    /// Next undealt slot in deal order: hole cards round-robin, then flop,
    /// turn, river. `None` once every card is out.
    pub fn next_request(&self) -> Option<RevealRequest> {
        for hole_index in 0..HOLE_CARDS {
            for slot in 0..self.num_players {
                if !self.hole[slot][hole_index] {
                    return Some(RevealRequest {
                        player_id: slot as i32,
                        card_id: self.hole_card_id(hole_index, slot),
                        card_type: CardType::Hole,
                    });
                }
            }
        }
        for flop_index in 0..FLOP_CARDS {
            if !self.flop[flop_index] {
                let card_type = match flop_index {
                    0 => CardType::Flop1,
                    1 => CardType::Flop2,
                    _ => CardType::Flop3,
                };
                return Some(RevealRequest {
                    player_id: -1,
                    card_id: self.flop_card_id(flop_index),
                    card_type,
                });
            }
        }
        if !self.turn {
            return Some(RevealRequest {
                player_id: -1,
                card_id: self.turn_card_id(),
                card_type: CardType::Turn,
            });
        }
        if !self.river {
            return Some(RevealRequest {
                player_id: -1,
                card_id: self.river_card_id(),
                card_type: CardType::River,
            });
        }
        None
    }

    pub fn mark_dealt(&mut self, request: &RevealRequest) {
        match request.card_type {
            CardType::Hole => {
                let slot = request.card_id % self.num_players;
                let hole_index = request.card_id / self.num_players;
                if let Some(cards) = self.hole.get_mut(slot) {
                    if hole_index < HOLE_CARDS {
                        cards[hole_index] = true;
                    }
                }
            }
            CardType::Flop1 => self.flop[0] = true,
            CardType::Flop2 => self.flop[1] = true,
            CardType::Flop3 => self.flop[2] = true,
            CardType::Turn => self.turn = true,
            CardType::River => self.river = true,
        }
    }

    pub fn holes_dealt(&self) -> bool {
        self.hole.iter().all(|cards| cards.iter().all(|&c| c))
    }

    pub fn flop_dealt(&self) -> bool {
        self.flop.iter().all(|&c| c)
    }

    pub fn turn_dealt(&self) -> bool {
        self.turn
    }

    pub fn river_dealt(&self) -> bool {
        self.river
    }

    /// Whether the card just dealt closed a street (and betting or showdown
    /// follows before the next card goes out).
    pub fn street_closed(&self, card_type: CardType) -> bool {
        match card_type {
            CardType::Hole => self.holes_dealt(),
            CardType::Flop1 | CardType::Flop2 | CardType::Flop3 => self.flop_dealt(),
            CardType::Turn => self.turn,
            CardType::River => self.river,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_player_deal_order_with_burn_gaps() {
        let mut schedule = DealSchedule::new(2);
        let mut ids = Vec::new();
        while let Some(request) = schedule.next_request() {
            ids.push((request.player_id, request.card_id, request.card_type));
            schedule.mark_dealt(&request);
        }
        assert_eq!(
            ids,
            vec![
                (0, 0, CardType::Hole),
                (1, 1, CardType::Hole),
                (0, 2, CardType::Hole),
                (1, 3, CardType::Hole),
                (-1, 5, CardType::Flop1),
                (-1, 6, CardType::Flop2),
                (-1, 7, CardType::Flop3),
                (-1, 9, CardType::Turn),
                (-1, 11, CardType::River),
            ]
        );
        assert!(schedule.river_dealt());
    }

    #[test]
    fn street_closed_only_when_every_card_of_street_is_out() {
        let mut schedule = DealSchedule::new(3);
        // Deal five of six hole cards.
        for _ in 0..5 {
            let request = schedule.next_request().unwrap();
            schedule.mark_dealt(&request);
        }
        assert!(!schedule.holes_dealt());
        let last_hole = schedule.next_request().unwrap();
        assert_eq!(last_hole.card_type, CardType::Hole);
        schedule.mark_dealt(&last_hole);
        assert!(schedule.street_closed(CardType::Hole));

        let flop1 = schedule.next_request().unwrap();
        schedule.mark_dealt(&flop1);
        assert!(!schedule.street_closed(CardType::Flop1));
    }
}

//! Role deal-out at game start.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::GameRulesConfig;
use crate::protocol::{GamePlayer, Role, RoomPlayer, SessionId};
use uuid::Uuid;

/// Build the role deck for a player count: `werewolf_count` werewolves
/// first, then one of each enabled special role in priority order until the
/// deck is full, villagers for the remainder.
pub fn build_role_deck(player_count: usize, config: &GameRulesConfig) -> Vec<Role> {
    let mut deck = vec![Role::Werewolf; usize::from(config.werewolf_count)];
    for role in Role::SPECIAL_PRIORITY {
        if deck.len() >= player_count {
            break;
        }
        if config.enabled_roles.contains(&role) {
            deck.push(role);
        }
    }
    while deck.len() < player_count {
        deck.push(Role::Villager);
    }
    deck
}

/// Shuffle the seated players and deal the deterministic deck across them.
pub fn assign_roles<R: Rng + ?Sized>(
    session_id: SessionId,
    seats: &[RoomPlayer],
    config: &GameRulesConfig,
    rng: &mut R,
) -> Vec<GamePlayer> {
    let mut order: Vec<&RoomPlayer> = seats.iter().collect();
    order.shuffle(rng);

    let deck = build_role_deck(order.len(), config);
    order
        .into_iter()
        .zip(deck)
        .map(|(seat, role)| GamePlayer {
            player_id: Uuid::new_v4(),
            session_id,
            user_id: seat.user_id,
            role,
            team: role.team(),
            is_alive: true,
            died_at_phase: None,
            death_reason: None,
            role_state: Default::default(),
            lover_id: None,
            current_voice_channel: None,
            allowed_voice_channels: Vec::new(),
            seat_position: seat.seat_position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Team;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seats(n: u8) -> Vec<RoomPlayer> {
        (0..n)
            .map(|i| RoomPlayer {
                room_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                is_ready: true,
                is_host: i == 0,
                seat_position: i,
                joined_at: Utc::now(),
                left_at: None,
            })
            .collect()
    }

    fn config_with(werewolves: u8, specials: Vec<Role>) -> GameRulesConfig {
        GameRulesConfig {
            werewolf_count: werewolves,
            enabled_roles: specials,
            ..GameRulesConfig::default()
        }
    }

    #[test]
    fn deck_places_wolves_then_specials_then_villagers() {
        let config = config_with(2, vec![Role::Seer, Role::Witch]);
        let deck = build_role_deck(6, &config);
        assert_eq!(
            deck,
            vec![
                Role::Werewolf,
                Role::Werewolf,
                Role::Seer,
                Role::Witch,
                Role::Villager,
                Role::Villager,
            ]
        );
    }

    #[test]
    fn deck_truncates_specials_at_capacity() {
        let config = config_with(
            2,
            vec![Role::Seer, Role::Witch, Role::Bodyguard, Role::Cupid, Role::Hunter],
        );
        let deck = build_role_deck(6, &config);
        assert_eq!(deck.len(), 6);
        // Cupid makes it in, Hunter does not.
        assert!(deck.contains(&Role::Cupid));
        assert!(!deck.contains(&Role::Hunter));
    }

    #[test]
    fn deck_respects_priority_order_of_enabled_roles() {
        // Enabled set is unordered input; priority decides who gets dealt.
        let config = config_with(1, vec![Role::Tanner, Role::Seer]);
        let deck = build_role_deck(4, &config);
        assert_eq!(
            deck,
            vec![Role::Werewolf, Role::Seer, Role::Tanner, Role::Villager]
        );
    }

    #[test]
    fn assignment_covers_every_seat_once() {
        let seats = seats(8);
        let config = config_with(2, vec![Role::Seer, Role::Witch]);
        let mut rng = StdRng::seed_from_u64(7);
        let players = assign_roles(Uuid::new_v4(), &seats, &config, &mut rng);

        assert_eq!(players.len(), 8);
        let mut seat_positions: Vec<u8> = players.iter().map(|p| p.seat_position).collect();
        seat_positions.sort_unstable();
        assert_eq!(seat_positions, (0..8).collect::<Vec<u8>>());

        assert_eq!(
            players.iter().filter(|p| p.role == Role::Werewolf).count(),
            2
        );
        assert_eq!(players.iter().filter(|p| p.role == Role::Seer).count(), 1);
        assert_eq!(players.iter().filter(|p| p.role == Role::Witch).count(), 1);
    }

    #[test]
    fn teams_follow_roles() {
        let seats = seats(7);
        let config = config_with(2, vec![Role::Tanner]);
        let mut rng = StdRng::seed_from_u64(11);
        let players = assign_roles(Uuid::new_v4(), &seats, &config, &mut rng);

        for player in &players {
            assert_eq!(player.team, player.role.team());
            assert!(player.is_alive);
            assert!(player.lover_id.is_none());
        }
        assert_eq!(
            players.iter().filter(|p| p.team == Team::Neutral).count(),
            1
        );
    }

    #[test]
    fn shuffles_differ_across_seeds() {
        let seats = seats(10);
        let config = config_with(2, vec![Role::Seer]);
        let deal = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            assign_roles(Uuid::new_v4(), &seats, &config, &mut rng)
                .into_iter()
                .map(|p| (p.seat_position, p.role))
                .collect::<Vec<_>>()
        };
        // Not a guarantee in general, but these seeds are known to differ.
        assert_ne!(deal(1), deal(2));
    }
}

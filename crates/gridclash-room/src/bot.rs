//! Decisions for computer-controlled players.
//!
//! Bots play the same actions as humans and go through the same
//! validation. Each call picks one action from the current state; the
//! session keeps asking until the bot's turn (or combat move) is over.

use gridclash_board::ItemType;
use gridclash_board::nav::{fastest_path, reachable_tiles};
use gridclash_protocol::{GameMode, PlayerId, Position};

use crate::player::Player;
use crate::{ClientAction, GameSession, RoomStatus};

/// The next action for `bot`.
pub(crate) fn decide(session: &GameSession, bot: PlayerId) -> ClientAction {
    let Some(me) = session.player(bot) else {
        return ClientAction::EndTurn;
    };
    if session.status() == RoomStatus::Combat {
        return ClientAction::Attack;
    }
    if let Some(pending) = me.pending {
        return ClientAction::ResolveInventory {
            drop: choose_drop(me, pending.item),
        };
    }
    if me.attributes.action_points > 0 {
        if let Some(target) = adjacent_opponent(session, me) {
            return ClientAction::StartCombat { target };
        }
    }
    if !session.moved_this_turn() {
        if let Some(destination) = next_stop(session, me) {
            return ClientAction::MoveTo { destination };
        }
    }
    ClientAction::EndTurn
}

/// Keeps the flag whenever it is involved, otherwise leaves the new item.
fn choose_drop(me: &Player, incoming: ItemType) -> ItemType {
    if incoming != ItemType::Flag {
        return incoming;
    }
    me.inventory
        .iter()
        .copied()
        .find(|&i| i != ItemType::Flag)
        .unwrap_or(incoming)
}

fn adjacent_opponent(session: &GameSession, me: &Player) -> Option<PlayerId> {
    session
        .players()
        .iter()
        .find(|p| p.id != me.id && p.is_connected() && p.position.is_adjacent(me.position))
        .map(|p| p.id)
}

/// Where the bot is heading this turn.
fn goal(session: &GameSession, me: &Player) -> Option<Position> {
    if session.config().mode == GameMode::CaptureTheFlag {
        if me.holds(ItemType::Flag) {
            return Some(me.spawn_position);
        }
        if let Some(&flag) = session.grid().find_items(ItemType::Flag).first() {
            return Some(flag);
        }
        if let Some(holder) = session
            .players()
            .iter()
            .find(|p| p.is_connected() && p.holds(ItemType::Flag))
        {
            return Some(holder.position);
        }
    }
    session
        .players()
        .iter()
        .filter(|p| p.id != me.id && p.is_connected())
        .min_by_key(|p| p.position.distance(me.position))
        .map(|p| p.position)
}

/// The furthest tile along the cheapest route to the goal that can be
/// reached this turn.
fn next_stop(session: &GameSession, me: &Player) -> Option<Position> {
    let goal = goal(session, me)?;
    let reachable = reachable_tiles(
        me.position,
        me.attributes.movement_points_left,
        session.grid(),
        &session.occupied_except(me.id),
    );
    fastest_path(me.position, goal, session.grid())
        .into_iter()
        .rev()
        .find(|p| reachable.contains(p))
}

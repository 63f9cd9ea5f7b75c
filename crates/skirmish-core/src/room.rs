//! Room roster bookkeeping: seats, teams, ready state, and host migration.
//!
//! Positions are dense per team. Red members occupy 0..limit/2, blue members
//! occupy `BLUE_INDEX_START..BLUE_INDEX_START + limit/2`. Removing a member
//! shifts every later member of the same team down one position so the range
//! stays gapless, and the host pointer follows the shift.

use crate::RoomId;
use crate::net::messages::{Client, RoomInfo};

/// First wire position of the blue team.
pub const BLUE_INDEX_START: u32 = 8;

/// Why a start request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRejection {
    NotAllReady,
    UnevenTeams,
}

impl std::fmt::Display for StartRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAllReady => write!(f, "To start a game, all users should be ready!"),
            Self::UnevenTeams => write!(
                f,
                "To start a game, the number of users on each team should be the same!"
            ),
        }
    }
}

impl std::error::Error for StartRejection {}

impl RoomInfo {
    /// A new room with the creator hosting from red position 0.
    pub fn create(room_id: RoomId, name: &str, limit: u32, host_name: &str) -> Self {
        Self {
            room_id,
            name: name.to_string(),
            host: 0,
            current: 1,
            limit,
            ready_count: 0,
            red_team: vec![Client {
                room_id,
                name: host_name.to_string(),
                position: 0,
                ready: false,
            }],
            blue_team: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.current >= self.limit
    }

    pub fn member(&self, position: u32) -> Option<&Client> {
        if position < BLUE_INDEX_START {
            self.red_team.get(position as usize)
        } else {
            self.blue_team.get((position - BLUE_INDEX_START) as usize)
        }
    }

    fn member_mut(&mut self, position: u32) -> Option<&mut Client> {
        if position < BLUE_INDEX_START {
            self.red_team.get_mut(position as usize)
        } else {
            self.blue_team.get_mut((position - BLUE_INDEX_START) as usize)
        }
    }

    /// The seat currently held by `name`. Positions shift on removal, so
    /// name is the stable member identity.
    pub fn position_of(&self, name: &str) -> Option<u32> {
        self.red_team
            .iter()
            .chain(self.blue_team.iter())
            .find(|c| c.name == name)
            .map(|c| c.position)
    }

    /// Seat a newcomer on the smaller team, red winning ties, at the next
    /// dense position. Callers check `is_full` first.
    pub fn add_member(&mut self, name: &str) -> Client {
        let position = if self.red_team.len() > self.blue_team.len() {
            BLUE_INDEX_START + self.blue_team.len() as u32
        } else {
            self.red_team.len() as u32
        };
        let client = Client {
            room_id: self.room_id,
            name: name.to_string(),
            position,
            ready: false,
        };
        if position < BLUE_INDEX_START {
            self.red_team.push(client.clone());
        } else {
            self.blue_team.push(client.clone());
        }
        self.current += 1;
        client
    }

    /// Flip the ready flag at `position`, keeping the counter in step.
    /// Returns the new flag value. The host's toggles count like anyone
    /// else's; start gating compensates with its `current - 1` rule.
    pub fn toggle_ready(&mut self, position: u32) -> Option<bool> {
        let member = self.member_mut(position)?;
        let to_ready = !member.ready;
        member.ready = to_ready;
        if to_ready {
            self.ready_count += 1;
        } else {
            self.ready_count -= 1;
        }
        Some(to_ready)
    }

    /// Move the member at `position` to the other team's next dense slot.
    /// Returns the updated seat, or `None` when the destination team is
    /// already at its `limit / 2` cap. A rejected change alters nothing.
    pub fn change_team(&mut self, position: u32) -> Option<Client> {
        let on_red = position < BLUE_INDEX_START;
        let cap = (self.limit / 2) as usize;

        let next_pos = if on_red {
            if self.blue_team.len() == cap {
                return None;
            }
            BLUE_INDEX_START + self.blue_team.len() as u32
        } else {
            if self.red_team.len() == cap {
                return None;
            }
            self.red_team.len() as u32
        };

        let dense = if on_red {
            position as usize
        } else {
            (position - BLUE_INDEX_START) as usize
        };
        let mut moved = if on_red {
            self.red_team.remove(dense)
        } else {
            self.blue_team.remove(dense)
        };

        if self.host == position {
            // Host keeps hosting from the new seat.
            self.host = next_pos;
            self.shift_positions(position);
        } else {
            self.shift_down_from(position);
        }

        moved.position = next_pos;
        let moved_out = moved.clone();
        if on_red {
            self.blue_team.push(moved);
        } else {
            self.red_team.push(moved);
        }
        Some(moved_out)
    }

    /// Drop the member at `position`. Returns `true` when the room emptied
    /// and should be destroyed. On a host departure the host seat passes to
    /// position 0 of the other team when it has members, otherwise to
    /// position 0 of the leaver's own (now shifted) team, and a pre-readied
    /// new host is un-readied.
    pub fn remove_member(&mut self, position: u32) -> Option<bool> {
        let on_red = position < BLUE_INDEX_START;
        let dense = if on_red {
            position as usize
        } else {
            (position - BLUE_INDEX_START) as usize
        };

        let removed = if on_red {
            if dense >= self.red_team.len() {
                return None;
            }
            self.red_team.remove(dense)
        } else {
            if dense >= self.blue_team.len() {
                return None;
            }
            self.blue_team.remove(dense)
        };

        if removed.ready {
            self.ready_count -= 1;
        }
        let was_host = self.host == position;
        let closed = self.current == 1;
        self.current -= 1;

        if !was_host {
            self.shift_down_from(position);
        } else {
            self.shift_down_host_removed(position);
            if !closed {
                self.reassign_host(on_red);
            }
        }
        Some(closed)
    }

    /// Start gate: every non-host member ready and both teams the same
    /// size. Purely counter based, so the gate expects `current - 1`
    /// readies regardless of who toggled them.
    pub fn can_start(&self) -> Result<(), StartRejection> {
        if self.current - 1 != self.ready_count {
            return Err(StartRejection::NotAllReady);
        }
        if self.red_team.len() != self.blue_team.len() {
            return Err(StartRejection::UnevenTeams);
        }
        Ok(())
    }

    /// Close the gap left at `position`: every same-team member at a higher
    /// position slides down one, and the host pointer slides with them.
    fn shift_down_from(&mut self, position: u32) {
        let host = self.host;
        let same_team = (host < BLUE_INDEX_START) == (position < BLUE_INDEX_START);
        self.shift_positions(position);
        if same_team && host >= position {
            self.host -= 1;
        }
    }

    /// Same as `shift_down_from`, for the case where the removed seat WAS
    /// the host. The stale pointer is about to be reassigned, so it must
    /// not be decremented along with the survivors.
    fn shift_down_host_removed(&mut self, position: u32) {
        self.shift_positions(position);
    }

    fn shift_positions(&mut self, position: u32) {
        let team = if position < BLUE_INDEX_START {
            &mut self.red_team
        } else {
            &mut self.blue_team
        };
        for member in team.iter_mut() {
            if member.position > position {
                member.position -= 1;
            }
        }
    }

    fn reassign_host(&mut self, was_red: bool) {
        let next = if was_red {
            if self.blue_team.is_empty() {
                0
            } else {
                BLUE_INDEX_START
            }
        } else if self.red_team.is_empty() {
            BLUE_INDEX_START
        } else {
            0
        };
        self.host = next;
        if let Some(new_host) = self.member_mut(next) {
            if new_host.ready {
                new_host.ready = false;
                self.ready_count -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_room;

    #[test]
    fn create_seats_host_on_red_zero() {
        let info = RoomInfo::create(100, "Alpha", 4, "Alice");
        assert_eq!(info.host, 0);
        assert_eq!(info.current, 1);
        assert_eq!(info.ready_count, 0);
        assert_eq!(info.red_team.len(), 1);
        assert!(info.blue_team.is_empty());
        assert_eq!(info.red_team[0].name, "Alice");
        assert!(!info.red_team[0].ready);
    }

    #[test]
    fn add_member_balances_teams_red_wins_ties() {
        let mut info = RoomInfo::create(100, "Alpha", 8, "Alice");

        // red 1, blue 0: newcomer goes blue at 8.
        assert_eq!(info.add_member("Bob").position, BLUE_INDEX_START);
        // tie at 1/1: red at 1.
        assert_eq!(info.add_member("Carol").position, 1);
        // red 2, blue 1: blue at 9.
        assert_eq!(info.add_member("Dave").position, BLUE_INDEX_START + 1);
        assert_eq!(info.current, 4);
    }

    #[test]
    fn toggle_ready_counts_everyone_including_host() {
        let mut info = make_room("Alpha", 4, 1, 1);

        assert_eq!(info.toggle_ready(BLUE_INDEX_START), Some(true));
        assert_eq!(info.ready_count, 1);

        // Host toggles move the counter too.
        assert_eq!(info.toggle_ready(0), Some(true));
        assert_eq!(info.ready_count, 2);
        assert_eq!(info.toggle_ready(0), Some(false));
        assert_eq!(info.ready_count, 1);

        assert_eq!(info.toggle_ready(5), None);
    }

    #[test]
    fn change_team_moves_to_next_dense_slot() {
        let mut info = make_room("Alpha", 8, 3, 1);

        let moved = info.change_team(1).unwrap();
        assert_eq!(moved.position, BLUE_INDEX_START + 1);
        assert_eq!(moved.name, "R1");
        // R2 slid down into the vacated red slot.
        assert_eq!(info.red_team.len(), 2);
        assert_eq!(info.red_team[1].name, "R2");
        assert_eq!(info.red_team[1].position, 1);
        assert_eq!(info.blue_team.len(), 2);
    }

    #[test]
    fn change_team_rejected_when_destination_full() {
        // limit 4 caps each team at 2.
        let mut info = make_room("Alpha", 4, 1, 2);
        assert!(info.change_team(0).is_none());
        // Nothing changed.
        assert_eq!(info.red_team.len(), 1);
        assert_eq!(info.blue_team.len(), 2);
        assert_eq!(info.host, 0);
    }

    #[test]
    fn change_team_host_keeps_hosting_at_new_seat() {
        let mut info = make_room("Alpha", 8, 2, 1);
        let moved = info.change_team(0).unwrap();
        assert_eq!(moved.position, BLUE_INDEX_START + 1);
        assert_eq!(info.host, BLUE_INDEX_START + 1);
        // Remaining red member slid to 0.
        assert_eq!(info.red_team[0].position, 0);
    }

    #[test]
    fn change_team_shifts_host_behind_the_mover() {
        // Host at red 2, member at red 1 switches.
        let mut info = make_room("Alpha", 8, 3, 1);
        info.host = 2;
        info.change_team(1).unwrap();
        assert_eq!(info.host, 1);
        assert_eq!(info.red_team[1].name, "R2");
    }

    #[test]
    fn remove_member_compacts_and_shifts_host() {
        let mut info = make_room("Alpha", 8, 3, 1);
        info.host = 2;

        assert_eq!(info.remove_member(0), Some(false));
        assert_eq!(info.current, 3);
        assert_eq!(info.red_team.len(), 2);
        assert_eq!(info.red_team[0].name, "R1");
        assert_eq!(info.red_team[0].position, 0);
        assert_eq!(info.host, 1);
    }

    #[test]
    fn remove_ready_member_drops_counter() {
        let mut info = make_room("Alpha", 4, 2, 1);
        info.toggle_ready(1);
        assert_eq!(info.ready_count, 1);
        info.remove_member(1);
        assert_eq!(info.ready_count, 0);
    }

    #[test]
    fn host_leave_passes_to_other_team_first() {
        let mut info = make_room("Alpha", 8, 2, 2);
        assert_eq!(info.remove_member(0), Some(false));
        assert_eq!(info.host, BLUE_INDEX_START);
    }

    #[test]
    fn host_leave_falls_back_to_own_team() {
        let mut info = make_room("Alpha", 8, 2, 0);
        assert_eq!(info.remove_member(0), Some(false));
        // Blue is empty; the shifted red survivor at 0 hosts.
        assert_eq!(info.host, 0);
        assert_eq!(info.member(0).unwrap().name, "R1");
    }

    #[test]
    fn new_host_is_unreadied() {
        let mut info = make_room("Alpha", 8, 2, 1);
        info.toggle_ready(BLUE_INDEX_START);
        assert_eq!(info.ready_count, 1);

        info.remove_member(0);
        assert_eq!(info.host, BLUE_INDEX_START);
        assert!(!info.member(BLUE_INDEX_START).unwrap().ready);
        assert_eq!(info.ready_count, 0);
    }

    #[test]
    fn last_member_leaving_closes_the_room() {
        let mut info = RoomInfo::create(100, "Alpha", 4, "Alice");
        assert_eq!(info.remove_member(0), Some(true));
        assert_eq!(info.current, 0);
    }

    #[test]
    fn remove_unknown_position_is_noop() {
        let mut info = make_room("Alpha", 4, 1, 1);
        assert_eq!(info.remove_member(3), None);
        assert_eq!(info.current, 2);
    }

    #[test]
    fn can_start_requires_all_followers_ready() {
        let mut info = make_room("Alpha", 4, 1, 1);
        assert_eq!(info.can_start(), Err(StartRejection::NotAllReady));
        assert_eq!(
            StartRejection::NotAllReady.to_string(),
            "To start a game, all users should be ready!"
        );

        info.toggle_ready(BLUE_INDEX_START);
        assert_eq!(info.can_start(), Ok(()));
    }

    #[test]
    fn can_start_requires_even_teams() {
        let mut info = make_room("Alpha", 8, 2, 1);
        info.toggle_ready(1);
        info.toggle_ready(BLUE_INDEX_START);
        assert_eq!(info.can_start(), Err(StartRejection::UnevenTeams));
        assert_eq!(
            StartRejection::UnevenTeams.to_string(),
            "To start a game, the number of users on each team should be the same!"
        );
    }

    #[test]
    fn host_ready_offsets_one_missing_follower() {
        // Host readied, follower not: counter says 1 but followers are 1,
        // so a readied host can mask an unready follower. Start gating is
        // purely counter based.
        let mut info = make_room("Alpha", 4, 1, 1);
        info.toggle_ready(0);
        assert_eq!(info.can_start(), Ok(()));
    }

    #[test]
    fn position_lookup_by_name_survives_shifts() {
        let mut info = make_room("Alpha", 8, 3, 0);
        assert_eq!(info.position_of("R2"), Some(2));
        info.remove_member(1);
        assert_eq!(info.position_of("R2"), Some(1));
        assert_eq!(info.position_of("R1"), None);
    }
}

pub mod net;
pub mod room;

/// Identifier for a room. Allocation starts at 100 and only grows; ids are
/// never reused within a server process.
pub type RoomId = u32;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::net::messages::{Client, RoomInfo};
    use crate::room::BLUE_INDEX_START;

    /// Build a room with `red` red members and `blue` blue members, host at
    /// red position 0, nobody ready. Member names are R0.. / B0..
    pub fn make_room(name: &str, limit: u32, red: usize, blue: usize) -> RoomInfo {
        let mut info = RoomInfo::create(100, name, limit, "R0");
        for i in 1..red {
            info.red_team.push(Client {
                room_id: 100,
                name: format!("R{i}"),
                position: i as u32,
                ready: false,
            });
        }
        for i in 0..blue {
            info.blue_team.push(Client {
                room_id: 100,
                name: format!("B{i}"),
                position: BLUE_INDEX_START + i as u32,
                ready: false,
            });
        }
        info.current = (red + blue) as u32;
        info
    }
}

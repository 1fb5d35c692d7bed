//! Migrations that shape the Jackson Trails HOA database.
//!
//! The host program hands [`hoa_migrations`] to a
//! [`Migrator`](crate::migrations::Migrator); there is no global registry.

mod board_members;
mod initial_schema;
mod seed_data;
mod update_board_members;

use crate::migrations::Migration;

pub const ANNOUNCEMENTS: &str = "announcements";
pub const DOCUMENTS: &str = "documents";
pub const BOARD_MEMBERS: &str = "board_members";

/// Every HOA migration, in version order.
pub fn hoa_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1733842800,
            name: "initial_schema",
            up: initial_schema::up,
            down: initial_schema::down,
        },
        Migration {
            version: 1733842801,
            name: "seed_data",
            up: seed_data::up,
            down: seed_data::down,
        },
        Migration {
            version: 1733931600,
            name: "board_members",
            up: board_members::up,
            down: board_members::down,
        },
        Migration {
            version: 1734000000,
            name: "update_board_members",
            up: update_board_members::up,
            down: update_board_members::down,
        },
    ]
}

//! Board members may be listed without a public email address.

use tracing::info;
use trails_common::Result;

use super::BOARD_MEMBERS;
use crate::store::SchemaStore;

fn set_email_required(store: &mut dyn SchemaStore, required: bool) -> Result<()> {
    let mut collection = store.get_collection(BOARD_MEMBERS)?;
    collection.require_field_mut("email")?.required = required;
    store.update_collection(&collection)?;
    info!("board_members.email required = {required}");
    Ok(())
}

pub fn up(store: &mut dyn SchemaStore) -> Result<()> {
    set_email_required(store, false)
}

pub fn down(store: &mut dyn SchemaStore) -> Result<()> {
    set_email_required(store, true)
}

//! Starter announcements and documents.
//!
//! Every seeded row carries a fixed id, so `down` removes exactly the rows
//! `up` inserted and nothing a user added later.

use serde_json::{Value, json};
use tracing::info;
use trails_common::Result;

use super::{ANNOUNCEMENTS, DOCUMENTS};
use crate::record::record_data;
use crate::store::SchemaStore;

pub const WELCOME_ID: &str = "seedwelcome0001";
pub const MEETING_ID: &str = "seedmeeting0001";
pub const BYLAWS_ID: &str = "seedbylaws00001";
pub const FINANCIALS_ID: &str = "seedfinance0001";

fn announcements() -> Vec<Value> {
    vec![
        json!({
            "id": WELCOME_ID,
            "title": "Welcome to Jackson Trails HOA",
            "slug": "welcome-to-jackson-trails-hoa",
            "content": "<p>Welcome to the new Jackson Trails Homeowners Association website!</p>\
                        <p>We are excited to bring you a new way to stay informed about \
                        community news and access important documents.</p>",
            "published_date": "2024-01-15 10:00:00.000Z",
            "featured": true,
        }),
        json!({
            "id": MEETING_ID,
            "title": "Annual Meeting Reminder",
            "slug": "annual-meeting-reminder",
            "content": "<p>A friendly reminder that our annual HOA meeting is scheduled for \
                        March 10th at 7 PM in the clubhouse.</p>\
                        <p>Please plan to attend to discuss important community matters.</p>",
            "published_date": "2024-02-28 09:00:00.000Z",
            "featured": false,
        }),
    ]
}

// The file field is required, so each document carries a placeholder name
// until the real PDF is uploaded.
fn documents() -> Vec<Value> {
    vec![
        json!({
            "id": BYLAWS_ID,
            "title": "HOA Bylaws",
            "category": "Bylaws",
            "year": 2023,
            "file": "hoa-bylaws.pdf",
            "description": "The official bylaws of the Jackson Trails Homeowners Association.",
        }),
        json!({
            "id": FINANCIALS_ID,
            "title": "2023 Annual Financial Report",
            "category": "Financial Reports",
            "year": 2023,
            "file": "2023-annual-financial-report.pdf",
            "description": "Summary of the HOA's financial activities for the year 2023.",
        }),
    ]
}

pub fn up(store: &mut dyn SchemaStore) -> Result<()> {
    for row in announcements() {
        store.insert_record(ANNOUNCEMENTS, record_data(row))?;
    }
    for row in documents() {
        store.insert_record(DOCUMENTS, record_data(row))?;
    }
    Ok(())
}

pub fn down(store: &mut dyn SchemaStore) -> Result<()> {
    let mut removed = 0;
    for (collection, rows) in [(ANNOUNCEMENTS, announcements()), (DOCUMENTS, documents())] {
        if store.find_collection(collection)?.is_none() {
            continue;
        }
        for row in rows {
            let Some(id) = row["id"].as_str() else {
                continue;
            };
            if store.get_record(collection, id)?.is_some() {
                store.delete_record(collection, id)?;
                removed += 1;
            }
        }
    }
    info!("removed {removed} seeded records");
    Ok(())
}

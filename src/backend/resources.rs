//! Static lookups mounted under `/api/internal/resources`. Public once past
//! the gateway (`permission_validator.py`'s allow-list carves out
//! `/api/external/resources/` for any authenticated user, mirrored in
//! `gateway::permission`), since they're reference data rather than
//! anything tenant-scoped. Timezones enumerate `chrono-tz`'s IANA database;
//! languages are the two the ICS card formatter actually renders
//! (`delivery::actionable_item_formatter`) rather than a speculative list.

use rocket::get;
use rocket::serde::json::Json;
use serde_json::{json, Value};

use super::guard::Identity;

#[get("/api/internal/resources/timezones")]
pub fn list_timezones(_identity: Identity) -> Json<Value> {
    let zones: Vec<&str> = chrono_tz::TZ_VARIANTS.iter().map(|tz| tz.name()).collect();
    Json(json!(zones))
}

#[get("/api/internal/resources/languages")]
pub fn list_languages(_identity: Identity) -> Json<Value> {
    Json(json!([
        {"code": "en", "name": "English"},
        {"code": "he", "name": "Hebrew"},
    ]))
}

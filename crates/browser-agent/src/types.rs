use drover_core::Decision;
use serde::{Deserialize, Serialize};

// ─── Requests ─────────────────────────────────────────────────────────────

/// One request line sent to the actor process, discriminated by `"op"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ActorRequest {
    /// Authenticate the session. Sent once, first.
    Login {
        account: String,
        credential: String,
    },
    /// Open the work area after login.
    Navigate,
    /// Ask for the next work item's id.
    FetchItem,
    /// Ask for the secondary (platform UID) identifier of the current item.
    FetchUid,
    /// Apply a decision to the current item and submit it.
    Apply { decision: Decision },
    /// Liveness probe.
    Ping,
    /// Ask the actor to tear down and exit.
    Close,
}

// ─── Responses ────────────────────────────────────────────────────────────

/// One response line read from the actor process, discriminated by
/// `"status"`. Every request gets exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActorResponse {
    /// Generic success. `has_item` is set for `navigate`.
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_item: Option<bool>,
    },
    /// `fetch_item`: a real item id.
    Item { id: String },
    /// `fetch_item`: the surface rendered an item with no id.
    Blank,
    /// `fetch_item`: no more items available for this account.
    Exhausted,
    /// `fetch_uid` result.
    Uid { value: String },
    /// The actor failed to execute the request.
    Error { message: String },
}

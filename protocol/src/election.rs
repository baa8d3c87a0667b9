//! Message sent over the message-framed notification channel between
//! coordinators (as opposed to the plain HTTP probe endpoints).

use serde::{Deserialize, Serialize};

/// The sole peer-to-peer notification: "the active gamemaster just failed,
/// you are the best remaining candidate".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    #[serde(rename = "GM_FAIL")]
    GmFail,
}

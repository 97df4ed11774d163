//! Big-map update types from the TzKT event stream.
//!
//! Only the consumed fields are modeled; everything else TzKT sends is
//! ignored during deserialization.

use serde::Deserialize;
use serde_json::Value;

/// One change event to a contract's `token_metadata` big map.
#[derive(Debug, Clone, Deserialize)]
pub struct BigMapUpdate {
    /// TzKT-assigned update id, strictly increasing over the stream
    pub id: u64,

    /// Block level the update was applied at
    pub level: u64,

    /// Contract owning the big map
    pub contract: ContractRef,

    /// Storage path of the big map (e.g. "assets.token_metadata")
    pub path: String,

    /// Update action ("add_key", "update_key", ...)
    pub action: String,

    /// Updated content; absent for allocations and removals
    #[serde(default)]
    pub content: Option<BigMapContent>,
}

/// Contract reference inside an update.
#[derive(Debug, Clone, Deserialize)]
pub struct ContractRef {
    /// KT1 address
    pub address: String,
}

/// Content of one big-map key update.
#[derive(Debug, Clone, Deserialize)]
pub struct BigMapContent {
    /// Raw value payload in the codec's input shape:
    /// `{"<token id>": {"<key>": "<hex or plain value>", ...}}`
    pub value: Value,
}

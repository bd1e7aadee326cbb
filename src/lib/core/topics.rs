//! Destinations used by the crowdfunding front end.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Global topic carrying successful pledge results.
pub const PLEDGE_SUCCESS: &str = "/user/queue/pledge/success";
/// Global topic carrying failed pledge results.
pub const PLEDGE_ERROR: &str = "/user/queue/pledge/error";
/// Command destination for pledge creation.
pub const PLEDGE_DESTINATION: &str = "/app/pledge";

/// Per-campaign progress topic, e.g. `/topic/campaign/42/progress`.
pub fn campaign_progress(campaign_id: impl Display) -> String {
    format!("/topic/campaign/{campaign_id}/progress")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeCommand {
    pub campaign_id: String,
    pub reward_id: Option<String>,
    pub amount: u64,
    pub bonus_amount: u64,
    pub total_amount: u64,
    #[serde(default)]
    pub add_ons: Vec<AddOn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub reward_item_id: String,
    pub quantity: u32,
}

//! Event team ranking model.

use serde::{Deserialize, Serialize};

/// A team's standing at one event. Rankings have no deletion flag: the set for an
/// event is replaced wholesale on every successful fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventTeamRanking {
    pub event_key: String,
    pub team_key: String,
    pub rank: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_score: Option<f64>,
}

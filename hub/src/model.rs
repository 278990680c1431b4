//! Deserialization targets for the slice of the GitHub REST API this crate
//! speaks. Deliberately narrow — only the fields the conversion functions in
//! `lib.rs` actually read.

use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct GhRepo {
    pub name: String,
    pub owner: GhOwner,
}

#[derive(Deserialize)]
pub(crate) struct GhOwner {
    pub login: String,
}

#[derive(Deserialize)]
pub(crate) struct GhCombinedStatus {
    pub statuses: Vec<GhStatus>,
}

#[derive(Deserialize)]
pub(crate) struct GhStatus {
    pub state: String,
    pub target_url: Option<String>,
    pub description: Option<String>,
    pub context: String,
}

#[derive(Deserialize)]
pub(crate) struct GhPullRequest {
    pub number: u64,
    pub state: String,
    pub title: String,
    pub head: GhCommitRef,
}

#[derive(Deserialize)]
pub(crate) struct GhCommitRef {
    pub sha: String,
}

#[derive(Deserialize)]
pub(crate) struct GhRef {
    pub r#ref: String,
    pub object: GhRefObject,
}

#[derive(Deserialize)]
pub(crate) struct GhRefObject {
    pub sha: String,
}

#[derive(Deserialize)]
pub(crate) struct GhEvent {
    pub r#type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_pull_request_payload() {
        let json = serde_json::json!({
            "number": 7,
            "state": "open",
            "title": "add x",
            "head": {"sha": "deadbeef"},
        });
        let pr: GhPullRequest = serde_json::from_value(json).unwrap();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.head.sha, "deadbeef");
    }

    #[test]
    fn deserializes_a_combined_status_payload() {
        let json = serde_json::json!({
            "statuses": [
                {"state": "success", "target_url": null, "description": null, "context": "ci/build"},
            ],
        });
        let combined: GhCombinedStatus = serde_json::from_value(json).unwrap();
        assert_eq!(combined.statuses.len(), 1);
        assert_eq!(combined.statuses[0].context, "ci/build");
    }
}

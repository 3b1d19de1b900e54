//! Management commands published to the job manager.

use serde::Serialize;

/// Body of a message on the `{base}/{clientId}/manager/manage` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManageCommand {
    pub request: &'static str,
    pub target: String,
    pub delete_old: bool,
}

impl ManageCommand {
    /// Ask the manager to run `job_id` again, discarding its previous output.
    pub fn rerun(job_id: impl Into<String>) -> Self {
        Self {
            request: "rerun",
            target: job_id.into(),
            delete_old: true,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

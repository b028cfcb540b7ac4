use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ApprovalId, MissionId, TaskId};
use super::mission::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub mission_id: MissionId,
    pub task_id: Option<TaskId>,
    pub action: String,
    pub tool_name: Option<String>,
    pub risk_level: RiskLevel,
    pub estimated_cost: Option<f64>,
    pub status: ApprovalStatus,
    pub auto_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state_version: u64,
}

impl Approval {
    pub fn new(
        mission_id: MissionId,
        task_id: Option<TaskId>,
        action: String,
        tool_name: Option<String>,
        risk_level: RiskLevel,
        estimated_cost: Option<f64>,
    ) -> Self {
        Self {
            id: ApprovalId::generate(),
            mission_id,
            task_id,
            action,
            tool_name,
            risk_level,
            estimated_cost,
            status: ApprovalStatus::Pending,
            auto_approved: false,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            comment: None,
            created_at: Utc::now(),
            state_version: 1,
        }
    }

    pub fn approve(&mut self, approved_by: String, comment: Option<String>) {
        self.status = ApprovalStatus::Approved;
        self.approved_by = Some(approved_by);
        self.approved_at = Some(Utc::now());
        self.comment = comment;
        self.state_version += 1;
    }

    pub fn reject(&mut self, rejected_by: String, comment: Option<String>) {
        self.status = ApprovalStatus::Rejected;
        self.rejected_by = Some(rejected_by);
        self.rejected_at = Some(Utc::now());
        self.comment = comment;
        self.state_version += 1;
    }

    pub fn auto_approve(&mut self, comment: String) {
        self.status = ApprovalStatus::AutoApproved;
        self.auto_approved = true;
        self.approved_by = Some("policy".into());
        self.approved_at = Some(Utc::now());
        self.comment = Some(comment);
        self.state_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_sets_human_provenance_fields() {
        let mut approval = Approval::new(MissionId::generate(), None, "unlock".into(), None, RiskLevel::Low, None);
        approval.approve("human".into(), Some("ok".into()));
        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert_eq!(approval.approved_by.as_deref(), Some("human"));
        assert!(!approval.auto_approved);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk tier derived from the fraud score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// LOW <40, MEDIUM 40-69, HIGH >=70.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=39 => RiskTier::Low,
            40..=69 => RiskTier::Medium,
            _ => RiskTier::High,
        }
    }
}

/// Ephemeral risk assessment. A gating signal for the lifecycle manager,
/// never authoritative state; the scorer mutates nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub reservation_id: Uuid,
    pub client_id: Uuid,
    pub score: u32,
    pub tier: RiskTier,
    pub triggered_rules: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

impl FraudAssessment {
    pub fn new(
        reservation_id: Uuid,
        client_id: Uuid,
        score: u32,
        triggered_rules: Vec<String>,
    ) -> Self {
        Self {
            reservation_id,
            client_id,
            score,
            tier: RiskTier::from_score(score),
            triggered_rules,
            assessed_at: Utc::now(),
        }
    }

    pub fn requires_manual_review(&self) -> bool {
        self.tier == RiskTier::High
    }
}

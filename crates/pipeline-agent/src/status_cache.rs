//! Agent status cache: mapping from agent id to its last-reported
//! status, kept fresh by heartbeat intake.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const HEARTBEAT_STALE_AFTER_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentHealth {
    Online,
    Offline,
    Busy,
    Idle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub status: AgentHealth,
    pub running_jobs_count: u32,
    pub max_concurrent_jobs: u32,
    pub labels: HashMap<String, String>,
    pub metrics: HashMap<String, f64>,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentStatus {
    /// Heartbeats older than 5 minutes are treated as offline
    /// regardless of reported status.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        if now - self.last_heartbeat > ChronoDuration::minutes(HEARTBEAT_STALE_AFTER_MINUTES) {
            return false;
        }
        matches!(self.status, AgentHealth::Online | AgentHealth::Idle)
    }
}

/// Upserted by heartbeat intake, read by agent selection. Reads
/// dominate, so a read/write lock is appropriate.
#[derive(Default)]
pub struct AgentStatusCache {
    agents: RwLock<HashMap<String, AgentStatus>>,
}

impl AgentStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_from_heartbeat(&self, status: AgentStatus) {
        self.agents.write().insert(status.agent_id.clone(), status);
    }

    pub fn remove(&self, agent_id: &str) {
        self.agents.write().remove(agent_id);
    }

    /// Snapshot of agents that are live as of `now`, in cache iteration
    /// order (the tiebreaker for equally-loaded candidates).
    pub fn live_agents(&self, now: DateTime<Utc>) -> Vec<AgentStatus> {
        self.agents
            .read()
            .values()
            .filter(|a| a.is_live(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentStatus> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: &str, minutes_ago: i64, health: AgentHealth) -> AgentStatus {
        AgentStatus {
            agent_id: id.to_string(),
            status: health,
            running_jobs_count: 0,
            max_concurrent_jobs: 10,
            labels: HashMap::new(),
            metrics: HashMap::new(),
            last_heartbeat: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    #[test]
    fn stale_heartbeat_is_not_live() {
        let cache = AgentStatusCache::new();
        cache.update_from_heartbeat(status("a1", 10, AgentHealth::Online));
        assert!(cache.live_agents(Utc::now()).is_empty());
    }

    #[test]
    fn offline_status_is_not_live_even_if_fresh() {
        let cache = AgentStatusCache::new();
        cache.update_from_heartbeat(status("a1", 0, AgentHealth::Offline));
        assert!(cache.live_agents(Utc::now()).is_empty());
    }

    #[test]
    fn fresh_online_agent_is_live() {
        let cache = AgentStatusCache::new();
        cache.update_from_heartbeat(status("a1", 1, AgentHealth::Online));
        assert_eq!(cache.live_agents(Utc::now()).len(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let cache = AgentStatusCache::new();
        cache.update_from_heartbeat(status("a1", 0, AgentHealth::Online));
        cache.remove("a1");
        assert!(cache.is_empty());
    }
}

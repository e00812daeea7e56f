//! Leaderboard and rank of the controlled agent.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::{Agent, AgentId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
    /// Marks the controlled agent's row.
    pub is_self: bool,
}

/// Materialised ranking, refreshed on a fixed cadence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standings {
    /// Top entries, best first.
    pub entries: Vec<LeaderboardEntry>,
    /// 1-based rank of the controlled agent; `None` once it is dead.
    pub rank: Option<usize>,
    /// Number of live agents ranked.
    pub total: usize,
}

impl Standings {
    /// Ranks every live agent by descending score; ties keep iteration order.
    pub fn compute<'a>(
        agents: impl IntoIterator<Item = &'a Agent>,
        self_id: AgentId,
        top: usize,
    ) -> Self {
        let mut live: Vec<&Agent> = agents.into_iter().filter(|agent| !agent.is_dead).collect();
        live.sort_by_key(|agent| Reverse(agent.score));

        let rank = live
            .iter()
            .position(|agent| agent.id == self_id)
            .map(|idx| idx + 1);
        let entries = live
            .iter()
            .take(top)
            .map(|agent| LeaderboardEntry {
                name: agent.name.clone(),
                score: agent.score,
                is_self: agent.id == self_id,
            })
            .collect();
        Self {
            entries,
            rank,
            total: live.len(),
        }
    }

    /// Compact `name:score` listing used in log lines.
    #[must_use]
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}:{}", entry.name, entry.score))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

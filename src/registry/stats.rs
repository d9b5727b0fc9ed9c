//! Registry statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Point-in-time registry counts, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Registered servers.
    pub server_count: usize,
    /// Indexed tools across all servers.
    pub tool_count: usize,
    /// Indexed tools per server ID.
    pub tools_per_server: BTreeMap<String, usize>,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} server(s), {} tool(s)",
            self.server_count, self.tool_count
        )?;
        if !self.tools_per_server.is_empty() {
            let breakdown: Vec<String> = self
                .tools_per_server
                .iter()
                .map(|(id, n)| format!("{id}={n}"))
                .collect();
            write!(f, " [{}]", breakdown.join(", "))?;
        }
        Ok(())
    }
}

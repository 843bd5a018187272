use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
    /// Extra per-target filter directives appended to the base level,
    /// e.g. "radiolink::core=debug".
    pub filters: Option<String>,
}

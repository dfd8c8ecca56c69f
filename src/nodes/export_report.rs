use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{State, StateUpdate};

/// Final stage; records the finished report
pub struct ExportReport;

#[async_trait]
impl Node for ExportReport {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        let claims: usize = state.details.iter().map(|s| s.claims.len()).sum();
        let biases: usize = state.details.iter().map(|s| s.biases.len()).sum();

        info!(
            run_id = %ctx.run_id,
            segments = state.details.len(),
            claims,
            biases,
            report_chars = state.report.chars().count(),
            "Report ready"
        );
        debug!(steps = ?state.events.steps(), report = %state.report, "Report");

        Ok(StateUpdate::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::test_support::context;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_export_changes_nothing() {
        let mut state = State::new("x", Arc::default());
        state.report = "Reliable.".into();

        let update = ExportReport.run(&state, &context()).await.unwrap();

        assert!(update.report.is_none());
        assert!(update.details.is_none());
        assert!(update.events.is_empty());
    }
}

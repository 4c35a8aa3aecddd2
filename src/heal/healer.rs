use crate::client::{DriveState, HealOpts, HealResultItem, NodeClient};
use crate::heal::error::HealResult;
use crate::heal::pool::ObjectHealer;
use crate::heal::progress::HealProgress;
use crate::heal::reconcile::{reconcile, TargetSet};
use crate::heal::types::HealItemStatus;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Status to persist for a reconciled heal result.
pub fn classify_item(item: &HealResultItem) -> HealItemStatus {
    if item.after.is_empty() {
        return HealItemStatus::Failed;
    }
    let (data, _) = item.erasure_layout();
    let (_, online) = item.online_counts();
    if online < data {
        HealItemStatus::CannotBeHealed
    } else if item.after.iter().any(|d| d.state != DriveState::Ok) {
        HealItemStatus::MissingParts
    } else {
        HealItemStatus::Ok
    }
}

/// Heals objects through one server.
pub struct NodeHealer {
    client: Arc<dyn NodeClient>,
    opts: HealOpts,
    targets: Arc<TargetSet>,
    progress: Option<HealProgress>,
}

impl NodeHealer {
    pub fn new(client: Arc<dyn NodeClient>, opts: HealOpts, targets: Arc<TargetSet>) -> Self {
        Self {
            client,
            opts,
            targets,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: HealProgress) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait]
impl ObjectHealer for NodeHealer {
    fn name(&self) -> String {
        self.client.endpoint()
    }

    async fn heal(&self, bucket: &str, key: &str) -> HealResult<HealItemStatus> {
        let mut item = match self.client.heal_object(bucket, key, &self.opts).await {
            Ok(item) => item,
            Err(e) => {
                warn!(endpoint = %self.client.endpoint(), bucket, key, "Heal request failed: {}", e);
                return Ok(HealItemStatus::Failed);
            }
        };

        reconcile(&mut item, &self.targets);
        let status = classify_item(&item);
        if let Some(progress) = &self.progress {
            progress.report(item);
        }
        Ok(status)
    }
}

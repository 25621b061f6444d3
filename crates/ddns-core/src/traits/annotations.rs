// # Annotation Updater Trait
//
// External collaborator invoked when the trigger hostname changed.

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Pushes the apex addresses to resources selected by a label selector
#[async_trait]
pub trait AnnotationUpdater: Send + Sync {
    /// Set the target annotation on every selected resource to `ips`
    ///
    /// Returns whether any resource changed (or would change in dry-run mode).
    async fn update_apex_annotations(
        &self,
        ips: &[Ipv4Addr],
        label_selector: &str,
        dry_run: bool,
    ) -> Result<bool, crate::Error>;
}

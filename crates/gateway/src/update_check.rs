/// Seam for the auxiliary scheduled-update checker (out of scope, §1):
/// the core only guarantees this trigger point exists, not a scheduler.
///
/// A real deployment injects its own `UpdateCheckTrigger` (backed by the
/// `UPDATE_CHECK_CRON` schedule) at startup; the gateway itself never
/// constructs or runs one.
pub trait UpdateCheckTrigger: Send + Sync {
    fn check(&self);
}

/// The default when no checker is configured.
pub struct NoopUpdateCheck;

impl UpdateCheckTrigger for NoopUpdateCheck {
    fn check(&self) {}
}

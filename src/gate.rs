//! The operator confirmation gate between enhancement and extraction.
//!
//! Every VLM call costs money, and a bad scan wastes it: the model will
//! happily hallucinate forty rows from an unreadable page. The gate pauses
//! the pipeline after the enhanced image has been written to disk so a
//! human can open it, judge the scan, and abort the run before the first
//! API token is spent.
//!
//! The gate is a trait rather than a boolean so unattended batch runs can
//! plug in [`AutoConfirm`] (or leave the config's gate unset, which means
//! the same thing) while the CLI installs a blocking stdin prompt. The
//! driver invokes the gate on a blocking thread; implementations may wait
//! indefinitely.

use std::path::Path;

/// Decides whether a prepared page should be sent to the VLM.
///
/// Returning `false` aborts the entire run, not just the page — the gate is
/// a spend control, and an operator who has seen one unusable scan usually
/// wants to stop and rescan the whole batch.
pub trait ConfirmationGate: Send + Sync {
    /// Called once per page, after the enhanced image exists at
    /// `enhanced_path` and before any VLM traffic.
    fn confirm_page(&self, page_num: usize, total_pages: usize, enhanced_path: &Path) -> bool;
}

/// A gate that approves every page. Equivalent to configuring no gate at
/// all; exists so callers can be explicit about unattended operation.
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm_page(&self, _page_num: usize, _total_pages: usize, _enhanced_path: &Path) -> bool {
        true
    }
}

//! FILENAME: edit-engine/src/dialog.rs
//! PURPOSE: Confirmation prompts raised by the edit session.
//! CONTEXT: Presentation belongs to the host, which implements `Confirm`.
//! `DialogGate` keeps at most one request outstanding.

use crate::error::EditError;
use async_trait::async_trait;
use engine::{log_debug, Localizer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Confirm,
    Delete,
    Warning,
    Info,
}

/// Everything the host needs to show one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogRequest {
    pub title: String,
    pub message: String,
    pub confirm_text: String,
    pub cancel_text: String,
    pub kind: DialogKind,
}

impl DialogRequest {
    fn localized(localizer: &dyn Localizer, message_key: &str, confirm_key: &str, kind: DialogKind) -> Self {
        DialogRequest {
            title: localizer.constant("confirmTitle"),
            message: localizer.constant(message_key),
            confirm_text: localizer.constant(confirm_key),
            cancel_text: localizer.constant("cancelText"),
            kind,
        }
    }

    pub fn save(localizer: &dyn Localizer) -> Self {
        Self::localized(localizer, "saveConfirm", "confirmText", DialogKind::Confirm)
    }

    pub fn cancel_edit(localizer: &dyn Localizer) -> Self {
        Self::localized(localizer, "cancelEditConfirm", "confirmText", DialogKind::Confirm)
    }

    pub fn delete(localizer: &dyn Localizer) -> Self {
        Self::localized(localizer, "deleteConfirm", "deleteText", DialogKind::Delete)
    }

    pub fn unsaved_changes(localizer: &dyn Localizer) -> Self {
        Self::localized(localizer, "unsavedChangesConfirm", "confirmText", DialogKind::Warning)
    }
}

/// Host-side prompt. Resolves to true when the user confirms.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, request: &DialogRequest) -> bool;
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Debug, Default)]
pub struct DialogGate {
    busy: AtomicBool,
    current: Mutex<Option<DialogRequest>>,
}

/// Releases the gate when the prompt resolves or its future is dropped.
struct Outstanding<'a>(&'a DialogGate);

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.0.current.lock() {
            *current = None;
        }
        self.0.busy.store(false, Ordering::Release);
    }
}

impl DialogGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// The request currently shown, if any.
    pub fn current(&self) -> Option<DialogRequest> {
        self.current.lock().ok().and_then(|c| c.clone())
    }

    /// Show `request` through `confirm`. Fails with `DialogBusy` while another
    /// request is outstanding.
    pub async fn ask(&self, confirm: &dyn Confirm, request: DialogRequest) -> Result<bool, EditError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EditError::DialogBusy);
        }
        let _outstanding = Outstanding(self);
        if let Ok(mut current) = self.current.lock() {
            *current = Some(request.clone());
        }
        let answer = confirm.confirm(&request).await;
        log_debug!("EDIT", "dialog '{}' answered {}", request.message, answer);
        Ok(answer)
    }
}

// ============================================================================
// BUILT-IN RESPONDERS
// ============================================================================

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _request: &DialogRequest) -> bool {
        self.0
    }
}

/// Answers from a queue, then falls back to a default. Keeps every request.
#[derive(Debug, Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    asked: Mutex<Vec<DialogRequest>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool], fallback: bool) -> Self {
        ScriptedConfirm {
            answers: Mutex::new(answers.iter().copied().collect()),
            fallback,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<DialogRequest> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, request: &DialogRequest) -> bool {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(request.clone());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::DefaultLocalizer;

    struct Reentrant<'a>(&'a DialogGate);

    #[async_trait]
    impl Confirm for Reentrant<'_> {
        async fn confirm(&self, _request: &DialogRequest) -> bool {
            assert!(self.0.is_open());
            assert!(self.0.current().is_some());
            let nested = self.0.ask(&AutoConfirm(true), DialogRequest::save(&DefaultLocalizer)).await;
            matches!(nested, Err(EditError::DialogBusy))
        }
    }

    #[test]
    fn test_localized_requests() {
        let delete = DialogRequest::delete(&DefaultLocalizer);
        assert_eq!(delete.kind, DialogKind::Delete);
        assert_eq!(delete.confirm_text, "Delete");
        assert_eq!(delete.message, "Are you sure you want to delete the record?");
        assert_eq!(DialogRequest::unsaved_changes(&DefaultLocalizer).kind, DialogKind::Warning);
    }

    #[tokio::test]
    async fn test_gate_allows_one_outstanding_request() {
        let gate = DialogGate::new();
        let answer = gate
            .ask(&Reentrant(&gate), DialogRequest::save(&DefaultLocalizer))
            .await
            .unwrap();
        assert!(answer);
        assert!(!gate.is_open());
        assert!(gate.current().is_none());
    }

    #[tokio::test]
    async fn test_scripted_answers() {
        let gate = DialogGate::new();
        let script = ScriptedConfirm::new(&[false], true);
        let req = DialogRequest::cancel_edit(&DefaultLocalizer);
        assert!(!gate.ask(&script, req.clone()).await.unwrap());
        assert!(gate.ask(&script, req).await.unwrap());
        assert_eq!(script.asked().len(), 2);
    }
}

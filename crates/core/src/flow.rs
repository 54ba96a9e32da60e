//! Pure progress transitions.
//!
//! Every operation takes the session's current progress (or its absence) and
//! returns the next progress plus the effect the caller should produce. The
//! caller owns persistence; nothing here touches a store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    PageSubmission, Progress, ProgressError, ProgressStatus, SubmissionError, TestId, TestLayout,
};

/// Where the respondent should be sent instead of seeing a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "to", content = "test_id", rename_all = "snake_case")]
pub enum Redirect {
    Index,
    Test(TestId),
    Result(TestId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEffect {
    /// Render the page with this 1-based number.
    ShowPage { number: u32, count: u32 },
    Redirect(Redirect),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Unchanged,
    Save,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub progress: Option<Progress>,
    pub store: StoreAction,
    pub effect: FlowEffect,
}

impl Transition {
    fn unchanged(progress: Option<Progress>, effect: FlowEffect) -> Self {
        Self {
            progress,
            store: StoreAction::Unchanged,
            effect,
        }
    }
}

/// Outcome of asking for a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultGate {
    /// Progress is finished for the requested test and can be scored.
    Ready(Progress),
    Redirect(Redirect),
}

fn live(current: Option<Progress>) -> Option<Progress> {
    current.filter(|p| p.status() != ProgressStatus::NotStarted)
}

fn show_current(progress: &Progress) -> FlowEffect {
    FlowEffect::ShowPage {
        number: progress.current_page(),
        count: progress.page_count(),
    }
}

/// Opens `test_id` for the session, resuming or creating progress.
///
/// A session holds at most one live test; asking for another one redirects to
/// the live test and leaves progress untouched.
///
/// # Errors
///
/// Returns `ProgressError::NoPages` if a new progress would have no pages.
pub fn start_or_resume(
    current: Option<Progress>,
    test_id: TestId,
    page_count: u32,
    now: DateTime<Utc>,
) -> Result<Transition, ProgressError> {
    match live(current) {
        Some(progress) if progress.test_id() != test_id => {
            let effect = FlowEffect::Redirect(Redirect::Test(progress.test_id()));
            Ok(Transition::unchanged(Some(progress), effect))
        }
        Some(progress) if progress.is_finished() => Ok(Transition::unchanged(
            Some(progress),
            FlowEffect::Redirect(Redirect::Result(test_id)),
        )),
        Some(progress) => {
            let effect = show_current(&progress);
            Ok(Transition::unchanged(Some(progress), effect))
        }
        None => {
            let progress = Progress::start(test_id, page_count, now)?;
            let effect = show_current(&progress);
            Ok(Transition {
                progress: Some(progress),
                store: StoreAction::Save,
                effect,
            })
        }
    }
}

/// Validates and records the answers of the current page.
///
/// # Errors
///
/// Returns `SubmissionError::NotActive` unless progress is active,
/// `SubmissionError::PageUnavailable` if the layout lacks the current page,
/// and the validation errors of `PageSubmission::validate`.
pub fn submit_page(
    mut progress: Progress,
    layout: &TestLayout,
    submission: PageSubmission,
    now: DateTime<Utc>,
) -> Result<Transition, SubmissionError> {
    if !progress.is_active() {
        return Err(SubmissionError::NotActive(progress.status()));
    }
    let number = progress.current_page();
    let page = layout
        .page(number)
        .filter(|_| layout.test_id() == progress.test_id())
        .ok_or(SubmissionError::PageUnavailable(number))?;

    let accepted = submission.validate(page)?;
    progress.record_page(accepted, now);

    let effect = if progress.is_finished() {
        FlowEffect::Redirect(Redirect::Result(progress.test_id()))
    } else {
        show_current(&progress)
    };
    Ok(Transition {
        progress: Some(progress),
        store: StoreAction::Save,
        effect,
    })
}

/// Drops any progress, whatever its status.
#[must_use]
pub fn give_up(_current: Option<Progress>) -> Transition {
    Transition {
        progress: None,
        store: StoreAction::Delete,
        effect: FlowEffect::Redirect(Redirect::Index),
    }
}

/// Decides whether the result of `test_id` can be computed now.
#[must_use]
pub fn result_gate(current: Option<Progress>, test_id: TestId) -> ResultGate {
    match live(current) {
        None => ResultGate::Redirect(Redirect::Test(test_id)),
        Some(progress) if !progress.is_finished() => {
            ResultGate::Redirect(Redirect::Test(progress.test_id()))
        }
        Some(progress) if progress.test_id() != test_id => {
            ResultGate::Redirect(Redirect::Result(progress.test_id()))
        }
        Some(progress) => ResultGate::Ready(progress),
    }
}

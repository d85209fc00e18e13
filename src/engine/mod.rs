// src/engine/mod.rs

//! The answer-session lifecycle and grading engine.

pub mod clock;
pub mod error;
pub mod grading;
pub mod scoring;
pub mod session;
pub mod submission;

use std::sync::Arc;

use crate::store::{QuestionCatalog, Store};

use self::{
    clock::Clock, scoring::ScoringReconciler, session::SessionMachine,
    submission::SubmissionCoordinator,
};

/// The engine's services, wired to one store, catalog and clock.
#[derive(Clone)]
pub struct Services {
    pub sessions: SessionMachine,
    pub submissions: SubmissionCoordinator,
    pub scoring: ScoringReconciler,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
        default_timeout_minutes: i32,
    ) -> Self {
        let sessions = SessionMachine::new(
            store.clone(),
            catalog.clone(),
            clock.clone(),
            default_timeout_minutes,
        );
        let scoring = ScoringReconciler::new(store.clone(), clock.clone());
        let submissions = SubmissionCoordinator::new(sessions.clone(), store, catalog, clock);

        Services { sessions, submissions, scoring }
    }
}

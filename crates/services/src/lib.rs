#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog;
pub mod config;
pub mod error;
pub mod flow_service;
pub mod views;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use config::SearchSettings;
pub use error::{AppServicesError, ConfigurationError, FlowError};
pub use flow_service::TestFlowService;
pub use views::{
    AlternateView, AnswerOption, AnswerView, IndexView, PageOutcome, PageView, QuestionView,
    ResultOutcome, ResultView, SearchStatus, TestSummary,
};

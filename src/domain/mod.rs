//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod analysis;
pub mod entities;
pub mod errors;

pub use analysis::{
    AnalysisResult, AnalysisSummary, AnswerAnalysis, QuestionAnalysis, QuestionCategory,
};
pub use entities::{
    Chat, CommandInvocation, InboundUpdate, IncomingMessage, Message, NewReport, Report,
    TextFormat,
};
pub use errors::DomainError;

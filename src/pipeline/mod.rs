//! Retrieval-augmented query pipeline
//!
//! Control flow: question → embedder → vector index → relevance gate →
//! {stored fact | generative client | canned reply}. Every answer carries its
//! provenance in `source`.

pub mod gate;
pub mod orchestrator;

pub use gate::{validate_question, DomainPolicy, GateDecision, RejectReason, RelevanceGate};
pub use orchestrator::{Answer, Outcome, PipelineSettings, QueryOrchestrator, QueryStage, Source};

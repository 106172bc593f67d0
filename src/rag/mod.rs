//! Graph-augmented retrieval and answering.
//!
//! Offline: [`corpus`] → [`extraction`] → [`indexer`] → [`store`].
//! Per request: [`retrieval`] → [`composer`] → [`generator`], orchestrated
//! by [`service::QuestionService`].

pub mod cache;
pub mod composer;
pub mod corpus;
pub mod domain;
pub mod embedding;
pub mod extraction;
pub mod generator;
pub mod indexer;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod tokens;

pub use domain::answer::{Answer, AnswerStatus, QueryMode, Question, RetrievalResult};
pub use domain::graph::{Community, Document, Entity, Relation};
pub use service::{AnswerTrace, QuestionService, ServiceConfig};
pub use store::{GraphSnapshot, GraphStore};

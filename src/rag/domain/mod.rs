pub mod answer;
pub mod graph;

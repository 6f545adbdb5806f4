pub mod chunker;
pub mod config;
pub mod db;
pub mod http;
pub mod run;
pub mod seams;
pub mod types;

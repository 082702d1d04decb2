// Módulos de la aplicación
pub mod answer;
pub mod api;
pub mod app_state;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod loader;
pub mod models;
pub mod practice;
pub mod prompts;
pub mod splitter;
pub mod update;
pub mod vector_store;

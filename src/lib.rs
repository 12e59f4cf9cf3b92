//! Headless admin client for a voice-chat-room platform: generic list screens
//! over the backend's REST resources and a polling room chat view.

pub mod api;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod notice;
pub mod render;
pub mod resource;
pub mod session;
pub mod upload;

pub mod conversation_service;
pub mod gateway;
pub mod health_service;
pub mod ingest_service;
pub mod message_service;
pub mod normalizer;
pub mod realtime_service;

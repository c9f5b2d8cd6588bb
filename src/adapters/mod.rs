//! Implementations of the ports: storage, cache, bus, HTTP gateways and
//! the message catalogue.

pub mod bus;
pub mod http_gateway;
pub mod http_services;
pub mod in_memory;
pub mod postgres_entity_repository;
pub mod redis_cache;
pub mod translator;

pub use bus::{InProcessBus, RetryPolicy};
pub use http_gateway::HttpGatewayClient;
pub use http_services::{
    HttpComplianceGateway, HttpIssueTracker, HttpOperationService, HttpPixGateway,
    HttpSmsGateway, HttpSmtpGateway, HttpUserService,
};
pub use in_memory::{in_memory_repositories, InMemoryCache, InMemoryRepository, RecordingEmitter};
pub use postgres_entity_repository::PostgresEntityRepository;
pub use redis_cache::RedisCache;
pub use translator::CatalogTranslator;

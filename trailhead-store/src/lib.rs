pub mod app_config;
pub mod cache;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod reservation_repo;
pub mod shift_repo;
pub mod stripe;
pub mod tour_repo;

pub use cache::{CacheKey, RequestCache};
pub use database::DbClient;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use reservation_repo::StoreReservationRepository;
pub use shift_repo::StoreShiftRepository;
pub use stripe::StripeGateway;
pub use tour_repo::StoreTourRepository;

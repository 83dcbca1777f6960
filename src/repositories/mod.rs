pub mod dynamo_memes;
pub mod dynamo_users;
pub mod items;
pub mod memory;

pub use dynamo_memes::DynamoDbMemeRepository;
pub use dynamo_users::DynamoDbUserRepository;
pub use memory::{InMemoryMemeRepository, InMemoryUserRepository};

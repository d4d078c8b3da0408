pub mod driver;
pub mod fetcher;
pub mod registry;
pub mod windows;

pub mod chart;
pub mod controller;
pub mod export;
pub mod page;

pub use controller::{DashboardController, DashboardEvent, DashboardState, DashboardView, DateBounds, Stage};

pub mod compare;
pub mod correlation;
pub mod export;
pub mod insights;
pub mod portfolio;
pub mod setup;
pub mod ui;
pub mod view;

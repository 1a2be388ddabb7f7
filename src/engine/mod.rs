pub mod align;
pub mod correlation;
pub mod dataset;
pub mod events;
pub mod insights;
pub mod lag;
pub mod normalize;
pub mod overlay;
pub mod portfolio;
pub mod stats;

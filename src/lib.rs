pub mod api;
pub mod build_info;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod lstm;
pub mod market_data;
pub mod sentiment;
pub mod service;
#[cfg(test)]
pub mod test;
pub mod util {
    pub mod feature_engineering;
    pub mod file_utils;
    pub mod model_logger;
    pub mod pre_processor;
    #[cfg(test)]
    pub mod test_utils;
}

pub use error::{PredictorError, Result};

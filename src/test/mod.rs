pub mod model_tests;
pub mod pipeline_tests;
pub mod support;

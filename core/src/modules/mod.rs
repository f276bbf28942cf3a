pub mod api_extractor;
pub mod issues;
pub mod js_extractor;
pub mod matchers;
pub mod microservice;

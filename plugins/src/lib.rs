pub mod factory;
pub mod renderers;
pub mod services;
pub mod tools;

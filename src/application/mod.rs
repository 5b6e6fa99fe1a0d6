//! Export core: translation, policy, scrubbing and export orchestration.

pub mod aliases;
pub mod error;
pub mod export;
pub mod manager;
pub mod policy;
pub mod repos;
pub mod rules;
pub mod scrub;
pub mod site;
pub mod translator;

pub mod audit;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod destination;
pub mod filing;
pub mod folder_match;
pub mod ingress_log;
pub mod layout;
pub mod metadata;
pub mod paths;
pub mod repair;
pub mod retry;
pub mod util;
pub mod warn;
